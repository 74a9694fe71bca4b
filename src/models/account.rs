//! Account entity and its balance invariants.
//!
//! The balance is mutated only through [`Account::deposit`],
//! [`Account::withdraw`] and [`Account::transfer`], which hold the
//! non-negative-balance and valid-amount invariants. Services persist the
//! entity only after these methods succeed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BankError;

/// Currency code. A single unit is supported; multi-currency is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "currency", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rub,
}

/// Account kind, fixed at account-opening time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Savings,
    Checking,
    Credit,
}

/// A 20-digit bank account number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Validate and wrap a raw account number: exactly 20 ASCII digits.
    pub fn new(raw: String) -> Result<Self, BankError> {
        if raw.len() == 20 && raw.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(raw))
        } else {
            Err(BankError::InvalidAccountNumber)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bank account record.
///
/// Maps to the `accounts` table. Created once at account-opening time and
/// never physically deleted.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Account {
    pub id: Uuid,

    /// Owning user. User management lives outside this crate.
    pub user_id: Uuid,

    pub account_number: AccountNumber,

    /// Current balance. Never negative after any committed operation.
    pub balance: Decimal,

    pub currency: Currency,

    pub kind: AccountKind,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Increase the balance by `amount`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is negative; the balance is untouched.
    pub fn deposit(&mut self, amount: Decimal) -> Result<(), BankError> {
        if amount < Decimal::ZERO {
            return Err(BankError::InvalidAmount);
        }
        self.balance += amount;
        Ok(())
    }

    /// Decrease the balance by `amount`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if `amount` is negative, `InsufficientFunds` if the
    /// balance does not cover it; the balance is untouched either way.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), BankError> {
        if amount < Decimal::ZERO {
            return Err(BankError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(BankError::InsufficientFunds);
        }
        self.balance -= amount;
        Ok(())
    }

    /// Move `amount` from `self` to `target`.
    ///
    /// Pure in-memory composition of withdraw + deposit; persistence of both
    /// sides in one atomic unit is the ledger's responsibility.
    pub fn transfer(&mut self, target: &mut Account, amount: Decimal) -> Result<(), BankError> {
        self.withdraw(amount)?;
        target.deposit(amount)
    }
}
