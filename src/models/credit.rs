//! Credit entity and its amortization schedule rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BankError;

/// Credit lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    Active,
    Paid,
}

/// A credit line. Maps to the `credits` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Credit {
    pub id: Uuid,

    /// Borrower.
    pub user_id: Uuid,

    /// Outstanding amount, decremented by withdrawals against the line.
    pub amount: Decimal,

    /// Annual interest rate in percent.
    pub interest_rate: Decimal,

    pub term_months: i32,

    pub status: CreditStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credit {
    /// Draw `amount` against the remaining credit line.
    ///
    /// # Errors
    ///
    /// `CreditNotActive` unless the credit is active, `CreditAmountExceeded`
    /// if the request exceeds the outstanding amount. The outstanding amount
    /// is untouched on error. Drawing the line down to zero flips the status
    /// to [`CreditStatus::Paid`].
    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), BankError> {
        if self.status != CreditStatus::Active {
            return Err(BankError::CreditNotActive);
        }
        if amount > self.amount {
            return Err(BankError::CreditAmountExceeded);
        }
        self.amount -= amount;
        if self.amount == Decimal::ZERO {
            self.status = CreditStatus::Paid;
        }
        Ok(())
    }
}

/// One period of a credit's payment schedule. Maps to `payment_schedules`.
///
/// Generated once at credit creation, one row per term month, append-only.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub credit_id: Uuid,

    /// Due date of this period's payment.
    pub due_on: NaiveDate,

    /// Constant annuity payment for the period.
    pub payment: Decimal,

    /// Portion of the payment amortizing principal.
    pub principal: Decimal,

    /// Portion of the payment covering interest.
    pub interest: Decimal,

    /// Late-payment penalty, zero at creation.
    pub penalty: Decimal,

    /// Remaining balance after this payment.
    pub remaining: Decimal,

    pub created_at: DateTime<Utc>,
}
