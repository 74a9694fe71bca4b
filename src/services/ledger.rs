//! Account ledger - deposits, withdrawals, and atomic transfers.
//!
//! All mutating reads go through `lock_account` (row-level lock in the
//! Postgres adapter), so concurrent operations on one account serialize in
//! the storage engine instead of racing in process memory. Transfers debit
//! the source and credit the target inside ONE unit: both balance changes
//! commit together or not at all, and the sum of the two balances is
//! invariant across the operation.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BankError;
use crate::models::{Account, AccountKind, AccountNumber, Currency};
use crate::storage::{commit_or_rollback, AccountRepository, Storage};

/// Repository-backed account ledger.
///
/// Cheap to clone; the store and the injected random source are shared.
pub struct LedgerService<S> {
    store: Arc<S>,
    rng: Arc<Mutex<StdRng>>,
}

impl<S> Clone for LedgerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            rng: Arc::clone(&self.rng),
        }
    }
}

impl<S: AccountRepository> LedgerService<S> {
    /// Create a ledger over `store`.
    ///
    /// The random source is injected explicitly (it feeds account-number
    /// generation), so tests can seed it deterministically.
    pub fn new(store: Arc<S>, rng: StdRng) -> Self {
        Self {
            store,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Open a new account for `user_id` with `initial_balance`.
    ///
    /// # Errors
    ///
    /// `InvalidAmount` if the initial balance is negative.
    pub async fn open_account(
        &self,
        user_id: Uuid,
        initial_balance: Decimal,
        kind: AccountKind,
    ) -> Result<Account, BankError> {
        if initial_balance < Decimal::ZERO {
            return Err(BankError::InvalidAmount);
        }

        let account_number = self.generate_account_number()?;
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            user_id,
            account_number,
            balance: initial_balance,
            currency: Currency::Rub,
            kind,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let out = self.store.save_account(&mut tx, &account).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(account_id = %account.id, number = %account.account_number, "account opened");
        Ok(account)
    }

    /// Increase the account balance by `amount` in its own atomic unit.
    pub async fn deposit(&self, account_id: Uuid, amount: Decimal) -> Result<(), BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.deposit_in(&mut tx, account_id, amount).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// Deposit joining the caller's unit.
    pub async fn deposit_in(
        &self,
        tx: &mut S::Tx,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<(), BankError> {
        let mut account = self.store.lock_account(tx, account_id).await?;
        account.deposit(amount)?;
        self.store.save_account(tx, &account).await?;

        tracing::info!(%account_id, %amount, "deposit applied");
        Ok(())
    }

    /// Decrease the account balance by `amount` in its own atomic unit.
    pub async fn withdraw(&self, account_id: Uuid, amount: Decimal) -> Result<(), BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.withdraw_in(&mut tx, account_id, amount).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// Withdrawal joining the caller's unit.
    pub async fn withdraw_in(
        &self,
        tx: &mut S::Tx,
        account_id: Uuid,
        amount: Decimal,
    ) -> Result<(), BankError> {
        let mut account = self.store.lock_account(tx, account_id).await?;
        account.withdraw(amount)?;
        self.store.save_account(tx, &account).await?;

        tracing::info!(%account_id, %amount, "withdrawal applied");
        Ok(())
    }

    /// Move `amount` between two accounts as one atomic unit.
    pub async fn transfer(
        &self,
        from_id: Uuid,
        to_id: Uuid,
        amount: Decimal,
    ) -> Result<(), BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.transfer_in(&mut tx, from_id, to_id, amount).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// Transfer joining the caller's unit.
    ///
    /// Both accounts are locked and both saves happen through the same
    /// handle, so either both balances move or neither is persisted. Locks
    /// are taken in ascending account-id order; two concurrent opposite
    /// transfers would otherwise acquire the row locks in opposite orders
    /// and deadlock.
    pub async fn transfer_in(
        &self,
        tx: &mut S::Tx,
        from_id: Uuid,
        to_id: Uuid,
        amount: Decimal,
    ) -> Result<(), BankError> {
        if from_id == to_id {
            return Err(BankError::InvalidAmount);
        }

        let (mut from, mut to) = if from_id < to_id {
            let from = self.store.lock_account(tx, from_id).await?;
            let to = self.store.lock_account(tx, to_id).await?;
            (from, to)
        } else {
            let to = self.store.lock_account(tx, to_id).await?;
            let from = self.store.lock_account(tx, from_id).await?;
            (from, to)
        };

        from.transfer(&mut to, amount)?;

        self.store.save_account(tx, &from).await?;
        self.store.save_account(tx, &to).await?;

        tracing::info!(%from_id, %to_id, %amount, "transfer applied");
        Ok(())
    }

    /// Fetch an account by id.
    pub async fn account(&self, account_id: Uuid) -> Result<Account, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.account_by_id(&mut tx, account_id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// All accounts owned by `user_id`, oldest first.
    pub async fn accounts_by_user(&self, user_id: Uuid) -> Result<Vec<Account>, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.accounts_by_user(&mut tx, user_id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// The user's primary (oldest) account, joining the caller's unit.
    pub async fn primary_account_in(
        &self,
        tx: &mut S::Tx,
        user_id: Uuid,
    ) -> Result<Account, BankError> {
        self.store
            .accounts_by_user(tx, user_id)
            .await?
            .into_iter()
            .next()
            .ok_or(BankError::NotFound("account"))
    }

    /// Generate a valid 20-digit account number from the injected RNG.
    fn generate_account_number(&self) -> Result<AccountNumber, BankError> {
        let raw: String = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| BankError::TransactionAborted("rng poisoned".into()))?;
            (0..20).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
        };
        AccountNumber::new(raw)
    }
}
