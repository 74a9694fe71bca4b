//! Storage contracts and the transaction-execution boundary.
//!
//! Every repository method takes an explicit `&mut Tx`, the ambient
//! transaction handle. A service operation that receives a handle joins the
//! caller's unit (a no-op join, never a savepoint); an operation that opens
//! its own unit goes through [`Storage::begin`] and seals it with
//! [`commit_or_rollback`]. The handle is the only way to reach storage, so
//! composing several repository writes into one atomic unit requires no
//! cooperation from the repositories themselves.
//!
//! Cancellation and panics are covered by drop semantics: an unfinished
//! handle rolls back when dropped (sqlx guarantees this for its
//! `Transaction`; the in-memory adapter stages writes inside the handle and
//! discards them). A caller that drops an in-flight operation therefore
//! aborts its transaction rather than leaving it open.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::BankError;
use crate::models::{Account, Card, CardTransaction, CardTransactionKind, Credit, ScheduleEntry};

pub use memory::MemStorage;
pub use postgres::PgStorage;

/// Opens, commits, and rolls back atomic units of storage work.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Ambient transaction handle threaded through every repository call.
    type Tx: Send;

    /// Open a new transaction.
    async fn begin(&self) -> Result<Self::Tx, BankError>;

    /// Make every write performed through `tx` visible, atomically.
    async fn commit(&self, tx: Self::Tx) -> Result<(), BankError>;

    /// Discard every write performed through `tx`.
    async fn rollback(&self, tx: Self::Tx) -> Result<(), BankError>;
}

/// Seal an atomic unit: commit on `Ok`, roll back on `Err`.
///
/// The original error wins: a rollback failure is logged, not returned, so
/// the caller always sees the domain error that aborted the unit. A commit
/// failure surfaces as [`BankError::TransactionAborted`] from the adapter.
pub async fn commit_or_rollback<S, T>(
    store: &S,
    tx: S::Tx,
    out: Result<T, BankError>,
) -> Result<T, BankError>
where
    S: Storage + ?Sized,
{
    match out {
        Ok(value) => {
            store.commit(tx).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = store.rollback(tx).await {
                tracing::warn!(error = %rb, "rollback failed after aborted unit");
            }
            Err(err)
        }
    }
}

/// Boxed future returned by [`run_atomic`] operations.
pub type AtomicFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T, BankError>> + Send + 't>>;

/// Run `op` inside a fresh transaction, committing on success and rolling
/// back on error.
///
/// `op` receives the ambient handle and must move its captures (clones,
/// ids, amounts) into the future:
///
/// ```ignore
/// run_atomic(&store, |tx| Box::pin(async move {
///     store.save_account(tx, &account).await
/// })).await?;
/// ```
///
/// Service methods that need to borrow `&self` across the unit use the
/// equivalent explicit form: `begin` + operation + [`commit_or_rollback`].
pub async fn run_atomic<S, T, F>(store: &S, op: F) -> Result<T, BankError>
where
    S: Storage + ?Sized,
    F: for<'t> FnOnce(&'t mut S::Tx) -> AtomicFuture<'t, T> + Send,
    T: Send,
{
    let mut tx = store.begin().await?;
    let out = op(&mut tx).await;
    commit_or_rollback(store, tx, out).await
}

/// Persistence contract for accounts.
#[async_trait]
pub trait AccountRepository: Storage {
    /// Insert the account, or update balance and timestamps if it exists.
    async fn save_account(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), BankError>;

    async fn account_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError>;

    async fn accounts_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Account>, BankError>;

    /// Read the account with a row-level lock held until the unit ends.
    ///
    /// Every read-for-mutation must come through here; a plain read followed
    /// by a save loses updates under concurrent deposits/withdrawals.
    async fn lock_account(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError>;
}

/// Persistence contract for cards.
#[async_trait]
pub trait CardRepository: Storage {
    async fn save_card(&self, tx: &mut Self::Tx, card: &Card) -> Result<(), BankError>;

    async fn card_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Card, BankError>;

    async fn cards_by_account(
        &self,
        tx: &mut Self::Tx,
        account_id: Uuid,
    ) -> Result<Vec<Card>, BankError>;
}

/// Append-only audit trail of card-scoped money movements.
#[async_trait]
pub trait CardTransactionRepository: Storage {
    /// Append one audit row; rows are never mutated afterwards.
    async fn record_card_transaction(
        &self,
        tx: &mut Self::Tx,
        card_id: Uuid,
        amount: Decimal,
        kind: CardTransactionKind,
    ) -> Result<CardTransaction, BankError>;

    async fn card_transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<CardTransaction, BankError>;
}

/// Persistence contract for credits and their payment schedules.
#[async_trait]
pub trait CreditRepository: Storage {
    /// Insert the credit, or update outstanding amount and status if it
    /// exists.
    async fn save_credit(&self, tx: &mut Self::Tx, credit: &Credit) -> Result<(), BankError>;

    async fn credit_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Credit, BankError>;

    async fn credits_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Credit>, BankError>;

    /// Append one schedule row; the schedule is append-only.
    async fn insert_schedule_row(
        &self,
        tx: &mut Self::Tx,
        entry: &ScheduleEntry,
    ) -> Result<(), BankError>;

    async fn schedule_by_credit(
        &self,
        tx: &mut Self::Tx,
        credit_id: Uuid,
    ) -> Result<Vec<ScheduleEntry>, BankError>;
}
