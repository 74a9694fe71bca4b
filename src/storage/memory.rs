//! In-memory adapter for the storage contracts.
//!
//! The ambient handle stages writes in a private snapshot of the shared
//! state. `commit` swaps the snapshot in atomically; dropping the handle
//! (rollback, cancellation, panic) discards it, so a half-finished unit is
//! never observable, the same guarantee the Postgres adapter gets from its
//! transaction.
//!
//! Intended for tests. Isolation is snapshot-at-begin with last-commit-wins,
//! which is enough for the single-writer scenarios exercised here; real
//! deployments use [`super::PgStorage`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::BankError;
use crate::models::{Account, Card, CardTransaction, CardTransactionKind, Credit, ScheduleEntry};

use super::{
    AccountRepository, CardRepository, CardTransactionRepository, CreditRepository, Storage,
};

#[derive(Debug, Default, Clone)]
struct MemState {
    accounts: HashMap<Uuid, Account>,
    cards: HashMap<Uuid, Card>,
    card_transactions: HashMap<Uuid, CardTransaction>,
    credits: HashMap<Uuid, Credit>,
    schedules: Vec<ScheduleEntry>,
}

/// Staged view of the store, discarded unless committed.
pub struct MemTx {
    staged: MemState,
}

/// Thread-safe in-memory storage with write-fault injection.
#[derive(Clone)]
pub struct MemStorage {
    state: Arc<RwLock<MemState>>,
    /// Remaining writes before an injected failure; negative = disabled.
    write_budget: Arc<AtomicI64>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            // A budget of 0 means "fail every write"; start disabled.
            write_budget: Arc::new(AtomicI64::new(-1)),
        }
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n + 1`-th write (and every later one) fail with
    /// `TransactionAborted`, simulating a process kill mid-batch.
    pub fn fail_after_writes(&self, n: i64) {
        self.write_budget.store(n, Ordering::SeqCst);
    }

    /// Disable fault injection.
    pub fn clear_fault(&self) {
        self.write_budget.store(-1, Ordering::SeqCst);
    }

    fn consume_write(&self) -> Result<(), BankError> {
        let mut current = self.write_budget.load(Ordering::SeqCst);
        loop {
            if current < 0 {
                return Ok(());
            }
            if current == 0 {
                // Exhausted budgets stay exhausted until cleared.
                return Err(BankError::TransactionAborted(
                    "injected storage failure".into(),
                ));
            }
            match self.write_budget.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }
}

#[async_trait]
impl Storage for MemStorage {
    type Tx = MemTx;

    async fn begin(&self) -> Result<Self::Tx, BankError> {
        let staged = self.state.read().await.clone();
        Ok(MemTx { staged })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BankError> {
        *self.state.write().await = tx.staged;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BankError> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for MemStorage {
    async fn save_account(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), BankError> {
        self.consume_write()?;
        let mut account = account.clone();
        account.updated_at = Utc::now();
        tx.staged.accounts.insert(account.id, account);
        Ok(())
    }

    async fn account_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError> {
        tx.staged
            .accounts
            .get(&id)
            .cloned()
            .ok_or(BankError::NotFound("account"))
    }

    async fn accounts_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Account>, BankError> {
        let mut accounts: Vec<Account> = tx
            .staged
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn lock_account(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError> {
        // No row locks in memory; the snapshot already isolates the unit.
        self.account_by_id(tx, id).await
    }
}

#[async_trait]
impl CardRepository for MemStorage {
    async fn save_card(&self, tx: &mut Self::Tx, card: &Card) -> Result<(), BankError> {
        self.consume_write()?;
        let mut card = card.clone();
        card.updated_at = Utc::now();
        tx.staged.cards.insert(card.id, card);
        Ok(())
    }

    async fn card_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Card, BankError> {
        tx.staged
            .cards
            .get(&id)
            .cloned()
            .ok_or(BankError::NotFound("card"))
    }

    async fn cards_by_account(
        &self,
        tx: &mut Self::Tx,
        account_id: Uuid,
    ) -> Result<Vec<Card>, BankError> {
        let mut cards: Vec<Card> = tx
            .staged
            .cards
            .values()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.created_at);
        Ok(cards)
    }
}

#[async_trait]
impl CardTransactionRepository for MemStorage {
    async fn record_card_transaction(
        &self,
        tx: &mut Self::Tx,
        card_id: Uuid,
        amount: Decimal,
        kind: CardTransactionKind,
    ) -> Result<CardTransaction, BankError> {
        self.consume_write()?;
        let row = CardTransaction {
            id: Uuid::new_v4(),
            card_id,
            amount,
            kind,
            created_at: Utc::now(),
        };
        tx.staged.card_transactions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn card_transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<CardTransaction, BankError> {
        tx.staged
            .card_transactions
            .get(&id)
            .cloned()
            .ok_or(BankError::NotFound("card transaction"))
    }
}

#[async_trait]
impl CreditRepository for MemStorage {
    async fn save_credit(&self, tx: &mut Self::Tx, credit: &Credit) -> Result<(), BankError> {
        self.consume_write()?;
        let mut credit = credit.clone();
        credit.updated_at = Utc::now();
        tx.staged.credits.insert(credit.id, credit);
        Ok(())
    }

    async fn credit_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Credit, BankError> {
        tx.staged
            .credits
            .get(&id)
            .cloned()
            .ok_or(BankError::NotFound("credit"))
    }

    async fn credits_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Credit>, BankError> {
        let mut credits: Vec<Credit> = tx
            .staged
            .credits
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        credits.sort_by_key(|c| c.created_at);
        Ok(credits)
    }

    async fn insert_schedule_row(
        &self,
        tx: &mut Self::Tx,
        entry: &ScheduleEntry,
    ) -> Result<(), BankError> {
        self.consume_write()?;
        tx.staged.schedules.push(entry.clone());
        Ok(())
    }

    async fn schedule_by_credit(
        &self,
        tx: &mut Self::Tx,
        credit_id: Uuid,
    ) -> Result<Vec<ScheduleEntry>, BankError> {
        let mut rows: Vec<ScheduleEntry> = tx
            .staged
            .schedules
            .iter()
            .filter(|s| s.credit_id == credit_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.due_on);
        Ok(rows)
    }
}
