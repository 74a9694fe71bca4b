//! PostgreSQL adapter for the storage contracts.
//!
//! One `sqlx::Transaction` is the ambient handle; every query executes
//! against it, so all repository calls made with the same handle commit or
//! roll back together. `lock_account` issues `SELECT ... FOR UPDATE`, which
//! is what makes concurrent deposits/withdrawals on one account serialize
//! correctly across process instances sharing the database.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::BankError;
use crate::models::{Account, Card, CardTransaction, CardTransactionKind, Credit, ScheduleEntry};

use super::{
    AccountRepository, CardRepository, CardTransactionRepository, CreditRepository, Storage,
};

/// sqlx-backed storage. Cheap to clone; connections are pooled.
#[derive(Clone)]
pub struct PgStorage {
    pool: DbPool,
}

impl PgStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PgStorage {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, BankError> {
        self.pool
            .begin()
            .await
            .map_err(|e| BankError::TransactionAborted(e.to_string()))
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BankError> {
        tx.commit()
            .await
            .map_err(|e| BankError::TransactionAborted(e.to_string()))
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BankError> {
        tx.rollback()
            .await
            .map_err(|e| BankError::TransactionAborted(e.to_string()))
    }
}

#[async_trait]
impl AccountRepository for PgStorage {
    async fn save_account(&self, tx: &mut Self::Tx, account: &Account) -> Result<(), BankError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, account_number, balance, currency, kind, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET balance = EXCLUDED.balance,
                kind = EXCLUDED.kind,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(account.account_number.as_str())
        .bind(account.balance)
        .bind(account.currency)
        .bind(account.kind)
        .bind(account.created_at)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn account_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BankError::NotFound("account"))
    }

    async fn accounts_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Account>, BankError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(accounts)
    }

    async fn lock_account(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Account, BankError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BankError::NotFound("account"))
    }
}

#[async_trait]
impl CardRepository for PgStorage {
    async fn save_card(&self, tx: &mut Self::Tx, card: &Card) -> Result<(), BankError> {
        sqlx::query(
            r#"
            INSERT INTO cards (id, account_id, encrypted_data, integrity_tag, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(card.id)
        .bind(card.account_id)
        .bind(&card.encrypted_data)
        .bind(&card.integrity_tag)
        .bind(card.status)
        .bind(card.created_at)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn card_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Card, BankError> {
        sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BankError::NotFound("card"))
    }

    async fn cards_by_account(
        &self,
        tx: &mut Self::Tx,
        account_id: Uuid,
    ) -> Result<Vec<Card>, BankError> {
        let cards = sqlx::query_as::<_, Card>(
            "SELECT * FROM cards WHERE account_id = $1 ORDER BY created_at",
        )
        .bind(account_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(cards)
    }
}

#[async_trait]
impl CardTransactionRepository for PgStorage {
    async fn record_card_transaction(
        &self,
        tx: &mut Self::Tx,
        card_id: Uuid,
        amount: Decimal,
        kind: CardTransactionKind,
    ) -> Result<CardTransaction, BankError> {
        let row = CardTransaction {
            id: Uuid::new_v4(),
            card_id,
            amount,
            kind,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO card_transactions (id, card_id, amount, kind, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(row.id)
        .bind(row.card_id)
        .bind(row.amount)
        .bind(row.kind)
        .bind(row.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn card_transaction_by_id(
        &self,
        tx: &mut Self::Tx,
        id: Uuid,
    ) -> Result<CardTransaction, BankError> {
        sqlx::query_as::<_, CardTransaction>("SELECT * FROM card_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BankError::NotFound("card transaction"))
    }
}

#[async_trait]
impl CreditRepository for PgStorage {
    async fn save_credit(&self, tx: &mut Self::Tx, credit: &Credit) -> Result<(), BankError> {
        sqlx::query(
            r#"
            INSERT INTO credits (id, user_id, amount, interest_rate, term_months, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET amount = EXCLUDED.amount,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(credit.id)
        .bind(credit.user_id)
        .bind(credit.amount)
        .bind(credit.interest_rate)
        .bind(credit.term_months)
        .bind(credit.status)
        .bind(credit.created_at)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn credit_by_id(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Credit, BankError> {
        sqlx::query_as::<_, Credit>("SELECT * FROM credits WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(BankError::NotFound("credit"))
    }

    async fn credits_by_user(
        &self,
        tx: &mut Self::Tx,
        user_id: Uuid,
    ) -> Result<Vec<Credit>, BankError> {
        let credits = sqlx::query_as::<_, Credit>(
            "SELECT * FROM credits WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(credits)
    }

    async fn insert_schedule_row(
        &self,
        tx: &mut Self::Tx,
        entry: &ScheduleEntry,
    ) -> Result<(), BankError> {
        sqlx::query(
            r#"
            INSERT INTO payment_schedules
                (id, credit_id, due_on, payment, principal, interest, penalty, remaining, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.credit_id)
        .bind(entry.due_on)
        .bind(entry.payment)
        .bind(entry.principal)
        .bind(entry.interest)
        .bind(entry.penalty)
        .bind(entry.remaining)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn schedule_by_credit(
        &self,
        tx: &mut Self::Tx,
        credit_id: Uuid,
    ) -> Result<Vec<ScheduleEntry>, BankError> {
        let rows = sqlx::query_as::<_, ScheduleEntry>(
            "SELECT * FROM payment_schedules WHERE credit_id = $1 ORDER BY due_on",
        )
        .bind(credit_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows)
    }
}
