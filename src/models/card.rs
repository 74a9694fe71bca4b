//! Card entity, its audit record, and the transient unsealed view.
//!
//! Plaintext PAN/CVV/expiry are never persisted. The stored record carries
//! only the asymmetric ciphertext and the keyed integrity tag; the plaintext
//! exists transiently in [`UnsealedCard`] after a successful
//! decrypt-and-verify.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Card lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "card_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Inactive,
    Blocked,
    Expired,
}

/// A stored card record. Maps to the `cards` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Card {
    pub id: Uuid,

    /// Owning account.
    pub account_id: Uuid,

    /// Hex-encoded RSA-OAEP ciphertext of `PAN:CVV:expiry`.
    pub encrypted_data: String,

    /// Hex-encoded HMAC-SHA256 tag over the plaintext, keyed by the
    /// configured secret.
    pub integrity_tag: String,

    pub status: CardStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A card whose sealed payload has been decrypted and verified.
///
/// Returned by read paths only after the integrity tag matched. Never
/// persisted and never serialized with its secrets.
#[derive(Debug, Clone)]
pub struct UnsealedCard {
    pub card: Card,
    pub pan: String,
    pub cvv: String,
    pub expires_on: NaiveDate,
}

/// Kind of a card-scoped money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "card_tx_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CardTransactionKind {
    Transfer,
    Withdrawal,
    Deposit,
}

/// Append-only audit record of a card-scoped money movement.
///
/// Never mutated after creation; the ledger's account rows carry the money,
/// these rows carry the trail.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CardTransaction {
    pub id: Uuid,
    pub card_id: Uuid,
    pub amount: Decimal,
    pub kind: CardTransactionKind,
    pub created_at: DateTime<Utc>,
}
