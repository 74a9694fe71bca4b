//! Error taxonomy for the banking core.
//!
//! Domain-rule violations (invalid amounts, insufficient funds, credit
//! limits) are returned to the immediate caller without retry. Storage and
//! crypto failures are wrapped and surfaced; the core never retries them on
//! its own. A failed atomic unit always rolls back fully, so no variant here
//! ever describes partially-applied state.

/// Application-wide error type.
///
/// Each variant corresponds to one failure class a caller can act on.
/// The HTTP layer (external to this crate) maps these to status codes.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    /// Amount is negative (or zero where zero is disallowed).
    #[error("invalid amount")]
    InvalidAmount,

    /// Account balance is smaller than the requested withdrawal.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Account number is not exactly 20 ASCII digits.
    #[error("invalid account number")]
    InvalidAccountNumber,

    /// Operation requires an active credit.
    #[error("credit is not active")]
    CreditNotActive,

    /// Requested amount exceeds the remaining credit amount.
    #[error("credit amount exceeds limit")]
    CreditAmountExceeded,

    /// Recomputed integrity tag does not match the stored tag.
    ///
    /// The card payload (or its tag) was altered since creation. The
    /// comparison is constant-time; see [`crate::crypto::CardSealer`].
    #[error("card integrity verification failed")]
    IntegrityViolation,

    /// Key material unreadable or encryption itself failed.
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),

    /// Key material unreadable, passphrase wrong, or ciphertext malformed.
    #[error("decryption failed: {0}")]
    DecryptionFailure(String),

    /// Referenced account/card/credit/transaction does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Storage transaction failed to begin, commit, or roll back, or the
    /// caller cancelled mid-flight.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// Database query error (connection loss, constraint violation, ...).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
