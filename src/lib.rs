//! Banking core - atomic money movement, credit amortization, and sealed
//! card storage.
//!
//! The crate's center of gravity is the transaction-execution boundary in
//! [`storage`]: every repository call takes an explicit ambient transaction
//! handle, so ledger, card, and credit operations compose multiple writes
//! into one commit-or-rollback unit without the repositories knowing about
//! transactions. The HTTP surface, authentication, and scheduling live in
//! other crates; they consume the services defined here.
//!
//! # Layout
//!
//! - [`storage`]: `Storage` + repository traits, the Postgres adapter, and
//!   an in-memory adapter for tests
//! - [`services`]: account ledger, card protection, credit amortization
//! - [`crypto`]: RSA-OAEP sealing and HMAC integrity tags for card payloads
//! - [`models`]: persisted entities (exact-decimal money fields throughout)

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod services;
pub mod storage;

pub use config::Config;
pub use error::BankError;
