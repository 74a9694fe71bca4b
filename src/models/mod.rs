//! Persisted entities of the banking core.
//!
//! All money fields use `rust_decimal::Decimal`: exact fixed-point
//! arithmetic, never floats, so amortization over many periods accumulates
//! no rounding drift.

pub mod account;
pub mod card;
pub mod credit;

pub use account::{Account, AccountKind, AccountNumber, Currency};
pub use card::{Card, CardStatus, CardTransaction, CardTransactionKind, UnsealedCard};
pub use credit::{Credit, CreditStatus, ScheduleEntry};
