//! Business services of the banking core.
//!
//! Each service drives its repositories through the ambient transaction
//! handle from [`crate::storage`]. Public operations open their own atomic
//! unit; the `*_in` variants join a unit the caller already holds, which is
//! how a credit withdrawal and the matching account debit end up in one
//! commit.

pub mod cards;
pub mod credit;
pub mod ledger;

pub use cards::CardService;
pub use credit::CreditService;
pub use ledger::LedgerService;
