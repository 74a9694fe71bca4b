//! Ledger invariants: valid amounts, non-negative balances, and transfers
//! that move money atomically or not at all.

mod common;

use banking_core::error::BankError;
use banking_core::models::AccountKind;
use banking_core::storage::{run_atomic, AccountRepository};
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn overdraft_then_deposit_then_full_transfer() {
    let bank = common::bank();
    let user = Uuid::new_v4();

    let source = bank
        .ledger
        .open_account(user, dec!(1000), AccountKind::Checking)
        .await
        .unwrap();

    // Withdraw more than the balance: fails, balance untouched.
    let err = bank.ledger.withdraw(source.id, dec!(1500)).await.unwrap_err();
    assert!(matches!(err, BankError::InsufficientFunds));
    assert_eq!(bank.ledger.account(source.id).await.unwrap().balance, dec!(1000));

    // Top up, then move everything to a fresh zero-balance account.
    bank.ledger.deposit(source.id, dec!(500)).await.unwrap();
    assert_eq!(bank.ledger.account(source.id).await.unwrap().balance, dec!(1500));

    let target = bank
        .ledger
        .open_account(user, dec!(0), AccountKind::Savings)
        .await
        .unwrap();
    bank.ledger.transfer(source.id, target.id, dec!(1500)).await.unwrap();

    assert_eq!(bank.ledger.account(source.id).await.unwrap().balance, dec!(0));
    assert_eq!(bank.ledger.account(target.id).await.unwrap().balance, dec!(1500));
}

#[tokio::test]
async fn transfer_conserves_total_balance() {
    let bank = common::bank();
    let user = Uuid::new_v4();

    let a = bank
        .ledger
        .open_account(user, dec!(730.25), AccountKind::Checking)
        .await
        .unwrap();
    let b = bank
        .ledger
        .open_account(user, dec!(19.75), AccountKind::Checking)
        .await
        .unwrap();
    let total_before = a.balance + b.balance;

    bank.ledger.transfer(a.id, b.id, dec!(130.25)).await.unwrap();

    let a = bank.ledger.account(a.id).await.unwrap();
    let b = bank.ledger.account(b.id).await.unwrap();
    assert_eq!(a.balance + b.balance, total_before);
    assert!(a.balance >= dec!(0) && b.balance >= dec!(0));
}

#[tokio::test]
async fn negative_deposit_fails_and_leaves_balance_unchanged() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(42), AccountKind::Savings)
        .await
        .unwrap();

    let err = bank.ledger.deposit(account.id, dec!(-5)).await.unwrap_err();
    assert!(matches!(err, BankError::InvalidAmount));
    assert_eq!(bank.ledger.account(account.id).await.unwrap().balance, dec!(42));
}

#[tokio::test]
async fn negative_initial_balance_is_rejected() {
    let bank = common::bank();
    let err = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(-1), AccountKind::Checking)
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::InvalidAmount));
}

#[tokio::test]
async fn transfer_to_self_is_rejected() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(100), AccountKind::Checking)
        .await
        .unwrap();

    let err = bank
        .ledger
        .transfer(account.id, account.id, dec!(10))
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::InvalidAmount));
}

#[tokio::test]
async fn transfer_rolls_back_both_legs_when_the_second_write_fails() {
    let bank = common::bank();
    let user = Uuid::new_v4();

    let from = bank
        .ledger
        .open_account(user, dec!(1000), AccountKind::Checking)
        .await
        .unwrap();
    let to = bank
        .ledger
        .open_account(user, dec!(0), AccountKind::Checking)
        .await
        .unwrap();

    // First save (debited source) succeeds, second (credited target) fails:
    // the whole unit must roll back, leaving the debit invisible too.
    bank.store.fail_after_writes(1);
    let err = bank.ledger.transfer(from.id, to.id, dec!(400)).await.unwrap_err();
    assert!(matches!(err, BankError::TransactionAborted(_)));
    bank.store.clear_fault();

    assert_eq!(bank.ledger.account(from.id).await.unwrap().balance, dec!(1000));
    assert_eq!(bank.ledger.account(to.id).await.unwrap().balance, dec!(0));
}

#[tokio::test]
async fn opposite_direction_transfers_debit_the_right_sides() {
    let bank = common::bank();
    let user = Uuid::new_v4();

    let a = bank
        .ledger
        .open_account(user, dec!(300), AccountKind::Checking)
        .await
        .unwrap();
    let b = bank
        .ledger
        .open_account(user, dec!(100), AccountKind::Checking)
        .await
        .unwrap();

    // Locks are taken in ascending id order, so one of these two transfers
    // locks the accounts in the reverse of its argument order. The debit
    // and credit must still land on the argument sides.
    bank.ledger.transfer(a.id, b.id, dec!(50)).await.unwrap();
    assert_eq!(bank.ledger.account(a.id).await.unwrap().balance, dec!(250));
    assert_eq!(bank.ledger.account(b.id).await.unwrap().balance, dec!(150));

    bank.ledger.transfer(b.id, a.id, dec!(150)).await.unwrap();
    assert_eq!(bank.ledger.account(a.id).await.unwrap().balance, dec!(400));
    assert_eq!(bank.ledger.account(b.id).await.unwrap().balance, dec!(0));
}

#[tokio::test]
async fn account_numbers_are_twenty_digits() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Savings)
        .await
        .unwrap();

    let number = account.account_number.as_str();
    assert_eq!(number.len(), 20);
    assert!(number.bytes().all(|b| b.is_ascii_digit()));
}

#[tokio::test]
async fn run_atomic_commits_owned_capture_operations() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(10), AccountKind::Checking)
        .await
        .unwrap();

    let store = std::sync::Arc::clone(&bank.store);
    let mut updated = account.clone();
    updated.balance = dec!(25);

    run_atomic(bank.store.as_ref(), move |tx| {
        Box::pin(async move { store.save_account(tx, &updated).await })
    })
    .await
    .unwrap();

    assert_eq!(bank.ledger.account(account.id).await.unwrap().balance, dec!(25));
}
