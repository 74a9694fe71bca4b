//! Card protection: sealed storage round-trips, tamper detection, and
//! card-scoped money movement with its audit trail.

mod common;

use std::io::Write;
use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use banking_core::config::Config;
use banking_core::crypto::CardSealer;
use banking_core::error::BankError;
use banking_core::models::{AccountKind, CardTransactionKind};
use banking_core::services::cards::luhn_valid;
use banking_core::storage::{commit_or_rollback, CardRepository, Storage};

#[tokio::test]
async fn created_card_reads_back_with_the_same_plaintext() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Checking)
        .await
        .unwrap();

    let issued = bank.cards.create_card(account.id).await.unwrap();
    assert_eq!(issued.pan.len(), 16);
    assert!(luhn_valid(&issued.pan), "{} fails Luhn", issued.pan);
    assert_eq!(issued.cvv.len(), 3);

    // Only ciphertext and tag are persisted; neither contains the PAN.
    assert!(!issued.card.encrypted_data.contains(&issued.pan));

    let read = bank.cards.card(issued.card.id).await.unwrap();
    assert_eq!(read.pan, issued.pan);
    assert_eq!(read.cvv, issued.cvv);
    assert_eq!(read.expires_on, issued.expires_on);
}

#[tokio::test]
async fn card_creation_requires_an_existing_account() {
    let bank = common::bank();
    let err = bank.cards.create_card(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, BankError::NotFound("account")));
}

#[tokio::test]
async fn tampered_stored_tag_fails_integrity_on_read() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Checking)
        .await
        .unwrap();
    let issued = bank.cards.create_card(account.id).await.unwrap();

    // Corrupt the stored tag directly through the repository.
    let mut tx = bank.store.begin().await.unwrap();
    let out = async {
        let mut card = bank.store.card_by_id(&mut tx, issued.card.id).await?;
        let mut tag = hex::decode(&card.integrity_tag).unwrap();
        tag[0] ^= 0x01;
        card.integrity_tag = hex::encode(tag);
        bank.store.save_card(&mut tx, &card).await
    }
    .await;
    commit_or_rollback(bank.store.as_ref(), tx, out).await.unwrap();

    let err = bank.cards.card(issued.card.id).await.unwrap_err();
    assert!(matches!(err, BankError::IntegrityViolation));
}

#[tokio::test]
async fn card_deposit_and_withdrawal_move_account_money_and_audit() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(100), AccountKind::Checking)
        .await
        .unwrap();
    let issued = bank.cards.create_card(account.id).await.unwrap();

    let deposit = bank
        .cards
        .deposit_to_card(issued.card.id, dec!(50))
        .await
        .unwrap();
    assert_eq!(deposit.kind, CardTransactionKind::Deposit);
    assert_eq!(bank.ledger.account(account.id).await.unwrap().balance, dec!(150));

    let withdrawal = bank
        .cards
        .withdraw_from_card(issued.card.id, dec!(30))
        .await
        .unwrap();
    assert_eq!(withdrawal.kind, CardTransactionKind::Withdrawal);
    assert_eq!(bank.ledger.account(account.id).await.unwrap().balance, dec!(120));

    // Both audit rows are retrievable by id.
    assert_eq!(
        bank.cards.card_transaction(deposit.id).await.unwrap().amount,
        dec!(50)
    );
    assert_eq!(
        bank.cards.card_transaction(withdrawal.id).await.unwrap().amount,
        dec!(30)
    );
}

#[tokio::test]
async fn card_transfer_moves_money_and_appends_one_audit_row() {
    let bank = common::bank();
    let source = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(1000), AccountKind::Checking)
        .await
        .unwrap();
    let target = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Checking)
        .await
        .unwrap();
    let from_card = bank.cards.create_card(source.id).await.unwrap();
    let to_card = bank.cards.create_card(target.id).await.unwrap();

    let row = bank
        .cards
        .transfer_between_cards(from_card.card.id, to_card.card.id, dec!(400))
        .await
        .unwrap();
    assert_eq!(row.kind, CardTransactionKind::Transfer);
    assert_eq!(row.card_id, from_card.card.id);

    assert_eq!(bank.ledger.account(source.id).await.unwrap().balance, dec!(600));
    assert_eq!(bank.ledger.account(target.id).await.unwrap().balance, dec!(400));
}

#[tokio::test]
async fn overdrawing_card_transfer_leaves_no_audit_row() {
    let bank = common::bank();
    let source = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(10), AccountKind::Checking)
        .await
        .unwrap();
    let target = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Checking)
        .await
        .unwrap();
    let from_card = bank.cards.create_card(source.id).await.unwrap();
    let to_card = bank.cards.create_card(target.id).await.unwrap();

    let err = bank
        .cards
        .transfer_between_cards(from_card.card.id, to_card.card.id, dec!(400))
        .await
        .unwrap_err();
    assert!(matches!(err, BankError::InsufficientFunds));

    assert_eq!(bank.ledger.account(source.id).await.unwrap().balance, dec!(10));
    assert_eq!(bank.ledger.account(target.id).await.unwrap().balance, dec!(0));
}

#[tokio::test]
async fn cards_by_account_unseals_every_card() {
    let bank = common::bank();
    let account = bank
        .ledger
        .open_account(Uuid::new_v4(), dec!(0), AccountKind::Checking)
        .await
        .unwrap();

    let first = bank.cards.create_card(account.id).await.unwrap();
    let second = bank.cards.create_card(account.id).await.unwrap();
    assert_ne!(first.pan, second.pan);

    let cards = bank.cards.cards_by_account(account.id).await.unwrap();
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|c| luhn_valid(&c.pan)));
}

#[tokio::test]
async fn sealer_loads_key_material_from_configured_paths() {
    let (public_pem, private_pem) = common::key_pems();

    let dir = tempfile::tempdir().unwrap();
    let public_path = dir.path().join("card_pub.pem");
    let private_path = dir.path().join("card_priv.pem");
    std::fs::File::create(&public_path)
        .unwrap()
        .write_all(public_pem.as_bytes())
        .unwrap();
    std::fs::File::create(&private_path)
        .unwrap()
        .write_all(private_pem.as_bytes())
        .unwrap();

    let config = Config {
        database_url: "postgres://unused".into(),
        card_public_key_path: public_path.to_string_lossy().into_owned(),
        card_private_key_path: private_path.to_string_lossy().into_owned(),
        card_key_passphrase: String::new(),
        card_hmac_secret: "test-tag-secret".into(),
    };
    let sealer = Arc::new(CardSealer::from_config(&config).unwrap());

    let mut rng = rand::rngs::OsRng;
    let sealed = sealer.seal(&mut rng, "4539578763621486:123:2036-08-23").unwrap();
    assert_eq!(
        sealer.open(&sealed.ciphertext, &sealed.tag).unwrap(),
        "4539578763621486:123:2036-08-23"
    );
}
