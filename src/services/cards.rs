//! Card protection service - generation, sealed storage, and card-scoped
//! money movement.
//!
//! Card numbers carry a Luhn check digit; CVVs are three random digits. At
//! creation the PAN/CVV/expiry triple is sealed by [`CardSealer`] and only
//! ciphertext plus integrity tag are persisted. Reads decrypt and verify
//! before any plaintext field becomes visible.
//!
//! Money movement by card id resolves the owning account and drives the
//! ledger inside one atomic unit together with the append-only audit row.

use std::sync::{Arc, Mutex};

use chrono::{Months, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::crypto::CardSealer;
use crate::error::BankError;
use crate::models::{Card, CardStatus, CardTransaction, CardTransactionKind, UnsealedCard};
use crate::services::LedgerService;
use crate::storage::{
    commit_or_rollback, AccountRepository, CardRepository, CardTransactionRepository, Storage,
};

/// Cards stay valid for ten years from creation.
const CARD_VALIDITY_MONTHS: u32 = 120;

/// Repository-backed card service.
pub struct CardService<S> {
    store: Arc<S>,
    ledger: LedgerService<S>,
    sealer: Arc<CardSealer>,
    rng: Arc<Mutex<StdRng>>,
}

impl<S> Clone for CardService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            sealer: Arc::clone(&self.sealer),
            rng: Arc::clone(&self.rng),
        }
    }
}

impl<S> CardService<S>
where
    S: AccountRepository + CardRepository + CardTransactionRepository,
{
    pub fn new(
        store: Arc<S>,
        ledger: LedgerService<S>,
        sealer: Arc<CardSealer>,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            ledger,
            sealer,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Issue a new active card for an existing account.
    ///
    /// Generates PAN/CVV, seals them together with the expiry date, and
    /// persists only the sealed payload. The plaintext is returned to the
    /// caller once and never stored.
    pub async fn create_card(&self, account_id: Uuid) -> Result<UnsealedCard, BankError> {
        let (pan, cvv) = {
            let mut rng = self.lock_rng()?;
            (generate_card_number(&mut *rng), generate_cvv(&mut *rng))
        };
        let expires_on = Utc::now().date_naive() + Months::new(CARD_VALIDITY_MONTHS);

        let plaintext = format!("{pan}:{cvv}:{expires_on}");
        let sealed = {
            let mut rng = self.lock_rng()?;
            self.sealer.seal(&mut *rng, &plaintext)?
        };

        let now = Utc::now();
        let card = Card {
            id: Uuid::new_v4(),
            account_id,
            encrypted_data: sealed.ciphertext,
            integrity_tag: sealed.tag,
            status: CardStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        let out = async {
            // The account must exist before a card is bound to it.
            self.store.account_by_id(&mut tx, account_id).await?;
            self.store.save_card(&mut tx, &card).await
        }
        .await;
        commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(card_id = %card.id, %account_id, "card created");
        Ok(UnsealedCard {
            card,
            pan,
            cvv,
            expires_on,
        })
    }

    /// Fetch a card and unseal its payload.
    ///
    /// # Errors
    ///
    /// `IntegrityViolation` if the stored tag does not match the decrypted
    /// payload; `DecryptionFailure` if the ciphertext or key material is
    /// unusable.
    pub async fn card(&self, card_id: Uuid) -> Result<UnsealedCard, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.card_by_id(&mut tx, card_id).await;
        let card = commit_or_rollback(self.store.as_ref(), tx, out).await?;
        self.unseal(card)
    }

    /// All cards bound to `account_id`, unsealed and verified.
    pub async fn cards_by_account(&self, account_id: Uuid) -> Result<Vec<UnsealedCard>, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.cards_by_account(&mut tx, account_id).await;
        let cards = commit_or_rollback(self.store.as_ref(), tx, out).await?;

        cards.into_iter().map(|card| self.unseal(card)).collect()
    }

    /// Deposit `amount` to the card's owning account and append the audit
    /// row, as one atomic unit.
    pub async fn deposit_to_card(
        &self,
        card_id: Uuid,
        amount: Decimal,
    ) -> Result<CardTransaction, BankError> {
        let mut tx = self.store.begin().await?;
        let out = async {
            let card = self.store.card_by_id(&mut tx, card_id).await?;
            self.ledger.deposit_in(&mut tx, card.account_id, amount).await?;
            self.store
                .record_card_transaction(&mut tx, card_id, amount, CardTransactionKind::Deposit)
                .await
        }
        .await;
        let row = commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(%card_id, %amount, transaction_id = %row.id, "card deposit completed");
        Ok(row)
    }

    /// Withdraw `amount` from the card's owning account and append the
    /// audit row, as one atomic unit.
    pub async fn withdraw_from_card(
        &self,
        card_id: Uuid,
        amount: Decimal,
    ) -> Result<CardTransaction, BankError> {
        let mut tx = self.store.begin().await?;
        let out = async {
            let card = self.store.card_by_id(&mut tx, card_id).await?;
            self.ledger.withdraw_in(&mut tx, card.account_id, amount).await?;
            self.store
                .record_card_transaction(&mut tx, card_id, amount, CardTransactionKind::Withdrawal)
                .await
        }
        .await;
        let row = commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(%card_id, %amount, transaction_id = %row.id, "card withdrawal completed");
        Ok(row)
    }

    /// Move `amount` between the two cards' owning accounts and append the
    /// audit row on the source card, as one atomic unit.
    pub async fn transfer_between_cards(
        &self,
        from_card_id: Uuid,
        to_card_id: Uuid,
        amount: Decimal,
    ) -> Result<CardTransaction, BankError> {
        let mut tx = self.store.begin().await?;
        let out = async {
            let from_card = self.store.card_by_id(&mut tx, from_card_id).await?;
            let to_card = self.store.card_by_id(&mut tx, to_card_id).await?;

            self.ledger
                .transfer_in(&mut tx, from_card.account_id, to_card.account_id, amount)
                .await?;
            self.store
                .record_card_transaction(&mut tx, from_card_id, amount, CardTransactionKind::Transfer)
                .await
        }
        .await;
        let row = commit_or_rollback(self.store.as_ref(), tx, out).await?;

        tracing::info!(%from_card_id, %to_card_id, %amount, transaction_id = %row.id, "card transfer completed");
        Ok(row)
    }

    /// Look up one audit row.
    pub async fn card_transaction(&self, id: Uuid) -> Result<CardTransaction, BankError> {
        let mut tx = self.store.begin().await?;
        let out = self.store.card_transaction_by_id(&mut tx, id).await;
        commit_or_rollback(self.store.as_ref(), tx, out).await
    }

    /// Decrypt-and-verify a stored card into its transient plaintext view.
    fn unseal(&self, card: Card) -> Result<UnsealedCard, BankError> {
        let plaintext = self.sealer.open(&card.encrypted_data, &card.integrity_tag)?;

        let mut parts = plaintext.splitn(3, ':');
        let (pan, cvv, expiry) = match (parts.next(), parts.next(), parts.next()) {
            (Some(pan), Some(cvv), Some(expiry)) => (pan, cvv, expiry),
            _ => {
                return Err(BankError::DecryptionFailure(
                    "malformed card payload".into(),
                ))
            }
        };
        let expires_on = NaiveDate::parse_from_str(expiry, "%Y-%m-%d")
            .map_err(|_| BankError::DecryptionFailure("malformed expiry date".into()))?;

        Ok(UnsealedCard {
            card,
            pan: pan.to_string(),
            cvv: cvv.to_string(),
            expires_on,
        })
    }

    fn lock_rng(&self) -> Result<std::sync::MutexGuard<'_, StdRng>, BankError> {
        self.rng
            .lock()
            .map_err(|_| BankError::TransactionAborted("rng poisoned".into()))
    }
}

/// Generate a 16-digit card number whose last digit is the Luhn checksum of
/// the preceding 15 (double every second digit from the left, subtract 9
/// from results above 9).
pub fn generate_card_number(rng: &mut impl Rng) -> String {
    let mut digits = [0u32; 16];
    for d in digits.iter_mut().take(15) {
        *d = rng.gen_range(0..10);
    }

    let mut checksum = 0;
    for (i, &d) in digits.iter().take(15).enumerate() {
        let mut d = d;
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        checksum += d;
    }
    digits[15] = (10 - checksum % 10) % 10;

    digits.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect()
}

/// Generate a zero-padded three-digit CVV.
pub fn generate_cvv(rng: &mut impl Rng) -> String {
    format!("{:03}", rng.gen_range(0..1000))
}

/// Standard Luhn validation over a full card number.
pub fn luhn_valid(number: &str) -> bool {
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let sum: u32 = number
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let mut d = u32::from(b - b'0');
            if i % 2 == 1 {
                d *= 2;
                if d > 9 {
                    d -= 9;
                }
            }
            d
        })
        .sum();

    sum % 10 == 0
}
