//! Sealing and unsealing of stored card payloads.
//!
//! A card's sensitive fields are serialized as `PAN:CVV:YYYY-MM-DD`, tagged
//! with HMAC-SHA256 under a configured secret, and encrypted with RSA-OAEP
//! (SHA-256) under a configured public key. Only the hex-encoded ciphertext
//! and tag are ever persisted.
//!
//! On read the payload is decrypted with the private key, the tag is
//! recomputed over the decrypted plaintext and compared in constant time
//! (`Mac::verify_slice`), and only a verified payload yields plaintext.
//!
//! The tag is keyed by one secret, used identically at seal and open time.
//! Keying it from a record field (account number on one side, account id on
//! the other) would silently break verification.

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::config::Config;
use crate::error::BankError;

type HmacSha256 = Hmac<Sha256>;

/// Ciphertext plus integrity tag, both hex-encoded for storage.
#[derive(Debug, Clone)]
pub struct SealedPayload {
    pub ciphertext: String,
    pub tag: String,
}

/// Seals card payloads for storage and unseals them on read.
///
/// Key material is opaque configuration: PEM paths and an optional
/// passphrase for the private key. Loading happens once at construction;
/// rotation is out of scope.
pub struct CardSealer {
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    mac_secret: Vec<u8>,
}

impl CardSealer {
    /// Build a sealer from PEM strings.
    ///
    /// An empty `passphrase` means the private key is an unencrypted PKCS#8
    /// document; otherwise it is decrypted with the passphrase.
    pub fn from_pems(
        public_pem: &str,
        private_pem: &str,
        passphrase: &str,
        mac_secret: impl Into<Vec<u8>>,
    ) -> Result<Self, BankError> {
        let public_key = RsaPublicKey::from_public_key_pem(public_pem)
            .map_err(|e| BankError::EncryptionFailure(format!("bad public key: {e}")))?;

        let private_key = if passphrase.is_empty() {
            RsaPrivateKey::from_pkcs8_pem(private_pem)
        } else {
            RsaPrivateKey::from_pkcs8_encrypted_pem(private_pem, passphrase.as_bytes())
        }
        .map_err(|e| BankError::DecryptionFailure(format!("bad private key: {e}")))?;

        Ok(Self {
            public_key,
            private_key,
            mac_secret: mac_secret.into(),
        })
    }

    /// Build a sealer from the configured key paths and secret.
    pub fn from_config(config: &Config) -> Result<Self, BankError> {
        let public_pem = std::fs::read_to_string(&config.card_public_key_path)
            .map_err(|e| BankError::EncryptionFailure(format!("public key unreadable: {e}")))?;
        let private_pem = std::fs::read_to_string(&config.card_private_key_path)
            .map_err(|e| BankError::DecryptionFailure(format!("private key unreadable: {e}")))?;

        Self::from_pems(
            &public_pem,
            &private_pem,
            &config.card_key_passphrase,
            config.card_hmac_secret.as_bytes().to_vec(),
        )
    }

    /// Tag and encrypt `plaintext` for storage.
    pub fn seal(
        &self,
        rng: &mut (impl RngCore + CryptoRng),
        plaintext: &str,
    ) -> Result<SealedPayload, BankError> {
        let tag = self.compute_tag(plaintext)?;

        let ciphertext = self
            .public_key
            .encrypt(rng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .map_err(|e| BankError::EncryptionFailure(e.to_string()))?;

        Ok(SealedPayload {
            ciphertext: hex::encode(ciphertext),
            tag: hex::encode(tag),
        })
    }

    /// Decrypt a stored payload and verify its integrity tag.
    ///
    /// # Errors
    ///
    /// `DecryptionFailure` if the ciphertext is malformed or the key does
    /// not decrypt it; `IntegrityViolation` if the recomputed tag does not
    /// match the stored one. The comparison is constant-time.
    pub fn open(&self, ciphertext_hex: &str, tag_hex: &str) -> Result<String, BankError> {
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|e| BankError::DecryptionFailure(format!("bad ciphertext encoding: {e}")))?;
        let stored_tag =
            hex::decode(tag_hex).map_err(|_| BankError::IntegrityViolation)?;

        let plaintext = self
            .private_key
            .decrypt(Oaep::new::<Sha256>(), &ciphertext)
            .map_err(|e| BankError::DecryptionFailure(e.to_string()))?;
        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| BankError::DecryptionFailure("payload is not utf-8".into()))?;

        let mut mac = self.mac(plaintext.as_bytes())?;
        mac.verify_slice(&stored_tag)
            .map_err(|_| BankError::IntegrityViolation)?;

        Ok(plaintext)
    }

    fn compute_tag(&self, plaintext: &str) -> Result<Vec<u8>, BankError> {
        let mac = self.mac(plaintext.as_bytes())?;
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, BankError> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_secret)
            .map_err(|e| BankError::EncryptionFailure(e.to_string()))?;
        mac.update(data);
        Ok(mac)
    }
}
