//! Application configuration management.
//!
//! Configuration is loaded from environment variables via the `envy` crate.
//! The core does not interpret the key material itself; paths and secrets
//! are handed opaquely to the card sealer at construction time.

use serde::Deserialize;

/// Configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `CARD_PUBLIC_KEY_PATH` (required): PEM public key used to seal card data
/// - `CARD_PRIVATE_KEY_PATH` (required): PEM private key used to unseal it
/// - `CARD_KEY_PASSPHRASE` (optional): passphrase for an encrypted private key
/// - `CARD_HMAC_SECRET` (required): secret keying the card integrity tag
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub card_public_key_path: String,
    pub card_private_key_path: String,

    #[serde(default)]
    pub card_key_passphrase: String,

    pub card_hmac_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Attempts to load a `.env` file first (optional), then deserializes
    /// the environment. Field names map to upper-cased variable names.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or unparsable.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
    }
}
