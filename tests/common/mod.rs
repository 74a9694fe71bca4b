//! Shared wiring for integration tests: an in-memory storage adapter behind
//! the full service stack, with deterministic RNG seeds and a process-wide
//! RSA key pair (generated once; key generation is the slow part).

#![allow(dead_code)]

use std::sync::{Arc, Once, OnceLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use banking_core::crypto::CardSealer;
use banking_core::notify::LogNotifier;
use banking_core::services::{CardService, CreditService, LedgerService};
use banking_core::storage::MemStorage;

static TRACING: Once = Once::new();

/// Route service tracing through the test harness, honoring `RUST_LOG`.
fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

static KEY_PEMS: OnceLock<(String, String)> = OnceLock::new();

/// `(public_pem, private_pem)` for the card sealer, generated once.
pub fn key_pems() -> &'static (String, String) {
    KEY_PEMS.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(4242);
        let private = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public = RsaPublicKey::from(&private);
        (
            public
                .to_public_key_pem(LineEnding::LF)
                .expect("public pem"),
            private
                .to_pkcs8_pem(LineEnding::LF)
                .expect("private pem")
                .to_string(),
        )
    })
}

/// The full service stack over one in-memory store.
pub struct TestBank {
    pub store: Arc<MemStorage>,
    pub ledger: LedgerService<MemStorage>,
    pub cards: CardService<MemStorage>,
    pub credits: CreditService<MemStorage>,
}

pub fn bank() -> TestBank {
    init_tracing();

    let store = Arc::new(MemStorage::new());
    let ledger = LedgerService::new(Arc::clone(&store), StdRng::seed_from_u64(1));

    let (public_pem, private_pem) = key_pems();
    let sealer = Arc::new(
        CardSealer::from_pems(public_pem, private_pem, "", b"test-tag-secret".to_vec())
            .expect("sealer"),
    );

    let cards = CardService::new(
        Arc::clone(&store),
        ledger.clone(),
        sealer,
        StdRng::seed_from_u64(2),
    );
    let credits = CreditService::new(Arc::clone(&store), ledger.clone(), Arc::new(LogNotifier));

    TestBank {
        store,
        ledger,
        cards,
        credits,
    }
}
