//! End-to-end encryption core
//!
//! This module provides:
//! - Key custody (RSA-OAEP key pairs, private key sealed under a password
//!   with PBKDF2-SHA256 + AES-256-GCM)
//! - Message cipher (RSA-OAEP per message, optional hybrid envelope)
//! - JWK export/import so keys can be stored and shared as JSON
//! - An injectable randomness provider

mod cipher;
mod custody;
pub mod encoding;
mod jwk;
mod provider;

pub use cipher::{MessageCipher, MessageMode};
pub use custody::{
    KeyCustody, KeyPair, SealedPrivateKey, DEFAULT_KDF_ITERATIONS, MIN_KDF_ITERATIONS,
    RSA_MODULUS_BITS,
};
pub use jwk::{PrivateJwk, PublicJwk};
pub use provider::{CryptoProvider, OsCryptoProvider, ProviderRng, SeededCryptoProvider};

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, OnceLock};

    pub fn custody() -> KeyCustody {
        KeyCustody::new(Arc::new(OsCryptoProvider), DEFAULT_KDF_ITERATIONS).unwrap()
    }

    /// RSA key generation is slow; most tests share these two pairs
    pub fn shared_key_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| custody().generate_key_pair().unwrap())
    }

    pub fn other_key_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| custody().generate_key_pair().unwrap())
    }
}
