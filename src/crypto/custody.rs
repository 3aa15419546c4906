//! Key custody: RSA-OAEP key pair generation and password sealing of the
//! private half.
//!
//! Sealing is PBKDF2-HMAC-SHA256 (per-seal 128-bit salt) into an AES-256-GCM
//! key, then AES-GCM over the private JWK's JSON with a per-seal 96-bit nonce.
//! No associated data is bound, so envelopes stay readable by WebCrypto.
//!
//! A successful unseal is the only password check the local account flow
//! has; see `app::Messenger::authenticate`.

use std::num::NonZeroU32;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ring::pbkdf2;
use rsa::{BigUint, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::encoding::b64;
use super::jwk::{PrivateJwk, PublicJwk};
use super::provider::CryptoProvider;
use crate::error::{E2eeError, E2eeResult};

pub const RSA_MODULUS_BITS: usize = 2048;
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const SEAL_KEY_LEN: usize = 32;

pub const DEFAULT_KDF_ITERATIONS: u32 = 120_000;
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

const WEAK_PASSWORD_LEN: usize = 8;

/// Freshly generated key pair, both halves exportable
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicJwk,
    pub private: PrivateJwk,
}

/// Private key encrypted under a password-derived key.
///
/// Values are immutable once produced; every seal draws a new salt and iv.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPrivateKey {
    #[serde(with = "b64", alias = "saltB64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64", alias = "ivB64")]
    pub iv: Vec<u8>,
    #[serde(rename = "data", with = "b64", alias = "dataB64")]
    pub ciphertext: Vec<u8>,
}

/// Generates key pairs and seals / unseals private keys
#[derive(Clone)]
pub struct KeyCustody {
    provider: Arc<dyn CryptoProvider>,
    iterations: NonZeroU32,
}

impl KeyCustody {
    pub fn new(provider: Arc<dyn CryptoProvider>, kdf_iterations: u32) -> E2eeResult<Self> {
        if kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(E2eeError::Config(format!(
                "KDF iterations must be at least {}, got {}",
                MIN_KDF_ITERATIONS, kdf_iterations
            )));
        }
        let iterations = NonZeroU32::new(kdf_iterations)
            .ok_or_else(|| E2eeError::Config("KDF iterations must be non-zero".to_string()))?;
        Ok(Self { provider, iterations })
    }

    /// RSA-2048, e = 65537, for OAEP with SHA-256
    pub fn generate_key_pair(&self) -> E2eeResult<KeyPair> {
        debug!(bits = RSA_MODULUS_BITS, "Generating RSA key pair");
        let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
        let key = RsaPrivateKey::new_with_exp(&mut self.provider.as_rng(), RSA_MODULUS_BITS, &exponent)
            .map_err(|e| E2eeError::KeyGenerationFailed(e.to_string()))?;

        let private = PrivateJwk::from_private_key(&key)
            .map_err(|e| E2eeError::KeyGenerationFailed(e.to_string()))?;
        let public = private.public_jwk();
        Ok(KeyPair { public, private })
    }

    pub fn seal_private_key(&self, private_key: &PrivateJwk, password: &str) -> E2eeResult<SealedPrivateKey> {
        if password.is_empty() {
            return Err(E2eeError::SealFailed("Password must not be empty".to_string()));
        }
        if password.chars().count() < WEAK_PASSWORD_LEN {
            warn!("Sealing private key under a password shorter than {} characters", WEAK_PASSWORD_LEN);
        }

        let salt: [u8; SALT_LEN] = self.provider.random_array();
        let iv: [u8; IV_LEN] = self.provider.random_array();
        let cipher = self.derive_cipher(password, &salt);

        let payload = Zeroizing::new(serde_json::to_vec(private_key)?);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), payload.as_slice())
            .map_err(|_| E2eeError::SealFailed("AES-GCM encryption failed".to_string()))?;

        debug!(len = ciphertext.len(), "Sealed private key");
        Ok(SealedPrivateKey {
            salt: salt.to_vec(),
            iv: iv.to_vec(),
            ciphertext,
        })
    }

    /// Wrong password, tampering and malformed envelopes all surface as
    /// [`E2eeError::UnsealFailed`].
    pub fn open_private_key(&self, sealed: &SealedPrivateKey, password: &str) -> E2eeResult<PrivateJwk> {
        let salt: [u8; SALT_LEN] = sealed
            .salt
            .as_slice()
            .try_into()
            .map_err(|_| E2eeError::UnsealFailed)?;
        if sealed.iv.len() != IV_LEN {
            return Err(E2eeError::UnsealFailed);
        }

        let cipher = self.derive_cipher(password, &salt);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&sealed.iv), sealed.ciphertext.as_slice())
            .map(Zeroizing::new)
            .map_err(|_| E2eeError::UnsealFailed)?;

        serde_json::from_slice(&plaintext).map_err(|_| E2eeError::UnsealFailed)
    }

    fn derive_cipher(&self, password: &str, salt: &[u8; SALT_LEN]) -> Aes256Gcm {
        let mut key = Zeroizing::new([0u8; SEAL_KEY_LEN]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt,
            password.as_bytes(),
            &mut key[..],
        );
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::{OsCryptoProvider, SeededCryptoProvider};
    use crate::crypto::test_support::{custody, shared_key_pair};

    #[test]
    fn test_seal_round_trip() {
        let custody = custody();
        let pair = shared_key_pair();

        let sealed = custody.seal_private_key(&pair.private, "correct-horse").unwrap();
        let opened = custody.open_private_key(&sealed, "correct-horse").unwrap();

        assert_eq!(opened, pair.private);
        assert_eq!(sealed.salt.len(), SALT_LEN);
        assert_eq!(sealed.iv.len(), IV_LEN);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let custody = custody();
        let sealed = custody.seal_private_key(&shared_key_pair().private, "correct-horse").unwrap();

        for wrong in ["wrong-password", "correct-horse ", "Correct-horse", ""] {
            assert!(matches!(
                custody.open_private_key(&sealed, wrong),
                Err(E2eeError::UnsealFailed)
            ));
        }
    }

    #[test]
    fn test_sealing_is_non_deterministic() {
        let custody = custody();
        let private = &shared_key_pair().private;

        let first = custody.seal_private_key(private, "hunter22").unwrap();
        let second = custody.seal_private_key(private, "hunter22").unwrap();

        assert_ne!(first.salt, second.salt);
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_tampered_data_rejected() {
        let custody = custody();
        let sealed = custody.seal_private_key(&shared_key_pair().private, "correct-horse").unwrap();

        // Spread over the body, plus the last tag byte
        for i in (0..sealed.ciphertext.len()).step_by(97).chain([sealed.ciphertext.len() - 1]) {
            let mut tampered = sealed.clone();
            tampered.ciphertext[i] ^= 0x01;
            assert!(matches!(
                custody.open_private_key(&tampered, "correct-horse"),
                Err(E2eeError::UnsealFailed)
            ));
        }
    }

    #[test]
    fn test_malformed_envelope_rejected() {
        let custody = custody();
        let sealed = custody.seal_private_key(&shared_key_pair().private, "correct-horse").unwrap();

        let mut short_salt = sealed.clone();
        short_salt.salt.truncate(8);
        assert!(matches!(custody.open_private_key(&short_salt, "correct-horse"), Err(E2eeError::UnsealFailed)));

        let mut long_iv = sealed.clone();
        long_iv.iv.push(0);
        assert!(matches!(custody.open_private_key(&long_iv, "correct-horse"), Err(E2eeError::UnsealFailed)));

        let mut truncated = sealed;
        truncated.ciphertext.truncate(10);
        assert!(matches!(custody.open_private_key(&truncated, "correct-horse"), Err(E2eeError::UnsealFailed)));
    }

    #[test]
    fn test_empty_password_cannot_seal() {
        let result = custody().seal_private_key(&shared_key_pair().private, "");
        assert!(matches!(result, Err(E2eeError::SealFailed(_))));
    }

    #[test]
    fn test_iteration_floor_enforced() {
        let provider = Arc::new(OsCryptoProvider);
        assert!(matches!(KeyCustody::new(provider.clone(), 10_000), Err(E2eeError::Config(_))));
        assert!(KeyCustody::new(provider, MIN_KDF_ITERATIONS).is_ok());
    }

    #[test]
    fn test_envelope_json_shape() {
        let sealed = custody().seal_private_key(&shared_key_pair().private, "correct-horse").unwrap();
        let json = serde_json::to_value(&sealed).unwrap();

        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 3);
        for field in ["salt", "iv", "data"] {
            assert!(object[field].is_string(), "{} should be a base64 string", field);
        }

        let parsed: SealedPrivateKey = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sealed);
    }

    #[test]
    fn test_legacy_envelope_field_names_accepted() {
        let custody = custody();
        let sealed = custody.seal_private_key(&shared_key_pair().private, "correct-horse").unwrap();
        let legacy = serde_json::json!({
            "saltB64": crate::crypto::encoding::to_b64(&sealed.salt),
            "ivB64": crate::crypto::encoding::to_b64(&sealed.iv),
            "dataB64": crate::crypto::encoding::to_b64(&sealed.ciphertext),
        });

        let parsed: SealedPrivateKey = serde_json::from_value(legacy).unwrap();
        assert!(custody.open_private_key(&parsed, "correct-horse").is_ok());
    }

    #[test]
    fn test_seeded_provider_reproduces_key_pair() {
        let a = KeyCustody::new(Arc::new(SeededCryptoProvider::new(42)), DEFAULT_KDF_ITERATIONS).unwrap();
        let b = KeyCustody::new(Arc::new(SeededCryptoProvider::new(42)), DEFAULT_KDF_ITERATIONS).unwrap();

        let left = a.generate_key_pair().unwrap();
        let right = b.generate_key_pair().unwrap();
        assert_eq!(left.public, right.public);
        assert_eq!(left.private, right.private);
    }
}
