use std::str::FromStr;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::encoding::{from_b64, to_b64};
use super::jwk::PublicJwk;
use super::provider::CryptoProvider;
use crate::error::{E2eeError, E2eeResult};

/// SHA-256 output length, used twice by OAEP padding
const OAEP_HASH_LEN: usize = 32;

const HYBRID_PREFIX: &str = "h1";
const HYBRID_AAD: &[u8] = b"chatseal-msg-v1";
const HYBRID_KEY_LEN: usize = 32;
const HYBRID_IV_LEN: usize = 12;

/// How outgoing messages are encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// RSA-OAEP over the plaintext itself. Bounded by the modulus size.
    #[default]
    Direct,
    /// Per-message AES-256-GCM key wrapped with RSA-OAEP. Unbounded, but a
    /// different wire format that older clients cannot read.
    Hybrid,
}

impl FromStr for MessageMode {
    type Err = E2eeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "rsa" => Ok(MessageMode::Direct),
            "hybrid" | "envelope" => Ok(MessageMode::Hybrid),
            other => Err(E2eeError::Config(format!(
                "Invalid message mode: {}. Use direct or hybrid",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MessageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageMode::Direct => write!(f, "direct"),
            MessageMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Encrypts chat messages to a recipient's public key and decrypts them
/// with the recipient's unsealed private key.
///
/// Ciphertexts are base64 strings. Direct-mode output is the raw RSA-OAEP
/// block; hybrid output is `h1.<wrapped key>.<iv>.<data>`. Decryption
/// accepts either, whatever mode this cipher encrypts with.
#[derive(Clone)]
pub struct MessageCipher {
    provider: Arc<dyn CryptoProvider>,
    mode: MessageMode,
}

impl MessageCipher {
    pub fn new(provider: Arc<dyn CryptoProvider>, mode: MessageMode) -> Self {
        Self { provider, mode }
    }

    /// Largest plaintext, in bytes, a single OAEP block can carry for `key`
    /// (190 for RSA-2048 with SHA-256).
    pub fn max_plaintext_len(key: &RsaPublicKey) -> usize {
        key.size().saturating_sub(2 * OAEP_HASH_LEN + 2)
    }

    pub fn encrypt_for(&self, recipient: &PublicJwk, plaintext: &str) -> E2eeResult<String> {
        let public_key = recipient.to_public_key()?;
        match self.mode {
            MessageMode::Direct => self.encrypt_direct(&public_key, plaintext.as_bytes()),
            MessageMode::Hybrid => self.encrypt_hybrid(&public_key, plaintext.as_bytes()),
        }
    }

    /// Every failure (wrong key, truncation, bad padding, bad UTF-8) is
    /// reported as [`E2eeError::MessageDecryptionFailed`].
    pub fn decrypt_with(&self, private_key: &RsaPrivateKey, ciphertext: &str) -> E2eeResult<String> {
        let plaintext = if let Some(rest) = ciphertext.strip_prefix(HYBRID_PREFIX).and_then(|r| r.strip_prefix('.')) {
            self.decrypt_hybrid(private_key, rest)?
        } else {
            let block = from_b64(ciphertext).map_err(|_| E2eeError::MessageDecryptionFailed)?;
            self.rsa_decrypt(private_key, &block)?
        };

        String::from_utf8(plaintext.to_vec()).map_err(|_| E2eeError::MessageDecryptionFailed)
    }

    fn encrypt_direct(&self, key: &RsaPublicKey, plaintext: &[u8]) -> E2eeResult<String> {
        let max = Self::max_plaintext_len(key);
        if plaintext.len() > max {
            return Err(E2eeError::PlaintextTooLarge { len: plaintext.len(), max });
        }
        let block = self.rsa_encrypt(key, plaintext)?;
        debug!(len = plaintext.len(), "Encrypted message (direct)");
        Ok(to_b64(&block))
    }

    fn encrypt_hybrid(&self, key: &RsaPublicKey, plaintext: &[u8]) -> E2eeResult<String> {
        let content_key = Zeroizing::new(self.provider.random_array::<HYBRID_KEY_LEN>());
        let iv: [u8; HYBRID_IV_LEN] = self.provider.random_array();

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&content_key[..]));
        let data = cipher
            .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad: HYBRID_AAD })
            .map_err(|_| E2eeError::InvalidKey("AES-GCM encryption failed".to_string()))?;
        let wrapped = self.rsa_encrypt(key, &content_key[..])?;

        debug!(len = plaintext.len(), "Encrypted message (hybrid)");
        Ok(format!("{}.{}.{}.{}", HYBRID_PREFIX, to_b64(&wrapped), to_b64(&iv), to_b64(&data)))
    }

    fn decrypt_hybrid(&self, private_key: &RsaPrivateKey, body: &str) -> E2eeResult<Zeroizing<Vec<u8>>> {
        let mut parts = body.split('.');
        let (Some(wrapped), Some(iv), Some(data), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(E2eeError::MessageDecryptionFailed);
        };

        let decode = |s: &str| from_b64(s).map_err(|_| E2eeError::MessageDecryptionFailed);
        let wrapped = decode(wrapped)?;
        let iv = decode(iv)?;
        let data = decode(data)?;
        if iv.len() != HYBRID_IV_LEN {
            return Err(E2eeError::MessageDecryptionFailed);
        }

        let content_key = self.rsa_decrypt(private_key, &wrapped)?;
        if content_key.len() != HYBRID_KEY_LEN {
            return Err(E2eeError::MessageDecryptionFailed);
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&content_key[..]));
        cipher
            .decrypt(Nonce::from_slice(&iv), Payload { msg: &data, aad: HYBRID_AAD })
            .map(Zeroizing::new)
            .map_err(|_| E2eeError::MessageDecryptionFailed)
    }

    fn rsa_encrypt(&self, key: &RsaPublicKey, msg: &[u8]) -> E2eeResult<Vec<u8>> {
        let max = Self::max_plaintext_len(key);
        key.encrypt(&mut self.provider.as_rng(), Oaep::new::<Sha256>(), msg)
            .map_err(|e| match e {
                rsa::Error::MessageTooLong => E2eeError::PlaintextTooLarge { len: msg.len(), max },
                other => E2eeError::InvalidKey(other.to_string()),
            })
    }

    fn rsa_decrypt(&self, key: &RsaPrivateKey, block: &[u8]) -> E2eeResult<Zeroizing<Vec<u8>>> {
        key.decrypt_blinded(&mut self.provider.as_rng(), Oaep::new::<Sha256>(), block)
            .map(Zeroizing::new)
            .map_err(|_| E2eeError::MessageDecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::provider::OsCryptoProvider;
    use crate::crypto::test_support::{other_key_pair, shared_key_pair};

    fn cipher(mode: MessageMode) -> MessageCipher {
        MessageCipher::new(Arc::new(OsCryptoProvider), mode)
    }

    #[test]
    fn test_round_trip() {
        let pair = shared_key_pair();
        let private_key = pair.private.to_private_key().unwrap();
        let cipher = cipher(MessageMode::Direct);

        for plaintext in ["", "hello bob", "grüße, 世界 🔐", &"x".repeat(190)] {
            let encrypted = cipher.encrypt_for(&pair.public, plaintext).unwrap();
            assert_eq!(cipher.decrypt_with(&private_key, &encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_encryption_is_randomized() {
        let pair = shared_key_pair();
        let cipher = cipher(MessageMode::Direct);

        let first = cipher.encrypt_for(&pair.public, "same text").unwrap();
        let second = cipher.encrypt_for(&pair.public, "same text").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_oversized_plaintext_rejected() {
        let pair = shared_key_pair();
        let result = cipher(MessageMode::Direct).encrypt_for(&pair.public, &"a".repeat(300));

        assert!(matches!(result, Err(E2eeError::PlaintextTooLarge { len: 300, max: 190 })));
    }

    #[test]
    fn test_bound_counts_bytes_not_chars() {
        let pair = shared_key_pair();
        // 64 chars, 192 bytes
        let result = cipher(MessageMode::Direct).encrypt_for(&pair.public, &"€".repeat(64));
        assert!(matches!(result, Err(E2eeError::PlaintextTooLarge { len: 192, .. })));
    }

    #[test]
    fn test_max_plaintext_len_for_2048_bits() {
        let key = shared_key_pair().public.to_public_key().unwrap();
        assert_eq!(MessageCipher::max_plaintext_len(&key), 190);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = cipher(MessageMode::Direct);
        let encrypted = cipher.encrypt_for(&shared_key_pair().public, "for alice only").unwrap();
        let other = other_key_pair().private.to_private_key().unwrap();

        assert!(matches!(
            cipher.decrypt_with(&other, &encrypted),
            Err(E2eeError::MessageDecryptionFailed)
        ));
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let pair = shared_key_pair();
        let private_key = pair.private.to_private_key().unwrap();
        let cipher = cipher(MessageMode::Direct);
        let encrypted = cipher.encrypt_for(&pair.public, "hello").unwrap();

        let mut bytes = from_b64(&encrypted).unwrap();
        bytes[10] ^= 0xff;
        let flipped = to_b64(&bytes);
        let truncated = to_b64(&bytes[..100]);

        for bad in [flipped.as_str(), truncated.as_str(), "not base64 at all", ""] {
            assert!(matches!(
                cipher.decrypt_with(&private_key, bad),
                Err(E2eeError::MessageDecryptionFailed)
            ));
        }
    }

    #[test]
    fn test_hybrid_handles_long_messages() {
        let pair = shared_key_pair();
        let private_key = pair.private.to_private_key().unwrap();
        let cipher = cipher(MessageMode::Hybrid);
        let long = "This message is far longer than a single RSA block can carry. ".repeat(40);

        let encrypted = cipher.encrypt_for(&pair.public, &long).unwrap();
        assert!(encrypted.starts_with("h1."));
        assert_eq!(cipher.decrypt_with(&private_key, &encrypted).unwrap(), long);
    }

    #[test]
    fn test_decrypt_accepts_both_formats() {
        let pair = shared_key_pair();
        let private_key = pair.private.to_private_key().unwrap();

        let direct = cipher(MessageMode::Direct).encrypt_for(&pair.public, "direct").unwrap();
        let hybrid = cipher(MessageMode::Hybrid).encrypt_for(&pair.public, "hybrid").unwrap();

        let reader = cipher(MessageMode::Direct);
        assert_eq!(reader.decrypt_with(&private_key, &direct).unwrap(), "direct");
        assert_eq!(reader.decrypt_with(&private_key, &hybrid).unwrap(), "hybrid");
    }

    #[test]
    fn test_tampered_hybrid_body_fails() {
        let pair = shared_key_pair();
        let private_key = pair.private.to_private_key().unwrap();
        let cipher = cipher(MessageMode::Hybrid);
        let encrypted = cipher.encrypt_for(&pair.public, "integrity matters").unwrap();

        let mut parts: Vec<String> = encrypted.split('.').map(str::to_string).collect();
        let mut data = from_b64(&parts[3]).unwrap();
        data[0] ^= 0x01;
        parts[3] = to_b64(&data);
        assert!(matches!(
            cipher.decrypt_with(&private_key, &parts.join(".")),
            Err(E2eeError::MessageDecryptionFailed)
        ));

        assert!(matches!(
            cipher.decrypt_with(&private_key, "h1.only.two"),
            Err(E2eeError::MessageDecryptionFailed)
        ));
    }

    #[test]
    fn test_message_mode_parsing() {
        assert_eq!("direct".parse::<MessageMode>().unwrap(), MessageMode::Direct);
        assert_eq!(" Hybrid ".parse::<MessageMode>().unwrap(), MessageMode::Hybrid);
        assert!("chunked".parse::<MessageMode>().is_err());
    }
}
