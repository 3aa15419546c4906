use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::encoding::{biguint_from_b64url, biguint_to_b64url};
use crate::error::{E2eeError, E2eeResult};

pub const KTY_RSA: &str = "RSA";
pub const ALG_RSA_OAEP_256: &str = "RSA-OAEP-256";

/// Public half of an RSA-OAEP key pair, in JSON Web Key form.
///
/// This is the shape peers publish and look each other up by, so it has to
/// stay interoperable with WebCrypto `exportKey("jwk", ...)` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
}

impl PublicJwk {
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self {
            kty: KTY_RSA.to_string(),
            alg: Some(ALG_RSA_OAEP_256.to_string()),
            n: biguint_to_b64url(key.n()),
            e: biguint_to_b64url(key.e()),
            ext: Some(true),
            key_ops: Some(vec!["encrypt".to_string()]),
        }
    }

    pub fn to_public_key(&self) -> E2eeResult<RsaPublicKey> {
        check_kty(&self.kty)?;
        let n = biguint_from_b64url(&self.n)?;
        let e = biguint_from_b64url(&self.e)?;
        RsaPublicKey::new(n, e).map_err(|e| E2eeError::InvalidKey(e.to_string()))
    }

    /// Fingerprint for out-of-band comparison: SHA-256 over `e` and `n`,
    /// first 8 bytes as XXXX-XXXX-XXXX-XXXX.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.e.as_bytes());
        hasher.update(b".");
        hasher.update(self.n.as_bytes());
        let hash = hasher.finalize();

        let hex = hex::encode_upper(&hash[..8]);
        format!("{}-{}-{}-{}", &hex[0..4], &hex[4..8], &hex[8..12], &hex[12..16])
    }
}

/// Private half of an RSA-OAEP key pair, in JSON Web Key form.
///
/// Secret members are wiped on drop. `Debug` is implemented by hand so the
/// key never ends up in a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrivateJwk {
    #[zeroize(skip)]
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub alg: Option<String>,
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: String,
    pub q: String,
    pub dp: String,
    pub dq: String,
    pub qi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub key_ops: Option<Vec<String>>,
}

impl std::fmt::Debug for PrivateJwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateJwk")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("n", &self.n)
            .field("e", &self.e)
            .finish_non_exhaustive()
    }
}

impl PrivateJwk {
    pub fn from_private_key(key: &RsaPrivateKey) -> E2eeResult<Self> {
        let primes = key.primes();
        if primes.len() != 2 {
            return Err(E2eeError::InvalidKey(format!(
                "Expected a two-prime RSA key, got {} primes",
                primes.len()
            )));
        }
        let missing = || E2eeError::InvalidKey("Missing CRT parameters".to_string());
        let dp = key.dp().ok_or_else(missing)?;
        let dq = key.dq().ok_or_else(missing)?;
        let qi = key.crt_coefficient().ok_or_else(missing)?;

        Ok(Self {
            kty: KTY_RSA.to_string(),
            alg: Some(ALG_RSA_OAEP_256.to_string()),
            n: biguint_to_b64url(key.n()),
            e: biguint_to_b64url(key.e()),
            d: biguint_to_b64url(key.d()),
            p: biguint_to_b64url(&primes[0]),
            q: biguint_to_b64url(&primes[1]),
            dp: biguint_to_b64url(dp),
            dq: biguint_to_b64url(dq),
            qi: biguint_to_b64url(&qi),
            ext: Some(true),
            key_ops: Some(vec!["decrypt".to_string()]),
        })
    }

    /// Rebuild and validate the RSA key. `dp`, `dq` and `qi` are recomputed
    /// from the primes rather than trusted.
    pub fn to_private_key(&self) -> E2eeResult<RsaPrivateKey> {
        check_kty(&self.kty)?;
        let n = biguint_from_b64url(&self.n)?;
        let e = biguint_from_b64url(&self.e)?;
        let d = biguint_from_b64url(&self.d)?;
        let p = biguint_from_b64url(&self.p)?;
        let q = biguint_from_b64url(&self.q)?;

        let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| E2eeError::InvalidKey(e.to_string()))?;
        key.validate()
            .map_err(|e| E2eeError::InvalidKey(e.to_string()))?;
        key.precompute()
            .map_err(|e| E2eeError::InvalidKey(e.to_string()))?;
        Ok(key)
    }

    pub fn public_jwk(&self) -> PublicJwk {
        PublicJwk {
            kty: self.kty.clone(),
            alg: Some(ALG_RSA_OAEP_256.to_string()),
            n: self.n.clone(),
            e: self.e.clone(),
            ext: Some(true),
            key_ops: Some(vec!["encrypt".to_string()]),
        }
    }
}

fn check_kty(kty: &str) -> E2eeResult<()> {
    if kty != KTY_RSA {
        return Err(E2eeError::InvalidKey(format!("Unsupported key type: {}", kty)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_support::shared_key_pair;

    #[test]
    fn test_jwk_shape_matches_webcrypto_export() {
        let pair = shared_key_pair();
        let json = serde_json::to_value(&pair.public).unwrap();

        assert_eq!(json["kty"], "RSA");
        assert_eq!(json["alg"], "RSA-OAEP-256");
        assert_eq!(json["e"], "AQAB");
        assert_eq!(json["key_ops"][0], "encrypt");
        // 2048-bit modulus is 256 bytes -> 342 base64url chars without padding
        assert_eq!(pair.public.n.len(), 342);
    }

    #[test]
    fn test_private_jwk_rebuilds_same_key() {
        let pair = shared_key_pair();
        let key = pair.private.to_private_key().unwrap();
        let exported = PrivateJwk::from_private_key(&key).unwrap();

        assert_eq!(exported, pair.private);
        assert_eq!(exported.public_jwk().to_public_key().unwrap(), key.to_public_key());
        assert_eq!(PublicJwk::from_public_key(&key.to_public_key()), pair.public);
    }

    #[test]
    fn test_foreign_public_jwk_without_optional_members() {
        let pair = shared_key_pair();
        let minimal = serde_json::json!({ "kty": "RSA", "n": pair.public.n, "e": pair.public.e });

        let jwk: PublicJwk = serde_json::from_value(minimal).unwrap();
        assert!(jwk.alg.is_none());
        assert!(jwk.to_public_key().is_ok());
        assert_eq!(jwk.fingerprint(), pair.public.fingerprint());
    }

    #[test]
    fn test_rejects_non_rsa_key() {
        let mut jwk = shared_key_pair().public.clone();
        jwk.kty = "EC".to_string();
        assert!(matches!(jwk.to_public_key(), Err(E2eeError::InvalidKey(_))));
    }

    #[test]
    fn test_rejects_inconsistent_private_key() {
        let mut jwk = shared_key_pair().private.clone();
        jwk.d = "AQAB".to_string();
        assert!(matches!(jwk.to_private_key(), Err(E2eeError::InvalidKey(_))));
    }

    #[test]
    fn test_fingerprint_format() {
        let fingerprint = shared_key_pair().public.fingerprint();
        assert_eq!(fingerprint.len(), 19);
        assert_eq!(fingerprint.chars().filter(|c| *c == '-').count(), 3);
    }

    #[test]
    fn test_debug_does_not_leak_secret_members() {
        let pair = shared_key_pair();
        let debug = format!("{:?}", pair.private);
        assert!(!debug.contains(&pair.private.d));
    }
}
