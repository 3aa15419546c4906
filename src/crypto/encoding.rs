//! Byte <-> text helpers shared by the key and message formats.
//!
//! Two alphabets are in play: JWK members use base64url without padding,
//! while sealed envelopes and message ciphertexts use standard padded base64.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rsa::BigUint;

use crate::error::E2eeResult;

pub fn to_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn from_b64(s: &str) -> E2eeResult<Vec<u8>> {
    Ok(STANDARD.decode(s.trim())?)
}

/// Big-endian unsigned integer as a JWK member
pub fn biguint_to_b64url(n: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(n.to_bytes_be())
}

pub fn biguint_from_b64url(s: &str) -> E2eeResult<BigUint> {
    let bytes = URL_SAFE_NO_PAD.decode(s.trim_end_matches('='))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

/// `#[serde(with = "b64")]` for `Vec<u8>` fields stored as standard base64
pub mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_b64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::from_b64(&s).map_err(serde::de::Error::custom)
    }
}
