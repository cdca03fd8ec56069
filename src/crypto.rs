use std::str::FromStr;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bigdecimal::BigDecimal;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Marker prefix for encrypted column values. Anything without it is
/// treated as legacy plaintext and passed through on read.
pub const ENC_PREFIX: &str = "ENC:v1:";

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encrypt value")]
    Encrypt,
    #[error("failed to decrypt value")]
    Decrypt,
    #[error("malformed encrypted payload")]
    Malformed,
    #[error("stored value is not a decimal: {0}")]
    BadDecimal(String),
}

/// Encrypt-at-rest codec for monetary columns. The storage layer converts
/// plain decimals to `ENC:v1:base64(nonce || ciphertext || tag)` strings and
/// back; domain code never sees ciphertext.
#[derive(Clone)]
pub struct AmountCodec {
    cipher: Aes256Gcm,
}

impl AmountCodec {
    /// Derives a 256-bit key from the configured secret.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.trim().as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest).expect("sha256 digest is a valid key");
        Self { cipher }
    }

    pub fn encode(&self, value: &BigDecimal) -> Result<String, CodecError> {
        self.encrypt(&value.to_string())
    }

    pub fn decode(&self, stored: &str) -> Result<BigDecimal, CodecError> {
        let plain = if Self::is_encrypted(stored) {
            self.decrypt(stored)?
        } else {
            stored.to_string()
        };
        BigDecimal::from_str(&plain).map_err(|_| CodecError::BadDecimal(plain))
    }

    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENC_PREFIX)
    }

    fn encrypt(&self, plain: &str) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|_| CodecError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", ENC_PREFIX, BASE64.encode(payload)))
    }

    fn decrypt(&self, stored: &str) -> Result<String, CodecError> {
        let encoded = stored.strip_prefix(ENC_PREFIX).ok_or(CodecError::Malformed)?;
        let payload = BASE64.decode(encoded).map_err(|_| CodecError::Malformed)?;
        if payload.len() <= NONCE_LEN {
            return Err(CodecError::Malformed);
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plain = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CodecError::Decrypt)?;
        String::from_utf8(plain).map_err(|_| CodecError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> AmountCodec {
        AmountCodec::from_secret("test-secret")
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn round_trips_amounts() {
        let codec = codec();
        let stored = codec.encode(&dec("1234.56")).unwrap();
        assert!(stored.starts_with(ENC_PREFIX));
        assert_eq!(codec.decode(&stored).unwrap(), dec("1234.56"));
    }

    #[test]
    fn nonces_differ_between_encodings() {
        let codec = codec();
        let a = codec.encode(&dec("5.00")).unwrap();
        let b = codec.encode(&dec("5.00")).unwrap();
        assert_ne!(a, b);
        assert_eq!(codec.decode(&a).unwrap(), codec.decode(&b).unwrap());
    }

    #[test]
    fn passes_legacy_plaintext_through() {
        let codec = codec();
        assert_eq!(codec.decode("42.10").unwrap(), dec("42.10"));
        assert_eq!(codec.decode("-7").unwrap(), dec("-7"));
    }

    #[test]
    fn rejects_garbage_payloads() {
        let codec = codec();
        assert!(codec.decode("ENC:v1:not-base64!!").is_err());
        assert!(codec.decode("not-a-number").is_err());
    }

    #[test]
    fn rejects_wrong_key() {
        let stored = codec().encode(&dec("9.99")).unwrap();
        let other = AmountCodec::from_secret("different-secret");
        assert!(matches!(other.decode(&stored), Err(CodecError::Decrypt)));
    }
}
