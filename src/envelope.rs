//! Symmetric envelope encryption for JSON payloads.
//!
//! An envelope is `hex(iv) ":" hex(ciphertext)`, produced with AES-256-CBC and
//! PKCS#7 padding under a pre-shared 32-byte key. A fresh IV is drawn for every
//! call to [`EnvelopeCipher::seal`], so sealing the same value twice never
//! yields the same string.

use openssl::symm::{Cipher, decrypt, encrypt};
use rand::RngCore;
use serde::{Serialize, de::DeserializeOwned};

use crate::cli::ConfigError;

/// Required key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// IV length in bytes (one AES block).
pub const IV_LEN: usize = 16;

/// Separator between the IV and ciphertext halves.
pub const DELIMITER: char = ':';

/// Errors produced while sealing or opening an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Malformed envelope, missing delimiter, bad hex, or padding failure.
    #[error("failed to decrypt envelope: {0}")]
    Decrypt(String),
    /// Decryption succeeded but the plaintext is not valid JSON for the target type.
    #[error("decrypted envelope is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// Serialization or cipher failure while sealing.
    #[error("failed to seal envelope: {0}")]
    Encrypt(String),
}

/// Process-wide envelope cipher holding the pre-shared key.
#[derive(Clone)]
pub struct EnvelopeCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeCipher").finish_non_exhaustive()
    }
}

impl EnvelopeCipher {
    /// Create a cipher from raw key bytes. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, ConfigError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            ConfigError::Invalid(format!(
                "envelope key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Serialize `value` to JSON and encrypt it under a fresh random IV.
    pub fn seal<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, EnvelopeError> {
        // serde_json::Value maps are ordered, so the same object always
        // serializes to the same text.
        let plaintext = serde_json::to_vec(value).map_err(|e| EnvelopeError::Encrypt(e.to_string()))?;

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);

        let ciphertext = encrypt(Cipher::aes_256_cbc(), &self.key, Some(&iv), &plaintext)
            .map_err(|e| EnvelopeError::Encrypt(e.to_string()))?;

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            DELIMITER,
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an envelope and parse the plaintext as JSON.
    pub fn open<T: DeserializeOwned>(&self, envelope: &str) -> Result<T, EnvelopeError> {
        let plaintext = self.open_bytes(envelope)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn open_bytes(&self, envelope: &str) -> Result<Vec<u8>, EnvelopeError> {
        let (iv_hex, ct_hex) = envelope
            .split_once(DELIMITER)
            .ok_or_else(|| EnvelopeError::Decrypt("missing delimiter".into()))?;

        let iv = hex::decode(iv_hex).map_err(|e| EnvelopeError::Decrypt(format!("iv: {e}")))?;
        if iv.len() != IV_LEN {
            return Err(EnvelopeError::Decrypt(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }

        let ciphertext =
            hex::decode(ct_hex).map_err(|e| EnvelopeError::Decrypt(format!("ciphertext: {e}")))?;
        if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
            return Err(EnvelopeError::Decrypt(format!(
                "ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            )));
        }

        decrypt(Cipher::aes_256_cbc(), &self.key, Some(&iv), &ciphertext)
            .map_err(|e| EnvelopeError::Decrypt(e.to_string()))
    }
}
