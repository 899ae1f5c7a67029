//! AES-256-GCM envelope for outbound order payloads.
//!
//! Wire format is `nonce || ciphertext || tag` with a 12-byte nonce drawn
//! from the OS CSPRNG on every `seal`. Opening never yields plaintext that
//! failed authentication.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use tracing::{instrument, warn};

use crate::error::{ArbError, Result};

pub const KEY_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 12;

/// Output of [`SecureEnvelope::seal`].
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPayload(Vec<u8>);

impl SealedPayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for SealedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedPayload({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for SealedPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Clone)]
pub struct SecureEnvelope {
    cipher: Aes256Gcm,
}

impl fmt::Debug for SecureEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureEnvelope").finish_non_exhaustive()
    }
}

impl SecureEnvelope {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(ArbError::InvalidKeySize {
                expected: KEY_LENGTH,
                actual: key.len(),
            });
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ArbError::InvalidKeySize {
            expected: KEY_LENGTH,
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }

    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key = hex::decode(key_hex.trim())
            .map_err(|e| ArbError::config_error(format!("Invalid encryption key: {e}")))?;
        Self::new(&key)
    }

    #[instrument(name = "crypto.encrypt_data", skip_all, fields(len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedPayload> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| ArbError::EncryptFailed)?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(SealedPayload(out))
    }

    #[instrument(name = "crypto.decrypt_data", skip_all, fields(len = sealed.len()))]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LENGTH {
            warn!("Ciphertext too short");
            return Err(ArbError::DecryptFailed);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ArbError::DecryptFailed)
    }
}
