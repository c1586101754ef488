//! Key handling, encryption and signing for the session payload

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// The size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const ENC_KEY_CONTEXT: &[u8] = b"hbsync/session/encryption/v1";
const MAC_KEY_CONTEXT: &[u8] = b"hbsync/session/signature/v1";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Ciphertext too short: {0} bytes")]
    Truncated(usize),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// A secure key wrapper that ensures the key is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureKey([u8; KEY_SIZE]);

impl SecureKey {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self(key)
    }

    /// Generates a new random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        let secure = Self::new(key);
        key.zeroize();
        secure
    }

    /// Builds a key from raw bytes read from disk.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if `bytes` is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let mut key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", bytes.len()))
        })?;
        let secure = Self::new(key);
        key.zeroize();
        Ok(secure)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives a purpose-specific key: `SHA-256(context || master)`.
fn derive_key(master: &SecureKey, context: &[u8]) -> SecureKey {
    let mut digest: [u8; KEY_SIZE] = Sha256::new()
        .chain_update(context)
        .chain_update(master.as_bytes())
        .finalize()
        .into();
    let key = SecureKey::new(digest);
    digest.zeroize();
    key
}

/// Encryption and MAC keys derived from one master key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    encryption: SecureKey,
    signing: SecureKey,
}

impl SessionKeys {
    pub fn derive(master: &SecureKey) -> Self {
        Self {
            encryption: derive_key(master, ENC_KEY_CONTEXT),
            signing: derive_key(master, MAC_KEY_CONTEXT),
        }
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext || tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(self.encryption.as_bytes().into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypts a blob produced by [`SessionKeys::encrypt`].
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Truncated(blob.len()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(self.encryption.as_bytes().into());

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decryption(e.to_string()))
    }

    /// HMAC-SHA256 of `data` under the signing key.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.signing.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time check of `signature` against `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match <HmacSha256 as Mac>::new_from_slice(self.signing.as_bytes()) {
            Ok(mut mac) => {
                mac.update(data);
                mac.verify_slice(signature).is_ok()
            }
            Err(_) => false,
        }
    }
}
