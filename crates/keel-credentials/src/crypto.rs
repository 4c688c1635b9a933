// crypto.rs — Key derivation and authenticated encryption for stored secrets.
//
// The working key is derived from the operator's master secret with scrypt
// (N = 2^14, r = 8, p = 1, 32-byte output by default). That is deliberately
// slow — tens to hundreds of milliseconds — to make brute-forcing a stolen
// store expensive. The salt and cost parameters live in the store document.
//
// Secrets are sealed with AES-256-GCM under the working key. Each sealed
// value is `base64(nonce || ciphertext || tag)` with a fresh random 12-byte
// nonce. Derived keys are zeroized when dropped.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CredentialError;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// scrypt cost exponent: N = 2^14 = 16384.
pub const DEFAULT_LOG_N: u8 = 14;
pub const DEFAULT_R: u32 = 8;
pub const DEFAULT_P: u32 = 1;

/// Upper bounds accepted from a store document. scrypt needs roughly
/// `128 * r * 2^logN` bytes, so an unchecked document could ask for
/// terabytes before the sentinel is ever tried.
pub const MAX_LOG_N: u8 = 20;
pub const MAX_R: u32 = 16;
pub const MAX_P: u32 = 16;
pub const MAX_KDF_MEMORY: u64 = 1 << 30;

/// The operator's master secret. Never serialized, never logged.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<String>);

impl MasterKey {
    pub fn new(secret: impl Into<String>) -> Result<Self, CredentialError> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(CredentialError::InvalidParameters {
                field: "master_key",
            });
        }
        Ok(Self(secret))
    }

    /// Read the master secret from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, CredentialError> {
        let secret = std::env::var(var).map_err(|_| CredentialError::InvalidParameters {
            field: "master_key",
        })?;
        Self::new(secret)
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

/// scrypt parameters and salt, persisted alongside the encrypted data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KdfParams {
    #[serde(rename = "logN")]
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
    /// Base64-encoded random salt.
    pub salt: String,
}

impl KdfParams {
    /// Fresh parameters with a random salt and the given cost exponent.
    pub fn generate(log_n: u8) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self {
            log_n,
            r: DEFAULT_R,
            p: DEFAULT_P,
            salt: STANDARD.encode(salt),
        }
    }

    /// Reject parameters outside the supported cost envelope.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.log_n == 0 || self.log_n > MAX_LOG_N {
            return Err(CredentialError::Crypto(format!(
                "scrypt logN {} outside 1..={}",
                self.log_n, MAX_LOG_N
            )));
        }
        if self.r == 0 || self.r > MAX_R {
            return Err(CredentialError::Crypto(format!(
                "scrypt r {} outside 1..={}",
                self.r, MAX_R
            )));
        }
        if self.p == 0 || self.p > MAX_P {
            return Err(CredentialError::Crypto(format!(
                "scrypt p {} outside 1..={}",
                self.p, MAX_P
            )));
        }
        let memory = (128u64 * u64::from(self.r)) << self.log_n;
        if memory > MAX_KDF_MEMORY {
            return Err(CredentialError::Crypto(format!(
                "scrypt parameters need {} bytes, limit is {}",
                memory, MAX_KDF_MEMORY
            )));
        }
        Ok(())
    }

    fn salt_bytes(&self) -> Result<Vec<u8>, CredentialError> {
        STANDARD
            .decode(&self.salt)
            .map_err(|e| CredentialError::Crypto(format!("invalid salt encoding: {}", e)))
    }
}

/// A 32-byte working key. Zeroized on drop.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive the working key from the master secret.
///
/// CPU-bound by design. Async callers should run it on a blocking thread.
pub fn derive_key(master: &MasterKey, params: &KdfParams) -> Result<DerivedKey, CredentialError> {
    params.validate()?;
    let salt = params.salt_bytes()?;
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_LEN)
        .map_err(|e| CredentialError::Crypto(format!("invalid scrypt parameters: {}", e)))?;

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(master.as_bytes(), &salt, &scrypt_params, output.as_mut_slice())
        .map_err(|e| CredentialError::Crypto(format!("key derivation failed: {}", e)))?;
    Ok(DerivedKey(output))
}

/// Encrypt `plaintext` under `key`. Returns `base64(nonce || ciphertext)`.
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<String, CredentialError> {
    let cipher = Aes256Gcm::new_from_slice(key.0.as_slice())
        .map_err(|_| CredentialError::Crypto("invalid key length".to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CredentialError::Crypto("encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

/// Decrypt a value produced by [`seal`]. Any tampering or a wrong key fails
/// with the same generic error.
pub fn open(key: &DerivedKey, sealed: &str) -> Result<Zeroizing<Vec<u8>>, CredentialError> {
    let bytes = STANDARD
        .decode(sealed)
        .map_err(|_| CredentialError::Crypto("malformed sealed value".to_string()))?;
    if bytes.len() <= NONCE_LEN {
        return Err(CredentialError::Crypto("malformed sealed value".to_string()));
    }
    let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key.0.as_slice())
        .map_err(|_| CredentialError::Crypto("invalid key length".to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CredentialError::Crypto("decryption failed".to_string()))?;
    Ok(Zeroizing::new(plaintext))
}
