// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric key generation, password derivation and raw export/import.
//!
//! ## Password Derivation
//!
//! `derive_key_from_password` runs PBKDF2-HMAC-SHA256 with a fixed
//! [`PBKDF2_ITERATIONS`] count and a 256-bit output. A zero-length password
//! is accepted as-is. It derives a valid key, but one with no secret input:
//! anyone holding the salt can reproduce it. Callers that accept user
//! passwords are responsible for rejecting empty or low-entropy ones.

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{decode_hex_array, CryptoError};

/// Key size in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Salt size in bytes for password-derived keys.
pub const SALT_LEN: usize = 16;

/// PBKDF2 iteration count. Fixed; changing it changes every derived key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const PBKDF2_ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// A 256-bit symmetric key.
///
/// Zeroized on drop. Equality is constant-time and `Debug` never prints the
/// key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    bytes: [u8; KEY_LEN],
}

impl Key {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Lowercase hex encoding (64 characters), the persisted `keyMaterial` form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: decode_hex_array(value, "key")?,
        })
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for Key {}

impl TryFrom<&[u8]> for Key {
    type Error = CryptoError;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: raw.len(),
        })?;
        Ok(Self { bytes })
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}

/// Produces, derives and (de)serializes symmetric keys.
#[derive(Debug, Clone)]
pub struct KeyManager {
    rng: SystemRandom,
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyManager {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    /// Generate a uniformly random 256-bit key from the system CSPRNG.
    pub fn generate_key(&self) -> Result<Key, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Randomness)?;
        Ok(Key { bytes })
    }

    /// Derive a key from `password` and `salt` with PBKDF2-HMAC-SHA256.
    ///
    /// Deterministic for a given (password, salt) pair. See the module docs
    /// for the empty-password caveat.
    pub fn derive_key_from_password(&self, password: &SecretString, salt: &[u8; SALT_LEN]) -> Key {
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN);
        let mut bytes = [0u8; KEY_LEN];
        pbkdf2::derive(
            PBKDF2_ALGORITHM,
            iterations,
            salt,
            password.expose_secret().as_bytes(),
            &mut bytes,
        );
        Key { bytes }
    }

    /// Fresh random salt, one per password-derived key.
    pub fn generate_salt(&self) -> Result<[u8; SALT_LEN], CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| CryptoError::Randomness)?;
        Ok(salt)
    }

    pub fn export_key(&self, key: &Key) -> [u8; KEY_LEN] {
        key.bytes
    }

    pub fn import_key(&self, raw: [u8; KEY_LEN]) -> Key {
        Key { bytes: raw }
    }
}
