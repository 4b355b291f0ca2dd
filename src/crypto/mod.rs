// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client-Side Encryption Primitives
//!
//! - [`keys`] - `KeyManager`: random keys, PBKDF2 derivation, raw export/import
//! - [`cipher`] - `CipherEngine`: AES-256-GCM with a fresh 96-bit nonce per call
//! - [`integrity`] - SHA-256 digest of the plaintext, computed before encryption
//!
//! All randomness comes from `ring::rand::SystemRandom`. Nonces are never
//! derived from counters.
//!
//! ## Size Invariants
//!
//! | Value | Bytes | Hex chars |
//! |-------|-------|-----------|
//! | Key | 32 | 64 |
//! | Nonce | 12 | 24 |
//! | Tag | 16 | - |
//! | Digest | 32 | 64 |

pub mod cipher;
pub mod integrity;
pub mod keys;

pub use cipher::{ciphertext_len, CipherEngine, Sealed, NONCE_LEN, TAG_LEN};
pub use integrity::DIGEST_LEN;
pub use keys::{Key, KeyManager, KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};

/// Errors raised by the encryption primitives.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag did not verify: wrong key, wrong nonce, or corrupted data.
    #[error("authentication failed: ciphertext, key or nonce does not match")]
    Integrity,

    /// Plaintext digest did not match the stored checksum.
    #[error("checksum mismatch: decrypted content does not match its digest")]
    ChecksumMismatch,

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("invalid hex encoding for {field}")]
    InvalidHex { field: &'static str },

    #[error("system random number generator failed")]
    Randomness,

    #[error("encryption failed")]
    Encryption,
}

/// Decode a hex string into a fixed-size array, naming `field` on failure.
pub(crate) fn decode_hex_array<const N: usize>(
    value: &str,
    field: &'static str,
) -> Result<[u8; N], CryptoError> {
    let bytes = hex::decode(value).map_err(|_| CryptoError::InvalidHex { field })?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| match field {
        "nonce" => CryptoError::InvalidNonceLength {
            expected: N,
            actual,
        },
        "key" => CryptoError::InvalidKeyLength {
            expected: N,
            actual,
        },
        _ => CryptoError::InvalidHex { field },
    })
}

/// Decrypt a stored ciphertext and check it against its plaintext checksum.
///
/// Takes the hex encodings exactly as they are persisted on an
/// `EncryptedFile` record. Returns the plaintext only when both the AEAD tag
/// and the SHA-256 digest verify.
pub fn open_and_verify(
    ciphertext: &[u8],
    key_hex: &str,
    nonce_hex: &str,
    checksum_hex: &str,
) -> Result<Vec<u8>, CryptoError> {
    let key = Key::from_hex(key_hex)?;
    let nonce: [u8; NONCE_LEN] = decode_hex_array(nonce_hex, "nonce")?;
    let checksum: [u8; DIGEST_LEN] = decode_hex_array(checksum_hex, "checksum")?;

    let plaintext = CipherEngine::new().decrypt(ciphertext, &key, &nonce)?;
    if !integrity::verify(&plaintext, &checksum) {
        return Err(CryptoError::ChecksumMismatch);
    }
    Ok(plaintext)
}
