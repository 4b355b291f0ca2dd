// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plaintext integrity: SHA-256 digests computed before encryption.
//!
//! The digest is stored as the record's `checksum` and is only ever computed
//! over plaintext, so a decrypted download can be checked without reference
//! to the ciphertext.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Digest size in bytes (SHA-256).
pub const DIGEST_LEN: usize = 32;

pub fn digest(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha256::digest(data).into()
}

/// Lowercase hex digest, the persisted `checksum` form.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(digest(data))
}

/// Recompute the digest of `data` and compare it in constant time.
pub fn verify(data: &[u8], expected: &[u8; DIGEST_LEN]) -> bool {
    digest(data).ct_eq(expected).into()
}

/// Like [`verify`], for a hex-encoded checksum. Malformed hex never verifies.
pub fn verify_hex(data: &[u8], expected_hex: &str) -> bool {
    let mut expected = [0u8; DIGEST_LEN];
    match hex::decode_to_slice(expected_hex, &mut expected) {
        Ok(()) => verify(data, &expected),
        Err(_) => false,
    }
}
