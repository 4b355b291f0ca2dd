// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated encryption with AES-256-GCM.
//!
//! Every call to [`CipherEngine::encrypt`] draws a fresh 96-bit nonce from the
//! system CSPRNG and returns it next to the ciphertext. The ciphertext is the
//! encrypted payload followed by the 128-bit GCM tag, so its length is always
//! `plaintext.len() + TAG_LEN`, including for empty input.

use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use super::{CryptoError, Key, KEY_LEN};

/// Nonce size in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag size in bytes (128 bits).
pub const TAG_LEN: usize = 16;

const ALGORITHM: &aead::Algorithm = &AES_256_GCM;

/// Ciphertext size for a plaintext of `plaintext_len` bytes, or `None` when
/// it does not fit in a `u64`.
pub const fn ciphertext_len(plaintext_len: u64) -> Option<u64> {
    plaintext_len.checked_add(TAG_LEN as u64)
}

/// Output of a single encryption: ciphertext with tag, and its nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// AES-256-GCM encryption and decryption.
#[derive(Debug, Clone)]
pub struct CipherEngine {
    rng: SystemRandom,
}

impl Default for CipherEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherEngine {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn less_safe_key(key: &Key) -> Result<LessSafeKey, CryptoError> {
        let unbound =
            UnboundKey::new(ALGORITHM, key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.as_bytes().len(),
            })?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Encrypt `plaintext` under `key` with a freshly generated nonce.
    pub fn encrypt(&self, plaintext: &[u8], key: &Key) -> Result<Sealed, CryptoError> {
        let key = Self::less_safe_key(key)?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| CryptoError::Randomness)?;

        let mut buffer = Vec::with_capacity(plaintext.len() + TAG_LEN);
        buffer.extend_from_slice(plaintext);
        key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;

        Ok(Sealed {
            ciphertext: buffer,
            nonce,
        })
    }

    /// Decrypt `ciphertext` (payload plus tag) with `key` and `nonce`.
    ///
    /// Any tag failure, including input shorter than the tag, yields
    /// [`CryptoError::Integrity`]. No plaintext is returned on failure.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        key: &Key,
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        let key = Self::less_safe_key(key)?;

        let mut buffer = ciphertext.to_vec();
        let plaintext_len = key
            .open_in_place(Nonce::assume_unique_for_key(*nonce), Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::Integrity)?
            .len();

        buffer.truncate(plaintext_len);
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyManager;
    use std::collections::HashSet;

    fn key() -> Key {
        KeyManager::new().generate_key().unwrap()
    }

    #[test]
    fn roundtrip_various_sizes() {
        let engine = CipherEngine::new();
        let key = key();
        for size in [0usize, 1, 15, 16, 17, 4096] {
            let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            let sealed = engine.encrypt(&plaintext, &key).unwrap();
            assert_eq!(Some(sealed.ciphertext.len() as u64), ciphertext_len(size as u64));
            let opened = engine.decrypt(&sealed.ciphertext, &key, &sealed.nonce).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn ciphertext_len_refuses_overflow() {
        assert_eq!(ciphertext_len(u64::MAX - TAG_LEN as u64), Some(u64::MAX));
        assert_eq!(ciphertext_len(u64::MAX - TAG_LEN as u64 + 1), None);
        assert_eq!(ciphertext_len(u64::MAX), None);
    }

    #[test]
    fn empty_plaintext_yields_tag_only_ciphertext() {
        let engine = CipherEngine::new();
        let key = key();
        let sealed = engine.encrypt(b"", &key).unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_LEN);
        assert!(engine
            .decrypt(&sealed.ciphertext, &key, &sealed.nonce)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nonces_never_repeat_for_same_key_and_plaintext() {
        let engine = CipherEngine::new();
        let key = key();
        let nonces: HashSet<[u8; NONCE_LEN]> = (0..10_000)
            .map(|_| engine.encrypt(b"same input", &key).unwrap().nonce)
            .collect();
        assert_eq!(nonces.len(), 10_000);
    }

    #[test]
    fn every_flipped_ciphertext_bit_is_detected() {
        let engine = CipherEngine::new();
        let key = key();
        let sealed = engine.encrypt(b"tamper evident", &key).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut corrupted = sealed.ciphertext.clone();
                corrupted[byte] ^= 1 << bit;
                assert_eq!(
                    engine.decrypt(&corrupted, &key, &sealed.nonce),
                    Err(CryptoError::Integrity)
                );
            }
        }
    }

    #[test]
    fn every_flipped_nonce_bit_is_detected() {
        let engine = CipherEngine::new();
        let key = key();
        let sealed = engine.encrypt(b"tamper evident", &key).unwrap();

        for byte in 0..NONCE_LEN {
            for bit in 0..8 {
                let mut nonce = sealed.nonce;
                nonce[byte] ^= 1 << bit;
                assert_eq!(
                    engine.decrypt(&sealed.ciphertext, &key, &nonce),
                    Err(CryptoError::Integrity)
                );
            }
        }
    }

    #[test]
    fn wrong_key_is_integrity_error() {
        let engine = CipherEngine::new();
        let sealed = engine.encrypt(b"secret", &key()).unwrap();
        assert_eq!(
            engine.decrypt(&sealed.ciphertext, &key(), &sealed.nonce),
            Err(CryptoError::Integrity)
        );
    }

    #[test]
    fn truncated_ciphertext_is_integrity_error() {
        let engine = CipherEngine::new();
        let key = key();
        let sealed = engine.encrypt(b"secret", &key).unwrap();
        assert_eq!(
            engine.decrypt(&sealed.ciphertext[..TAG_LEN - 1], &key, &sealed.nonce),
            Err(CryptoError::Integrity)
        );
    }
}
