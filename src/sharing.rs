// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Share Links
//!
//! [`ShareLinkService`] mints, resolves and revokes time-limited tokens bound
//! to a stored record. A token is 32 bytes from the system CSPRNG, hex
//! encoded (64 characters). It grants access to the record without the
//! caller ever holding the file key.
//!
//! ## Resolution Policy
//!
//! A token resolves only while the record is shared, not soft-deleted, and
//! its expiry is absent or strictly in the future. Unknown, revoked and
//! expired tokens are all reported as not found at the HTTP boundary.
//!
//! ## Consistency
//!
//! Issue and revoke go through [`FileStore::update`], which rewrites the
//! record and its token index entry under one writer. A resolve never
//! observes a token whose share state has already been cleared, and a
//! re-issued token retires the old one in the same step.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::crypto::CryptoError;
use crate::error::VaultError;
use crate::models::{EncryptedFile, SharePreset};
use crate::storage::{FileStore, StoreError};

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Hex length of an issued token.
pub const TOKEN_HEX_LEN: usize = TOKEN_BYTES * 2;

/// Lifetime of a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareTtl {
    Never,
    /// Relative to the moment of issue.
    For(TimeDelta),
    /// Absolute expiry instant.
    Until(DateTime<Utc>),
}

impl ShareTtl {
    /// Resolve to an absolute expiry. Lifetimes that are already over are
    /// rejected.
    pub fn expires_at(self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, VaultError> {
        let expires_at = match self {
            ShareTtl::Never => return Ok(None),
            ShareTtl::For(ttl) => now
                .checked_add_signed(ttl)
                .ok_or_else(|| VaultError::validation("Share lifetime out of range"))?,
            ShareTtl::Until(at) => at,
        };
        if expires_at <= now {
            return Err(VaultError::validation("expiresAt must be in the future"));
        }
        Ok(Some(expires_at))
    }
}

impl From<SharePreset> for ShareTtl {
    fn from(preset: SharePreset) -> Self {
        match preset {
            SharePreset::Day => ShareTtl::For(TimeDelta::hours(24)),
            SharePreset::Week => ShareTtl::For(TimeDelta::days(7)),
            SharePreset::Month => ShareTtl::For(TimeDelta::days(30)),
            SharePreset::Never => ShareTtl::Never,
        }
    }
}

/// Result of [`ShareLinkService::issue`].
#[derive(Debug, Clone)]
pub struct IssuedShare {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub file: EncryptedFile,
}

/// Result of [`ShareLinkService::revoke`].
#[derive(Debug, Clone)]
pub struct Revocation {
    pub file: EncryptedFile,
    /// Token that stopped resolving, if the file was shared.
    pub previous_token: Option<String>,
}

/// Loggable form of a token: its first 8 characters.
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

fn is_token_shaped(token: &str) -> bool {
    token.len() == TOKEN_HEX_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())
}

pub struct ShareLinkService {
    store: Arc<dyn FileStore>,
    rng: SystemRandom,
}

impl ShareLinkService {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            rng: SystemRandom::new(),
        }
    }

    fn generate_token(&self) -> Result<String, CryptoError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| CryptoError::Randomness)?;
        Ok(hex::encode(bytes))
    }

    /// Publish `file_id` under a fresh token, replacing any previous one.
    pub fn issue(
        &self,
        file_id: &str,
        ttl: ShareTtl,
        now: DateTime<Utc>,
    ) -> Result<IssuedShare, VaultError> {
        let expires_at = ttl.expires_at(now)?;
        let token = self.generate_token()?;

        let file = self.store.update(file_id, &mut |file| {
            if file.is_deleted {
                return Err(StoreError::NotFound(format!("File {file_id}")));
            }
            Ok(file.share(token.clone(), expires_at, now))
        })?;

        tracing::info!(
            file_id = %file_id,
            token_prefix = %token_prefix(&token),
            expires_at = ?expires_at,
            "share link issued"
        );
        Ok(IssuedShare {
            token,
            expires_at,
            file,
        })
    }

    /// Return the record behind `token` if the link is live at `now`.
    ///
    /// Yields `ExpiredLink` for a known token past its expiry and `NotFound`
    /// for everything else that does not resolve.
    pub fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<EncryptedFile, VaultError> {
        let not_found = || VaultError::NotFound("Share link".to_string());
        if !is_token_shaped(token) {
            return Err(not_found());
        }

        let file = self.store.find_by_share_token(token)?.ok_or_else(not_found)?;
        if !file.is_shared || file.is_deleted || file.share_token.as_deref() != Some(token) {
            return Err(not_found());
        }
        if !file.share_is_live(now) {
            tracing::debug!(
                file_id = %file.id,
                token_prefix = %token_prefix(token),
                "share link expired"
            );
            return Err(VaultError::ExpiredLink);
        }
        Ok(file)
    }

    /// Clear all share state on `file_id`. Revoking an unshared file is a
    /// no-op.
    pub fn revoke(&self, file_id: &str, now: DateTime<Utc>) -> Result<Revocation, VaultError> {
        let mut previous_token = None;
        let file = self.store.update(file_id, &mut |file| {
            previous_token = file.share_token.clone();
            Ok(file.revoke(now))
        })?;

        if let Some(token) = previous_token.as_deref() {
            tracing::info!(
                file_id = %file_id,
                token_prefix = %token_prefix(token),
                "share link revoked"
            );
        }
        Ok(Revocation {
            file,
            previous_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::record;
    use crate::storage::InMemoryFileStore;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn setup() -> (ShareLinkService, Arc<dyn FileStore>, EncryptedFile) {
        let store: Arc<dyn FileStore> = Arc::new(InMemoryFileStore::new());
        let file = record("owner", "report.pdf");
        store.insert(&file).unwrap();
        (ShareLinkService::new(store.clone()), store, file)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn one_hour_link_expires_after_an_hour() {
        let (service, _, file) = setup();
        let issued = service
            .issue(&file.id, ShareTtl::For(TimeDelta::hours(1)), t0())
            .unwrap();
        assert_eq!(issued.expires_at, Some(t0() + TimeDelta::hours(1)));
        assert!(issued.file.is_shared);

        let resolved = service
            .resolve(&issued.token, t0() + TimeDelta::minutes(30))
            .unwrap();
        assert_eq!(resolved.id, file.id);

        let expired = service.resolve(&issued.token, t0() + TimeDelta::minutes(61));
        assert!(matches!(expired, Err(VaultError::ExpiredLink)));
    }

    #[test]
    fn link_is_dead_exactly_at_expiry() {
        let (service, _, file) = setup();
        let issued = service
            .issue(&file.id, ShareTtl::For(TimeDelta::hours(1)), t0())
            .unwrap();
        assert!(service
            .resolve(&issued.token, t0() + TimeDelta::hours(1))
            .is_err());
    }

    #[test]
    fn never_expiring_link_resolves_far_in_the_future() {
        let (service, _, file) = setup();
        let issued = service.issue(&file.id, ShareTtl::Never, t0()).unwrap();
        assert_eq!(issued.expires_at, None);
        assert_eq!(issued.file.share_expires_at, None);

        let far = t0() + TimeDelta::days(365 * 200);
        assert_eq!(service.resolve(&issued.token, far).unwrap().id, file.id);
    }

    #[test]
    fn revoked_token_stops_resolving() {
        let (service, store, file) = setup();
        let issued = service.issue(&file.id, ShareTtl::Never, t0()).unwrap();

        let revocation = service.revoke(&file.id, t0()).unwrap();
        assert_eq!(revocation.previous_token.as_deref(), Some(issued.token.as_str()));
        assert!(!revocation.file.is_shared);
        assert!(revocation.file.share_token.is_none());
        assert!(revocation.file.share_expires_at.is_none());

        assert!(matches!(
            service.resolve(&issued.token, t0()),
            Err(VaultError::NotFound(_))
        ));
        assert!(store.find_by_share_token(&issued.token).unwrap().is_none());
    }

    #[test]
    fn revoke_is_idempotent() {
        let (service, _, file) = setup();
        let first = service.revoke(&file.id, t0()).unwrap();
        assert!(first.previous_token.is_none());
        assert_eq!(first.file, file);

        let second = service.revoke(&file.id, t0()).unwrap();
        assert_eq!(second.file, file);
    }

    #[test]
    fn reissue_retires_previous_token() {
        let (service, _, file) = setup();
        let first = service.issue(&file.id, ShareTtl::Never, t0()).unwrap();
        let second = service
            .issue(&file.id, ShareTtl::For(TimeDelta::days(7)), t0())
            .unwrap();
        assert_ne!(first.token, second.token);

        assert!(service.resolve(&first.token, t0()).is_err());
        assert_eq!(service.resolve(&second.token, t0()).unwrap().id, file.id);
    }

    #[test]
    fn tokens_are_64_hex_chars_without_collisions() {
        let (service, _, file) = setup();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let token = service.generate_token().unwrap();
            assert_eq!(token.len(), TOKEN_HEX_LEN);
            assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
            assert!(seen.insert(token));
        }

        let issued = service.issue(&file.id, ShareTtl::Never, t0()).unwrap();
        assert!(is_token_shaped(&issued.token));
    }

    #[test]
    fn deleted_file_cannot_be_shared_or_resolved() {
        let (service, store, file) = setup();
        let issued = service.issue(&file.id, ShareTtl::Never, t0()).unwrap();

        store
            .update(&file.id, &mut |f| Ok(f.soft_delete(t0())))
            .unwrap();
        assert!(matches!(
            service.resolve(&issued.token, t0()),
            Err(VaultError::NotFound(_))
        ));
        assert!(matches!(
            service.issue(&file.id, ShareTtl::Never, t0()),
            Err(VaultError::NotFound(_))
        ));

        store.update(&file.id, &mut |f| Ok(f.restore(t0()))).unwrap();
        assert!(service.resolve(&issued.token, t0()).is_ok());
    }

    #[test]
    fn past_expiry_is_rejected() {
        let (service, _, file) = setup();
        let err = service
            .issue(&file.id, ShareTtl::Until(t0() - TimeDelta::minutes(1)), t0())
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn unknown_and_malformed_tokens_are_not_found() {
        let (service, _, file) = setup();
        service.issue(&file.id, ShareTtl::Never, t0()).unwrap();

        let non_hex = "g".repeat(64);
        let unknown = "a".repeat(64);
        for token in ["", "short", non_hex.as_str(), unknown.as_str()] {
            assert!(matches!(
                service.resolve(token, t0()),
                Err(VaultError::NotFound(_))
            ));
        }
    }

    #[test]
    fn issue_on_missing_file_is_not_found() {
        let (service, _, _) = setup();
        assert!(matches!(
            service.issue("missing", ShareTtl::Never, t0()),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn presets_map_to_lifetimes() {
        let now = t0();
        assert_eq!(
            ShareTtl::from(SharePreset::Day).expires_at(now).unwrap(),
            Some(now + TimeDelta::hours(24))
        );
        assert_eq!(
            ShareTtl::from(SharePreset::Month).expires_at(now).unwrap(),
            Some(now + TimeDelta::days(30))
        );
        assert_eq!(ShareTtl::from(SharePreset::Never).expires_at(now).unwrap(), None);
    }

    #[test]
    fn token_prefix_is_short() {
        assert_eq!(token_prefix(&"ab".repeat(32)), "abababab");
        assert_eq!(token_prefix("abc"), "abc");
    }
}
