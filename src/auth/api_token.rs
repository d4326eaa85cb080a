// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Opaque API tokens.
//!
//! Long-lived, revocable credentials for programmatic admin access. The raw
//! token is `evk_` followed by 64 lowercase hex characters and is returned
//! exactly once; only its SHA-256 digest is persisted.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AuthError;
use crate::storage::{ApiTokenRecord, ApiTokenRepository, AuthDatabase, User, UserRepository};

/// Prefix identifying API tokens in logs and headers.
pub const API_TOKEN_PREFIX: &str = "evk_";

/// Total length of a raw token (prefix + 64 hex chars).
pub const API_TOKEN_LENGTH: usize = API_TOKEN_PREFIX.len() + 64;

/// Lifetime applied when none (or a non-positive one) is requested.
pub const DEFAULT_TTL_DAYS: i64 = 90;

/// Longest lifetime a token may be created with (ten years).
pub const MAX_TTL_DAYS: i64 = 3650;

/// Expired rows are kept this long before cleanup removes them.
pub const RETENTION_DAYS: i64 = 30;

/// A freshly created token. `raw` is never retrievable again.
#[derive(Debug, Serialize)]
pub struct CreatedApiToken {
    pub raw: String,
    pub record: ApiTokenRecord,
}

/// Generate a new raw token from 32 random bytes.
pub fn generate_token(rng: &SystemRandom) -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)
        .map_err(|_| AuthError::Internal("Random number generator failure".to_string()))?;
    Ok(format!("{API_TOKEN_PREFIX}{}", hex::encode(bytes)))
}

/// Hex SHA-256 digest of a raw token.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Whether `raw` has the shape of an API token.
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == API_TOKEN_LENGTH
        && raw.starts_with(API_TOKEN_PREFIX)
        && raw[API_TOKEN_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Issues and validates API tokens.
pub struct ApiTokenService {
    db: Arc<AuthDatabase>,
    rng: SystemRandom,
}

impl ApiTokenService {
    pub fn new(db: Arc<AuthDatabase>) -> Self {
        Self {
            db,
            rng: SystemRandom::new(),
        }
    }

    /// Create a token for an admin user.
    pub fn create(
        &self,
        user_id: i64,
        description: Option<String>,
        ttl_days: Option<i64>,
    ) -> Result<CreatedApiToken, AuthError> {
        let owner = UserRepository::new(&self.db)
            .get(user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if !owner.is_admin() {
            return Err(AuthError::AdminRequired);
        }

        let ttl_days = match ttl_days {
            Some(days) if days > MAX_TTL_DAYS => {
                return Err(AuthError::ApiTokenTtlInvalid {
                    max_days: MAX_TTL_DAYS,
                })
            }
            Some(days) if days > 0 => days,
            _ => DEFAULT_TTL_DAYS,
        };

        let now = Utc::now();
        let expires_at = Duration::try_days(ttl_days)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(AuthError::ApiTokenTtlInvalid {
                max_days: MAX_TTL_DAYS,
            })?;

        let raw = generate_token(&self.rng)?;
        let record = ApiTokenRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            token_hash: hash_token(&raw),
            description,
            created_at: now,
            expires_at,
            revoked_at: None,
            last_used_at: None,
        };
        ApiTokenRepository::new(&self.db).create(&record)?;

        info!(user_id, token_id = %record.id, ttl_days, "API token created");
        Ok(CreatedApiToken { raw, record })
    }

    /// Validate a raw token and resolve its owner.
    pub async fn validate(&self, raw: &str) -> Result<(User, ApiTokenRecord), AuthError> {
        let (user, record) = self.validate_at(raw, Utc::now())?;

        // Usage tracking stays off the request path
        let db = Arc::clone(&self.db);
        let token_id = record.id.clone();
        let now = Utc::now();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = ApiTokenRepository::new(&db).touch_last_used(&token_id, now) {
                warn!(token_id = %token_id, error = %e, "Failed to record API token use");
            }
        });

        Ok((user, record))
    }

    /// Validation without the usage side effect.
    pub fn validate_at(
        &self,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, ApiTokenRecord), AuthError> {
        if !is_well_formed(raw) {
            return Err(AuthError::ApiTokenMalformed);
        }

        let record = ApiTokenRepository::new(&self.db)
            .find_by_hash(&hash_token(raw))?
            .ok_or(AuthError::ApiTokenNotFound)?;
        if record.is_revoked() {
            debug!(token_id = %record.id, "Revoked API token presented");
            return Err(AuthError::ApiTokenRevoked);
        }
        if record.is_expired_at(now) {
            return Err(AuthError::ApiTokenExpired);
        }

        let user = UserRepository::new(&self.db)
            .get(record.user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::ApiTokenOwnerInactive);
        }
        if !user.is_admin() {
            return Err(AuthError::AdminRequired);
        }

        Ok((user, record))
    }

    /// List a user's tokens, newest first.
    pub fn list(&self, user_id: i64) -> Result<Vec<ApiTokenRecord>, AuthError> {
        Ok(ApiTokenRepository::new(&self.db).list_by_user(user_id)?)
    }

    /// Get one of the user's tokens.
    pub fn get(&self, user_id: i64, token_id: &str) -> Result<ApiTokenRecord, AuthError> {
        ApiTokenRepository::new(&self.db)
            .get_for_user(user_id, token_id)?
            .ok_or(AuthError::ApiTokenNotFound)
    }

    /// Revoke one of the user's tokens. Revoking twice is not an error.
    pub fn revoke(&self, user_id: i64, token_id: &str) -> Result<ApiTokenRecord, AuthError> {
        let repo = ApiTokenRepository::new(&self.db);
        if repo.get_for_user(user_id, token_id)?.is_none() {
            return Err(AuthError::ApiTokenNotFound);
        }
        let record = repo.revoke(token_id, Utc::now())?;
        info!(user_id, token_id, "API token revoked");
        Ok(record)
    }

    /// Delete tokens expired for longer than the retention window.
    pub fn cleanup_expired(&self) -> Result<usize, AuthError> {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize, AuthError> {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let removed = ApiTokenRepository::new(&self.db).delete_expired_before(cutoff)?;
        if removed > 0 {
            info!(removed, "Removed expired API tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::database::tests::temp_db;
    use crate::storage::NewUser;

    fn setup() -> (ApiTokenService, User, tempfile::TempDir) {
        let (db, dir) = temp_db();
        let admin = UserRepository::new(&db)
            .create(NewUser {
                email: Some("admin@example.com".to_string()),
                role: Role::Admin,
                ..Default::default()
            })
            .unwrap();
        (ApiTokenService::new(Arc::new(db)), admin, dir)
    }

    #[test]
    fn generated_tokens_have_fixed_shape() {
        let rng = SystemRandom::new();
        let a = generate_token(&rng).unwrap();
        let b = generate_token(&rng).unwrap();

        assert!(a.starts_with(API_TOKEN_PREFIX));
        assert_eq!(a.len(), API_TOKEN_LENGTH);
        assert_eq!(API_TOKEN_LENGTH, 68);
        assert!(is_well_formed(&a));
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), hash_token(&b));
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_token("evk_abc"), hash_token("evk_abc"));
        assert_eq!(hash_token("evk_abc").len(), 64);
    }

    #[test]
    fn well_formed_rejects_wrong_prefix_case_and_length() {
        let body = "a".repeat(64);
        assert!(is_well_formed(&format!("evk_{body}")));
        assert!(!is_well_formed(&format!("xyz_{body}")));
        assert!(!is_well_formed(&format!("evk_{}", "A".repeat(64))));
        assert!(!is_well_formed(&format!("evk_{}", "a".repeat(63))));
        assert!(!is_well_formed(""));
    }

    #[tokio::test]
    async fn create_then_validate() {
        let (service, admin, _dir) = setup();
        let created = service
            .create(admin.id, Some("ci deploy".to_string()), None)
            .unwrap();

        assert_eq!(created.record.token_hash, hash_token(&created.raw));
        assert_eq!(
            created.record.expires_at - created.record.created_at,
            Duration::days(DEFAULT_TTL_DAYS)
        );

        let (user, record) = service.validate(&created.raw).await.unwrap();
        assert_eq!(user.id, admin.id);
        assert_eq!(record.id, created.record.id);
    }

    #[test]
    fn non_positive_ttl_uses_default() {
        let (service, admin, _dir) = setup();
        for ttl in [Some(0), Some(-5)] {
            let created = service.create(admin.id, None, ttl).unwrap();
            assert_eq!(
                created.record.expires_at - created.record.created_at,
                Duration::days(DEFAULT_TTL_DAYS)
            );
        }
        let created = service.create(admin.id, None, Some(7)).unwrap();
        assert_eq!(
            created.record.expires_at - created.record.created_at,
            Duration::days(7)
        );
    }

    #[test]
    fn oversized_ttl_is_rejected_without_storing() {
        let (service, admin, _dir) = setup();
        for ttl in [Some(MAX_TTL_DAYS + 1), Some(100_000_000), Some(i64::MAX)] {
            assert!(matches!(
                service.create(admin.id, None, ttl),
                Err(AuthError::ApiTokenTtlInvalid { max_days: MAX_TTL_DAYS })
            ));
        }
        assert!(service.list(admin.id).unwrap().is_empty());

        let created = service.create(admin.id, None, Some(MAX_TTL_DAYS)).unwrap();
        assert_eq!(
            created.record.expires_at - created.record.created_at,
            Duration::days(MAX_TTL_DAYS)
        );
    }

    #[test]
    fn create_requires_admin_owner() {
        let (service, _admin, _dir) = setup();
        let member = UserRepository::new(&service.db)
            .create(NewUser::default())
            .unwrap();

        assert!(matches!(service.create(member.id, None, None), Err(AuthError::AdminRequired)));
        assert!(matches!(service.create(404, None, None), Err(AuthError::UserNotFound)));
    }

    #[test]
    fn revoked_expired_and_unknown_are_distinct() {
        let (service, admin, _dir) = setup();

        let revoked = service.create(admin.id, None, None).unwrap();
        service.revoke(admin.id, &revoked.record.id).unwrap();
        assert!(matches!(
            service.validate_at(&revoked.raw, Utc::now()),
            Err(AuthError::ApiTokenRevoked)
        ));

        let expiring = service.create(admin.id, None, Some(1)).unwrap();
        assert!(matches!(
            service.validate_at(&expiring.raw, Utc::now() + Duration::days(2)),
            Err(AuthError::ApiTokenExpired)
        ));

        let unknown = generate_token(&SystemRandom::new()).unwrap();
        assert!(matches!(
            service.validate_at(&unknown, Utc::now()),
            Err(AuthError::ApiTokenNotFound)
        ));

        assert!(matches!(
            service.validate_at("evk_short", Utc::now()),
            Err(AuthError::ApiTokenMalformed)
        ));
    }

    #[test]
    fn inactive_or_demoted_owner_is_rejected() {
        let (service, admin, _dir) = setup();
        let created = service.create(admin.id, None, None).unwrap();
        let users = UserRepository::new(&service.db);

        users.set_role(admin.id, Role::Member).unwrap();
        assert!(matches!(
            service.validate_at(&created.raw, Utc::now()),
            Err(AuthError::AdminRequired)
        ));

        users.set_role(admin.id, Role::Admin).unwrap();
        users.set_active(admin.id, false).unwrap();
        assert!(matches!(
            service.validate_at(&created.raw, Utc::now()),
            Err(AuthError::ApiTokenOwnerInactive)
        ));
    }

    #[test]
    fn get_and_revoke_are_owner_scoped() {
        let (service, admin, _dir) = setup();
        let other = UserRepository::new(&service.db)
            .create(NewUser {
                role: Role::Admin,
                ..Default::default()
            })
            .unwrap();
        let created = service.create(admin.id, None, None).unwrap();

        assert!(service.get(admin.id, &created.record.id).is_ok());
        assert!(matches!(
            service.get(other.id, &created.record.id),
            Err(AuthError::ApiTokenNotFound)
        ));
        assert!(matches!(
            service.revoke(other.id, &created.record.id),
            Err(AuthError::ApiTokenNotFound)
        ));
        assert!(service.get(admin.id, &created.record.id).unwrap().revoked_at.is_none());
    }

    #[test]
    fn list_returns_only_own_tokens() {
        let (service, admin, _dir) = setup();
        service.create(admin.id, Some("one".to_string()), None).unwrap();
        service.create(admin.id, Some("two".to_string()), None).unwrap();

        assert_eq!(service.list(admin.id).unwrap().len(), 2);
        assert!(service.list(admin.id + 1).unwrap().is_empty());
    }

    #[test]
    fn cleanup_keeps_recently_expired_rows() {
        let (service, admin, _dir) = setup();
        service.create(admin.id, None, Some(1)).unwrap();

        let now = Utc::now();
        assert_eq!(service.cleanup_expired_at(now + Duration::days(10)).unwrap(), 0);
        assert_eq!(service.cleanup_expired_at(now + Duration::days(32)).unwrap(), 1);
        assert_eq!(service.cleanup_expired_at(now + Duration::days(32)).unwrap(), 0);
    }

    #[tokio::test]
    async fn validate_records_last_use() {
        let (service, admin, _dir) = setup();
        let created = service.create(admin.id, None, None).unwrap();
        service.validate(&created.raw).await.unwrap();

        let mut last_used = None;
        for _ in 0..50 {
            last_used = service.get(admin.id, &created.record.id).unwrap().last_used_at;
            if last_used.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(last_used.is_some());
    }
}
