// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token service.
//!
//! Session tokens are HS256 JWTs signed with a shared secret. They are the
//! terminal step of every login path (password, passkey, Apple).
//!
//! ## Verification
//!
//! 1. Signature, then exact `iss` / `aud` match (jsonwebtoken)
//! 2. Expiry, checked here against an explicit clock so the lenient grace
//!    window can be applied
//! 3. The user is re-read by id; inactive or deleted users are rejected even
//!    while their token is still valid

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

use super::{AuthError, SessionClaims};
use crate::storage::{AuthDatabase, User, UserRepository};

/// Session token settings.
#[derive(Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    /// Window after expiry during which `refresh_lenient` still succeeds
    pub grace: Duration,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("grace", &self.grace)
            .finish()
    }
}

/// Issues and verifies session tokens.
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
    grace: Duration,
    db: Arc<AuthDatabase>,
}

impl SessionTokenService {
    pub fn new(config: SessionConfig, db: Arc<AuthDatabase>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by hand so the grace window can apply
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["iss", "aud"]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer,
            audience: config.audience,
            ttl: config.ttl,
            grace: config.grace,
            db,
        }
    }

    /// Configured grace window for lenient refresh.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Issue a token for `user`.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AuthError::Internal("Session lifetime out of range".to_string()))?;
        let claims = SessionClaims {
            user_id: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: Some(exp.timestamp()),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign session token: {e}")))
    }

    /// Strictly verify a token and resolve its user.
    pub async fn verify(&self, token: &str) -> Result<User, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<User, AuthError> {
        let claims = self.decode_claims(token)?;
        let exp = claims.exp.ok_or(AuthError::TokenInvalid)?;
        if now.timestamp() >= exp {
            return Err(AuthError::TokenExpired);
        }
        self.resolve_user(claims.user_id)
    }

    /// Verify a token, tolerating expiry up to `grace` ago.
    pub async fn verify_lenient(&self, token: &str, grace: Duration) -> Result<User, AuthError> {
        self.verify_lenient_at(token, grace, Utc::now())
    }

    pub fn verify_lenient_at(
        &self,
        token: &str,
        grace: Duration,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let claims = self.decode_claims(token)?;
        let exp = claims.exp.ok_or(AuthError::MissingExpiry)?;
        let now = now.timestamp();
        let expired_for = now.saturating_sub(exp);
        if now >= exp && expired_for > grace.num_seconds() {
            debug!(user_id = claims.user_id, expired_for, "Session token past grace window");
            return Err(AuthError::ExpiredBeyondGrace);
        }
        self.resolve_user(claims.user_id)
    }

    /// Exchange a valid token for a fresh one.
    pub async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let user = self.verify_at(token, now)?;
        self.issue_at(&user, now)
    }

    /// Exchange a recently-expired token for a fresh one, using the configured grace window.
    pub async fn refresh_lenient(&self, token: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let user = self.verify_lenient_at(token, self.grace, now)?;
        self.issue_at(&user, now)
    }

    fn decode_claims(&self, token: &str) -> Result<SessionClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::TokenInvalid);
        }
        decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Session token rejected");
                AuthError::TokenInvalid
            })
    }

    fn resolve_user(&self, user_id: i64) -> Result<User, AuthError> {
        let user = UserRepository::new(&self.db)
            .get(user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::database::tests::temp_db;
    use crate::storage::NewUser;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    pub(crate) fn test_config() -> SessionConfig {
        SessionConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: "events-platform".to_string(),
            audience: "events-platform-clients".to_string(),
            ttl: Duration::hours(1),
            grace: Duration::days(7),
        }
    }

    fn setup() -> (SessionTokenService, User, tempfile::TempDir) {
        let (db, dir) = temp_db();
        let user = UserRepository::new(&db)
            .create(NewUser {
                email: Some("fan@example.com".to_string()),
                role: Role::Member,
                ..Default::default()
            })
            .unwrap();
        (SessionTokenService::new(test_config(), Arc::new(db)), user, dir)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[tokio::test]
    async fn issue_then_verify_resolves_same_user() {
        let (service, user, _dir) = setup();
        let token = service.issue(&user).unwrap();
        let verified = service.verify(&token).await.unwrap();
        assert_eq!(verified.id, user.id);
    }

    #[test]
    fn token_has_three_segments_and_claims() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let claims: SessionClaims = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email.as_deref(), Some("fan@example.com"));
        assert_eq!(claims.iat, t0().timestamp());
        assert_eq!(claims.exp, Some(t0().timestamp() + 3600));
        assert_eq!(claims.iss, "events-platform");
        assert_eq!(claims.aud, "events-platform-clients");
    }

    #[test]
    fn tampered_payload_is_invalid() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        for i in 0..payload.len() {
            payload[i] ^= 0x01;
            let forged = format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(&payload), parts[2]);
            let result = service.verify_at(&forged, t0());
            assert!(matches!(result, Err(AuthError::TokenInvalid)), "byte {i} accepted");
            payload[i] ^= 0x01;
        }
    }

    #[test]
    fn malformed_and_empty_tokens_are_invalid() {
        let (service, _user, _dir) = setup();
        assert!(matches!(service.verify_at("", t0()), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify_at("not-a-jwt", t0()), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify_at("a.b.c", t0()), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn wrong_secret_or_audience_is_invalid() {
        let (service, user, _dir) = setup();

        let mut other = test_config();
        other.secret = "a-completely-different-signing-secret!!".to_string();
        let foreign = SessionTokenService::new(other, Arc::clone(&service.db));
        let token = foreign.issue_at(&user, t0()).unwrap();
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::TokenInvalid)));

        let mut other = test_config();
        other.audience = "someone-else".to_string();
        let foreign = SessionTokenService::new(other, Arc::clone(&service.db));
        let token = foreign.issue_at(&user, t0()).unwrap();
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::TokenInvalid)));

        let mut other = test_config();
        other.issuer = "someone-else".to_string();
        let foreign = SessionTokenService::new(other, Arc::clone(&service.db));
        let token = foreign.issue_at(&user, t0()).unwrap();
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn lifetime_past_calendar_limit_errors_instead_of_panicking() {
        let (db, _dir) = temp_db();
        let user = UserRepository::new(&db).create(NewUser::default()).unwrap();
        let config = SessionConfig {
            ttl: Duration::MAX,
            ..test_config()
        };
        let service = SessionTokenService::new(config, Arc::new(db));

        assert!(matches!(service.issue_at(&user, t0()), Err(AuthError::Internal(_))));
    }

    #[test]
    fn strict_verify_rejects_at_expiry() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        let exp = t0() + Duration::hours(1);

        assert!(service.verify_at(&token, exp - Duration::seconds(1)).is_ok());
        assert!(matches!(service.verify_at(&token, exp), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn lenient_grace_boundary() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        let exp = t0() + Duration::hours(1);
        let grace = Duration::minutes(30);

        assert!(service.verify_lenient_at(&token, grace, exp + grace).is_ok());
        assert!(matches!(
            service.verify_lenient_at(&token, grace, exp + grace + Duration::seconds(1)),
            Err(AuthError::ExpiredBeyondGrace)
        ));
        // Not yet expired behaves like strict verification
        assert!(service.verify_lenient_at(&token, grace, t0()).is_ok());
    }

    #[test]
    fn lenient_still_checks_signature() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        let forged = format!("{}x", token);
        assert!(matches!(
            service.verify_lenient_at(&forged, Duration::days(1), t0()),
            Err(AuthError::TokenInvalid)
        ));
    }

    #[test]
    fn lenient_rejects_missing_expiry_distinctly() {
        let (service, user, _dir) = setup();
        let claims = SessionClaims {
            user_id: user.id,
            email: None,
            iat: t0().timestamp(),
            exp: None,
            iss: "events-platform".to_string(),
            aud: "events-platform-clients".to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &service.encoding_key).unwrap();

        assert!(matches!(
            service.verify_lenient_at(&token, Duration::days(1), t0()),
            Err(AuthError::MissingExpiry)
        ));
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn inactive_or_deleted_user_is_rejected() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();

        UserRepository::new(&service.db).set_active(user.id, false).unwrap();
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::UserInactive)));

        let ghost = User { id: 999, ..user };
        let token = service.issue_at(&ghost, t0()).unwrap();
        assert!(matches!(service.verify_at(&token, t0()), Err(AuthError::UserNotFound)));
    }

    #[test]
    fn role_changes_apply_without_reissue() {
        let (service, user, _dir) = setup();
        let token = service.issue_at(&user, t0()).unwrap();
        UserRepository::new(&service.db).set_role(user.id, Role::Admin).unwrap();

        let verified = service.verify_at(&token, t0()).unwrap();
        assert!(verified.is_admin());
    }

    #[tokio::test]
    async fn refresh_issues_new_token_for_same_user() {
        let (service, user, _dir) = setup();
        let token = service.issue(&user).unwrap();
        let refreshed = service.refresh(&token).await.unwrap();
        assert_eq!(service.verify(&refreshed).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn refresh_rejects_expired_but_lenient_refresh_accepts() {
        let (service, user, _dir) = setup();
        let token = service
            .issue_at(&user, Utc::now() - Duration::hours(2))
            .unwrap();

        assert!(matches!(service.refresh(&token).await, Err(AuthError::TokenExpired)));
        let refreshed = service.refresh_lenient(&token).await.unwrap();
        assert_eq!(service.verify(&refreshed).await.unwrap().id, user.id);
    }
}
