// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign in with Apple.
//!
//! ## Verification
//!
//! 1. `kid` from the token header selects the key (one refetch on a miss)
//! 2. RS256 signature, issuer `https://appleid.apple.com`, `aud` equal to the
//!    app bundle id, expiry with 60 s leeway
//!
//! Every token problem is reported as `AppleTokenInvalid`. Only an unreachable
//! key endpoint is reported separately, and it always rejects.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::{debug, info, warn};

use super::{AppleClaims, AppleKeyCache, AppleKeyError};
use crate::auth::{AuthError, SessionTokenService};
use crate::storage::{AuthDatabase, NewUser, StorageError, User, UserRepository};

pub const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

pub struct AppleIdentityVerifier {
    keys: Arc<AppleKeyCache>,
    bundle_id: String,
    sessions: Arc<SessionTokenService>,
    db: Arc<AuthDatabase>,
}

impl AppleIdentityVerifier {
    pub fn new(
        keys: Arc<AppleKeyCache>,
        bundle_id: impl Into<String>,
        sessions: Arc<SessionTokenService>,
        db: Arc<AuthDatabase>,
    ) -> Self {
        Self {
            keys,
            bundle_id: bundle_id.into(),
            sessions,
            db,
        }
    }

    /// Verify an identity token from the Apple client SDK.
    pub async fn validate_identity_token(&self, token: &str) -> Result<AppleClaims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::AppleTokenInvalid);
        }
        let header = decode_header(token).map_err(|_| AuthError::AppleTokenInvalid)?;
        if header.alg != Algorithm::RS256 {
            return Err(AuthError::AppleTokenInvalid);
        }
        let kid = header.kid.ok_or(AuthError::AppleTokenInvalid)?;

        let key = self.keys.decoding_key(&kid).await.map_err(|e| match e {
            AppleKeyError::Fetch(reason) => {
                warn!(error = %reason, "Apple key endpoint unavailable");
                AuthError::AppleKeyFetch(reason)
            }
            AppleKeyError::KeyNotFound(_) => {
                debug!(kid = %kid, "Apple identity token signed with unknown key");
                AuthError::AppleTokenInvalid
            }
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[APPLE_ISSUER]);
        validation.set_audience(&[self.bundle_id.as_str()]);

        decode::<AppleClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Apple identity token rejected");
                AuthError::AppleTokenInvalid
            })
    }

    /// Issue a session token for a user signed in with Apple.
    pub fn generate_token(&self, user: &User) -> Result<String, AuthError> {
        self.sessions.issue(user)
    }

    /// Resolve the platform user for verified Apple claims.
    ///
    /// Order: existing subject link, then account with the same verified email
    /// (linked as an additional subject), then a brand new account.
    pub fn find_or_create_apple_user(
        &self,
        claims: &AppleClaims,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<User, AuthError> {
        let users = UserRepository::new(&self.db);

        if let Some(user) = self.linked_user(&users, &claims.sub)? {
            return Ok(user);
        }

        if let Some(email) = claims.verified_email() {
            if let Some(user) = users.find_by_email(email)? {
                ensure_active(&user)?;
                match users.link_apple_identity(&claims.sub, user.id, Some(email.to_string())) {
                    Ok(_) => {
                        info!(user_id = user.id, "Linked Apple identity to existing account");
                        return Ok(user);
                    }
                    // Linked concurrently
                    Err(StorageError::AlreadyExists(_)) => {
                        return self
                            .linked_user(&users, &claims.sub)?
                            .ok_or(AuthError::UserNotFound);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let new_user = NewUser {
            email: claims.verified_email().map(str::to_string),
            first_name,
            last_name,
            ..Default::default()
        };
        match users.create_with_apple_identity(new_user, &claims.sub) {
            Ok(user) => {
                info!(user_id = user.id, "Created account from Apple sign-in");
                Ok(user)
            }
            Err(StorageError::AlreadyExists(_)) => self
                .linked_user(&users, &claims.sub)?
                .ok_or(AuthError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    fn linked_user(&self, users: &UserRepository<'_>, subject: &str) -> Result<Option<User>, AuthError> {
        let Some(identity) = users.find_apple_identity(subject)? else {
            return Ok(None);
        };
        let user = users.get(identity.user_id)?.ok_or(AuthError::UserNotFound)?;
        ensure_active(&user)?;
        Ok(Some(user))
    }
}

fn ensure_active(user: &User) -> Result<(), AuthError> {
    if user.is_active {
        Ok(())
    } else {
        Err(AuthError::UserInactive)
    }
}
