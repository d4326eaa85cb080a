// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passkey ceremonies.
//!
//! Flow overview:
//! 1) `start_*` builds options with `webauthn-rs` and persists the in-progress
//!    ceremony state as a challenge record with a short TTL.
//! 2) The client runs the authenticator and posts the response back together
//!    with the challenge id.
//! 3) `finish_*` consumes the challenge (single use, operation must match),
//!    verifies the response and resolves or provisions the user.
//!
//! Unknown, expired and wrong-ceremony challenge ids all fail with
//! `ChallengeNotFound`.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webauthn_rs::prelude::*;

use super::PasskeySettings;
use crate::auth::AuthError;
use crate::storage::{
    normalize_email, AuthDatabase, ChallengeOperation, ChallengeRepository, CredentialRepository,
    NewUser, StorageError, User, UserRepository, WebauthnCredential,
};

const DEFAULT_CREDENTIAL_NAME: &str = "Passkey";
const MAX_CREDENTIAL_NAME_LEN: usize = 64;

/// Ceremony state stored in a challenge record.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CeremonyState {
    Registration(PasskeyRegistration),
    Signup(PasskeyRegistration),
    Authentication(PasskeyAuthentication),
    Discoverable(DiscoverableAuthentication),
}

/// Options to hand to `navigator.credentials.create()`.
#[derive(Debug, Serialize)]
pub struct RegistrationStart {
    pub challenge_id: String,
    pub options: CreationChallengeResponse,
}

/// Options to hand to `navigator.credentials.get()`.
#[derive(Debug, Serialize)]
pub struct AuthenticationStart {
    pub challenge_id: String,
    pub options: RequestChallengeResponse,
}

/// Drives passkey registration, login and sign-up ceremonies.
pub struct PasskeyService {
    webauthn: Webauthn,
    settings: PasskeySettings,
    db: Arc<AuthDatabase>,
}

impl PasskeyService {
    pub fn new(settings: PasskeySettings, db: Arc<AuthDatabase>) -> Result<Self, WebauthnError> {
        let (primary, extra) = settings
            .allowed_origins()
            .split_first()
            .ok_or(WebauthnError::Configuration)?;

        let mut builder = WebauthnBuilder::new(settings.rp_id(), primary)?.rp_name(settings.rp_name());
        for origin in extra {
            builder = builder.append_allowed_origin(origin);
        }
        let webauthn = builder.build()?;

        Ok(Self {
            webauthn,
            settings,
            db,
        })
    }

    pub fn settings(&self) -> &PasskeySettings {
        &self.settings
    }

    fn challenges(&self) -> ChallengeRepository<'_> {
        ChallengeRepository::new(&self.db, self.settings.challenge_ttl())
    }

    // =========================================================================
    // Registration (signed-in user adds a passkey)
    // =========================================================================

    pub fn start_registration(&self, user: &User) -> Result<RegistrationStart, AuthError> {
        let existing = CredentialRepository::new(&self.db).list_by_user(user.id)?;
        let exclude = existing
            .iter()
            .map(|c| stored_passkey(c).map(|pk| pk.cred_id().clone()))
            .collect::<Result<Vec<CredentialID>, _>>()?;
        let exclude = if exclude.is_empty() { None } else { Some(exclude) };

        let (options, state) = self
            .webauthn
            .start_passkey_registration(
                user_handle(user.id),
                &user.login_name(),
                &user.display_name(),
                exclude,
            )
            .map_err(webauthn_error)?;

        let challenge_id = self.challenges().store_challenge(
            Some(user.id),
            encode_state(&CeremonyState::Registration(state))?,
            ChallengeOperation::Registration,
        )?;
        debug!(user_id = user.id, challenge_id = %challenge_id, "Passkey registration started");

        Ok(RegistrationStart {
            challenge_id,
            options,
        })
    }

    pub fn finish_registration(
        &self,
        user_id: i64,
        challenge_id: &str,
        response: &RegisterPublicKeyCredential,
        display_name: Option<&str>,
    ) -> Result<WebauthnCredential, AuthError> {
        let challenge = self
            .challenges()
            .consume_user_challenge(challenge_id, ChallengeOperation::Registration, user_id)?
            .into_option()
            .ok_or(AuthError::ChallengeNotFound)?;
        let CeremonyState::Registration(state) = decode_state(&challenge.challenge)? else {
            return Err(AuthError::ChallengeNotFound);
        };

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &state)
            .map_err(webauthn_error)?;

        let credential = StoredKey::from_passkey(&passkey)?.into_credential(user_id, display_name);
        CredentialRepository::new(&self.db)
            .create(&credential)
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => {
                    AuthError::Webauthn("credential already registered".to_string())
                }
                other => other.into(),
            })?;

        info!(user_id, credential_id = %credential.id, "Passkey registered");
        Ok(credential)
    }

    // =========================================================================
    // Authentication (known user)
    // =========================================================================

    pub fn start_authentication(&self, user_id: i64) -> Result<AuthenticationStart, AuthError> {
        let user = self.active_user(user_id)?;
        let passkeys = CredentialRepository::new(&self.db)
            .list_by_user(user.id)?
            .iter()
            .map(stored_passkey)
            .collect::<Result<Vec<Passkey>, _>>()?;
        if passkeys.is_empty() {
            return Err(AuthError::NoPasskeys);
        }

        let (options, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(webauthn_error)?;

        let challenge_id = self.challenges().store_challenge(
            Some(user.id),
            encode_state(&CeremonyState::Authentication(state))?,
            ChallengeOperation::Authentication,
        )?;

        Ok(AuthenticationStart {
            challenge_id,
            options,
        })
    }

    pub fn finish_authentication(
        &self,
        challenge_id: &str,
        response: &PublicKeyCredential,
    ) -> Result<User, AuthError> {
        let challenge = self
            .challenges()
            .consume_challenge(challenge_id, ChallengeOperation::Authentication)?
            .into_option()
            .ok_or(AuthError::ChallengeNotFound)?;
        let (Some(user_id), CeremonyState::Authentication(state)) =
            (challenge.user_id, decode_state(&challenge.challenge)?)
        else {
            return Err(AuthError::ChallengeNotFound);
        };

        let result = self
            .webauthn
            .finish_passkey_authentication(response, &state)
            .map_err(webauthn_error)?;

        let credential = CredentialRepository::new(&self.db)
            .find_by_credential_id(&encode_credential_id(result.cred_id().as_ref()))?
            .filter(|c| c.user_id == user_id)
            .ok_or(AuthError::CredentialNotFound)?;
        self.record_use(&credential, &result)?;

        self.active_user(user_id)
    }

    // =========================================================================
    // Discoverable login (no prior user context)
    // =========================================================================

    pub fn start_discoverable_login(&self) -> Result<AuthenticationStart, AuthError> {
        let (options, state) = self
            .webauthn
            .start_discoverable_authentication()
            .map_err(webauthn_error)?;

        let challenge_id = self.challenges().store_challenge(
            None,
            encode_state(&CeremonyState::Discoverable(state))?,
            ChallengeOperation::Authentication,
        )?;

        Ok(AuthenticationStart {
            challenge_id,
            options,
        })
    }

    pub fn finish_discoverable_login(
        &self,
        challenge_id: &str,
        response: &PublicKeyCredential,
    ) -> Result<User, AuthError> {
        let challenge = self
            .challenges()
            .consume_challenge(challenge_id, ChallengeOperation::Authentication)?
            .into_option()
            .ok_or(AuthError::ChallengeNotFound)?;
        let CeremonyState::Discoverable(state) = decode_state(&challenge.challenge)? else {
            return Err(AuthError::ChallengeNotFound);
        };

        // The credential id, not the user handle, identifies the account
        let (_, cred_id) = self
            .webauthn
            .identify_discoverable_authentication(response)
            .map_err(webauthn_error)?;
        let credential = CredentialRepository::new(&self.db)
            .find_by_credential_id(&encode_credential_id(cred_id))?
            .ok_or(AuthError::CredentialNotFound)?;
        let passkey = stored_passkey(&credential)?;

        let result = self
            .webauthn
            .finish_discoverable_authentication(response, state, &[DiscoverableKey::from(&passkey)])
            .map_err(webauthn_error)?;
        self.record_use(&credential, &result)?;

        self.active_user(credential.user_id)
    }

    // =========================================================================
    // Sign-up (no user record until completion)
    // =========================================================================

    pub fn start_signup(&self, email: &str) -> Result<RegistrationStart, AuthError> {
        let email = normalize_email(email);
        if UserRepository::new(&self.db).find_by_email(&email)?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let (options, state) = self
            .webauthn
            .start_passkey_registration(Uuid::new_v4(), &email, &email, None)
            .map_err(webauthn_error)?;

        let challenge_id = self
            .challenges()
            .store_signup_challenge(&email, encode_state(&CeremonyState::Signup(state))?)?;
        debug!(challenge_id = %challenge_id, "Passkey sign-up started");

        Ok(RegistrationStart {
            challenge_id,
            options,
        })
    }

    /// Verify the sign-up response and create the user with its first passkey.
    pub fn finish_signup(
        &self,
        challenge_id: &str,
        response: &RegisterPublicKeyCredential,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<User, AuthError> {
        let challenge = self
            .challenges()
            .consume_challenge(challenge_id, ChallengeOperation::SignupRegistration)?
            .into_option()
            .ok_or(AuthError::ChallengeNotFound)?;
        let (Some(email), CeremonyState::Signup(state)) =
            (challenge.pending_email, decode_state(&challenge.challenge)?)
        else {
            return Err(AuthError::ChallengeNotFound);
        };

        let passkey = self
            .webauthn
            .finish_passkey_registration(response, &state)
            .map_err(webauthn_error)?;

        let key = StoredKey::from_passkey(&passkey)?;
        let new_user = NewUser {
            email: Some(email),
            first_name,
            last_name,
            ..Default::default()
        };
        let (user, _) = UserRepository::new(&self.db)
            .create_with_credential(new_user, |user| key.into_credential(user.id, None))
            .map_err(|e| match e {
                StorageError::AlreadyExists(_) => AuthError::EmailTaken,
                other => other.into(),
            })?;

        info!(user_id = user.id, "User signed up with passkey");
        Ok(user)
    }

    // =========================================================================
    // Credential management
    // =========================================================================

    pub fn list_credentials(&self, user_id: i64) -> Result<Vec<WebauthnCredential>, AuthError> {
        Ok(CredentialRepository::new(&self.db).list_by_user(user_id)?)
    }

    pub fn rename_credential(
        &self,
        user_id: i64,
        id: &str,
        display_name: &str,
    ) -> Result<WebauthnCredential, AuthError> {
        CredentialRepository::new(&self.db)
            .rename(user_id, id, &credential_name(Some(display_name)))
            .map_err(credential_not_found)
    }

    pub fn delete_credential(&self, user_id: i64, id: &str) -> Result<(), AuthError> {
        CredentialRepository::new(&self.db)
            .delete(user_id, id)
            .map_err(credential_not_found)?;
        info!(user_id, credential_id = %id, "Passkey deleted");
        Ok(())
    }

    /// Remove expired challenges. Returns the number removed.
    pub fn cleanup_expired_challenges(&self) -> Result<usize, AuthError> {
        let removed = self.challenges().cleanup_expired_challenges(Utc::now())?;
        if removed > 0 {
            info!(removed, "Removed expired WebAuthn challenges");
        }
        Ok(removed)
    }

    fn active_user(&self, user_id: i64) -> Result<User, AuthError> {
        let user = UserRepository::new(&self.db)
            .get(user_id)?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::UserInactive);
        }
        Ok(user)
    }

    /// Persist counter and backup-state changes, and the usage time.
    fn record_use(
        &self,
        credential: &WebauthnCredential,
        result: &AuthenticationResult,
    ) -> Result<(), AuthError> {
        let mut passkey = stored_passkey(credential)?;
        let updated = match passkey.update_credential(result) {
            Some(true) => Some(serde_json::to_string(&passkey).map_err(|e| {
                AuthError::Internal(format!("Failed to serialize passkey: {e}"))
            })?),
            _ => None,
        };
        CredentialRepository::new(&self.db).record_use(
            credential.user_id,
            &credential.id,
            updated,
            Utc::now(),
        )?;
        Ok(())
    }
}

/// Stable WebAuthn user handle for an existing account.
pub fn user_handle(user_id: i64) -> Uuid {
    Uuid::from_u64_pair(0, user_id as u64)
}

fn encode_credential_id(raw: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(raw)
}

fn credential_name(requested: Option<&str>) -> String {
    let name: String = requested
        .map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_CREDENTIAL_NAME_LEN)
        .collect();
    if name.is_empty() {
        DEFAULT_CREDENTIAL_NAME.to_string()
    } else {
        name
    }
}

/// Serialized form of a verified passkey, ready to be stored.
struct StoredKey {
    credential_id: String,
    public_key: String,
}

impl StoredKey {
    fn from_passkey(passkey: &Passkey) -> Result<Self, AuthError> {
        let cred_id: &[u8] = passkey.cred_id().as_ref();
        Ok(Self {
            credential_id: encode_credential_id(cred_id),
            public_key: serde_json::to_string(passkey)
                .map_err(|e| AuthError::Internal(format!("Failed to serialize passkey: {e}")))?,
        })
    }

    fn into_credential(self, user_id: i64, display_name: Option<&str>) -> WebauthnCredential {
        WebauthnCredential {
            id: Uuid::new_v4().to_string(),
            user_id,
            credential_id: self.credential_id,
            public_key: self.public_key,
            display_name: credential_name(display_name),
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

fn stored_passkey(credential: &WebauthnCredential) -> Result<Passkey, AuthError> {
    serde_json::from_str(&credential.public_key).map_err(|e| {
        warn!(credential_id = %credential.id, error = %e, "Stored passkey is unreadable");
        AuthError::Internal("Failed to deserialize passkey".to_string())
    })
}

fn encode_state(state: &CeremonyState) -> Result<String, AuthError> {
    serde_json::to_string(state)
        .map_err(|e| AuthError::Internal(format!("Failed to serialize ceremony state: {e}")))
}

fn decode_state(raw: &str) -> Result<CeremonyState, AuthError> {
    serde_json::from_str(raw).map_err(|_| AuthError::ChallengeNotFound)
}

fn webauthn_error(e: WebauthnError) -> AuthError {
    debug!(error = ?e, "WebAuthn ceremony rejected");
    AuthError::Webauthn(e.to_string())
}

fn credential_not_found(e: StorageError) -> AuthError {
    match e {
        StorageError::NotFound(_) => AuthError::CredentialNotFound,
        other => other.into(),
    }
}
