// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use webauthn_rs::prelude::WebauthnError;

use crate::apple::{AppleIdentityVerifier, AppleKeyCache, AppleKeyError};
use crate::auth::{ApiTokenService, SessionTokenService};
use crate::config::Settings;
use crate::password::{BreachCheckError, PasswordValidator};
use crate::storage::AuthDatabase;
use crate::webauthn::PasskeyService;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("WebAuthn setup failed: {0}")]
    Webauthn(#[from] WebauthnError),
    #[error("Apple key client setup failed: {0}")]
    AppleKeys(#[from] AppleKeyError),
    #[error("Breach client setup failed: {0}")]
    Breach(#[from] BreachCheckError),
}

/// Shared handles to every verification service.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<AuthDatabase>,
    pub sessions: Arc<SessionTokenService>,
    pub api_tokens: Arc<ApiTokenService>,
    pub passkeys: Arc<PasskeyService>,
    pub apple: Arc<AppleIdentityVerifier>,
    pub passwords: Arc<PasswordValidator>,
}

impl AppState {
    pub fn new(settings: &Settings, db: Arc<AuthDatabase>) -> Result<Self, StateError> {
        let sessions = Arc::new(SessionTokenService::new(settings.session.clone(), db.clone()));
        let api_tokens = Arc::new(ApiTokenService::new(db.clone()));
        let passkeys = Arc::new(PasskeyService::new(settings.passkeys.clone(), db.clone())?);
        let apple_keys = Arc::new(AppleKeyCache::new(settings.apple_keys_url.clone())?);
        let apple = Arc::new(AppleIdentityVerifier::new(
            apple_keys,
            settings.apple_bundle_id.clone(),
            sessions.clone(),
            db.clone(),
        ));
        let passwords = Arc::new(PasswordValidator::new(settings.breach_api_url.clone())?);

        Ok(Self {
            db,
            sessions,
            api_tokens,
            passkeys,
            apple,
            passwords,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::session::tests::test_config;
    use crate::webauthn::PasskeySettings;
    use tempfile::TempDir;

    /// State over a fresh database. External endpoints point nowhere.
    pub(crate) fn test_state() -> (AppState, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(AuthDatabase::open(&temp_dir.path().join("identity.redb")).unwrap());

        let settings = Settings {
            data_dir: temp_dir.path().to_path_buf(),
            session: test_config(),
            passkeys: PasskeySettings::for_frontend("http://localhost:3000").unwrap(),
            apple_bundle_id: "com.events.app".to_string(),
            apple_keys_url: "http://127.0.0.1:9/auth/keys".to_string(),
            breach_api_url: "http://127.0.0.1:9".to_string(),
            cleanup_interval: std::time::Duration::from_secs(3600),
            log_format: Default::default(),
        };

        let state = AppState::new(&settings, db).unwrap();
        (state, temp_dir)
    }

    #[test]
    fn services_share_one_database() {
        let (state, _temp_dir) = test_state();
        assert_eq!(Arc::strong_count(&state.db), 5);
    }
}
