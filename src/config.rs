// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the service. Configuration is loaded from the environment at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `identity.redb` | `/data` |
//! | `SESSION_SECRET` | HMAC-SHA256 signing secret (>= 32 bytes) | Required |
//! | `SESSION_ISSUER` | Session token `iss` claim | `events-platform` |
//! | `SESSION_AUDIENCE` | Session token `aud` claim | `events-platform-clients` |
//! | `SESSION_TTL_HOURS` | Session token lifetime | `168` |
//! | `SESSION_GRACE_DAYS` | Lenient refresh window after expiry | `7` |
//! | `FRONTEND_URL` | Default WebAuthn origin | `http://localhost:3000` |
//! | `WEBAUTHN_RP_ID` | Relying-party id | `localhost` |
//! | `WEBAUTHN_RP_NAME` | Relying-party display name | `Events` |
//! | `WEBAUTHN_ALLOWED_ORIGINS` | Comma-separated origins | `FRONTEND_URL` |
//! | `WEBAUTHN_CHALLENGE_TTL_SECS` | Ceremony lifetime | `300` |
//! | `APPLE_BUNDLE_ID` | Expected Apple token audience | `com.events.app` |
//! | `APPLE_KEYS_URL` | Apple key-distribution endpoint | `https://appleid.apple.com/auth/keys` |
//! | `BREACH_API_URL` | Breach corpus base URL | `https://api.pwnedpasswords.com` |
//! | `CLEANUP_INTERVAL_SECS` | Expiry sweep period | `3600` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::apple::APPLE_KEYS_URL;
use crate::auth::SessionConfig;
use crate::password::DEFAULT_BREACH_API_URL;
use crate::telemetry::LogFormat;
use crate::webauthn::settings::{DEFAULT_CHALLENGE_TTL_SECS, MAX_CHALLENGE_TTL_SECS};
use crate::webauthn::{PasskeySettings, PasskeySettingsError};

/// Directory holding the identity database.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";
pub const SESSION_ISSUER_ENV: &str = "SESSION_ISSUER";
pub const SESSION_AUDIENCE_ENV: &str = "SESSION_AUDIENCE";
pub const SESSION_TTL_HOURS_ENV: &str = "SESSION_TTL_HOURS";
pub const SESSION_GRACE_DAYS_ENV: &str = "SESSION_GRACE_DAYS";
pub const FRONTEND_URL_ENV: &str = "FRONTEND_URL";
pub const WEBAUTHN_RP_ID_ENV: &str = "WEBAUTHN_RP_ID";
pub const WEBAUTHN_RP_NAME_ENV: &str = "WEBAUTHN_RP_NAME";
pub const WEBAUTHN_ALLOWED_ORIGINS_ENV: &str = "WEBAUTHN_ALLOWED_ORIGINS";
pub const WEBAUTHN_CHALLENGE_TTL_SECS_ENV: &str = "WEBAUTHN_CHALLENGE_TTL_SECS";
pub const APPLE_BUNDLE_ID_ENV: &str = "APPLE_BUNDLE_ID";
pub const APPLE_KEYS_URL_ENV: &str = "APPLE_KEYS_URL";
pub const BREACH_API_URL_ENV: &str = "BREACH_API_URL";
pub const CLEANUP_INTERVAL_SECS_ENV: &str = "CLEANUP_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_SESSION_ISSUER: &str = "events-platform";
pub const DEFAULT_SESSION_AUDIENCE: &str = "events-platform-clients";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;
pub const DEFAULT_SESSION_GRACE_DAYS: i64 = 7;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
pub const DEFAULT_APPLE_BUNDLE_ID: &str = "com.events.app";
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;

/// Upper bounds for lifetimes read from the environment.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;
pub const MAX_SESSION_GRACE_DAYS: i64 = 366;

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Database file name inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "identity.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
    #[error(transparent)]
    Passkey(#[from] PasskeySettingsError),
}

/// Fully resolved service settings.
#[derive(Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub session: SessionConfig,
    pub passkeys: PasskeySettings,
    pub apple_bundle_id: String,
    pub apple_keys_url: String,
    pub breach_api_url: String,
    pub cleanup_interval: StdDuration,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SessionConfig's Debug redacts the secret
        f.debug_struct("Settings")
            .field("data_dir", &self.data_dir)
            .field("session", &self.session)
            .field("passkeys", &self.passkeys)
            .field("apple_bundle_id", &self.apple_bundle_id)
            .field("apple_keys_url", &self.apple_keys_url)
            .field("breach_api_url", &self.breach_api_url)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let secret = get(SESSION_SECRET_ENV).ok_or(ConfigError::Missing(SESSION_SECRET_ENV))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let ttl_hours: i64 = parse_or(&get, SESSION_TTL_HOURS_ENV, DEFAULT_SESSION_TTL_HOURS)?;
        let grace_days: i64 = parse_or(&get, SESSION_GRACE_DAYS_ENV, DEFAULT_SESSION_GRACE_DAYS)?;
        let ttl = bounded(
            SESSION_TTL_HOURS_ENV,
            ttl_hours,
            1,
            MAX_SESSION_TTL_HOURS,
            Duration::try_hours,
        )?;
        let grace = bounded(
            SESSION_GRACE_DAYS_ENV,
            grace_days,
            0,
            MAX_SESSION_GRACE_DAYS,
            Duration::try_days,
        )?;

        let session = SessionConfig {
            secret,
            issuer: get(SESSION_ISSUER_ENV).unwrap_or_else(|| DEFAULT_SESSION_ISSUER.to_string()),
            audience: get(SESSION_AUDIENCE_ENV)
                .unwrap_or_else(|| DEFAULT_SESSION_AUDIENCE.to_string()),
            ttl,
            grace,
        };

        let frontend_url = get(FRONTEND_URL_ENV).unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());
        let allowed_origins = match get(WEBAUTHN_ALLOWED_ORIGINS_ENV) {
            Some(list) => list.split(',').map(str::to_string).collect(),
            None => vec![frontend_url],
        };
        let challenge_ttl: i64 = parse_or(
            &get,
            WEBAUTHN_CHALLENGE_TTL_SECS_ENV,
            DEFAULT_CHALLENGE_TTL_SECS,
        )?;
        let passkeys = PasskeySettings::new(
            get(WEBAUTHN_RP_ID_ENV)
                .unwrap_or_else(|| crate::webauthn::settings::DEFAULT_RP_ID.to_string()),
            get(WEBAUTHN_RP_NAME_ENV)
                .unwrap_or_else(|| crate::webauthn::settings::DEFAULT_RP_NAME.to_string()),
            &allowed_origins,
            bounded(
                WEBAUTHN_CHALLENGE_TTL_SECS_ENV,
                challenge_ttl,
                1,
                MAX_CHALLENGE_TTL_SECS,
                Duration::try_seconds,
            )?,
        )?;

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(value) => value.parse().map_err(|reason| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                reason,
            })?,
            None => LogFormat::default(),
        };

        let cleanup_secs: u64 = parse_or(&get, CLEANUP_INTERVAL_SECS_ENV, DEFAULT_CLEANUP_INTERVAL_SECS)?;
        if cleanup_secs == 0 {
            return Err(ConfigError::Invalid {
                name: CLEANUP_INTERVAL_SECS_ENV,
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            session,
            passkeys,
            apple_bundle_id: get(APPLE_BUNDLE_ID_ENV)
                .unwrap_or_else(|| DEFAULT_APPLE_BUNDLE_ID.to_string()),
            apple_keys_url: get(APPLE_KEYS_URL_ENV).unwrap_or_else(|| APPLE_KEYS_URL.to_string()),
            breach_api_url: get(BREACH_API_URL_ENV)
                .unwrap_or_else(|| DEFAULT_BREACH_API_URL.to_string()),
            cleanup_interval: StdDuration::from_secs(cleanup_secs),
            log_format,
        })
    }

    /// Path of the identity database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

/// Check `value` against `min..=max` and convert it to a lifetime.
fn bounded(
    name: &'static str,
    value: i64,
    min: i64,
    max: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be between {min} and {max}"),
        });
    }
    to_duration(value).ok_or(ConfigError::Invalid {
        name,
        reason: "out of range".to_string(),
    })
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
