// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relying-party settings for passkey ceremonies.

use chrono::Duration;
use url::Url;

pub const DEFAULT_RP_ID: &str = "localhost";
pub const DEFAULT_RP_NAME: &str = "Events";
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;
/// Upper bound on a ceremony's lifetime (one day).
pub const MAX_CHALLENGE_TTL_SECS: i64 = 86_400;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PasskeySettingsError {
    #[error("WebAuthn relying-party id must not be empty")]
    EmptyRpId,
    #[error("WebAuthn allowed origins must not be empty")]
    NoOrigins,
    #[error("Invalid WebAuthn origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
    #[error("WebAuthn challenge lifetime must be between 1 and {MAX_CHALLENGE_TTL_SECS} seconds")]
    InvalidChallengeTtl,
}

/// Relying-party identity and ceremony lifetime.
#[derive(Debug, Clone)]
pub struct PasskeySettings {
    rp_id: String,
    rp_name: String,
    allowed_origins: Vec<Url>,
    challenge_ttl: Duration,
}

impl PasskeySettings {
    pub fn new(
        rp_id: impl Into<String>,
        rp_name: impl Into<String>,
        allowed_origins: &[String],
        challenge_ttl: Duration,
    ) -> Result<Self, PasskeySettingsError> {
        let rp_id = rp_id.into().trim().to_string();
        if rp_id.is_empty() {
            return Err(PasskeySettingsError::EmptyRpId);
        }
        if challenge_ttl <= Duration::zero() || challenge_ttl.num_seconds() > MAX_CHALLENGE_TTL_SECS {
            return Err(PasskeySettingsError::InvalidChallengeTtl);
        }

        let allowed_origins = allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(parse_origin)
            .collect::<Result<Vec<_>, _>>()?;
        if allowed_origins.is_empty() {
            return Err(PasskeySettingsError::NoOrigins);
        }

        Ok(Self {
            rp_id,
            rp_name: rp_name.into(),
            allowed_origins,
            challenge_ttl,
        })
    }

    /// Settings for a local front end at `frontend_url`.
    pub fn for_frontend(frontend_url: &str) -> Result<Self, PasskeySettingsError> {
        Self::new(
            DEFAULT_RP_ID,
            DEFAULT_RP_NAME,
            &[frontend_url.to_string()],
            Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
        )
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    pub fn allowed_origins(&self) -> &[Url] {
        &self.allowed_origins
    }

    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }
}

fn parse_origin(origin: &str) -> Result<Url, PasskeySettingsError> {
    let url = Url::parse(origin).map_err(|e| PasskeySettingsError::InvalidOrigin {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    if url.host_str().is_none() {
        return Err(PasskeySettingsError::InvalidOrigin {
            origin: origin.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_defaults() {
        let settings = PasskeySettings::for_frontend("http://localhost:3000").unwrap();
        assert_eq!(settings.rp_id(), "localhost");
        assert_eq!(settings.rp_name(), "Events");
        assert_eq!(settings.allowed_origins().len(), 1);
        assert_eq!(settings.allowed_origins()[0].as_str(), "http://localhost:3000/");
        assert_eq!(settings.challenge_ttl(), Duration::seconds(300));
    }

    #[test]
    fn blank_origins_are_skipped() {
        let origins = vec![" https://events.example ".to_string(), "".to_string()];
        let settings =
            PasskeySettings::new("events.example", "Events", &origins, Duration::minutes(5)).unwrap();
        assert_eq!(settings.allowed_origins().len(), 1);
    }

    #[test]
    fn rejects_invalid_input() {
        let ttl = Duration::minutes(5);
        assert!(matches!(
            PasskeySettings::new(" ", "Events", &["https://a.example".to_string()], ttl),
            Err(PasskeySettingsError::EmptyRpId)
        ));
        assert!(matches!(
            PasskeySettings::new("a.example", "Events", &[], ttl),
            Err(PasskeySettingsError::NoOrigins)
        ));
        assert!(matches!(
            PasskeySettings::new("a.example", "Events", &["not a url".to_string()], ttl),
            Err(PasskeySettingsError::InvalidOrigin { .. })
        ));
        assert!(matches!(
            PasskeySettings::new("a.example", "Events", &["https://a.example".to_string()], Duration::zero()),
            Err(PasskeySettingsError::InvalidChallengeTtl)
        ));
        assert!(matches!(
            PasskeySettings::new("a.example", "Events", &["https://a.example".to_string()], Duration::days(2)),
            Err(PasskeySettingsError::InvalidChallengeTtl)
        ));
    }
}
