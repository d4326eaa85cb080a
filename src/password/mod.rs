// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password policy.
//!
//! Length, weak-list and breach checks produce `errors` (any one makes the
//! password unacceptable). A breach service outage only adds a warning so
//! that sign-up keeps working.

pub mod breach;
pub mod common;
pub mod strength;

use serde::Serialize;
use tracing::warn;

pub use breach::{BreachCheckError, BreachClient, DEFAULT_BREACH_API_URL};
pub use common::is_common_password;
pub use strength::{calculate_password_strength, strength_label};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Outcome of [`PasswordValidator::validate_password`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PasswordValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct PasswordValidator {
    breach: BreachClient,
}

impl PasswordValidator {
    pub fn new(breach_api_url: impl Into<String>) -> Result<Self, BreachCheckError> {
        Ok(Self {
            breach: BreachClient::new(breach_api_url)?,
        })
    }

    pub fn is_common_password(&self, password: &str) -> bool {
        is_common_password(password)
    }

    pub async fn is_breached(&self, password: &str) -> Result<bool, BreachCheckError> {
        self.breach.is_breached(password).await
    }

    pub async fn validate_password(&self, password: &str) -> PasswordValidation {
        let mut result = PasswordValidation::default();

        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH {
            result
                .errors
                .push(format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"));
        }
        if length > MAX_PASSWORD_LENGTH {
            result
                .errors
                .push(format!("Password must be at most {MAX_PASSWORD_LENGTH} characters"));
        }
        if is_common_password(password) {
            result
                .errors
                .push("Password is too common".to_string());
        }

        if !password.is_empty() {
            match self.breach.is_breached(password).await {
                Ok(true) => result
                    .errors
                    .push("Password has appeared in a data breach".to_string()),
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Breach check unavailable");
                    result
                        .warnings
                        .push("Could not check password against breach database".to_string());
                }
            }
        }

        result.valid = result.errors.is_empty();
        result
    }

    pub fn calculate_password_strength(&self, password: &str) -> u8 {
        calculate_password_strength(password)
    }

    pub fn strength_label(&self, score: u8) -> &'static str {
        strength_label(score)
    }
}
