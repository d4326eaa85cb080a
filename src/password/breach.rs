// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Breach corpus lookup (k-anonymity range API).
//!
//! Only the first five hex characters of the password's SHA-1 leave the
//! process. The service answers with every `SUFFIX:COUNT` sharing that
//! prefix and the match is done locally.

use std::time::Duration;

use reqwest::StatusCode;
use sha1::{Digest, Sha1};
use tracing::debug;

pub const DEFAULT_BREACH_API_URL: &str = "https://api.pwnedpasswords.com";

const USER_AGENT: &str = "events-identity-password-check";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
const PREFIX_LEN: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum BreachCheckError {
    #[error("breach lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("breach lookup returned HTTP {0}")]
    UnexpectedStatus(StatusCode),
}

/// Client for the breach corpus range endpoint.
pub struct BreachClient {
    base_url: String,
    client: reqwest::Client,
}

impl BreachClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BreachCheckError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Whether the password appears in the breach corpus.
    pub async fn is_breached(&self, password: &str) -> Result<bool, BreachCheckError> {
        let digest = sha1_upper_hex(password);
        let (prefix, suffix) = digest.split_at(PREFIX_LEN);

        let response = self
            .client
            .get(format!("{}/range/{prefix}", self.base_url))
            .header("Add-Padding", "true")
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(BreachCheckError::UnexpectedStatus(response.status()));
        }

        let body = response.text().await?;
        let found = suffix_listed(&body, suffix);
        debug!(prefix, found, "Breach range lookup complete");
        Ok(found)
    }
}

fn sha1_upper_hex(password: &str) -> String {
    hex::encode_upper(Sha1::digest(password.as_bytes()))
}

/// Whether `suffix` appears with a non-zero count in a range response.
///
/// Padding entries carry a count of zero and never match.
fn suffix_listed(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        let Some((candidate, count)) = line.trim().split_once(':') else {
            return false;
        };
        candidate.eq_ignore_ascii_case(suffix) && count.trim().parse::<u64>().map_or(true, |n| n > 0)
    })
}
