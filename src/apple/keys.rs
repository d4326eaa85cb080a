// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Apple public key fetching and caching.
//!
//! ## Cache semantics
//!
//! - Empty at start, filled lazily on the first lookup
//! - A lookup miss triggers exactly one refetch of the full key set before
//!   failing with [`AppleKeyError::KeyNotFound`]
//! - No TTL: keys stay cached until a refetch replaces the whole set
//! - A refetch builds a new map and swaps it in; readers never see a partial set
//! - Fetch failures are returned to the caller (fail closed)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::DecodingKey;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Apple's key-distribution endpoint.
pub const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum AppleKeyError {
    #[error("failed to fetch Apple public keys: {0}")]
    Fetch(String),
    #[error("Apple public key not found: {0}")]
    KeyNotFound(String),
}

/// Key-id to decoding-key cache for Apple identity tokens.
pub struct AppleKeyCache {
    keys_url: String,
    keys: RwLock<Arc<HashMap<String, DecodingKey>>>,
    client: reqwest::Client,
}

impl AppleKeyCache {
    /// Create a cache backed by `keys_url`.
    pub fn new(keys_url: impl Into<String>) -> Result<Self, AppleKeyError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AppleKeyError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            keys_url: keys_url.into(),
            keys: RwLock::new(Arc::new(HashMap::new())),
            client,
        })
    }

    pub fn keys_url(&self) -> &str {
        &self.keys_url
    }

    /// Get the decoding key for `kid`, refetching once on a miss.
    pub async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, AppleKeyError> {
        if let Some(key) = self.snapshot().await.get(kid) {
            return Ok(key.clone());
        }

        debug!(kid, "Apple key not cached, refetching key set");
        let keys = self.refresh().await?;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| AppleKeyError::KeyNotFound(kid.to_string()))
    }

    /// Fetch the current key set and replace the cache with it.
    pub async fn refresh(&self) -> Result<Arc<HashMap<String, DecodingKey>>, AppleKeyError> {
        let jwks = self.fetch_jwks().await?;

        let mut fresh = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            match jwk_to_decoding_key(jwk) {
                Ok(key) => {
                    fresh.insert(kid, key);
                }
                Err(reason) => warn!(kid = %kid, reason, "Skipping unusable Apple key"),
            }
        }

        let fresh = Arc::new(fresh);
        *self.keys.write().await = Arc::clone(&fresh);
        info!(count = fresh.len(), "Apple public keys refreshed");
        Ok(fresh)
    }

    /// Key ids currently cached.
    pub async fn cached_key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn snapshot(&self) -> Arc<HashMap<String, DecodingKey>> {
        Arc::clone(&*self.keys.read().await)
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AppleKeyError> {
        let response = self
            .client
            .get(&self.keys_url)
            .send()
            .await
            .map_err(|e| AppleKeyError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppleKeyError::Fetch(format!(
                "HTTP {} from Apple keys endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AppleKeyError::Fetch(e.to_string()))
    }
}

/// Convert an RSA JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, &'static str> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|_| "invalid RSA components")
        }
        _ => Err("unsupported key type"),
    }
}
