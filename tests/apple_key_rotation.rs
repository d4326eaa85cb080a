// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Apple sign-in end to end across a signing-key rotation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use events_identity::apple::APPLE_ISSUER;
use events_identity::auth::AuthError;
use events_identity::config::Settings;
use events_identity::state::AppState;
use events_identity::storage::AuthDatabase;

const BUNDLE_ID: &str = "com.events.app";
const TEST_KEY_PEM: &[u8] = include_bytes!("fixtures/apple_rsa_key.pem");
const TEST_N: &str = "oK1SEUNqLMgEqaxQOJRhXA_QLNWmKQQXAGspiCP4jz0MnzEgH1BeP4bgUyykeohedh3IRSva0JAuHX_TtSSDo7VjJIFOzTrjPGPnsIwLawJ4_UIQBzkimkpHOsHSzF8-XPc2koFEQ5GTt3R6vE9YvHR2oM0N53ZzGf3OrTUmD-a8r58fRVVeO0M_4JBSRGsAanVUmuswha18_L9V_Onr_skueD1lB-14pet4n80k9AEKI_VSfQ_R_9P0JmK-wExpW_wDe7P2nKZR30izsPzYmRTPxfJDFi2IPq8PxNdj3KMkczJ3uHFBInHLb-pJcTKuHwk-5PSDK3G6FB3FLfXAMQ";

fn jwks(kid: &str) -> serde_json::Value {
    serde_json::json!({
        "keys": [{"kty": "RSA", "kid": kid, "use": "sig", "alg": "RS256", "n": TEST_N, "e": "AQAB"}]
    })
}

fn identity_token(kid: &str, sub: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "sub": sub,
        "iss": APPLE_ISSUER,
        "aud": BUNDLE_ID,
        "iat": now,
        "exp": now + 600,
        "email": "fan@example.com",
        "email_verified": true,
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(&header, &claims, &EncodingKey::from_rsa_pem(TEST_KEY_PEM).unwrap()).unwrap()
}

fn state_for(server: &MockServer, dir: &tempfile::TempDir) -> AppState {
    let vars: HashMap<&str, String> = HashMap::from([
        ("SESSION_SECRET", "integration-secret-that-is-long-enough".to_string()),
        ("DATA_DIR", dir.path().display().to_string()),
        ("APPLE_BUNDLE_ID", BUNDLE_ID.to_string()),
        ("APPLE_KEYS_URL", format!("{}/auth/keys", server.uri())),
        ("BREACH_API_URL", server.uri()),
    ]);
    let settings = Settings::from_lookup(|name| vars.get(name).cloned()).unwrap();
    let db = Arc::new(AuthDatabase::open(&settings.database_path()).unwrap());
    AppState::new(&settings, db).unwrap()
}

#[tokio::test]
async fn rotated_key_is_picked_up_on_miss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("old")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks("new")))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let state = state_for(&server, &dir);

    let claims = state
        .apple
        .validate_identity_token(&identity_token("old", "001.rotation"))
        .await
        .unwrap();
    let user = state
        .apple
        .find_or_create_apple_user(&claims, Some("Ada".to_string()), None)
        .unwrap();

    // Signed with a key id the cache has never seen
    let claims = state
        .apple
        .validate_identity_token(&identity_token("new", "001.rotation"))
        .await
        .unwrap();
    let again = state
        .apple
        .find_or_create_apple_user(&claims, None, None)
        .unwrap();
    assert_eq!(again.id, user.id);

    // "old" was dropped by the rotation
    let result = state
        .apple
        .validate_identity_token(&identity_token("old", "001.rotation"))
        .await;
    assert!(matches!(result, Err(AuthError::AppleTokenInvalid)));

    let session = state.apple.generate_token(&again).unwrap();
    let verified = state.sessions.verify(&session).await.unwrap();
    assert_eq!(verified.id, user.id);
    assert_eq!(verified.email.as_deref(), Some("fan@example.com"));
}
