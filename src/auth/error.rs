// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Every verifier returns `Result<_, AuthError>`. Each rejection has its own
//! variant and stable `error_code()`, except where two outcomes differ only in
//! whether a record exists for someone else: those share one variant.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StorageError;

/// Authentication error type.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authorization header present
    #[error("Authorization header is required")]
    MissingAuthHeader,
    /// Invalid authorization header format
    #[error("Invalid authorization header format (expected 'Bearer <token>')")]
    InvalidAuthHeader,

    // Session tokens
    /// Malformed, unsigned, wrongly signed, or wrong issuer/audience
    #[error("Token is invalid")]
    TokenInvalid,
    /// Expired (strict verification)
    #[error("Token has expired")]
    TokenExpired,
    /// Expired longer ago than the grace window (lenient verification)
    #[error("Token expired beyond grace period")]
    ExpiredBeyondGrace,
    /// Token carries no expiry claim (lenient verification)
    #[error("Token has no expiry claim")]
    MissingExpiry,

    // Identity
    #[error("User not found")]
    UserNotFound,
    #[error("User account is inactive")]
    UserInactive,

    // API tokens
    #[error("API token is malformed")]
    ApiTokenMalformed,
    #[error("API token not found")]
    ApiTokenNotFound,
    #[error("API token has been revoked")]
    ApiTokenRevoked,
    #[error("API token has expired")]
    ApiTokenExpired,
    #[error("API token owner is inactive")]
    ApiTokenOwnerInactive,
    #[error("Admin privileges required")]
    AdminRequired,
    #[error("API token lifetime must be at most {max_days} days")]
    ApiTokenTtlInvalid { max_days: i64 },

    // WebAuthn
    #[error("challenge not found")]
    ChallengeNotFound,
    #[error("user has no registered passkeys")]
    NoPasskeys,
    #[error("credential not found")]
    CredentialNotFound,
    #[error("passkey verification failed: {0}")]
    Webauthn(String),
    #[error("an account with this email already exists")]
    EmailTaken,

    // Apple
    #[error("invalid Apple identity token")]
    AppleTokenInvalid,
    #[error("failed to fetch Apple public keys: {0}")]
    AppleKeyFetch(String),

    /// Insufficient permissions
    #[error("Insufficient permissions for this operation")]
    InsufficientPermissions,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Internal authentication error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::TokenInvalid => "TOKEN_INVALID",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::ExpiredBeyondGrace => "token_expired_beyond_grace",
            AuthError::MissingExpiry => "token_missing_expiry",
            AuthError::UserNotFound => "user_not_found",
            AuthError::UserInactive => "user_inactive",
            AuthError::ApiTokenMalformed => "api_token_malformed",
            AuthError::ApiTokenNotFound => "api_token_not_found",
            AuthError::ApiTokenRevoked => "api_token_revoked",
            AuthError::ApiTokenExpired => "api_token_expired",
            AuthError::ApiTokenOwnerInactive => "api_token_owner_inactive",
            AuthError::AdminRequired => "admin_required",
            AuthError::ApiTokenTtlInvalid { .. } => "api_token_ttl_invalid",
            AuthError::ChallengeNotFound => "challenge_not_found",
            AuthError::NoPasskeys => "no_passkeys",
            AuthError::CredentialNotFound => "credential_not_found",
            AuthError::Webauthn(_) => "webauthn_failed",
            AuthError::EmailTaken => "email_taken",
            AuthError::AppleTokenInvalid => "apple_token_invalid",
            AuthError::AppleKeyFetch(_) => "apple_key_fetch_failed",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::Storage(_) => "storage_error",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::TokenInvalid
            | AuthError::TokenExpired
            | AuthError::ExpiredBeyondGrace
            | AuthError::MissingExpiry
            | AuthError::UserNotFound
            | AuthError::ApiTokenMalformed
            | AuthError::ApiTokenNotFound
            | AuthError::ApiTokenRevoked
            | AuthError::ApiTokenExpired
            | AuthError::Webauthn(_)
            | AuthError::AppleTokenInvalid => StatusCode::UNAUTHORIZED,
            AuthError::UserInactive
            | AuthError::ApiTokenOwnerInactive
            | AuthError::AdminRequired
            | AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::ChallengeNotFound
            | AuthError::NoPasskeys
            | AuthError::ApiTokenTtlInvalid { .. } => StatusCode::BAD_REQUEST,
            AuthError::CredentialNotFound => StatusCode::NOT_FOUND,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::AppleKeyFetch(_) => StatusCode::BAD_GATEWAY,
            AuthError::Storage(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Storage and internal details stay in the logs
        let message = match &self {
            AuthError::Storage(_) | AuthError::Internal(_) => {
                tracing::error!(error = %self, "Authentication failed with internal error");
                "Internal authentication error".to_string()
            }
            _ => self.to_string(),
        };
        let body = Json(AuthErrorBody {
            error: message,
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
