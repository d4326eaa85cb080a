// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer credentials accepted by the events platform.
//!
//! ## Auth Flow
//!
//! 1. A login path (password, passkey, Apple) resolves a `User`
//! 2. [`SessionTokenService`] issues an HS256 session token for that user
//! 3. Clients send `Authorization: Bearer <token>`; admin tooling may send an
//!    `evk_` API token instead
//! 4. The [`Auth`] extractor dispatches on the token prefix and re-reads the
//!    user from storage on every request
//!
//! ## Security
//!
//! - Session tokens cannot be revoked individually; deactivating the user
//!   takes effect on the next request
//! - API tokens are stored as SHA-256 digests only and require an active admin
//! - No clock skew leeway on session expiry

pub mod api_token;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;
pub mod session;

pub use api_token::{ApiTokenService, CreatedApiToken, API_TOKEN_LENGTH, API_TOKEN_PREFIX};
pub use claims::{AuthMethod, AuthenticatedUser, SessionClaims};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, OptionalAuth};
pub use roles::Role;
pub use session::{SessionConfig, SessionTokenService};
