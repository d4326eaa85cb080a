// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Events Identity - credential verification for the events platform
//!
//! Every way a caller can prove who they are ends here, and every path
//! resolves to the same stored user record.
//!
//! ## Modules
//!
//! - `auth` - Session tokens, admin API tokens and the axum extractors
//! - `webauthn` - Passkey registration, login and sign-up ceremonies
//! - `apple` - Apple identity token verification and account linking
//! - `password` - Password policy, breach lookup and strength scoring
//! - `storage` - Embedded redb store for users and credentials
//! - `sweeper` - Background removal of expired records

pub mod apple;
pub mod auth;
pub mod config;
pub mod password;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod telemetry;
pub mod webauthn;
