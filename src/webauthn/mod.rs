// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passkey (WebAuthn) support.
//!
//! Ceremony state lives in the `webauthn_challenges` table between the start
//! and finish calls, so any instance sharing the database can complete a
//! ceremony another one started.

pub mod service;
pub mod settings;

pub use service::{user_handle, AuthenticationStart, PasskeyService, RegistrationStart};
pub use settings::{PasskeySettings, PasskeySettingsError};
