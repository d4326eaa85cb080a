// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Apple Sign-In verification.

pub mod claims;
pub mod keys;
pub mod verifier;

pub use claims::AppleClaims;
pub use keys::{AppleKeyCache, AppleKeyError, APPLE_KEYS_URL};
pub use verifier::{AppleIdentityVerifier, APPLE_ISSUER};
