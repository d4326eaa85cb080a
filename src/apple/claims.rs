// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claims carried by an Apple identity token.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppleClaims {
    /// Stable, app-scoped user identifier
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub email: Option<String>,
    /// Apple sends this as a JSON bool or as "true"/"false"
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: bool,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub is_private_email: bool,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl AppleClaims {
    /// The email, only when Apple vouches for it.
    pub fn verified_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .filter(|email| self.email_verified && !email.trim().is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(value)) => value,
        Some(BoolOrString::String(value)) => value.eq_ignore_ascii_case("true"),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> AppleClaims {
        serde_json::from_str(&format!(
            r#"{{"sub":"001.abc","iss":"https://appleid.apple.com","aud":"com.events.app","exp":1{extra}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn email_verified_accepts_bool_and_string() {
        assert!(parse(r#","email_verified":true"#).email_verified);
        assert!(parse(r#","email_verified":"true""#).email_verified);
        assert!(!parse(r#","email_verified":"false""#).email_verified);
        assert!(!parse(r#","email_verified":false"#).email_verified);
        assert!(!parse("").email_verified);
        assert!(parse(r#","is_private_email":"true""#).is_private_email);
    }

    #[test]
    fn verified_email_requires_flag() {
        let claims = parse(r#","email":"a@example.com","email_verified":"false""#);
        assert_eq!(claims.verified_email(), None);

        let claims = parse(r#","email":"a@example.com","email_verified":true"#);
        assert_eq!(claims.verified_email(), Some("a@example.com"));
    }
}
