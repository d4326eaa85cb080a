// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Weak-password list.

use std::collections::HashSet;
use std::sync::LazyLock;

const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "welcome", "welcome1",
    "password1", "password123", "passw0rd", "p@ssw0rd", "p@ssword", "admin", "admin123",
    "administrator", "root", "toor", "changeme", "default", "guest", "login", "qwerty123",
    "qwerty1", "1q2w3e4r", "1q2w3e4r5t", "1qaz2wsx3edc", "zaq12wsx", "abcd1234", "abcdef",
    "abcdefg", "abcdefgh", "iloveyou1", "letmein1", "monkey1", "sunshine1", "football1",
    "baseball1", "superman1", "princess1", "dragon1", "master1", "shadow1", "trustno1!",
    "12341234", "11223344", "123454321", "qwertyui", "asdfghjkl", "asdf1234", "zxcvbnm1",
    "secret", "secret123", "test", "test123", "testing", "hello", "hello123", "whatever",
    "concert", "concerts", "festival", "livemusic", "music123", "showtime", "rockandroll",
    "metallica", "nirvana", "beatles", "ticket", "tickets", "events", "events123",
];

static COMMON: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| COMMON_PASSWORDS.iter().copied().collect());

/// Whether `password` is on the weak-password list (case-insensitive).
pub fn is_common_password(password: &str) -> bool {
    COMMON.contains(password.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively() {
        assert!(is_common_password("password"));
        assert!(is_common_password("PassWord"));
        assert!(is_common_password("QWERTY123"));
    }

    #[test]
    fn unusual_passwords_are_not_common() {
        assert!(!is_common_password("correct horse battery staple"));
        assert!(!is_common_password(""));
    }
}
