// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Password strength heuristic.
//!
//! Score = length tier + 10 per character class present + uniqueness bonus,
//! capped at 100.

use std::collections::HashSet;

/// Score a password from 0 to 100.
pub fn calculate_password_strength(password: &str) -> u8 {
    let chars: Vec<char> = password.chars().collect();
    if chars.is_empty() {
        return 0;
    }

    let length_score: u32 = match chars.len() {
        16.. => 40,
        12.. => 30,
        8.. => 20,
        _ => 0,
    };

    let classes = [
        chars.iter().any(|c| c.is_lowercase()),
        chars.iter().any(|c| c.is_uppercase()),
        chars.iter().any(|c| c.is_ascii_digit()),
        chars.iter().any(|c| !c.is_alphanumeric()),
    ];
    let class_score = classes.iter().filter(|present| **present).count() as u32 * 10;

    let distinct = chars.iter().collect::<HashSet<_>>().len();
    let ratio = distinct as f64 / chars.len() as f64;
    let uniqueness_score: u32 = if ratio >= 0.8 {
        20
    } else if ratio >= 0.5 {
        10
    } else {
        0
    };

    (length_score + class_score + uniqueness_score).min(100) as u8
}

/// Human-readable band for a score.
pub fn strength_label(score: u8) -> &'static str {
    match score {
        0..20 => "very weak",
        20..40 => "weak",
        40..60 => "fair",
        60..80 => "strong",
        _ => "very strong",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scores_zero() {
        assert_eq!(calculate_password_strength(""), 0);
        assert_eq!(strength_label(0), "very weak");
    }

    #[test]
    fn long_unique_four_class_scores_100() {
        // 16 distinct characters across all four classes
        assert_eq!(calculate_password_strength("aB3$cD4%eF5&gH6*"), 100);
    }

    #[test]
    fn repeated_character_gets_no_uniqueness_bonus() {
        // 12 chars: length 30 + one class 10
        assert_eq!(calculate_password_strength("aaaaaaaaaaaa"), 40);
        // 16 chars: length 40 + one class 10
        assert_eq!(calculate_password_strength(&"Z".repeat(16)), 50);
    }

    #[test]
    fn short_password_scores_classes_and_uniqueness_only() {
        // length 0 + lower 10 + uniqueness 20
        assert_eq!(calculate_password_strength("abc"), 30);
    }

    #[test]
    fn medium_uniqueness_bonus() {
        // 8 chars, 4 distinct: ratio 0.5
        assert_eq!(calculate_password_strength("aabbccdd"), 20 + 10 + 10);
    }

    #[test]
    fn labels_cover_bands() {
        assert_eq!(strength_label(19), "very weak");
        assert_eq!(strength_label(20), "weak");
        assert_eq!(strength_label(40), "fair");
        assert_eq!(strength_label(60), "strong");
        assert_eq!(strength_label(80), "very strong");
        assert_eq!(strength_label(100), "very strong");
    }
}
