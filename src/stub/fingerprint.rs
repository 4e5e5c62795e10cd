//! Subject normalization and the fingerprint join key.
//!
//! A placeholder arrives with a bare subject ("Fed Raises Rates"), the full
//! article with a category prefix ("(BN) Fed Raises Rates"). Both collapse to
//! the same fingerprint. A subject that genuinely starts with a bracketed
//! acronym loses it too; that ambiguity is accepted.

use chrono::{DateTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

static BRACKETED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\([A-Z0-9]{1,8}\)|\[[A-Z0-9]{1,8}\])(?:\s+|$)").expect("valid prefix regex")
});

fn is_category_token(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_uppercase())
}

/// Strip one leading bracketed all-caps token and the whitespace around it.
pub fn normalize(subject: &str) -> &str {
    let Some(found) = BRACKETED_PREFIX.find(subject) else {
        return subject.trim();
    };
    let token = found.as_str().trim();
    let inner = &token[1..token.len() - 1];
    if !is_category_token(inner) {
        return subject.trim();
    }
    subject[found.end()..].trim()
}

pub fn fingerprint<Tz: TimeZone>(subject: &str, received_at: &DateTime<Tz>) -> String {
    let subject_key = normalize(subject).to_lowercase();
    format!(
        "{}_{}",
        subject_key.trim(),
        received_at.date_naive().format("%Y%m%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn jan_15() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-15T10:30:00+01:00").expect("timestamp")
    }

    #[test]
    fn prefix_is_stripped_once() {
        assert_eq!(normalize("(BN) Fed Raises Rates"), "Fed Raises Rates");
        assert_eq!(normalize("  [BFW]   Fed Raises Rates  "), "Fed Raises Rates");
        assert_eq!(normalize("(BN) (BI) Nested"), "(BI) Nested");
    }

    #[test]
    fn non_category_brackets_are_kept() {
        assert_eq!(normalize("(Video) Fed Raises Rates"), "(Video) Fed Raises Rates");
        assert_eq!(normalize("(2024) Outlook"), "(2024) Outlook");
        assert_eq!(normalize("(BN)Fed"), "(BN)Fed");
        assert_eq!(normalize("Fed Raises Rates (BN)"), "Fed Raises Rates (BN)");
    }

    #[test]
    fn fingerprint_uses_received_date() {
        assert_eq!(
            fingerprint("Fed Raises Rates", &jan_15()),
            "fed raises rates_20240115"
        );
    }

    #[test]
    fn fingerprint_ignores_any_category_prefix() {
        let date = jan_15();
        let subjects = [
            "Fed Raises Rates",
            "Swiss Watch Exports Fell Again in October",
            "BHP Says It's 'No Longer Considering' Anglo Takeover (Video)",
            "ünïcode Subject",
        ];
        let prefixes = ["(XX)", "(BN)", "(BFW)", "[BI]", "(BNEF)", "(A1)"];
        for subject in subjects {
            for prefix in prefixes {
                assert_eq!(
                    fingerprint(subject, &date),
                    fingerprint(&format!("{prefix} {subject}"), &date),
                    "prefix {prefix} on {subject}"
                );
            }
        }
    }

    #[test]
    fn fingerprint_is_case_and_edge_whitespace_insensitive() {
        let date = Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 0).single().expect("date");
        assert_eq!(
            fingerprint("  FED raises RATES ", &date),
            fingerprint("(BN) fed Raises rates", &date)
        );
    }

    #[test]
    fn fingerprint_separates_days() {
        let a = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).single().expect("date");
        let b = Utc.with_ymd_and_hms(2024, 1, 16, 9, 0, 0).single().expect("date");
        assert_ne!(fingerprint("Same", &a), fingerprint("Same", &b));
    }
}
