//! Issue signature: a normalized fingerprint of a finding's headline.

/// First non-blank line of `body`, trimmed, inner whitespace collapsed to a
/// single space, lower-cased. Emoji and punctuation are kept as-is.
///
/// Returns an empty string for a blank body; callers treat an empty
/// signature as "never matches".
pub fn issue_signature(body: &str) -> String {
    body.lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| {
            l.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_spacing_of_first_line_only() {
        assert_eq!(
            issue_signature("  🔴 Problem:   X \n details"),
            issue_signature("🔴 problem: x")
        );
        assert_eq!(issue_signature("\n\n  Null   REF\nmore"), "null ref");
    }

    #[test]
    fn keeps_emoji_and_punctuation() {
        assert_ne!(issue_signature("🔴 problem: x"), issue_signature("problem: x"));
        assert_ne!(issue_signature("problem: x"), issue_signature("problem x"));
    }

    #[test]
    fn blank_body_has_empty_signature() {
        assert_eq!(issue_signature(""), "");
        assert_eq!(issue_signature(" \n\t\n"), "");
    }
}
