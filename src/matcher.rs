//! Typed predicates over single header families

use crate::models::MessageMetadata;
use crate::normalize::normalize_list_id;

/// One header predicate of a compiled rule
///
/// Candidates are stored normalized (lower-cased, wrapping punctuation
/// stripped), so evaluation only lower-cases the message side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    From(Vec<String>),
    To(Vec<String>),
    Subject(Vec<String>),
    ListId(String),
}

impl Matcher {
    /// Whether this single predicate holds for the message
    pub fn matches(&self, message: &MessageMetadata) -> bool {
        match self {
            Matcher::From(candidates) => contains_any(message.header("From"), candidates),
            Matcher::To(candidates) => contains_any(message.header("To"), candidates),
            Matcher::Subject(candidates) => contains_any(message.header("Subject"), candidates),
            Matcher::ListId(expected) => list_id_matches(message.header("List-Id"), expected),
        }
    }
}

/// Conjunction of matchers, stopping at the first failure
pub fn matches(matchers: &[Matcher], message: &MessageMetadata) -> bool {
    matchers.iter().all(|m| m.matches(message))
}

fn contains_any(header: &str, candidates: &[String]) -> bool {
    let header = header.to_lowercase();
    candidates.iter().any(|c| header.contains(c.as_str()))
}

// Substring containment is intentionally loose: "example.com" also accepts
// "alerts.example.com".
fn list_id_matches(raw: &str, expected: &str) -> bool {
    let list_id = normalize_list_id(raw);
    list_id == expected || list_id.contains(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> MessageMetadata {
        MessageMetadata::new("m1")
            .with_header("From", "Alerts <Alerts@Example.com>")
            .with_header("To", "me@home.example")
            .with_header("Subject", "Disk usage WARNING")
            .with_header("List-Id", "<Alerts.Example.com>")
    }

    #[test]
    fn test_substring_matchers_ignore_case() {
        let msg = message();
        assert!(Matcher::From(vec!["alerts@example.com".into()]).matches(&msg));
        assert!(Matcher::Subject(vec!["nothing".into(), "warning".into()]).matches(&msg));
        assert!(Matcher::To(vec!["home.example".into()]).matches(&msg));
        assert!(!Matcher::From(vec!["billing".into()]).matches(&msg));
    }

    #[test]
    fn test_list_id_equality_and_substring() {
        let msg = message();
        assert!(Matcher::ListId("alerts.example.com".into()).matches(&msg));
        assert!(Matcher::ListId("example.com".into()).matches(&msg));
        assert!(!Matcher::ListId("news.example.com".into()).matches(&msg));
    }

    #[test]
    fn test_missing_header_reads_as_empty() {
        let msg = MessageMetadata::new("m2").with_header("From", "a@b.example");
        assert!(!Matcher::Subject(vec!["digest".into()]).matches(&msg));
        assert!(!Matcher::ListId("alerts.example.com".into()).matches(&msg));
    }

    #[test]
    fn test_conjunction() {
        let msg = message();
        let both = vec![
            Matcher::From(vec!["example.com".into()]),
            Matcher::ListId("alerts.example.com".into()),
        ];
        assert!(matches(&both, &msg));

        let one_fails = vec![
            Matcher::From(vec!["example.com".into()]),
            Matcher::Subject(vec!["invoice".into()]),
        ];
        assert!(!matches(&one_fails, &msg));
    }

    #[test]
    fn test_empty_candidates_never_match() {
        assert!(!Matcher::From(Vec::new()).matches(&message()));
    }
}
