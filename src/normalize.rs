//! Header and criterion normalization shared by the rule compiler, the matcher
//! and the rankings

use mailparse::MailAddr;
use once_cell::sync::Lazy;
use regex::Regex;

static ANGLE_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[<\s]*(.*?)[>\s]*$").expect("angle bracket pattern is valid"));

const CANDIDATE_WRAPPING: &[char] = &['"', '\'', '(', ')'];

/// Split a from/to/subject criterion into lower-cased substring candidates
///
/// `,` `;` and `|` act as separators alongside whitespace. Wrapping quotes and
/// parentheses are stripped and the literal `OR` is dropped.
pub fn split_candidates(raw: &str) -> Vec<String> {
    raw.replace([',', ';', '|'], " ")
        .split_whitespace()
        .map(|part| part.trim_matches(CANDIDATE_WRAPPING).to_lowercase())
        .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case("or"))
        .collect()
}

/// Normalize a List-Id header or list criterion
///
/// `"<Alerts.Example.com>"` and ` alerts.example.com ` both become
/// `alerts.example.com`. Blank input yields `""`.
pub fn normalize_list_id(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let inner = ANGLE_BRACKETS
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let inner = inner.trim();
    let inner = inner.strip_suffix('>').unwrap_or(inner);
    let inner = inner.strip_prefix('<').unwrap_or(inner);
    inner.trim_matches(&['"', ' '][..]).to_lowercase()
}

/// Sender domain of a `From` header
///
/// The header is parsed as an address list and the first address carrying a
/// domain wins. Unparseable headers fall back to splitting on the last `@`.
pub fn domain_of(from: &str) -> String {
    let from = from.trim();
    if from.is_empty() {
        return String::new();
    }

    let addrs = match mailparse::addrparse(from) {
        Ok(list) => list,
        Err(_) => return extract_domain(from),
    };

    addrs
        .iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => vec![single.addr.as_str()],
            MailAddr::Group(group) => group.addrs.iter().map(|s| s.addr.as_str()).collect(),
        })
        .map(extract_domain)
        .find(|domain| !domain.is_empty())
        .unwrap_or_default()
}

fn extract_domain(address: &str) -> String {
    let address = address.trim().to_lowercase();
    match address.rfind('@') {
        Some(at) => address[at + 1..].trim_matches(&['.', ' '][..]).to_string(),
        None => String::new(),
    }
}
