//! Audit report and its human and JSON renderings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{AuditError, Result};
use crate::findings::{Conflict, Findings, RuleFinding};
use crate::ranking::{ListStat, SenderStat};

const PREVIEW_DISPLAY_LIMIT: usize = 60;

/// Outcome of one audit run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    /// Serialized as whole seconds
    #[serde(serialize_with = "serialize_secs", deserialize_with = "deserialize_secs")]
    pub window: Duration,
    pub total: usize,
    pub top_senders: Vec<SenderStat>,
    pub top_lists: Vec<ListStat>,
    /// Live label name to number of sampled messages carrying it
    pub coverage: BTreeMap<String, usize>,
    pub suggestions: Suggestions,
    pub findings: Findings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
    /// gmailctl Jsonnet snippets
    pub archive_rules: Vec<String>,
    pub remove_rules: Vec<RuleFinding>,
    pub smells: Vec<Conflict>,
}

fn serialize_secs<S>(window: &Duration, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_u64(window.as_secs())
}

fn deserialize_secs<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(d).map(Duration::from_secs)
}

/// Compact window label: `30d`, `36h` or `90s`
pub fn format_window(window: &Duration) -> String {
    let secs = window.as_secs();
    if secs > 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs > 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate to `max_chars` characters, marking the cut with `…`
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

/// Render the report for a terminal
pub fn print_human<W: Write>(report: &Report, out: &mut W) -> Result<()> {
    render_human(report, out).map_err(|e| AuditError::Output(format!("write human report: {}", e)))
}

fn render_human<W: Write>(report: &Report, out: &mut W) -> std::io::Result<()> {
    writeln!(
        out,
        "gmail-audit — window {} ({} messages)",
        format_window(&report.window),
        report.total
    )?;

    if !report.top_senders.is_empty() {
        writeln!(out, "\nTop senders:")?;
        for sender in &report.top_senders {
            writeln!(
                out,
                "  {:<30} {:>4} {}",
                sender.domain,
                sender.count,
                truncate(&sender.preview_subject, PREVIEW_DISPLAY_LIMIT)
            )?;
        }
    }

    if !report.top_lists.is_empty() {
        writeln!(out, "\nTop lists:")?;
        for list in &report.top_lists {
            writeln!(
                out,
                "  {:<30} {:>4} {}",
                list.list_id,
                list.count,
                truncate(&list.preview_subject, PREVIEW_DISPLAY_LIMIT)
            )?;
        }
    }

    if !report.suggestions.archive_rules.is_empty() {
        writeln!(out, "\nSuggested gmailctl snippets:")?;
        for snippet in &report.suggestions.archive_rules {
            writeln!(out, "{}\n", snippet)?;
        }
    }

    let findings = &report.findings;
    if !findings.is_empty() {
        writeln!(out, "\nLint findings:")?;
        for dead in &findings.dead_rules {
            writeln!(out, "  dead rule: {} — {}", dead.name, dead.reason)?;
        }
        for label in &findings.missing_labels {
            writeln!(out, "  missing label: {}", label)?;
        }
        for conflict in &findings.conflicts {
            writeln!(
                out,
                "  conflict: {} ({})",
                conflict.rules.join(", "),
                conflict.description
            )?;
        }
    }

    out.flush()
}

/// Resolve a report path, refusing anything outside the working directory
fn safe_relative_path(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(AuditError::Output("path must not be empty".to_string()));
    }

    let candidate = Path::new(trimmed);
    if candidate.is_absolute() || candidate.has_root() {
        return Err(AuditError::Output(format!(
            "output path must be relative, got {}",
            trimmed
        )));
    }

    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => {
                if !clean.pop() {
                    return Err(AuditError::Output(format!(
                        "output path {} escapes working directory",
                        trimmed
                    )));
                }
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(AuditError::Output(format!(
                    "output path must be relative, got {}",
                    trimmed
                )));
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(AuditError::Output(format!(
            "output path {} does not name a file",
            trimmed
        )));
    }
    Ok(clean)
}

/// Write the report as pretty JSON under the working directory
///
/// The file is created owner-only on unix and truncated if it already exists.
pub async fn write_json(report: &Report, path: &str) -> Result<PathBuf> {
    let relative = safe_relative_path(path)?;
    let cwd = std::env::current_dir()
        .map_err(|e| AuditError::Output(format!("determine working directory: {}", e)))?;
    let target = cwd.join(relative);

    let mut json = serde_json::to_vec_pretty(report)
        .map_err(|e| AuditError::Output(format!("encode report: {}", e)))?;
    json.push(b'\n');

    let mut options = tokio::fs::OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&target)
        .await
        .map_err(|e| AuditError::Output(format!("create {}: {}", target.display(), e)))?;
    file.write_all(&json)
        .await
        .map_err(|e| AuditError::Output(format!("write {}: {}", target.display(), e)))?;
    file.flush()
        .await
        .map_err(|e| AuditError::Output(format!("write {}: {}", target.display(), e)))?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> Report {
        Report {
            generated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            window: Duration::from_secs(30 * 86_400),
            total: 3,
            top_senders: vec![SenderStat {
                domain: "example.com".into(),
                count: 2,
                preview_subject: "x".repeat(80),
            }],
            top_lists: vec![ListStat {
                list_id: "alerts.example.com".into(),
                count: 2,
                preview_subject: "Disk usage".into(),
            }],
            coverage: BTreeMap::from([("bulk".to_string(), 2)]),
            suggestions: Suggestions {
                archive_rules: vec!["{ snippet }".into()],
                ..Default::default()
            },
            findings: Findings {
                dead_rules: vec![RuleFinding {
                    name: "DeadRule".into(),
                    reason: "no messages matched in lookback".into(),
                }],
                missing_labels: vec!["missing".into()],
                conflicts: vec![Conflict {
                    rules: vec!["ArchiveAlerts".into(), "StarAlerts".into()],
                    description: "archive and star rules overlap".into(),
                }],
            },
        }
    }

    #[test]
    fn test_window_serializes_as_seconds() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["window"], 2_592_000);
        assert_eq!(json["top_lists"][0]["list_id"], "alerts.example.com");
        assert_eq!(json["coverage"]["bulk"], 2);
        assert_eq!(json["findings"]["missing_labels"][0], "missing");
    }

    #[test]
    fn test_format_window() {
        assert_eq!(format_window(&Duration::from_secs(30 * 86_400)), "30d");
        assert_eq!(format_window(&Duration::from_secs(36 * 3_600)), "36h");
        assert_eq!(format_window(&Duration::from_secs(90)), "90s");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 60), "short");
        let long = "é".repeat(70);
        let cut = truncate(&long, 60);
        assert_eq!(cut.chars().count(), 60);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_print_human_sections() {
        let mut out = Vec::new();
        print_human(&sample_report(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("gmail-audit — window 30d (3 messages)"));
        assert!(text.contains("\nTop senders:\n"));
        assert!(text.contains("\nTop lists:\n"));
        assert!(text.contains("\nSuggested gmailctl snippets:\n{ snippet }\n"));
        assert!(text.contains("  dead rule: DeadRule — no messages matched in lookback"));
        assert!(text.contains("  missing label: missing"));
        assert!(text.contains(
            "  conflict: ArchiveAlerts, StarAlerts (archive and star rules overlap)"
        ));
        assert!(text.contains(&format!("{}…", "x".repeat(59))));
    }

    #[test]
    fn test_print_human_empty_report_has_only_header() {
        let mut out = Vec::new();
        let report = Report {
            window: Duration::from_secs(86_400),
            ..Default::default()
        };
        print_human(&report, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "gmail-audit — window 1d (0 messages)\n");
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path(" reports/./audit.json ").unwrap(),
            PathBuf::from("reports/audit.json")
        );
        assert_eq!(
            safe_relative_path("reports/../audit.json").unwrap(),
            PathBuf::from("audit.json")
        );

        for bad in ["", "   ", "/tmp/audit.json", "../audit.json", "a/../../audit.json", "."] {
            let err = safe_relative_path(bad).unwrap_err();
            assert!(matches!(err, AuditError::Output(_)), "{bad:?} should be rejected");
        }
    }
}
