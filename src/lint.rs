//! CI projection of an audit: findings plus a pass/fail policy

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditOptions, AuditService};
use crate::error::Result;
use crate::findings::{Findings, RuleFinding};
use crate::report::format_window;

pub const FAIL_ON_DEAD: &str = "dead";
pub const FAIL_ON_MISSING_LABEL: &str = "missing-label";
pub const FAIL_ON_CONFLICT: &str = "conflict";

/// Every recognized `fail_on` token
pub const ALL_FAIL_ON: [&str; 3] = [FAIL_ON_DEAD, FAIL_ON_CONFLICT, FAIL_ON_MISSING_LABEL];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub window: Duration,
    pub total: usize,
    pub findings: Findings,
}

impl AuditService {
    /// Run a full audit and keep only what the lint policy needs
    pub async fn run_lint(
        &self,
        options: &AuditOptions,
        cancel: &CancellationToken,
    ) -> Result<LintReport> {
        let report = self.run(options, cancel).await?;
        Ok(LintReport {
            window: options.window,
            total: report.total,
            findings: report.findings,
        })
    }
}

impl LintReport {
    /// Whether any requested category has findings
    ///
    /// Tokens are trimmed and lower-cased; unknown tokens are ignored.
    pub fn should_fail<S: AsRef<str>>(&self, fail_on: &[S]) -> bool {
        fail_on.iter().any(|token| {
            match token.as_ref().trim().to_lowercase().as_str() {
                FAIL_ON_DEAD => !self.findings.dead_rules.is_empty(),
                FAIL_ON_MISSING_LABEL => !self.findings.missing_labels.is_empty(),
                FAIL_ON_CONFLICT => !self.findings.conflicts.is_empty(),
                _ => false,
            }
        })
    }

    /// Summary for CI logs, sorted so repeated runs diff cleanly
    pub fn human_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "gmail-audit lint — window {} ({} messages checked)\n",
            format_window(&self.window),
            self.total
        ));

        let findings = &self.findings;
        if findings.is_empty() {
            out.push_str("no findings\n");
            return out;
        }

        if !findings.dead_rules.is_empty() {
            out.push_str("dead rules:\n");
            let mut dead: Vec<&RuleFinding> = findings.dead_rules.iter().collect();
            dead.sort_by(|a, b| a.name.cmp(&b.name));
            for finding in dead {
                out.push_str(&format!("  {} — {}\n", finding.name, finding.reason));
            }
        }

        if !findings.missing_labels.is_empty() {
            out.push_str("missing labels:\n");
            let mut labels: Vec<&String> = findings.missing_labels.iter().collect();
            labels.sort();
            for label in labels {
                out.push_str(&format!("  {}\n", label));
            }
        }

        if !findings.conflicts.is_empty() {
            out.push_str("conflicts:\n");
            for conflict in &findings.conflicts {
                out.push_str(&format!(
                    "  {} — {}\n",
                    conflict.rules.join(", "),
                    conflict.description
                ));
            }
        }

        out
    }
}

/// Split a comma separated `--fail-on` value into canonical tokens
pub fn parse_fail_on(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}
