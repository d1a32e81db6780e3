//! Gmail filter audit
//!
//! Replays a compiled gmailctl configuration against a recent sample of a
//! mailbox and reports what the filters actually do.
//!
//! # Overview
//!
//! - **Sampling**: metadata-only listing of the lookback window, paced by a token bucket
//! - **Ranking**: noisiest sender domains and mailing lists, label coverage
//! - **Replay**: gmailctl filters compiled into matchers and run over the sample
//! - **Findings**: dead rules, missing labels, archive/star conflicts
//! - **Lint**: the same findings with a CI pass/fail policy
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_audit::{auth, AuditOptions, AuditService, GmailctlRunner, ProductionGmailClient};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-audit/token.json".as_ref(),
//!         auth::READONLY_SCOPES,
//!     )
//!     .await?;
//!
//!     let service = AuditService::new(Box::new(ProductionGmailClient::new(hub)))
//!         .with_loader(Box::new(GmailctlRunner::default()));
//!
//!     let report = service
//!         .run(&AuditOptions::with_window_days(30), &CancellationToken::new())
//!         .await?;
//!     println!("{} dead rules", report.findings.dead_rules.len());
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`audit`] - Run orchestration
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mailbox connector trait and the Gmail implementation
//! - [`export`] - gmailctl export format and loaders
//! - [`rules`] / [`matcher`] - Filter compilation and header matching
//! - [`replay`] / [`findings`] - Replay and the lint findings derived from it
//! - [`ranking`] - Sender and list rankings, snippet suggestions
//! - [`report`] / [`lint`] - Output shapes

pub mod audit;
pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod findings;
pub mod lint;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod ranking;
pub mod rate_limiter;
pub mod replay;
pub mod report;
pub mod rules;

pub use error::{AuditError, GmailError, Result};

pub use audit::{AuditOptions, AuditService};
pub use client::{MailboxClient, ProductionGmailClient};
pub use config::Config;
pub use export::{ExportLoader, FileExportLoader, FilterExport, GmailctlRunner};
pub use findings::{Conflict, Findings, RuleFinding};
pub use lint::LintReport;
pub use models::{LabelCatalog, LabelId, ListPage, MessageId, MessageMetadata, ModifyOps};
pub use rate_limiter::{Limiter, TokenBucket};
pub use report::{Report, Suggestions};
pub use rules::{CompiledRule, Evaluation, NonEvaluableReason};
