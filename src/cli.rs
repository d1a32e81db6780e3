//! Command-line interface

use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audit::AuditService;
use crate::auth::{self, READONLY_SCOPES};
use crate::client::ProductionGmailClient;
use crate::config::Config;
use crate::error::{AuditError, Result};
use crate::export::{ExportLoader, FileExportLoader, GmailctlRunner};
use crate::lint::{self, LintReport};
use crate::rate_limiter::TokenBucket;
use crate::report::{self, Report};

#[derive(Parser, Debug)]
#[command(name = "gmail-audit")]
#[command(version)]
#[command(
    about = "Replay gmailctl filters against recent mail and report dead rules, \
             missing labels and conflicts",
    long_about = None
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gmail-audit.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-audit/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API (read-only scope)
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Rank noisy senders and lists and replay gmailctl filters
    Audit(AuditArgs),

    /// Check gmailctl filters and exit non-zero on policy failures
    Lint {
        /// Lookback window in days (overrides lint.window_days)
        #[arg(long)]
        days: Option<u32>,

        /// Comma separated categories that fail the run: dead, conflict, missing-label
        #[arg(long)]
        fail_on: Option<String>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "gmail-audit.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct AuditArgs {
    /// Lookback window in days (overrides audit.window_days)
    #[arg(long)]
    pub days: Option<u32>,

    /// Rows per ranking table (overrides audit.top_n)
    #[arg(long)]
    pub top: Option<usize>,

    /// Also write the report as JSON to this relative path
    #[arg(long)]
    pub json: Option<String>,

    /// Skip gmailctl replay
    #[arg(long)]
    pub no_rules: bool,
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        self.multi.suspend(|| eprintln!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

/// Run the OAuth flow and return the authorized account
pub async fn run_auth(cli: &Cli, force: bool) -> Result<String> {
    if force && auth::clear_token_cache(&cli.token_cache).await.map_err(auth_error)? {
        info!("Removed cached token at {:?}", cli.token_cache);
    }

    let client = connect(cli).await?;
    client
        .profile_email()
        .await
        .map_err(|e| AuditError::fetch("get profile", e))
}

/// Run an audit, print it, and optionally write JSON
pub async fn run_audit(
    cli: &Cli,
    config: &Config,
    progress: &ProgressReporter,
    args: &AuditArgs,
    cancel: &CancellationToken,
) -> Result<Report> {
    let options = config.audit_options(args.days, args.top);
    let service = build_service(cli, config, !args.no_rules).await?;

    let spinner = progress.add_spinner("Sampling mailbox...");
    let result = service.run(&options, cancel).await;
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };
    progress.finish_spinner(&spinner, &format!("Sampled {} messages", report.total));

    let stdout = std::io::stdout();
    report::print_human(&report, &mut stdout.lock())?;

    if let Some(path) = args.json.as_deref() {
        let written = report::write_json(&report, path).await?;
        info!("Wrote JSON report to {:?}", written);
    }

    Ok(report)
}

/// Run the lint projection and report whether the policy fails
pub async fn run_lint(
    cli: &Cli,
    config: &Config,
    progress: &ProgressReporter,
    days: Option<u32>,
    fail_on: Option<&str>,
    cancel: &CancellationToken,
) -> Result<bool> {
    if !config.gmailctl.enabled {
        warn!("gmailctl replay is disabled in {:?}; lint has no findings to check", cli.config);
    }

    let options = config.lint_options(days);
    let tokens = match fail_on {
        Some(raw) => lint::parse_fail_on(raw),
        None => config.lint.fail_on.clone(),
    };
    let service = build_service(cli, config, true).await?;

    let spinner = progress.add_spinner("Replaying gmailctl filters...");
    let result: Result<LintReport> = service.run_lint(&options, cancel).await;
    spinner.finish_and_clear();
    let lint_report = result?;

    print!("{}", lint_report.human_summary());
    let failed = lint_report.should_fail(&tokens);
    if failed {
        warn!(fail_on = ?tokens, "Lint policy failed");
    }
    Ok(failed)
}

async fn build_service(cli: &Cli, config: &Config, with_rules: bool) -> Result<AuditService> {
    let client = connect(cli).await?;
    let limiter = TokenBucket::new(config.rate.requests_per_second, config.rate.burst);

    let mut service = AuditService::new(Box::new(client)).with_limiter(Box::new(limiter));
    if with_rules {
        if let Some(loader) = build_loader(config) {
            service = service.with_loader(loader);
        }
    }
    Ok(service)
}

/// Loader selected by `[gmailctl]`; a pre-compiled export wins over the binary
pub fn build_loader(config: &Config) -> Option<Box<dyn ExportLoader>> {
    let gmailctl = &config.gmailctl;
    if !gmailctl.enabled {
        return None;
    }
    match gmailctl.export_file.as_ref() {
        Some(path) => Some(Box::new(FileExportLoader::new(path))),
        None => Some(Box::new(GmailctlRunner::new(
            gmailctl.binary.clone(),
            gmailctl.config_dir.clone(),
        ))),
    }
}

async fn connect(cli: &Cli) -> Result<ProductionGmailClient> {
    ensure_parent_dir(&cli.token_cache).await?;
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, READONLY_SCOPES)
        .await
        .map_err(auth_error)?;
    Ok(ProductionGmailClient::new(hub))
}

fn auth_error(e: crate::error::GmailError) -> AuditError {
    AuditError::fetch("authenticate", e)
}

async fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AuditError::Config(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    Ok(())
}
