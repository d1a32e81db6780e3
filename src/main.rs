use anyhow::Result;
use clap::Parser;
use gmail_audit::cli::{self, Cli, Commands, ProgressReporter};
use gmail_audit::config::Config;
use gmail_audit::error::{AuditError, GmailError};
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Buffers one log event and writes it to stderr with the spinner suspended
#[derive(Clone)]
struct MultiProgressWriter {
    multi: MultiProgress,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if buffer.is_empty() {
            return Ok(());
        }
        let result = self
            .multi
            .suspend(|| std::io::stderr().lock().write_all(&buffer));
        buffer.clear();
        result
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: MultiProgress,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(self.multi.clone())
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => process::exit(code),
        Err(e) => {
            display_error(&e);
            eprintln!("\nFor help, run: gmail-audit --help");
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    // aws-lc-rs needs NASM/CMake on Windows, so ring is used there
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_audit=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_audit=info"))
    };

    let multi = MultiProgress::new();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(MultiProgressMakeWriter {
            multi: multi.clone(),
        })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let progress = ProgressReporter::new(multi);

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            let email = cli::run_auth(&cli, *force).await?;
            println!("Authenticated as {}", email);
            println!("Token cached at {}", cli.token_cache.display());
            Ok(0)
        }

        Commands::Audit(args) => {
            let config = Config::load(&cli.config).await?;
            cli::run_audit(&cli, &config, &progress, args, &cancel).await?;
            Ok(0)
        }

        Commands::Lint { days, fail_on } => {
            let config = Config::load(&cli.config).await?;
            let failed =
                cli::run_lint(&cli, &config, &progress, *days, fail_on.as_deref(), &cancel).await?;
            Ok(if failed { 1 } else { 0 })
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !*force {
                anyhow::bail!(
                    "{} already exists; pass --force to overwrite",
                    output.display()
                );
            }
            Config::create_example(output).await?;
            println!("Wrote default configuration to {}", output.display());
            Ok(0)
        }
    }
}

fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    let gmail_err = match error.downcast_ref::<AuditError>() {
        Some(AuditError::Config(_)) => {
            eprintln!("\nHint: Check your configuration file for errors.");
            eprintln!("      Run: gmail-audit init-config --force");
            return;
        }
        Some(AuditError::Export(_)) => {
            eprintln!("\nHint: Make sure gmailctl is installed and `gmailctl compile` succeeds.");
            eprintln!("      Or set gmailctl.export_file to a pre-compiled export.");
            return;
        }
        Some(AuditError::Fetch { source, .. }) => Some(source),
        _ => error.downcast_ref::<GmailError>(),
    };

    match gmail_err {
        Some(GmailError::AuthError(_)) => {
            eprintln!("\nHint: Make sure your credentials.json file is valid.");
            eprintln!("      You can download it from Google Cloud Console.");
            eprintln!("      Try running: gmail-audit auth --force");
        }
        Some(GmailError::RateLimitExceeded { .. }) => {
            eprintln!("\nHint: You've hit Gmail API rate limits.");
            eprintln!("      Consider lowering rate.requests_per_second in config.");
        }
        Some(GmailError::ApiError(_)) | Some(GmailError::ServerError { .. }) => {
            eprintln!("\nHint: This may be a temporary API error.");
            eprintln!("      Try running the command again.");
        }
        _ => {}
    }
}
