//! Audit orchestration: sample the mailbox, rank it, replay the filters

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::MailboxClient;
use crate::error::{AuditError, ClientResult, Result};
use crate::export::ExportLoader;
use crate::findings::{self, Findings};
use crate::models::{LabelCatalog, MessageId, MessageMetadata, DEFAULT_HEADERS};
use crate::rate_limiter::Limiter;
use crate::ranking;
use crate::replay;
use crate::report::Report;
use crate::rules;

pub const DEFAULT_TOP_N: usize = 20;
/// Gmail's ceiling for `messages.list` page size
pub const MAX_PAGE_SIZE: u32 = 500;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Per-run parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Lookback window; must be non-zero
    pub window: Duration,
    /// Rows kept per ranking table; 0 selects the default
    pub top_n: usize,
    /// Listing page size; 0 or anything above 500 selects 500
    pub page_size: u32,
    /// Headers fetched per message; empty selects the defaults
    pub headers: Vec<String>,
}

impl AuditOptions {
    pub fn with_window_days(days: u32) -> Self {
        Self {
            window: Duration::from_secs(u64::from(days) * SECONDS_PER_DAY),
            ..Default::default()
        }
    }

    fn resolved(&self) -> Result<ResolvedOptions> {
        if self.window.is_zero() {
            return Err(AuditError::Config("window must be positive".to_string()));
        }
        Ok(ResolvedOptions {
            window: self.window,
            top_n: if self.top_n == 0 { DEFAULT_TOP_N } else { self.top_n },
            page_size: if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
                MAX_PAGE_SIZE
            } else {
                self.page_size
            },
            headers: if self.headers.is_empty() {
                DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect()
            } else {
                self.headers.clone()
            },
        })
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * SECONDS_PER_DAY),
            top_n: DEFAULT_TOP_N,
            page_size: MAX_PAGE_SIZE,
            headers: Vec::new(),
        }
    }
}

struct ResolvedOptions {
    window: Duration,
    top_n: usize,
    page_size: u32,
    headers: Vec<String>,
}

/// Gmail search query covering the window, rounded up to whole days
pub fn window_query(window: Duration) -> String {
    let secs = window.as_secs();
    let partial_day = secs % SECONDS_PER_DAY != 0 || window.subsec_nanos() > 0;
    let days = (secs / SECONDS_PER_DAY + u64::from(partial_day)).max(1);
    format!("newer_than:{}d", days)
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs audits against one mailbox
///
/// Holds only collaborators; everything derived during a run is passed
/// explicitly and discarded with it.
pub struct AuditService {
    client: Box<dyn MailboxClient>,
    limiter: Option<Box<dyn Limiter>>,
    loader: Option<Box<dyn ExportLoader>>,
    clock: Clock,
}

impl AuditService {
    pub fn new(client: Box<dyn MailboxClient>) -> Self {
        Self {
            client,
            limiter: None,
            loader: None,
            clock: Box::new(Utc::now),
        }
    }

    /// Pace every list and metadata call through `limiter`
    pub fn with_limiter(mut self, limiter: Box<dyn Limiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Replay the filters produced by `loader`
    pub fn with_loader(mut self, loader: Box<dyn ExportLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Produce a full report for the window
    ///
    /// Any failure aborts the run; a partial report is never returned.
    pub async fn run(&self, options: &AuditOptions, cancel: &CancellationToken) -> Result<Report> {
        let options = options.resolved()?;
        info!(window_secs = options.window.as_secs(), "Running audit");

        let catalog = cancellable(cancel, "list labels", self.client.list_labels()).await?;
        debug!(labels = catalog.len(), "Fetched label catalog");

        let messages = self.fetch_sample(&options, cancel).await?;
        info!(messages = messages.len(), "Fetched message sample");

        let mut report = Report {
            generated_at: (self.clock)(),
            window: options.window,
            total: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }

        let (top_senders, top_lists) = ranking::build_rankings(&messages, options.top_n);
        report.suggestions.archive_rules = ranking::build_archive_rules(&top_lists, &top_senders);
        report.coverage = ranking::build_coverage(&messages, &catalog);
        report.top_senders = top_senders;
        report.top_lists = top_lists;

        let findings = self.analyze_filters(&messages, &catalog, cancel).await?;
        report.suggestions.remove_rules = findings.dead_rules.clone();
        report.suggestions.smells = findings.conflicts.clone();
        report.findings = findings;

        Ok(report)
    }

    async fn fetch_sample(
        &self,
        options: &ResolvedOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageMetadata>> {
        let query = window_query(options.window);
        let mut messages = Vec::new();
        let mut page_token = String::new();

        loop {
            self.wait(cancel, "rate limit messages").await?;
            let page = cancellable(
                cancel,
                "list messages",
                self.client.list_messages(&query, &page_token, options.page_size),
            )
            .await?;
            debug!(ids = page.ids.len(), "Listed page");

            for id in &page.ids {
                messages.push(self.fetch_metadata(id, &options.headers, cancel).await?);
            }

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        Ok(messages)
    }

    async fn fetch_metadata(
        &self,
        id: &MessageId,
        headers: &[String],
        cancel: &CancellationToken,
    ) -> Result<MessageMetadata> {
        self.wait(cancel, "rate limit metadata").await?;
        let operation = format!("get metadata {}", id);
        cancellable(cancel, &operation, self.client.get_metadata(id, headers)).await
    }

    async fn analyze_filters(
        &self,
        messages: &[MessageMetadata],
        catalog: &LabelCatalog,
        cancel: &CancellationToken,
    ) -> Result<Findings> {
        let Some(loader) = self.loader.as_ref() else {
            return Ok(Findings::default());
        };

        let export = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AuditError::Cancelled("load gmailctl filters".to_string()));
            }
            export = loader.export_filters() => export?,
        };

        let compiled = rules::compile_rules(&export, catalog);
        let evaluable = compiled.iter().filter(|r| r.evaluation.is_evaluable()).count();
        debug!(rules = compiled.len(), evaluable, "Compiled gmailctl filters");
        if compiled.is_empty() {
            return Ok(Findings::default());
        }

        let replay = replay::evaluate(&compiled, messages);
        let findings = findings::analyze(&compiled, &replay, catalog);
        info!(
            dead = findings.dead_rules.len(),
            missing_labels = findings.missing_labels.len(),
            conflicts = findings.conflicts.len(),
            "Replayed gmailctl filters"
        );
        Ok(findings)
    }

    async fn wait(&self, cancel: &CancellationToken, operation: &str) -> Result<()> {
        match self.limiter.as_ref() {
            Some(limiter) => limiter.wait(cancel).await.map_err(|e| match e {
                AuditError::Cancelled(_) => AuditError::Cancelled(operation.to_string()),
                other => other,
            }),
            None if cancel.is_cancelled() => Err(AuditError::Cancelled(operation.to_string())),
            None => Ok(()),
        }
    }
}

/// Race a connector call against cancellation
async fn cancellable<T, Fut>(cancel: &CancellationToken, operation: &str, call: Fut) -> Result<T>
where
    Fut: Future<Output = ClientResult<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AuditError::Cancelled(operation.to_string())),
        result = call => result.map_err(|e| AuditError::fetch(operation, e)),
    }
}
