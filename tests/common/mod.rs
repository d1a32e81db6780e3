//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gmail_audit::client::MailboxClient;
use gmail_audit::error::{AuditError, ClientResult, GmailError, Result};
use gmail_audit::export::{ExportLoader, Filter, FilterAction, FilterCriteria, FilterExport, Label};
use gmail_audit::models::{LabelCatalog, LabelId, ListPage, MessageId, MessageMetadata, ModifyOps};
use mockall::mock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Create a test message with the headers the engine reads
pub fn create_test_message(id: &str, from: &str, subject: &str) -> MessageMetadata {
    MessageMetadata::new(id)
        .with_header("From", from)
        .with_header("To", "me@example.com")
        .with_header("Subject", subject)
}

/// Create a mailing list message
pub fn create_list_message(id: &str, from: &str, subject: &str, list_id: &str) -> MessageMetadata {
    create_test_message(id, from, subject).with_header("List-Id", list_id)
}

/// Three messages: two alerts on a list labelled bulk, one personal note
pub fn basic_mailbox() -> Vec<MessageMetadata> {
    vec![
        create_list_message(
            "m1",
            "Alerts <alerts@example.com>",
            "Disk usage",
            "<alerts.example.com>",
        )
        .with_labels(["Label_bulk"]),
        create_list_message(
            "m2",
            "alerts@example.com",
            "CPU usage",
            "alerts.example.com",
        )
        .with_labels(["Label_bulk", "INBOX"]),
        create_test_message("m3", "Friend <friend@other.org>", "Hello"),
    ]
}

pub fn basic_catalog() -> LabelCatalog {
    [("Label_bulk", "bulk"), ("INBOX", "INBOX")].into_iter().collect()
}

pub fn filter(name: &str, criteria: FilterCriteria, action: FilterAction) -> Filter {
    Filter {
        name: name.to_string(),
        criteria,
        action,
        ..Default::default()
    }
}

pub fn from_criteria(from: &str) -> FilterCriteria {
    FilterCriteria {
        from: from.to_string(),
        ..Default::default()
    }
}

pub fn list_criteria(list: &str) -> FilterCriteria {
    FilterCriteria {
        list: list.to_string(),
        ..Default::default()
    }
}

pub fn archive_action() -> FilterAction {
    FilterAction {
        remove_label_ids: vec!["INBOX".to_string()],
        ..Default::default()
    }
}

pub fn star_action() -> FilterAction {
    FilterAction {
        add_label_ids: vec!["STARRED".to_string()],
        ..Default::default()
    }
}

pub fn label_action(label_id: &str) -> FilterAction {
    FilterAction {
        add_label_ids: vec![label_id.to_string()],
        ..Default::default()
    }
}

/// Export exercising every finding kind against [`basic_mailbox`]
///
/// ArchiveAlerts and StarAlerts overlap on m1/m2, DeadRule matches nothing
/// and MissingLabelRule applies a label absent from the mailbox.
pub fn findings_export() -> FilterExport {
    FilterExport {
        filters: vec![
            filter("ArchiveAlerts", from_criteria("alerts@example.com"), archive_action()),
            filter("StarAlerts", list_criteria("alerts.example.com"), star_action()),
            filter("DeadRule", from_criteria("nobody@nowhere.test"), archive_action()),
            filter(
                "MissingLabelRule",
                from_criteria("friend@other.org"),
                label_action("Label_missing"),
            ),
        ],
        labels: vec![Label {
            id: "Label_missing".to_string(),
            name: "missing".to_string(),
            kind: "user".to_string(),
        }],
    }
}

// Mock implementation of MailboxClient for testing
mock! {
    pub MailboxClient {}

    #[async_trait]
    impl MailboxClient for MailboxClient {
        async fn list_messages(
            &self,
            query: &str,
            page_token: &str,
            page_size: u32,
        ) -> ClientResult<ListPage>;
        async fn get_metadata(
            &self,
            id: &MessageId,
            headers: &[String],
        ) -> ClientResult<MessageMetadata>;
        async fn list_labels(&self) -> ClientResult<LabelCatalog>;
        async fn create_label(&self, name: &str) -> ClientResult<LabelId>;
        async fn batch_modify(&self, ids: &[MessageId], ops: &ModifyOps) -> ClientResult<usize>;
    }
}

/// In-memory mailbox serving messages in fixed-size pages
///
/// Page tokens are the stringified page index. [`FakeMailbox::with_pages`]
/// scripts a listing exactly.
#[derive(Default)]
pub struct FakeMailbox {
    messages: HashMap<MessageId, MessageMetadata>,
    pages: Vec<ListPage>,
    catalog: LabelCatalog,
    pub list_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl FakeMailbox {
    /// Serve `messages` in pages of `page_size`
    pub fn new(messages: Vec<MessageMetadata>, catalog: LabelCatalog, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let ids: Vec<MessageId> = messages.iter().map(|m| m.id.clone()).collect();
        let chunks: Vec<&[MessageId]> = ids.chunks(page_size).collect();
        let pages = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| ListPage {
                ids: chunk.to_vec(),
                next_page_token: if i + 1 < chunks.len() {
                    (i + 1).to_string()
                } else {
                    String::new()
                },
            })
            .collect();

        Self {
            messages: messages.into_iter().map(|m| (m.id.clone(), m)).collect(),
            pages,
            catalog,
            ..Default::default()
        }
    }

    /// Replace the listing with explicit pages; tokens index into `pages`
    pub fn with_pages(mut self, pages: Vec<ListPage>) -> Self {
        self.pages = pages;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_messages(
        &self,
        query: &str,
        page_token: &str,
        _page_size: u32,
    ) -> ClientResult<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let index = if page_token.is_empty() {
            0
        } else {
            page_token
                .parse::<usize>()
                .map_err(|_| GmailError::BadRequest(format!("bad page token {page_token}")))?
        };
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }

    async fn get_metadata(
        &self,
        id: &MessageId,
        _headers: &[String],
    ) -> ClientResult<MessageMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| GmailError::NotFound(id.to_string()))
    }

    async fn list_labels(&self) -> ClientResult<LabelCatalog> {
        Ok(self.catalog.clone())
    }

    async fn create_label(&self, name: &str) -> ClientResult<LabelId> {
        Ok(LabelId::from(format!("Label_{name}")))
    }

    async fn batch_modify(&self, ids: &[MessageId], _ops: &ModifyOps) -> ClientResult<usize> {
        Ok(ids.len())
    }
}

/// Loader returning a fixed export and counting invocations
#[derive(Clone, Default)]
pub struct StubLoader {
    export: Option<FilterExport>,
    pub calls: Arc<AtomicUsize>,
}

impl StubLoader {
    pub fn new(export: FilterExport) -> Self {
        Self {
            export: Some(export),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A loader whose export is always rejected
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExportLoader for StubLoader {
    async fn export_filters(&self) -> Result<FilterExport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.export
            .clone()
            .ok_or_else(|| AuditError::Export("gmailctl returned no filters or labels".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_list_message() {
        let msg = create_list_message("m1", "a@example.com", "Hi", "<l.example.com>");
        assert_eq!(msg.id.as_str(), "m1");
        assert_eq!(msg.header("list-id"), "<l.example.com>");
        assert_eq!(msg.header("subject"), "Hi");
    }

    #[tokio::test]
    async fn test_fake_mailbox_pages() {
        let fake = FakeMailbox::new(basic_mailbox(), basic_catalog(), 2);
        let first = fake.list_messages("q", "", 2).await.unwrap();
        assert_eq!(first.ids.len(), 2);
        assert_eq!(first.next_page_token, "1");

        let second = fake.list_messages("q", "1", 2).await.unwrap();
        assert_eq!(second.ids.len(), 1);
        assert!(second.next_page_token.is_empty());
        assert_eq!(fake.list_calls(), 2);
    }
}
