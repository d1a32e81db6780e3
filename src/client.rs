//! Gmail mailbox connector with request timeouts and retry logic

use async_trait::async_trait;
use google_gmail1::api::{BatchModifyMessagesRequest, Label, Message};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, MODIFY_SCOPES, READONLY_SCOPES};
use crate::error::{ClientResult, GmailError};
use crate::models::{LabelCatalog, LabelId, ListPage, MessageId, MessageMetadata, ModifyOps};

/// Gmail caps `messages.batchModify` at 1000 ids per request
const BATCH_MODIFY_CHUNK: usize = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// Mailbox operations the audit consumes
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// One page of message ids matching a Gmail search query
    ///
    /// An empty `page_token` requests the first page.
    async fn list_messages(
        &self,
        query: &str,
        page_token: &str,
        page_size: u32,
    ) -> ClientResult<ListPage>;

    /// Label ids and the requested headers of one message
    async fn get_metadata(
        &self,
        id: &MessageId,
        headers: &[String],
    ) -> ClientResult<MessageMetadata>;

    /// Snapshot of the live label catalog
    async fn list_labels(&self) -> ClientResult<LabelCatalog>;

    /// Create a user label and return its id
    ///
    /// Needs a hub authorized with `MODIFY_SCOPES`.
    async fn create_label(&self, name: &str) -> ClientResult<LabelId>;

    /// Apply label mutations to many messages, returning how many were sent
    ///
    /// Needs a hub authorized with `MODIFY_SCOPES`; `cli::connect` asks for read-only.
    async fn batch_modify(&self, ids: &[MessageId], ops: &ModifyOps) -> ClientResult<usize>;
}

#[async_trait]
impl<C: MailboxClient + ?Sized> MailboxClient for Arc<C> {
    async fn list_messages(
        &self,
        query: &str,
        page_token: &str,
        page_size: u32,
    ) -> ClientResult<ListPage> {
        (**self).list_messages(query, page_token, page_size).await
    }

    async fn get_metadata(
        &self,
        id: &MessageId,
        headers: &[String],
    ) -> ClientResult<MessageMetadata> {
        (**self).get_metadata(id, headers).await
    }

    async fn list_labels(&self) -> ClientResult<LabelCatalog> {
        (**self).list_labels().await
    }

    async fn create_label(&self, name: &str) -> ClientResult<LabelId> {
        (**self).create_label(name).await
    }

    async fn batch_modify(&self, ids: &[MessageId], ops: &ModifyOps) -> ClientResult<usize> {
        (**self).batch_modify(ids, ops).await
    }
}

/// Production connector over `google-gmail1`
///
/// Every call is bounded by a 30s timeout and retried with exponential
/// backoff on transient failures. Pacing is left to the caller's limiter.
pub struct ProductionGmailClient {
    hub: GmailHub,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self { hub }
    }

    /// Email address of the authenticated account
    pub async fn profile_email(&self) -> ClientResult<String> {
        Self::with_retry("get_profile", MAX_RETRIES, || async {
            let call = self
                .hub
                .users()
                .get_profile("me")
                .add_scope(READONLY_SCOPES[0])
                .doit();
            let (_, profile) = with_timeout("get_profile", call).await?;
            profile
                .email_address
                .ok_or_else(|| GmailError::ApiError("Profile has no email address".to_string()))
        })
        .await
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    // Honour the server's Retry-After when it asks for longer
                    let wait = match &e {
                        GmailError::RateLimitExceeded { retry_after } => {
                            delay.max(Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Bound a hub call by the request timeout, mapping API errors
async fn with_timeout<T, Fut>(operation_name: &str, call: Fut) -> ClientResult<T>
where
    Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
{
    match tokio::time::timeout(REQUEST_TIMEOUT, call).await {
        Ok(result) => result.map_err(GmailError::from),
        Err(_) => {
            warn!("Gmail API {} call timed out after {:?}", operation_name, REQUEST_TIMEOUT);
            Err(GmailError::NetworkError(format!(
                "API call timed out after {:?}",
                REQUEST_TIMEOUT
            )))
        }
    }
}

/// Convert a Gmail API message into a header snapshot
fn parse_message_metadata(msg: Message) -> ClientResult<MessageMetadata> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let headers: HashMap<String, String> = msg
        .payload
        .and_then(|payload| payload.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        })
        .collect();

    Ok(MessageMetadata {
        id: MessageId(id),
        label_ids: msg
            .label_ids
            .unwrap_or_default()
            .into_iter()
            .map(LabelId)
            .collect(),
        headers,
    })
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn list_messages(
        &self,
        query: &str,
        page_token: &str,
        page_size: u32,
    ) -> ClientResult<ListPage> {
        Self::with_retry("list_messages", MAX_RETRIES, || async {
            let mut call = self
                .hub
                .users()
                .messages_list("me")
                .q(query)
                .max_results(page_size);

            if !page_token.is_empty() {
                call = call.page_token(page_token);
            }

            let (_, response) =
                with_timeout("list_messages", call.add_scope(READONLY_SCOPES[0]).doit()).await?;

            let ids: Vec<MessageId> = response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|msg_ref| msg_ref.id.map(MessageId))
                .collect();
            debug!(count = ids.len(), "Listed message page");

            Ok(ListPage {
                ids,
                next_page_token: response.next_page_token.unwrap_or_default(),
            })
        })
        .await
    }

    async fn get_metadata(
        &self,
        id: &MessageId,
        headers: &[String],
    ) -> ClientResult<MessageMetadata> {
        let operation = format!("get_metadata {}", id);
        Self::with_retry(&operation, MAX_RETRIES, || async {
            let mut call = self
                .hub
                .users()
                .messages_get("me", id.as_str())
                .format("metadata");
            for header in headers {
                call = call.add_metadata_headers(header);
            }

            let (_, msg) =
                with_timeout("get_metadata", call.add_scope(READONLY_SCOPES[0]).doit()).await?;
            parse_message_metadata(msg)
        })
        .await
    }

    async fn list_labels(&self) -> ClientResult<LabelCatalog> {
        Self::with_retry("list_labels", MAX_RETRIES, || async {
            debug!("Calling Gmail API to list labels...");
            let call = self
                .hub
                .users()
                .labels_list("me")
                .add_scope(READONLY_SCOPES[0])
                .doit();
            let (_, response) = with_timeout("list_labels", call).await?;

            let catalog: LabelCatalog = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some((id, name)),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", catalog.len());
            Ok(catalog)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> ClientResult<LabelId> {
        Self::with_retry("create_label", MAX_RETRIES, || async {
            let label = Label {
                name: Some(name.to_string()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let call = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope(MODIFY_SCOPES[0])
                .doit();
            let (_, created) = with_timeout("create_label", call).await?;

            created.id.map(LabelId).ok_or_else(|| {
                GmailError::LabelError(format!("Created label {} has no id", name))
            })
        })
        .await
    }

    async fn batch_modify(&self, ids: &[MessageId], ops: &ModifyOps) -> ClientResult<usize> {
        if ids.is_empty() || ops.is_empty() {
            return Ok(0);
        }

        let to_strings = |labels: &[LabelId]| -> Option<Vec<String>> {
            (!labels.is_empty()).then(|| labels.iter().map(|l| l.0.clone()).collect())
        };
        let add_label_ids = to_strings(&ops.add_label_ids);
        let remove_label_ids = to_strings(&ops.remove_label_ids);

        let mut total_modified = 0;
        for chunk in ids.chunks(BATCH_MODIFY_CHUNK) {
            let chunk_ids: Vec<String> = chunk.iter().map(|id| id.0.clone()).collect();

            Self::with_retry("batch_modify", MAX_RETRIES, || async {
                let request = BatchModifyMessagesRequest {
                    ids: Some(chunk_ids.clone()),
                    add_label_ids: add_label_ids.clone(),
                    remove_label_ids: remove_label_ids.clone(),
                };

                let call = self
                    .hub
                    .users()
                    .messages_batch_modify(request, "me")
                    .add_scope(MODIFY_SCOPES[0])
                    .doit();
                with_timeout("batch_modify", call).await?;
                Ok(())
            })
            .await?;

            total_modified += chunk.len();
        }

        Ok(total_modified)
    }
}
