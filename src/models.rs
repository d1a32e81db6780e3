use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Headers fetched for every sampled message when none are configured
pub const DEFAULT_HEADERS: [&str; 6] = [
    "From",
    "To",
    "Subject",
    "List-Id",
    "Auto-Submitted",
    "Precedence",
];

/// Opaque Gmail message identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// Opaque Gmail label identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl LabelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId(value)
    }
}

impl From<&str> for LabelId {
    fn from(value: &str) -> Self {
        LabelId(value.to_string())
    }
}

impl From<String> for LabelId {
    fn from(value: String) -> Self {
        LabelId(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header snapshot of one sampled message
///
/// Only the requested header subset is retained. Header names are looked up
/// case-insensitively; a header Gmail did not return reads as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub id: MessageId,
    pub label_ids: Vec<LabelId>,
    pub headers: HashMap<String, String>,
}

impl MessageMetadata {
    pub fn new(id: impl Into<MessageId>) -> Self {
        Self {
            id: id.into(),
            label_ids: Vec::new(),
            headers: HashMap::new(),
        }
    }

    /// Builder-style helper used by fixtures and the connector
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LabelId>,
    {
        self.label_ids = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive header lookup, empty when absent
    pub fn header(&self, name: &str) -> &str {
        if let Some(value) = self.headers.get(name) {
            return value;
        }
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }
}

/// Snapshot of the live Gmail label catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCatalog {
    pub by_name: HashMap<String, LabelId>,
    pub by_id: HashMap<LabelId, String>,
}

impl LabelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a label; entries with an empty id or name are ignored
    pub fn insert(&mut self, id: impl Into<LabelId>, name: impl Into<String>) {
        let id = id.into();
        let name = name.into();
        if id.0.is_empty() || name.is_empty() {
            return;
        }
        self.by_name.insert(name.clone(), id.clone());
        self.by_id.insert(id, name);
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn name_of(&self, id: &LabelId) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl<I, S> FromIterator<(I, S)> for LabelCatalog
where
    I: Into<LabelId>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (I, S)>>(iter: T) -> Self {
        let mut catalog = LabelCatalog::new();
        for (id, name) in iter {
            catalog.insert(id, name);
        }
        catalog
    }
}

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub ids: Vec<MessageId>,
    /// Empty when there are no further pages
    pub next_page_token: String,
}

/// Label mutation applied by `batch_modify`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyOps {
    pub add_label_ids: Vec<LabelId>,
    pub remove_label_ids: Vec<LabelId>,
}

impl ModifyOps {
    pub fn is_empty(&self) -> bool {
        self.add_label_ids.is_empty() && self.remove_label_ids.is_empty()
    }
}
