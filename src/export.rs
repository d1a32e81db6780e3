//! gmailctl compile output and the loaders that produce it

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AuditError, Result};

/// Payload of `gmailctl compile --format=json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExport {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl FilterExport {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub criteria: FilterCriteria,
    #[serde(default)]
    pub action: FilterAction,
}

/// Subset of Gmail search predicates the engine replays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub list: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub forward: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Source of the compiled filter set replayed by an audit
#[async_trait]
pub trait ExportLoader: Send + Sync {
    async fn export_filters(&self) -> Result<FilterExport>;
}

/// Parse and validate export JSON
pub fn parse_export(bytes: &[u8]) -> Result<FilterExport> {
    let export: FilterExport = serde_json::from_slice(bytes)
        .map_err(|e| AuditError::Export(format!("decode gmailctl output: {}", e)))?;

    if export.is_empty() {
        return Err(AuditError::Export(
            "gmailctl returned no filters or labels".to_string(),
        ));
    }

    Ok(export)
}

/// Shells out to `gmailctl compile`
#[derive(Debug, Clone)]
pub struct GmailctlRunner {
    pub binary: String,
    pub config_dir: Option<PathBuf>,
}

impl GmailctlRunner {
    pub fn new(binary: impl Into<String>, config_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            config_dir,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["compile".to_string(), "--format=json".to_string()];
        if let Some(dir) = self.config_dir.as_ref() {
            let dir = dir.to_string_lossy();
            if !dir.trim().is_empty() {
                args.push("--config".to_string());
                args.push(dir.into_owned());
            }
        }
        args
    }
}

impl Default for GmailctlRunner {
    fn default() -> Self {
        Self::new("gmailctl", None)
    }
}

#[async_trait]
impl ExportLoader for GmailctlRunner {
    async fn export_filters(&self) -> Result<FilterExport> {
        let binary = if self.binary.trim().is_empty() {
            "gmailctl"
        } else {
            self.binary.as_str()
        };
        let args = self.args();
        debug!(binary, ?args, "Running gmailctl");

        let output = Command::new(binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AuditError::Export(format!("run gmailctl: {}", e)))?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(AuditError::Export(format!(
                "run gmailctl: {} (output: {})",
                output.status,
                combined.trim()
            )));
        }

        let export = parse_export(&output.stdout)?;
        info!(
            filters = export.filters.len(),
            labels = export.labels.len(),
            "Loaded gmailctl export"
        );
        Ok(export)
    }
}

/// Reads a previously compiled export from disk
#[derive(Debug, Clone)]
pub struct FileExportLoader {
    pub path: PathBuf,
}

impl FileExportLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ExportLoader for FileExportLoader {
    async fn export_filters(&self) -> Result<FilterExport> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AuditError::Export(format!("read {}: {}", self.path.display(), e))
        })?;

        let export = parse_export(&bytes)?;
        info!(
            path = %self.path.display(),
            filters = export.filters.len(),
            "Loaded export file"
        );
        Ok(export)
    }
}
