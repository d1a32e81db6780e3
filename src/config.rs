use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::{AuditOptions, MAX_PAGE_SIZE};
use crate::error::{AuditError, Result};
use crate::lint::ALL_FAIL_ON;
use crate::models::DEFAULT_HEADERS;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub lint: LintConfig,
    #[serde(default)]
    pub gmailctl: GmailctlConfig,
    #[serde(default)]
    pub rate: RateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditConfig {
    #[serde(default = "default_audit_window_days")]
    pub window_days: u32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_headers")]
    pub headers: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            window_days: default_audit_window_days(),
            top_n: default_top_n(),
            page_size: default_page_size(),
            headers: default_headers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LintConfig {
    #[serde(default = "default_lint_window_days")]
    pub window_days: u32,
    #[serde(default = "default_fail_on")]
    pub fail_on: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            window_days: default_lint_window_days(),
            fail_on: default_fail_on(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GmailctlConfig {
    /// Replay filters at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Passed to `gmailctl --config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    /// Pre-compiled export; used instead of running the binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file: Option<PathBuf>,
}

impl Default for GmailctlConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            binary: default_binary(),
            config_dir: None,
            export_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

fn default_audit_window_days() -> u32 {
    60
}

fn default_lint_window_days() -> u32 {
    30
}

fn default_top_n() -> usize {
    30
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_headers() -> Vec<String> {
    DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect()
}

fn default_fail_on() -> Vec<String> {
    ALL_FAIL_ON.iter().map(|t| t.to_string()).collect()
}

fn default_enabled() -> bool {
    true
}

fn default_binary() -> String {
    "gmailctl".to_string()
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst() -> u32 {
    10
}

const MAX_WINDOW_DAYS: u32 = 365;
/// Gmail allows 250 quota units per user per second
const MAX_REQUESTS_PER_SECOND: u32 = 250;

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AuditError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AuditError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuditError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AuditError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| AuditError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (field, days) in [
            ("audit.window_days", self.audit.window_days),
            ("lint.window_days", self.lint.window_days),
        ] {
            if days == 0 {
                return Err(AuditError::Config(format!("{} must be at least 1", field)));
            }
            if days > MAX_WINDOW_DAYS {
                return Err(AuditError::Config(format!(
                    "{} cannot exceed {} (1 year)",
                    field, MAX_WINDOW_DAYS
                )));
            }
        }

        if self.audit.top_n == 0 {
            return Err(AuditError::Config(
                "audit.top_n must be greater than 0".to_string(),
            ));
        }

        if self.audit.page_size == 0 || self.audit.page_size > MAX_PAGE_SIZE {
            return Err(AuditError::Config(format!(
                "audit.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.audit.headers.iter().any(|h| h.trim().is_empty()) {
            return Err(AuditError::Config(
                "audit.headers cannot contain empty strings".to_string(),
            ));
        }

        for token in &self.lint.fail_on {
            let canonical = token.trim().to_lowercase();
            if !ALL_FAIL_ON.contains(&canonical.as_str()) {
                return Err(AuditError::Config(format!(
                    "Invalid lint.fail_on entry: '{}'. Must be one of {}",
                    token,
                    ALL_FAIL_ON.join(", ")
                )));
            }
        }

        if self.gmailctl.enabled
            && self.gmailctl.export_file.is_none()
            && self.gmailctl.binary.trim().is_empty()
        {
            return Err(AuditError::Config(
                "gmailctl.binary cannot be empty when gmailctl is enabled".to_string(),
            ));
        }

        if self.rate.requests_per_second == 0
            || self.rate.requests_per_second > MAX_REQUESTS_PER_SECOND
        {
            return Err(AuditError::Config(format!(
                "rate.requests_per_second must be between 1 and {}",
                MAX_REQUESTS_PER_SECOND
            )));
        }
        if self.rate.burst == 0 {
            return Err(AuditError::Config(
                "rate.burst must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }

    /// Audit options for `days`, falling back to `[audit]`
    pub fn audit_options(&self, days: Option<u32>, top_n: Option<usize>) -> AuditOptions {
        AuditOptions {
            window: days_to_window(days.unwrap_or(self.audit.window_days)),
            top_n: top_n.unwrap_or(self.audit.top_n),
            page_size: self.audit.page_size,
            headers: self.audit.headers.clone(),
        }
    }

    /// Lint runs share the audit sampling settings with their own window
    pub fn lint_options(&self, days: Option<u32>) -> AuditOptions {
        AuditOptions {
            window: days_to_window(days.unwrap_or(self.lint.window_days)),
            ..self.audit_options(None, None)
        }
    }
}

fn days_to_window(days: u32) -> Duration {
    Duration::from_secs(u64::from(days) * 24 * 60 * 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audit.window_days, 60);
        assert_eq!(config.audit.top_n, 30);
        assert_eq!(config.audit.page_size, 500);
        assert_eq!(config.audit.headers.len(), 6);
        assert_eq!(config.lint.window_days, 30);
        assert_eq!(config.lint.fail_on, vec!["dead", "conflict", "missing-label"]);
        assert!(config.gmailctl.enabled);
        assert_eq!(config.gmailctl.binary, "gmailctl");
        assert_eq!(config.rate.requests_per_second, 10);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/gmail-audit.toml"))
            .await
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[audit]
window_days = 14

[gmailctl]
config_dir = "/home/me/.gmailctl"
"#
        )
        .unwrap();

        let config = Config::load(temp_file.path()).await.unwrap();
        assert_eq!(config.audit.window_days, 14);
        assert_eq!(config.audit.top_n, 30);
        assert_eq!(
            config.gmailctl.config_dir,
            Some(PathBuf::from("/home/me/.gmailctl"))
        );
        assert_eq!(config.lint, LintConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_values_rejected_on_load() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[lint]\nfail_on = [\"dead\", \"typo\"]").unwrap();

        let err = Config::load(temp_file.path()).await.unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
        assert!(err.to_string().contains("typo"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.audit.window_days = 0;
        assert!(config.validate().unwrap_err().to_string().contains("audit.window_days"));

        let mut config = Config::default();
        config.lint.window_days = 366;
        assert!(config.validate().unwrap_err().to_string().contains("365"));

        let mut config = Config::default();
        config.audit.page_size = 501;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rate.requests_per_second = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gmailctl.binary = " ".into();
        assert!(config.validate().is_err());
        config.gmailctl.export_file = Some(PathBuf::from("export.json"));
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_create_example_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gmail-audit.toml");

        Config::create_example(&path).await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_in_options() {
        let config = Config::default();

        let audit = config.audit_options(Some(7), None);
        assert_eq!(audit.window, Duration::from_secs(7 * 86_400));
        assert_eq!(audit.top_n, 30);

        let lint = config.lint_options(None);
        assert_eq!(lint.window, Duration::from_secs(30 * 86_400));
        assert_eq!(lint.page_size, 500);
    }
}
