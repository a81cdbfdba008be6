//! Site configuration.
//!
//! Loaded from TOML; every field defaults to the values of the deployed
//! site, so an empty document (or no document at all) is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error loading a configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Longest accepted background-sync retry delay (one week).
pub const MAX_RETRY_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

// ── Data models ──────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteConfig {
    /// The site's own origin; relative request paths resolve against it.
    pub origin: String,
    /// Cross-origin hosts the service worker still intercepts (fonts, CDN).
    pub external_hosts: Vec<String>,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub submit: SubmitConfig,
    pub notifications: NotificationConfig,
    pub announcements: AnnouncementConfig,
    pub motion: MotionConfig,
}

/// How installation treats a manifest entry that fails to fetch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallPolicy {
    /// Cache whatever succeeded, log what did not.
    #[serde(rename = "best-effort")]
    BestEffort,
    /// Any failure leaves the static partition empty.
    #[serde(rename = "all-or-nothing")]
    AllOrNothing,
}

impl std::fmt::Display for InstallPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallPolicy::BestEffort => write!(f, "best-effort"),
            InstallPolicy::AllOrNothing => write!(f, "all-or-nothing"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub static_name: String,
    pub dynamic_name: String,
    /// Resources fetched into the static partition at install time.
    pub manifest: Vec<String>,
    /// Served for failed top-level navigations. Must appear in `manifest`.
    pub offline_document: String,
    pub install_policy: InstallPolicy,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub draft_key: String,
    pub queue_key: String,
    pub announcement_key: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub tag: String,
    pub max_retries: u32,
    pub retry_delays_secs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubmitConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    pub toast_lifetime_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnouncementConfig {
    pub rotation_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub endpoint: String,
    pub health_endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────

const STATIC_FILES: &[&str] = &[
    "/",
    "/index.html",
    "/about.html",
    "/achievements.html",
    "/events.html",
    "/register.html",
    "/styles.css",
    "/js/app.js",
    "/js/animations.js",
    "/js/interactive.js",
    "/include.js",
    "/components/header.html",
    "/components/footer.html",
    "/nsudc-logo.png",
    "/nsu-logo-small.png",
    "/data/social.json",
    "/data/announcements.json",
    "/offline.html",
    "https://cdn.tailwindcss.com/3.3.0",
    "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700;800&family=Poppins:wght@300;400;500;600;700;800&display=swap",
];

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            external_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "cdn.tailwindcss.com".to_string(),
            ],
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
            submit: SubmitConfig::default(),
            notifications: NotificationConfig::default(),
            announcements: AnnouncementConfig::default(),
            motion: MotionConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            static_name: "nsudc-static-v1".to_string(),
            dynamic_name: "nsudc-dynamic-v1".to_string(),
            manifest: STATIC_FILES.iter().map(|s| s.to_string()).collect(),
            offline_document: "/offline.html".to_string(),
            install_policy: InstallPolicy::BestEffort,
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            draft_key: "nsudc:registration-draft".to_string(),
            queue_key: "nsudc:pending-submissions".to_string(),
            announcement_key: "nsudc:last-announcement-id".to_string(),
            max_bytes: crate::web_storage::DEFAULT_MAX_STORAGE_SIZE,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: "background-sync".to_string(),
            max_retries: 3,
            retry_delays_secs: vec![30, 60, 300],
        }
    }
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/nsudc-logo.png".to_string(),
            badge: "/nsudc-logo.png".to_string(),
            toast_lifetime_ms: 4000,
        }
    }
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            rotation_interval_ms: 8000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            endpoint: "/api/generate-motion".to_string(),
            health_endpoint: "/api/health".to_string(),
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────────

impl SiteConfig {
    /// Parse a config from a TOML file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secs) = self
            .sync
            .retry_delays_secs
            .iter()
            .find(|s| **s > MAX_RETRY_DELAY_SECS)
        {
            return Err(ConfigError::Invalid(format!(
                "sync.retry_delays_secs entry {secs} exceeds {MAX_RETRY_DELAY_SECS}"
            )));
        }
        Ok(())
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = SiteConfig::from_toml_str("").unwrap();
        assert_eq!(config, SiteConfig::default());
    }

    #[test]
    fn defaults_match_deployed_site() {
        let config = SiteConfig::default();
        assert_eq!(config.cache.static_name, "nsudc-static-v1");
        assert_eq!(config.cache.dynamic_name, "nsudc-dynamic-v1");
        assert_eq!(config.sync.tag, "background-sync");
        assert!(config
            .cache
            .manifest
            .contains(&config.cache.offline_document));
        assert_eq!(config.cache.install_policy, InstallPolicy::BestEffort);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let toml = r#"
            origin = "https://nsudc.example"

            [cache]
            static_name = "nsudc-static-v2"
            install_policy = "all-or-nothing"

            [submit]
            timeout_secs = 5
        "#;
        let config = SiteConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.origin, "https://nsudc.example");
        assert_eq!(config.cache.static_name, "nsudc-static-v2");
        assert_eq!(config.cache.dynamic_name, "nsudc-dynamic-v1");
        assert_eq!(config.cache.install_policy, InstallPolicy::AllOrNothing);
        assert_eq!(config.submit_timeout(), Duration::from_secs(5));
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = SiteConfig::from_toml_str("origin = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn oversized_retry_delay_is_rejected() {
        let err = SiteConfig::from_toml_str("[sync]\nretry_delays_secs = [30, 9999999999]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(SiteConfig::from_toml_str("[sync]\nretry_delays_secs = [604800]\n").is_ok());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        std::fs::write(&path, "[sync]\ntag = \"outbox\"\n").unwrap();
        let config = SiteConfig::load(&path).unwrap();
        assert_eq!(config.sync.tag, "outbox");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SiteConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
