//! Configuration file parser for ~/.config/newsdesk/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::net::Connection;
use crate::sources::{Registry, Source, SourceFormat, DEFAULT_PER_PAGE, DEFAULT_SOURCE_ID};

/// Background sweeps never run more often than this.
pub const MIN_BACKGROUND_INTERVAL_MINUTES: u64 = 15;
/// ...and at least once a week.
pub const MAX_BACKGROUND_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid source '{id}': {reason}")]
    InvalidSource { id: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only fetch over wifi when refreshing interactively.
    pub wifi_only: bool,
    pub is_premium: bool,
    /// Run a batch download after an online refresh, and allow background sweeps.
    pub auto_download: bool,
    /// Batch downloads abort unless on wifi.
    pub auto_download_wifi_only: bool,
    pub auto_download_sources: Vec<String>,
    pub background_interval_minutes: u64,
    pub request_timeout_secs: u64,
    /// WordPress page size for the built-in JSON sources.
    pub per_page: u32,
    /// Store location. Defaults to `newsdesk.db` in the config directory.
    pub database_path: Option<String>,
    pub network: NetworkConfig,
    /// Extra registry entries. An entry with a built-in id replaces it.
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wifi_only: true,
            is_premium: false,
            auto_download: false,
            auto_download_wifi_only: true,
            auto_download_sources: vec![DEFAULT_SOURCE_ID.to_string()],
            background_interval_minutes: MIN_BACKGROUND_INTERVAL_MINUTES,
            request_timeout_secs: 30,
            per_page: DEFAULT_PER_PAGE,
            database_path: None,
            network: NetworkConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection to report, or the connection kind to attach to a live probe.
    pub connection: Connection,
    /// When set, reachability is probed with `HEAD` against this URL.
    pub probe_url: Option<String>,
}

/// One `[[sources]]` entry. URLs are used as given, including for JSON sources.
///
/// Without a `placeholder_image`, an entry keeps the placeholder of the source it
/// replaces, or borrows the default source's.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub urls: Vec<String>,
    pub format: SourceFormat,
    #[serde(default = "default_verify_cert")]
    pub verify_cert: bool,
    #[serde(default)]
    pub placeholder_image: Option<String>,
}

fn default_verify_cert() -> bool {
    true
}

impl SourceConfig {
    fn validate(&self, fallback_placeholder: &str) -> Result<Source, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSource {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty".to_string()));
        }
        if self.urls.is_empty() {
            return Err(invalid("no urls".to_string()));
        }
        for url in &self.urls {
            let parsed = Url::parse(url).map_err(|e| invalid(format!("{url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(format!("{url}: unsupported scheme")));
            }
        }

        let placeholder_image = match self.placeholder_image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => {
                let parsed = Url::parse(image).map_err(|e| invalid(format!("placeholder_image {image}: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(invalid(format!("placeholder_image {image}: unsupported scheme")));
                }
                image.to_string()
            }
            _ => fallback_placeholder.to_string(),
        };

        Ok(Source {
            id: self.id.clone(),
            name: self.name.clone(),
            urls: self.urls.clone(),
            format: self.format,
            verify_cert: self.verify_cert,
            placeholder_image,
        })
    }
}

/// The explicit settings object handed to every fetch and batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub wifi_only: bool,
    pub is_premium: bool,
    pub auto_download: bool,
    pub auto_download_wifi_only: bool,
    pub auto_download_sources: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().settings()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "wifi_only",
        "is_premium",
        "auto_download",
        "auto_download_wifi_only",
        "auto_download_sources",
        "background_interval_minutes",
        "request_timeout_secs",
        "per_page",
        "database_path",
        "network",
        "sources",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Invalid `[[sources]]` entry → `Err(ConfigError::InvalidSource)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            wifi_only = config.wifi_only,
            auto_download = config.auto_download,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(content)?;
        config.registry()?;

        let requested = config.background_interval_minutes;
        config.background_interval_minutes =
            requested.clamp(MIN_BACKGROUND_INTERVAL_MINUTES, MAX_BACKGROUND_INTERVAL_MINUTES);
        if config.background_interval_minutes != requested {
            tracing::warn!(
                requested,
                clamped = config.background_interval_minutes,
                "Background interval out of range, clamping"
            );
        }
        Ok(config)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            wifi_only: self.wifi_only,
            is_premium: self.is_premium,
            auto_download: self.auto_download,
            auto_download_wifi_only: self.auto_download_wifi_only,
            auto_download_sources: self.auto_download_sources.clone(),
        }
    }

    /// Built-in catalog with the configured `[[sources]]` applied on top.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        let mut registry = Registry::builtin(self.per_page);
        for entry in &self.sources {
            let fallback = registry
                .get(&entry.id)
                .unwrap_or_else(|| registry.default_source())
                .placeholder_image
                .clone();
            registry.upsert(entry.validate(&fallback)?);
        }
        Ok(registry)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("newsdesk_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.wifi_only);
        assert!(!config.is_premium);
        assert!(!config.auto_download);
        assert!(config.auto_download_wifi_only);
        assert_eq!(config.auto_download_sources, vec!["borneo".to_string()]);
        assert_eq!(config.background_interval_minutes, 15);
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.per_page, 20);
        assert_eq!(config.network.connection, Connection::Wifi);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/newsdesk_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let path = write_config(
            "full",
            r#"
wifi_only = false
is_premium = true
auto_download = true
auto_download_wifi_only = false
auto_download_sources = ["borneo", "dayak"]
background_interval_minutes = 60
request_timeout_secs = 10
per_page = 50
database_path = "/tmp/news.db"

[network]
connection = "cellular"
probe_url = "https://example.com/"

[[sources]]
id = "local"
name = "Local Gazette"
urls = ["https://gazette.example/feed/"]
format = "xml"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert!(!config.wifi_only);
        assert!(config.is_premium);
        assert_eq!(config.auto_download_sources, vec!["borneo", "dayak"]);
        assert_eq!(config.background_interval_minutes, 60);
        assert_eq!(config.database_path.as_deref(), Some("/tmp/news.db"));
        assert_eq!(config.network.connection, Connection::Cellular);
        assert_eq!(config.network.probe_url.as_deref(), Some("https://example.com/"));

        let registry = config.registry().unwrap();
        let local = registry.get("local").unwrap();
        assert!(local.verify_cert);
        assert_eq!(local.format, SourceFormat::Xml);
        assert_eq!(
            registry.resolve("dayak").urls[0],
            "https://dayakdaily.com/wp-json/wp/v2/posts?_embed&per_page=50"
        );

        cleanup(&path);
    }

    #[test]
    fn test_source_override_replaces_builtin() {
        let config = Config::from_toml(
            r#"
[[sources]]
id = "borneo"
name = "Borneo Mirror"
urls = ["https://mirror.example/rss"]
format = "xml"
verify_cert = false
"#,
        )
        .unwrap();

        let registry = config.registry().unwrap();
        assert_eq!(registry.ids().count(), 3);
        let borneo = registry.resolve("borneo");
        assert_eq!(borneo.name, "Borneo Mirror");
        assert!(!borneo.verify_cert);
    }

    #[test]
    fn test_source_without_urls_rejected() {
        let err = Config::from_toml(
            r#"
[[sources]]
id = "empty"
name = "Empty"
urls = []
format = "json"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSource { ref id, .. } if id == "empty"));
    }

    #[test]
    fn test_source_with_bad_url_rejected() {
        let err = Config::from_toml(
            r#"
[[sources]]
id = "bad"
name = "Bad"
urls = ["ftp://files.example/feed"]
format = "xml"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_background_interval_is_clamped() {
        let config = Config::from_toml("background_interval_minutes = 1\n").unwrap();
        assert_eq!(config.background_interval_minutes, MIN_BACKGROUND_INTERVAL_MINUTES);
    }

    #[test]
    fn test_huge_background_interval_is_clamped() {
        let config = Config::from_toml(&format!("background_interval_minutes = {}\n", i64::MAX)).unwrap();
        assert_eq!(config.background_interval_minutes, MAX_BACKGROUND_INTERVAL_MINUTES);
    }

    #[test]
    fn test_source_without_placeholder_borrows_one() {
        let config = Config::from_toml(
            r#"
[[sources]]
id = "local"
name = "Local Gazette"
urls = ["https://gazette.example/feed/"]
format = "xml"
placeholder_image = "  "

[[sources]]
id = "dayak"
name = "Dayak Mirror"
urls = ["https://mirror.example/wp-json/wp/v2/posts"]
format = "json"
"#,
        )
        .unwrap();

        let builtin = Registry::builtin(DEFAULT_PER_PAGE);
        let registry = config.registry().unwrap();
        assert_eq!(
            registry.resolve("local").placeholder_image,
            builtin.default_source().placeholder_image
        );
        assert_eq!(
            registry.resolve("dayak").placeholder_image,
            builtin.resolve("dayak").placeholder_image
        );

        let feed = r#"<rss version="2.0"><channel><item><guid>1</guid><title>No image</title></item></channel></rss>"#;
        let articles = crate::feed::normalize_xml(feed, registry.resolve("local")).unwrap();
        assert_eq!(articles[0].image_url, builtin.default_source().placeholder_image);
    }

    #[test]
    fn test_source_with_bad_placeholder_rejected() {
        let err = Config::from_toml(
            r#"
[[sources]]
id = "local"
name = "Local Gazette"
urls = ["https://gazette.example/feed/"]
format = "xml"
placeholder_image = "logo.png"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSource { ref id, .. } if id == "local"));
    }

    #[test]
    fn test_unknown_connection_is_error() {
        let err = Config::from_toml("[network]\nconnection = \"satellite\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::from_toml("wifi_only = false\ntotally_fake_key = 1\n").unwrap();
        assert!(!config.wifi_only);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        cleanup(&path);
    }

    #[test]
    fn test_settings_snapshot() {
        let config = Config::from_toml("is_premium = true\nauto_download = true\n").unwrap();
        let settings = config.settings();
        assert!(settings.is_premium);
        assert!(settings.auto_download);
        assert!(settings.wifi_only);
        assert_eq!(Settings::default(), Config::default().settings());
    }
}
