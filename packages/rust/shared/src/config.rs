//! Application configuration for fieldmap.
//!
//! User config lives at `~/.fieldmap/fieldmap.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FieldMapError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "fieldmap.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".fieldmap";

// ---------------------------------------------------------------------------
// Config structs (matching fieldmap.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Row mapping behaviour.
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Crawl worker settings.
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// File parser settings.
    #[serde(default)]
    pub parser: ParserConfig,
}

/// How a rule's source column is matched against the row's column labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnMatch {
    /// Exact, case-sensitive label match.
    #[default]
    Exact,
    /// ASCII case-insensitive label match.
    CaseInsensitive,
}

/// `[mapping]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Seconds to wait for a crawl fetch to start.
    #[serde(default = "default_crawl_wait")]
    pub crawl_start_timeout_secs: u64,

    /// Seconds to wait for a crawl fetch to finish, after the start wait.
    #[serde(default = "default_crawl_wait")]
    pub crawl_end_timeout_secs: u64,

    /// Ask the parser to populate the document even when extraction faulted.
    #[serde(default = "default_true")]
    pub populate_after_extract_fault: bool,

    /// Column label matching mode.
    #[serde(default)]
    pub column_match: ColumnMatch,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            crawl_start_timeout_secs: default_crawl_wait(),
            crawl_end_timeout_secs: default_crawl_wait(),
            populate_after_extract_fault: true,
            column_match: ColumnMatch::Exact,
        }
    }
}

fn default_crawl_wait() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Maximum concurrent fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Milliseconds to sleep before each request.
    #[serde(default)]
    pub rate_limit_ms: u64,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Allow fetching localhost and private network addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            rate_limit_ms: 0,
            request_timeout_secs: default_request_timeout(),
            max_redirects: default_max_redirects(),
            allow_private_hosts: false,
        }
    }
}

fn default_concurrency() -> u32 {
    4
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}

/// `[parser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Files larger than this are refused at extraction time.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    16 * 1024 * 1024
}

// ---------------------------------------------------------------------------
// Runtime options (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime options for the row mapper.
#[derive(Debug, Clone)]
pub struct MappingOptions {
    /// Budget for a crawl fetch to start.
    pub crawl_start_timeout: Duration,
    /// Budget for a crawl fetch to finish, awaited even after a start timeout.
    pub crawl_end_timeout: Duration,
    /// Populate from the parser after a faulted extraction.
    pub populate_after_extract_fault: bool,
    /// Column label matching mode.
    pub column_match: ColumnMatch,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MappingOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            crawl_start_timeout: Duration::from_secs(config.mapping.crawl_start_timeout_secs),
            crawl_end_timeout: Duration::from_secs(config.mapping.crawl_end_timeout_secs),
            populate_after_extract_fault: config.mapping.populate_after_extract_fault,
            column_match: config.mapping.column_match,
        }
    }
}

/// Runtime options for the crawl worker.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum concurrent fetches.
    pub concurrency: u32,
    /// Delay before each request.
    pub rate_limit: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Maximum redirects followed per request.
    pub max_redirects: usize,
    /// Allow localhost/private IPs.
    pub allow_private_hosts: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.crawl.concurrency.max(1),
            rate_limit: Duration::from_millis(config.crawl.rate_limit_ms),
            request_timeout: Duration::from_secs(config.crawl.request_timeout_secs),
            max_redirects: config.crawl.max_redirects,
            allow_private_hosts: config.crawl.allow_private_hosts,
        }
    }
}

/// Runtime options for the file parser registry.
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Files larger than this fail extraction.
    pub max_file_bytes: u64,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ParserOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_file_bytes: config.parser.max_file_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.fieldmap/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FieldMapError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.fieldmap/fieldmap.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FieldMapError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FieldMapError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FieldMapError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FieldMapError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FieldMapError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("crawl_start_timeout_secs = 60"));
        assert!(toml_str.contains("column_match = \"exact\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.mapping.crawl_end_timeout_secs, 60);
        assert!(parsed.mapping.populate_after_extract_fault);
        assert_eq!(parsed.crawl.concurrency, 4);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[mapping]
crawl_start_timeout_secs = 5
column_match = "case-insensitive"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.mapping.crawl_start_timeout_secs, 5);
        assert_eq!(config.mapping.crawl_end_timeout_secs, 60);
        assert_eq!(config.mapping.column_match, ColumnMatch::CaseInsensitive);
        assert_eq!(config.parser.max_file_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn mapping_options_from_app_config() {
        let mut app = AppConfig::default();
        app.mapping.crawl_end_timeout_secs = 7;
        app.mapping.populate_after_extract_fault = false;
        let opts = MappingOptions::from(&app);
        assert_eq!(opts.crawl_start_timeout, Duration::from_secs(60));
        assert_eq!(opts.crawl_end_timeout, Duration::from_secs(7));
        assert!(!opts.populate_after_extract_fault);
    }

    #[test]
    fn crawl_options_clamp_concurrency() {
        let mut app = AppConfig::default();
        app.crawl.concurrency = 0;
        app.crawl.rate_limit_ms = 250;
        let opts = CrawlOptions::from(&app);
        assert_eq!(opts.concurrency, 1);
        assert_eq!(opts.rate_limit, Duration::from_millis(250));
        assert!(!opts.allow_private_hosts);
    }

    #[test]
    fn load_config_from_reports_bad_toml() {
        let dir = std::env::temp_dir().join(format!("fm-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        std::fs::write(&path, "[mapping\ncolumn_match = 1").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
