//! Application configuration for CardComply.
//!
//! Config is loaded from a TOML file (path supplied by the server CLI);
//! every field has a default so a missing file or empty section still
//! yields a runnable configuration. The public base URL and the data
//! directory can additionally be overridden through environment variables,
//! which take precedence over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CardComplyError, Result};

/// Env var overriding the public base URL used in download links.
pub const PUBLIC_URL_ENV: &str = "CARDCOMPLY_PUBLIC_URL";

/// Env var overriding the retention store directory (e.g. a mounted volume).
pub const DATA_DIR_ENV: &str = "CARDCOMPLY_DATA_DIR";

// ---------------------------------------------------------------------------
// Config structs (matching cardcomply.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Artifact retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Link enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL for absolute download links (empty = relative links).
    #[serde(default)]
    pub public_url: String,

    /// Path to the DOCX report template.
    #[serde(default = "default_template_path")]
    pub template_path: String,

    /// Path to the question-schema JSON file served to callers.
    #[serde(default = "default_questions_path")]
    pub questions_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
            template_path: default_template_path(),
            questions_path: default_questions_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_template_path() -> String {
    "templates/default_template.docx".into()
}
fn default_questions_path() -> String {
    "questions.json".into()
}

/// `[retention]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Directory holding rendered artifacts pending expiry.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How long an artifact survives after creation, in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// How often the background sweep runs, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention_hours: default_retention_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_data_dir() -> String {
    "generated_docs".into()
}
fn default_retention_hours() -> u64 {
    24
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

/// `[enrichment]` section.
///
/// These caps are asserted exactly by tests; tune them here, not inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Maximum outbound link fetches per enrichment call.
    #[serde(default = "default_fetch_budget")]
    pub fetch_budget: usize,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Declared Content-Length ceiling in bytes (skip larger payloads).
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: u64,

    /// Maximum PDF pages to extract text from.
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,

    /// Character budget for extracted text before truncation.
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            fetch_budget: default_fetch_budget(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_content_bytes: default_max_content_bytes(),
            max_pdf_pages: default_max_pdf_pages(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

fn default_fetch_budget() -> usize {
    2
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_max_content_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_max_pdf_pages() -> usize {
    15
}
fn default_truncate_chars() -> usize {
    12_000
}

// ---------------------------------------------------------------------------
// Enrich config (runtime, merged from config file)
// ---------------------------------------------------------------------------

/// Runtime enrichment configuration passed to the fetcher/orchestrator.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Maximum outbound link fetches per enrichment call.
    pub fetch_budget: usize,
    /// Per-fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Declared Content-Length ceiling in bytes.
    pub max_content_bytes: u64,
    /// Maximum PDF pages to extract text from.
    pub max_pdf_pages: usize,
    /// Character budget for extracted text before truncation.
    pub truncate_chars: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for EnrichConfig {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            fetch_budget: config.fetch_budget,
            fetch_timeout_secs: config.fetch_timeout_secs,
            max_content_bytes: config.max_content_bytes,
            max_pdf_pages: config.max_pdf_pages,
            truncate_chars: config.truncate_chars,
        }
    }
}

impl From<&AppConfig> for EnrichConfig {
    fn from(config: &AppConfig) -> Self {
        Self::from(&config.enrichment)
    }
}

// ---------------------------------------------------------------------------
// Config loading and env overrides
// ---------------------------------------------------------------------------

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CardComplyError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CardComplyError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Resolve the retention data directory: env var wins over the config file.
pub fn resolve_data_dir(config: &AppConfig) -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(&config.retention.data_dir),
    }
}

/// Resolve the public base URL: env var wins over the config file.
///
/// Returns `None` when neither source is set, in which case download links
/// are emitted as relative paths. A bare hostname is promoted to https.
pub fn resolve_public_url(config: &AppConfig) -> Option<String> {
    let raw = match std::env::var(PUBLIC_URL_ENV) {
        Ok(url) if !url.is_empty() => url,
        _ => config.server.public_url.clone(),
    };

    if raw.is_empty() {
        return None;
    }

    let url = if raw.starts_with("http") {
        raw
    } else {
        format!("https://{raw}")
    };
    Some(url.trim_end_matches('/').to_string())
}
