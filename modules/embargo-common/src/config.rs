use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BASE_URL: &str = "http://datadryad.org";
const DEFAULT_USER_AGENT: &str = "DryadEmbargoValidator";

const RESOURCE_PREFIX: &str = "/resource";
const CONTENT_FEED_SUFFIX: &str = "/DRI";
const RECENT_FEED_PATH: &str = "/feed/atom_1.0/10255/3";

const MAX_CONCURRENCY: u64 = 64;
const MAX_ATTEMPTS: u64 = 10;

/// Everything with an embargoedUntil date between now and 10000 days out.
/// Assumes the index is current with the item metadata. There is no
/// pagination: if the index caps `rows` below the true match count,
/// discovery under-counts.
const SEARCH_INDEX_PATH: &str = "/solr/search/select/?q=dc.date.embargoedUntil_dt:%5BNOW%20TO%20NOW/DAY%2B10000DAY%5D&rows=1000000&fl=dc.identifier";

/// URL layout of the repository being audited.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    base_url: String,
}

impl RepositoryConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn resource_url(&self, identifier: &str) -> String {
        format!("{}{}/{}", self.base_url, RESOURCE_PREFIX, identifier)
    }

    /// Content feed (DRI) for an identifier.
    pub fn content_feed_url(&self, identifier: &str) -> String {
        format!("{}{}", self.resource_url(identifier), CONTENT_FEED_SUFFIX)
    }

    pub fn search_index_url(&self) -> String {
        format!("{}{}", self.base_url, SEARCH_INDEX_PATH)
    }

    pub fn recent_feed_url(&self) -> String {
        format!("{}{}", self.base_url, RECENT_FEED_PATH)
    }

    /// Resolve an href to an absolute URL. Root-relative hrefs
    /// (`/bitstream/...`, `/metadata/...`) are appended to the base URL, path
    /// prefix included. Absolute hrefs come back unchanged.
    pub fn absolute(&self, href: &str) -> std::result::Result<String, url::ParseError> {
        if href.starts_with('/') && !href.starts_with("//") {
            return Ok(url::Url::parse(&format!("{}{}", self.base_url, href))?.to_string());
        }
        let base = url::Url::parse(&format!("{}/", self.base_url))?;
        Ok(base.join(href)?.to_string())
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Audit configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub repository: RepositoryConfig,

    // HTTP
    pub user_agent: String,
    pub http_timeout: Duration,

    // Reports
    pub output_dir: PathBuf,

    // Batch behaviour
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl AuditConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            repository: RepositoryConfig::new(
                &std::env::var("REPOSITORY_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            ),
            user_agent: std::env::var("USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout: Duration::from_secs(env_number("HTTP_TIMEOUT_SECS", 30)?),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            concurrency: env_bounded("AUDIT_CONCURRENCY", 1, MAX_CONCURRENCY)? as usize,
            max_attempts: env_bounded("AUDIT_MAX_ATTEMPTS", 2, MAX_ATTEMPTS)? as u32,
            retry_backoff: Duration::from_millis(env_number("AUDIT_RETRY_BACKOFF_MS", 1000)?),
        };

        config.log_summary();
        Ok(config)
    }

    fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  REPOSITORY_BASE_URL: {}", self.repository.base_url());
        tracing::info!("  USER_AGENT: {}", self.user_agent);
        tracing::info!("  HTTP_TIMEOUT_SECS: {}", self.http_timeout.as_secs());
        tracing::info!("  OUTPUT_DIR: {}", self.output_dir.display());
        tracing::info!("  AUDIT_CONCURRENCY: {}", self.concurrency);
        tracing::info!("  AUDIT_MAX_ATTEMPTS: {}", self.max_attempts);
        tracing::info!("  AUDIT_RETRY_BACKOFF_MS: {}", self.retry_backoff.as_millis());
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout: Duration::from_secs(30),
            output_dir: PathBuf::from("."),
            concurrency: 1,
            max_attempts: 2,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

/// Like `env_number`, but the value must lie in `1..=max`.
fn env_bounded(key: &str, default: u64, max: u64) -> Result<u64> {
    let value = env_number(key, default)?;
    if !(1..=max).contains(&value) {
        anyhow::bail!("{key} must be between 1 and {max}, got {value}");
    }
    Ok(value)
}

fn env_number(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
