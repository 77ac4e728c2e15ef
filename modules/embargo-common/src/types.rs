use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// A package or file identifier (a DOI such as `doi:10.5061/dryad.s8g15/1`).
///
/// Packages and files share one namespace. File identifiers carry the
/// package's own separator plus at least one more, so two `/` or more marks
/// a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_file(&self) -> bool {
        self.0.matches('/').count() >= 2
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Download links
// ---------------------------------------------------------------------------

/// One way of addressing the bytes of a download link (mirror, presentation
/// variant). Attributes are kept exactly as found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlVariant {
    pub href: Option<String>,
    pub label: Option<String>,
    pub title: Option<String>,
}

/// A storable unit attached to an item: checksum, media type, size and the
/// distinct URL variants serving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub checksum: Option<String>,
    pub checksum_type: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    pub id: Option<String>,
    pub urls: Vec<UrlVariant>,
}

// ---------------------------------------------------------------------------
// Check results
// ---------------------------------------------------------------------------

/// Evidence from one reachability probe. Exactly one of `status` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status: Some(status),
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// True when the repository actually served the bytes.
    pub fn is_reachable(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

/// Per-file outcome of an embargo check.
///
/// `probes` is non-empty only when the embargo is active and the file has
/// download links; no probe is issued otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbargoCheckResult {
    pub file: Option<Identifier>,
    pub embargo_dates: Vec<String>,
    pub embargo_active: bool,
    pub has_download_links: bool,
    pub probes: Vec<ProbeOutcome>,
}

impl EmbargoCheckResult {
    /// An active embargo with any download link at all is a leak, whatever
    /// the probes returned.
    pub fn is_leak(&self) -> bool {
        self.embargo_active && self.has_download_links
    }

    pub fn joined_dates(&self) -> String {
        self.embargo_dates.join(",")
    }

    pub fn file_label(&self) -> &str {
        self.file.as_ref().map(Identifier::as_str).unwrap_or("")
    }
}
