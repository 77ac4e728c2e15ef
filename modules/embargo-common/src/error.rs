use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// The metadata graph did not have the one-reference / one-identifier shape
/// the pipeline relies on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Expected exactly one description reference for {identifier}, found {count}")]
    AmbiguousReference { identifier: String, count: usize },

    #[error("More than one identifier in description: {}", candidates.join(", "))]
    AmbiguousIdentifier { candidates: Vec<String> },

    #[error("Unexpected document structure: {0}")]
    UnexpectedStructure(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Fetch failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Malformed document at {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Item has neither an identifier nor a description location")]
    MissingLocator,
}

impl AuditError {
    pub fn transport(url: &str, reason: impl ToString) -> Self {
        AuditError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: &str, reason: impl ToString) -> Self {
        AuditError::Parse {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Network failures, throttling (429) and server errors (5xx). Other
    /// statuses, parse and resolution failures repeat on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AuditError::Transport { .. } => true,
            AuditError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
