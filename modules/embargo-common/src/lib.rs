pub mod config;
pub mod error;
pub mod types;

pub use config::{AuditConfig, RepositoryConfig};
pub use error::{AuditError, ResolutionError, Result};
pub use types::*;
