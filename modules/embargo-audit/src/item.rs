// Items: packages and files in the repository.
//
// Every resolved attribute is a write-once cell. A successful fetch, parse
// or extraction fills its cell exactly once; later calls read the cell and
// issue no network traffic. A failed step leaves its cell empty so a retry
// resumes from that step.

use std::fmt;
use std::sync::OnceLock;

use tokio::sync::OnceCell;

use embargo_common::{DownloadLink, Identifier};

use crate::document::XmlElement;

/// Resolution state shared by packages and files.
#[derive(Debug, Default)]
pub struct ItemHandle {
    pub(crate) identifier: OnceLock<Identifier>,
    /// Description location as found in the content feed (usually
    /// repository-relative).
    pub(crate) location: OnceCell<String>,
    pub(crate) content_feed: OnceCell<XmlElement>,
    pub(crate) description: OnceCell<XmlElement>,
}

impl ItemHandle {
    pub fn with_identifier(identifier: Identifier) -> Self {
        let handle = Self::default();
        let _ = handle.identifier.set(identifier);
        handle
    }

    pub fn at_location(location: impl Into<String>) -> Self {
        Self {
            location: OnceCell::new_with(Some(location.into())),
            ..Self::default()
        }
    }

    pub fn identifier(&self) -> Option<&Identifier> {
        self.identifier.get()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.get().map(String::as_str)
    }

    pub fn is_resolved(&self) -> bool {
        self.description.initialized()
    }

    /// The next pipeline step this item needs. Used to label failures.
    pub fn stage(&self) -> Stage {
        if self.description.initialized() {
            Stage::Evaluate
        } else if self.location.initialized() {
            Stage::Description
        } else {
            Stage::ContentFeed
        }
    }

    /// Best label for logs: the identifier, else the location.
    pub fn label(&self) -> String {
        match (self.identifier(), self.location()) {
            (Some(id), _) => id.to_string(),
            (None, Some(location)) => location.to_string(),
            (None, None) => "<unknown>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ContentFeed,
    Description,
    Evaluate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ContentFeed => "content_feed",
            Stage::Description => "description",
            Stage::Evaluate => "evaluate",
        })
    }
}

/// Capability shared by everything the resolver can load.
pub trait Resolvable {
    fn item(&self) -> &ItemHandle;

    fn identifier(&self) -> Option<&Identifier> {
        self.item().identifier()
    }
}

/// A data file: the unit that carries embargo dates and download links.
#[derive(Debug, Default)]
pub struct DataFile {
    pub(crate) item: ItemHandle,
    pub(crate) embargo_dates: OnceLock<Vec<String>>,
    pub(crate) download_links: OnceLock<Vec<DownloadLink>>,
}

impl DataFile {
    pub fn with_identifier(identifier: Identifier) -> Self {
        Self {
            item: ItemHandle::with_identifier(identifier),
            ..Self::default()
        }
    }

    pub fn at_location(location: impl Into<String>) -> Self {
        Self {
            item: ItemHandle::at_location(location),
            ..Self::default()
        }
    }
}

impl Resolvable for DataFile {
    fn item(&self) -> &ItemHandle {
        &self.item
    }
}

/// A data package: enumerates the files it contains.
#[derive(Debug, Default)]
pub struct DataPackage {
    pub(crate) item: ItemHandle,
    pub(crate) file_locations: OnceCell<Vec<String>>,
}

impl DataPackage {
    pub fn with_identifier(identifier: Identifier) -> Self {
        Self {
            item: ItemHandle::with_identifier(identifier),
            file_locations: OnceCell::new(),
        }
    }
}

impl Resolvable for DataPackage {
    fn item(&self) -> &ItemHandle {
        &self.item
    }
}
