pub mod audit;
pub mod discovery;
pub mod document;
pub mod evaluator;
pub mod extractor;
pub mod item;
pub mod report;
pub mod resolver;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use audit::{Audit, RunSummary};
pub use discovery::{FeedDiscoverer, IndexDiscoverer};
pub use document::{parse_document, XmlElement};
pub use evaluator::EmbargoEvaluator;
pub use item::{DataFile, DataPackage, ItemHandle, Resolvable, Stage};
pub use report::classify;
pub use resolver::ItemResolver;
pub use traits::Fetcher;
