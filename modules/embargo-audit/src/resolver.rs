// ItemResolver: identifier or location → parsed item description.
//
// identifier ──GET <base>/resource/<id>/DRI──▶ content feed
//            ──exactly one reference@url──▶ description location
//            ──GET <base><location>──▶ METS description
//
// An item created from a location skips the content feed and recovers its
// identifier from the description's dc.identifier fields.

use std::sync::Arc;

use tracing::debug;

use embargo_common::{AuditError, Identifier, RepositoryConfig, ResolutionError, Result};

use crate::document::{parse_document, XmlElement};
use crate::extractor::read_identifiers;
use crate::item::{DataPackage, ItemHandle};
use crate::traits::{fetch_body, Fetcher};

const REFERENCE_PATH: &[&str] = &["body", "div", "referenceSet", "reference"];

#[derive(Clone)]
pub struct ItemResolver {
    fetcher: Arc<dyn Fetcher>,
    repository: RepositoryConfig,
}

impl ItemResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, repository: RepositoryConfig) -> Self {
        Self {
            fetcher,
            repository,
        }
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn repository(&self) -> &RepositoryConfig {
        &self.repository
    }

    async fn load(&self, url: &str) -> Result<XmlElement> {
        let body = fetch_body(self.fetcher.as_ref(), url).await?;
        parse_document(url, &body)
    }

    /// The item's content feed. Requires a known identifier.
    pub async fn content_feed<'a>(&self, item: &'a ItemHandle) -> Result<&'a XmlElement> {
        let identifier = item.identifier().ok_or(AuditError::MissingLocator)?;
        let url = self.repository.content_feed_url(identifier.as_str());
        item.content_feed.get_or_try_init(|| self.load(&url)).await
    }

    /// Where the item's description lives, following the content feed's
    /// single reference when only the identifier is known.
    pub async fn location<'a>(&self, item: &'a ItemHandle) -> Result<&'a str> {
        if let Some(location) = item.location() {
            return Ok(location);
        }

        let feed = self.content_feed(item).await?;
        let location = item
            .location
            .get_or_try_init(|| async { description_reference(feed, &item.label()) })
            .await?;
        Ok(location.as_str())
    }

    /// Load and parse the item's description. Recovers the identifier from
    /// the description when it was not known up front.
    pub async fn resolve<'a>(&self, item: &'a ItemHandle) -> Result<&'a XmlElement> {
        if let Some(description) = item.description.get() {
            return Ok(description);
        }

        let location = self.location(item).await?;
        item.description
            .get_or_try_init(|| async {
                let url = self.repository.absolute(location).map_err(|e| {
                    ResolutionError::UnexpectedStructure(format!(
                        "unusable description location {location:?}: {e}"
                    ))
                })?;

                let description = self.load(&url).await?;

                if item.identifier().is_none() {
                    if let Some(identifier) = recover_identifier(&description)? {
                        debug!(location, identifier = %identifier, "Recovered identifier from description");
                        let _ = item.identifier.set(identifier);
                    }
                }

                Ok::<_, AuditError>(description)
            })
            .await
    }

    /// Description locations of every file in a package, in feed order.
    pub async fn file_locations<'a>(&self, package: &'a DataPackage) -> Result<&'a [String]> {
        let feed = self.content_feed(&package.item).await?;
        let locations = package
            .file_locations
            .get_or_try_init(|| async { nested_references(feed) })
            .await?;
        Ok(locations.as_slice())
    }
}

/// The single description reference in a content feed.
fn description_reference(feed: &XmlElement, label: &str) -> Result<String> {
    let references = feed.find_all(REFERENCE_PATH);
    match references.as_slice() {
        [reference] => reference.attr("url").map(str::to_string).ok_or_else(|| {
            ResolutionError::UnexpectedStructure(format!("reference for {label} has no url"))
                .into()
        }),
        _ => Err(ResolutionError::AmbiguousReference {
            identifier: label.to_string(),
            count: references.len(),
        }
        .into()),
    }
}

/// A package's content feed nests one reference set inside its own
/// reference, listing a reference per contained file.
fn nested_references(feed: &XmlElement) -> Result<Vec<String>> {
    let nested_sets: Vec<&XmlElement> = feed
        .find_all(REFERENCE_PATH)
        .into_iter()
        .flat_map(|reference| reference.children())
        .collect();

    match nested_sets.as_slice() {
        [] => Ok(Vec::new()),
        [set] => Ok(set
            .children_named("reference")
            .filter_map(|r| r.attr("url"))
            .map(str::to_string)
            .collect()),
        _ => Err(ResolutionError::UnexpectedStructure(format!(
            "expected at most one nested reference set, found {}",
            nested_sets.len()
        ))
        .into()),
    }
}

fn recover_identifier(description: &XmlElement) -> Result<Option<Identifier>> {
    let mut candidates = read_identifiers(description);
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop().map(Identifier::new)),
        _ => Err(ResolutionError::AmbiguousIdentifier { candidates }.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dri_document, package_dri_document, MetsFixture, MockFetcher};

    const BASE: &str = "http://datadryad.org";

    fn resolver(fetcher: Arc<MockFetcher>) -> ItemResolver {
        ItemResolver::new(fetcher, RepositoryConfig::new(BASE))
    }

    #[tokio::test]
    async fn identifier_resolves_through_content_feed() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_document(
                    "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
                    dri_document(&["/metadata/handle/10255/dryad.13/mets.xml"]),
                )
                .on_document(
                    "http://datadryad.org/metadata/handle/10255/dryad.13/mets.xml",
                    MetsFixture::new().embargo_date("2099-01-01").to_xml(),
                ),
        );
        let resolver = resolver(fetcher.clone());
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        resolver.resolve(&item).await.unwrap();
        assert_eq!(item.location(), Some("/metadata/handle/10255/dryad.13/mets.xml"));
        assert!(item.is_resolved());
    }

    #[tokio::test]
    async fn resolving_twice_fetches_once() {
        let description_url = "http://datadryad.org/metadata/handle/10255/dryad.13/mets.xml";
        let fetcher = Arc::new(MockFetcher::new().on_document(
            description_url,
            MetsFixture::new()
                .identifier("doi:10.5061/dryad.12/1")
                .to_xml(),
        ));
        let resolver = resolver(fetcher.clone());
        let item = ItemHandle::at_location("/metadata/handle/10255/dryad.13/mets.xml");

        let first = resolver.resolve(&item).await.unwrap().clone();
        let second = resolver.resolve(&item).await.unwrap();
        assert_eq!(&first, second);
        assert_eq!(fetcher.fetch_count(description_url), 1);
    }

    #[tokio::test]
    async fn two_references_are_ambiguous_and_skip_the_description() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_document(
                    "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
                    dri_document(&["/metadata/a/mets.xml", "/metadata/b/mets.xml"]),
                )
                .on_document(
                    "http://datadryad.org/metadata/a/mets.xml",
                    MetsFixture::new().to_xml(),
                ),
        );
        let resolver = resolver(fetcher.clone());
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        let err = resolver.resolve(&item).await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::Resolution(ResolutionError::AmbiguousReference { count: 2, .. })
        ));
        assert_eq!(fetcher.fetch_count("http://datadryad.org/metadata/a/mets.xml"), 0);
        assert_eq!(fetcher.total_gets(), 1);
    }

    #[tokio::test]
    async fn zero_references_are_ambiguous() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
            dri_document(&[]),
        ));
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        let err = resolver(fetcher).resolve(&item).await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::Resolution(ResolutionError::AmbiguousReference { count: 0, .. })
        ));
    }

    #[tokio::test]
    async fn identifier_recovered_from_description() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/metadata/x/mets.xml",
            MetsFixture::new()
                .identifier("doi:10.5061/dryad.12/3")
                .identifier("http://hdl.handle.net/10255/dryad.99")
                .to_xml(),
        ));
        let item = ItemHandle::at_location("/metadata/x/mets.xml");

        resolver(fetcher).resolve(&item).await.unwrap();
        assert_eq!(
            item.identifier().map(Identifier::as_str),
            Some("doi:10.5061/dryad.12/3")
        );
    }

    #[tokio::test]
    async fn no_identifier_in_description_leaves_it_unset() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/metadata/x/mets.xml",
            MetsFixture::new().embargo_date("2099-01-01").to_xml(),
        ));
        let item = ItemHandle::at_location("/metadata/x/mets.xml");

        resolver(fetcher).resolve(&item).await.unwrap();
        assert!(item.identifier().is_none());
    }

    #[tokio::test]
    async fn distinct_identifiers_are_ambiguous() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/metadata/x/mets.xml",
            MetsFixture::new()
                .identifier("doi:10.5061/dryad.12/3")
                .identifier("doi:10.5061/dryad.12/4")
                .to_xml(),
        ));
        let item = ItemHandle::at_location("/metadata/x/mets.xml");

        let err = resolver(fetcher).resolve(&item).await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::Resolution(ResolutionError::AmbiguousIdentifier { .. })
        ));
        assert!(!item.is_resolved());
    }

    #[tokio::test]
    async fn known_identifier_is_not_overwritten() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_document(
                    "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
                    dri_document(&["/metadata/x/mets.xml"]),
                )
                .on_document(
                    "http://datadryad.org/metadata/x/mets.xml",
                    MetsFixture::new()
                        .identifier("doi:10.5061/dryad.12/3")
                        .identifier("doi:10.5061/dryad.12/4")
                        .to_xml(),
                ),
        );
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        resolver(fetcher).resolve(&item).await.unwrap();
        assert_eq!(
            item.identifier().map(Identifier::as_str),
            Some("doi:10.5061/dryad.12/1")
        );
    }

    #[tokio::test]
    async fn missing_content_feed_is_a_permanent_status_error() {
        let fetcher = Arc::new(MockFetcher::new().on_status(
            "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
            404,
            "<html>not found</html>",
        ));
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        let err = resolver(fetcher).resolve(&item).await.unwrap_err();
        assert!(matches!(err, AuditError::HttpStatus { status: 404, .. }));
        assert!(!err.is_transient());
        assert_eq!(item.stage(), crate::item::Stage::ContentFeed);
    }

    #[tokio::test]
    async fn unavailable_content_feed_is_transient() {
        let fetcher = Arc::new(MockFetcher::new().on_status(
            "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
            503,
            "<html>try later</html>",
        ));
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        let err = resolver(fetcher).resolve(&item).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_description_is_a_parse_error() {
        let fetcher = Arc::new(
            MockFetcher::new().on_document("http://datadryad.org/metadata/x/mets.xml", "<METS><dmdSec>"),
        );
        let item = ItemHandle::at_location("/metadata/x/mets.xml");

        let err = resolver(fetcher).resolve(&item).await.unwrap_err();
        assert!(matches!(err, AuditError::Parse { .. }));
    }

    #[tokio::test]
    async fn package_lists_nested_file_locations() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/resource/doi:10.5061/dryad.s8g15/DRI",
            package_dri_document(
                "/metadata/handle/10255/dryad.53353/mets.xml",
                &[
                    "/metadata/handle/10255/dryad.53354/mets.xml",
                    "/metadata/handle/10255/dryad.53355/mets.xml",
                ],
            ),
        ));
        let resolver = resolver(fetcher.clone());
        let package = DataPackage::with_identifier("doi:10.5061/dryad.s8g15".into());

        let locations = resolver.file_locations(&package).await.unwrap();
        assert_eq!(
            locations,
            &[
                "/metadata/handle/10255/dryad.53354/mets.xml".to_string(),
                "/metadata/handle/10255/dryad.53355/mets.xml".to_string(),
            ]
        );

        resolver.file_locations(&package).await.unwrap();
        assert_eq!(
            fetcher.fetch_count("http://datadryad.org/resource/doi:10.5061/dryad.s8g15/DRI"),
            1
        );
    }

    #[tokio::test]
    async fn package_without_nested_set_has_no_files() {
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/resource/doi:10.5061/dryad.s8g15/DRI",
            dri_document(&["/metadata/handle/10255/dryad.53353/mets.xml"]),
        ));
        let package = DataPackage::with_identifier("doi:10.5061/dryad.s8g15".into());

        let locations = resolver(fetcher).file_locations(&package).await.unwrap();
        assert!(locations.is_empty());
    }

    #[tokio::test]
    async fn package_with_two_nested_sets_is_unexpected() {
        let feed = r#"<document xmlns="http://di.tamu.edu/DRI/1.0/"><body><div>
            <referenceSet type="summaryView">
              <reference url="/metadata/handle/10255/dryad.53353/mets.xml">
                <referenceSet type="embeddedView">
                  <reference url="/metadata/handle/10255/dryad.53354/mets.xml"/>
                </referenceSet>
                <referenceSet type="embeddedView">
                  <reference url="/metadata/handle/10255/dryad.53355/mets.xml"/>
                </referenceSet>
              </reference>
            </referenceSet>
        </div></body></document>"#;
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/resource/doi:10.5061/dryad.s8g15/DRI",
            feed,
        ));
        let package = DataPackage::with_identifier("doi:10.5061/dryad.s8g15".into());

        let err = resolver(fetcher).file_locations(&package).await.unwrap_err();
        assert!(matches!(
            err,
            AuditError::Resolution(ResolutionError::UnexpectedStructure(_))
        ));
        assert!(package.file_locations.get().is_none());
    }

    #[tokio::test]
    async fn reference_without_url_is_unexpected() {
        let feed = r#"<document xmlns="http://di.tamu.edu/DRI/1.0/"><body><div>
            <referenceSet type="summaryView"><reference type="DSpace Item"/></referenceSet>
        </div></body></document>"#;
        let fetcher = Arc::new(MockFetcher::new().on_document(
            "http://datadryad.org/resource/doi:10.5061/dryad.12/1/DRI",
            feed,
        ));
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        let err = resolver(fetcher.clone()).resolve(&item).await.unwrap_err();
        match err {
            AuditError::Resolution(ResolutionError::UnexpectedStructure(reason)) => {
                assert!(reason.contains("doi:10.5061/dryad.12/1"));
            }
            other => panic!("expected UnexpectedStructure, got {other:?}"),
        }
        assert_eq!(fetcher.total_gets(), 1);
    }

    #[tokio::test]
    async fn base_url_path_prefix_applies_to_description_location() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_document(
                    "http://host.example/repo/resource/doi:10.5061/dryad.12/1/DRI",
                    dri_document(&["/metadata/handle/10255/dryad.13/mets.xml"]),
                )
                .on_document(
                    "http://host.example/repo/metadata/handle/10255/dryad.13/mets.xml",
                    MetsFixture::new().to_xml(),
                ),
        );
        let resolver = ItemResolver::new(
            fetcher.clone(),
            RepositoryConfig::new("http://host.example/repo"),
        );
        let item = ItemHandle::with_identifier("doi:10.5061/dryad.12/1".into());

        resolver.resolve(&item).await.unwrap();
        assert_eq!(
            fetcher.fetch_count("http://host.example/repo/metadata/handle/10255/dryad.13/mets.xml"),
            1
        );
    }
}
