// Discovery: the two entry points that produce identifiers to check.
//
// - IndexDiscoverer queries the search index for everything with a future
//   embargoedUntil date and yields *file* identifiers directly.
// - FeedDiscoverer reads the recently-published Atom feed and yields
//   *package* identifiers, which must be expanded to files.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use embargo_common::{AuditError, Identifier, Result};

use crate::document::{parse_document, XmlElement};
use crate::traits::{fetch_body, Fetcher};

const IDENTIFIER_FIELD: &str = "dc.identifier";
const RESOURCE_MARKER: &str = "resource/";

pub struct IndexDiscoverer {
    fetcher: Arc<dyn Fetcher>,
}

impl IndexDiscoverer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// One round-trip with a very large row count. If the index caps rows
    /// below the true match count the result is silently truncated.
    pub async fn discover(&self, query_url: &str) -> Result<Vec<Identifier>> {
        let body = fetch_body(self.fetcher.as_ref(), query_url).await?;
        let results = parse_document(query_url, &body)?;
        let identifiers = file_identifiers(&results);

        info!(count = identifiers.len(), "Search index: embargoed file identifiers");
        Ok(identifiers)
    }
}

/// File identifiers among `result/doc/arr[@name="dc.identifier"]/str`,
/// deduplicated and sorted. Package identifiers share the field and are
/// dropped by the two-separator rule.
pub fn file_identifiers(results: &XmlElement) -> Vec<Identifier> {
    results
        .find_all(&["result", "doc", "arr"])
        .into_iter()
        .filter(|arr| arr.attr("name") == Some(IDENTIFIER_FIELD))
        .flat_map(|arr| arr.children_named("str"))
        .map(|s| Identifier::new(s.text()))
        .filter(Identifier::is_file)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct FeedDiscoverer {
    fetcher: Arc<dyn Fetcher>,
}

impl FeedDiscoverer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn discover(&self, feed_url: &str) -> Result<Vec<Identifier>> {
        let body = fetch_body(self.fetcher.as_ref(), feed_url).await?;
        let feed =
            feed_rs::parser::parse(&body[..]).map_err(|e| AuditError::parse(feed_url, e))?;

        let ids: Vec<String> = feed.entries.into_iter().map(|entry| entry.id).collect();
        let packages = package_identifiers(ids.iter().map(String::as_str));

        info!(
            entries = ids.len(),
            packages = packages.len(),
            "Recent feed: published package identifiers"
        );
        Ok(packages)
    }
}

/// Package identifiers from entry ids like
/// `http://datadryad.org/resource/doi:10.5061/dryad.s8g15`, deduplicated
/// and sorted.
pub fn package_identifiers<'a>(entry_ids: impl IntoIterator<Item = &'a str>) -> Vec<Identifier> {
    entry_ids
        .into_iter()
        .filter_map(|id| {
            let suffix = id.rsplit(RESOURCE_MARKER).next().unwrap_or(id).trim();
            if suffix.is_empty() {
                debug!(entry_id = id, "Feed entry without package identifier");
                None
            } else {
                Some(Identifier::new(suffix))
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{atom_feed, solr_response, MockFetcher};

    #[test]
    fn index_keeps_unique_file_identifiers() {
        let xml = solr_response(&[
            &["doi:10.5061/dryad.s8g15", "doi:10.5061/dryad.s8g15/2"],
            &["doi:10.5061/dryad.s8g15/1"],
            &["doi:10.5061/dryad.s8g15/2"],
        ]);
        let doc = parse_document("u", xml.as_bytes()).unwrap();
        let ids: Vec<String> = file_identifiers(&doc)
            .into_iter()
            .map(|i| i.to_string())
            .collect();
        assert_eq!(
            ids,
            vec!["doi:10.5061/dryad.s8g15/1", "doi:10.5061/dryad.s8g15/2"]
        );
    }

    #[test]
    fn index_ignores_other_array_fields() {
        let xml = r#"<response><result><doc>
            <arr name="dc.relation.haspart"><str>doi:10.5061/dryad.a/1</str></arr>
            <arr name="dc.identifier"><str>doi:10.5061/dryad.b/1</str></arr>
        </doc></result></response>"#;
        let doc = parse_document("u", xml.as_bytes()).unwrap();
        assert_eq!(file_identifiers(&doc), vec![Identifier::new("doi:10.5061/dryad.b/1")]);
    }

    #[test]
    fn package_identifier_follows_resource_marker() {
        let ids = package_identifiers([
            "http://datadryad.org/resource/doi:10.5061/dryad.ct40s",
            "http://datadryad.org/resource/doi:10.5061/dryad.s8g15",
            "http://datadryad.org/resource/doi:10.5061/dryad.ct40s",
        ]);
        assert_eq!(
            ids,
            vec![
                Identifier::new("doi:10.5061/dryad.ct40s"),
                Identifier::new("doi:10.5061/dryad.s8g15"),
            ]
        );
    }

    #[test]
    fn entry_id_without_marker_is_used_whole() {
        let ids = package_identifiers(["doi:10.5061/dryad.ct40s", "http://x/resource/"]);
        assert_eq!(ids, vec![Identifier::new("doi:10.5061/dryad.ct40s")]);
    }

    #[tokio::test]
    async fn feed_discovery_reads_atom_entry_ids() {
        let url = "http://datadryad.org/feed/atom_1.0/10255/3";
        let fetcher = Arc::new(MockFetcher::new().on_document(
            url,
            atom_feed(&[
                "http://datadryad.org/resource/doi:10.5061/dryad.s8g15",
                "http://datadryad.org/resource/doi:10.5061/dryad.ct40s",
            ]),
        ));

        let ids = FeedDiscoverer::new(fetcher).discover(url).await.unwrap();
        assert_eq!(
            ids,
            vec![
                Identifier::new("doi:10.5061/dryad.ct40s"),
                Identifier::new("doi:10.5061/dryad.s8g15"),
            ]
        );
    }

    #[tokio::test]
    async fn index_discovery_surfaces_fetch_failure() {
        let fetcher = Arc::new(MockFetcher::new());
        let err = IndexDiscoverer::new(fetcher)
            .discover("http://datadryad.org/solr/search/select/")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
