// Test mocks for the audit pipeline.
//
// - MockFetcher (Fetcher): HashMap-based URL → response, with per-URL
//   call counters so tests can assert that cached stages are not refetched.
// - Fixture builders for the four document dialects: DRI content feeds,
//   METS descriptions, Solr results and the Atom feed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use repository_client::{ClientError, Fetched};

use crate::traits::Fetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Returns `Err` for unregistered URLs, like a refused connection.
/// Builder pattern: `.on_document()`, `.on_status()`, `.on_head()`, `.on_flaky()`.
#[derive(Default)]
pub struct MockFetcher {
    documents: HashMap<String, Fetched>,
    heads: HashMap<String, u16>,
    flaky: Mutex<HashMap<String, u32>>,
    gets: Mutex<HashMap<String, usize>>,
    head_calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_document(self, url: &str, body: impl Into<String>) -> Self {
        self.on_status(url, 200, body)
    }

    pub fn on_status(mut self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.documents.insert(
            url.to_string(),
            Fetched {
                status,
                body: body.into().into_bytes(),
            },
        );
        self
    }

    pub fn on_head(mut self, url: &str, status: u16) -> Self {
        self.heads.insert(url.to_string(), status);
        self
    }

    /// Fail the first `failures` GETs of `url` with a network error.
    pub fn on_flaky(self, url: &str, failures: u32) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(url.to_string(), failures);
        self
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.gets.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_gets(&self) -> usize {
        self.gets.lock().unwrap().values().sum()
    }

    pub fn head_count(&self, url: &str) -> usize {
        self.head_calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_heads(&self) -> usize {
        self.head_calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &str) -> repository_client::Result<Fetched> {
        *self.gets.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ClientError::Network(format!(
                    "MockFetcher: simulated reset for {url}"
                )));
            }
        }

        self.documents.get(url).cloned().ok_or_else(|| {
            ClientError::Network(format!("MockFetcher: no document registered for {url}"))
        })
    }

    async fn head(&self, url: &str) -> repository_client::Result<u16> {
        *self
            .head_calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        self.heads.get(url).copied().ok_or_else(|| {
            ClientError::Network(format!("MockFetcher: connection refused for {url}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A file's DRI content feed with one top-level reference per location.
pub fn dri_document(references: &[&str]) -> String {
    let refs: String = references
        .iter()
        .map(|url| {
            format!(
                r#"<reference repositoryID="10255" type="DSpace Item" url="{}"/>"#,
                escape(url)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<document xmlns="http://di.tamu.edu/DRI/1.0/">
  <body>
    <div id="aspect.artifactbrowser.ItemViewer.div.item-view">
      <referenceSet type="summaryView">{refs}</referenceSet>
    </div>
  </body>
</document>"#
    )
}

/// A package's DRI content feed: its own reference, with a nested
/// reference set listing its files.
pub fn package_dri_document(package_location: &str, file_locations: &[&str]) -> String {
    let files: String = file_locations
        .iter()
        .map(|url| {
            format!(
                r#"<reference repositoryID="10255" type="DSpace Item" url="{}"/>"#,
                escape(url)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<document xmlns="http://di.tamu.edu/DRI/1.0/">
  <body>
    <div id="aspect.artifactbrowser.ItemViewer.div.item-view">
      <referenceSet type="summaryView">
        <reference repositoryID="10255" type="DSpace Item" url="{}">
          <referenceSet type="embeddedView">{files}</referenceSet>
        </reference>
      </referenceSet>
    </div>
  </body>
</document>"#,
        escape(package_location)
    )
}

/// Builder for a METS item description.
#[derive(Debug, Default, Clone)]
pub struct MetsFixture {
    fields: Vec<(String, Option<String>, String)>,
    files: Vec<(String, Vec<String>)>,
}

impl MetsFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dc_field(mut self, element: &str, qualifier: Option<&str>, value: &str) -> Self {
        self.fields.push((
            element.to_string(),
            qualifier.map(str::to_string),
            value.to_string(),
        ));
        self
    }

    pub fn identifier(self, value: &str) -> Self {
        self.dc_field("identifier", None, value)
    }

    pub fn embargo_date(self, value: &str) -> Self {
        self.dc_field("date", Some("embargoedUntil"), value)
    }

    /// A file entry with one FLocat per href.
    pub fn file(mut self, id: &str, hrefs: &[&str]) -> Self {
        self.files
            .push((id.to_string(), hrefs.iter().map(|h| h.to_string()).collect()));
        self
    }

    pub fn to_xml(&self) -> String {
        let fields: String = self
            .fields
            .iter()
            .map(|(element, qualifier, value)| {
                let qualifier = qualifier
                    .as_deref()
                    .map(|q| format!(r#" qualifier="{}""#, escape(q)))
                    .unwrap_or_default();
                format!(
                    r#"<dim:field mdschema="dc" element="{}"{qualifier}>{}</dim:field>"#,
                    escape(element),
                    escape(value)
                )
            })
            .collect();

        let files: String = self
            .files
            .iter()
            .map(|(id, hrefs)| {
                let locators: String = hrefs
                    .iter()
                    .map(|href| {
                        let title = href.rsplit('/').next().unwrap_or(href);
                        let title = title.split('?').next().unwrap_or(title);
                        format!(
                            r#"<mets:FLocat LOCTYPE="URL" xlink:title="{}" xlink:label="dataset-file" xlink:type="locator" xlink:href="{}"/>"#,
                            escape(title),
                            escape(href)
                        )
                    })
                    .collect();
                format!(
                    r#"<mets:file CHECKSUMTYPE="MD5" GROUPID="group_{id}" ID="{id}" MIMETYPE="text/plain" SIZE="137110" CHECKSUM="093be9c10e510e1e1de55f0e2b664a13">{locators}</mets:file>"#,
                    id = escape(id)
                )
            })
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<mets:METS xmlns:mets="http://www.loc.gov/METS/" xmlns:dim="http://www.dspace.org/xmlns/dspace/dim" xmlns:xlink="http://www.w3.org/TR/xlink/">
  <mets:dmdSec ID="dmd_1">
    <mets:mdWrap MDTYPE="OTHER" OTHERMDTYPE="DIM">
      <mets:xmlData>
        <dim:dim dspaceType="ITEM">{fields}</dim:dim>
      </mets:xmlData>
    </mets:mdWrap>
  </mets:dmdSec>
  <mets:fileSec>
    <mets:fileGrp USE="CONTENT">{files}</mets:fileGrp>
  </mets:fileSec>
</mets:METS>"#
        )
    }
}

/// Solr select response: one `doc` per entry, each with a dc.identifier
/// array.
pub fn solr_response(docs: &[&[&str]]) -> String {
    let found = docs.len();
    let docs: String = docs
        .iter()
        .map(|ids| {
            let strs: String = ids
                .iter()
                .map(|id| format!("<str>{}</str>", escape(id)))
                .collect();
            format!(r#"<doc><arr name="dc.identifier">{strs}</arr></doc>"#)
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <lst name="responseHeader"><int name="status">0</int></lst>
  <result name="response" numFound="{found}" start="0">{docs}</result>
</response>"#
    )
}

/// Atom feed with one entry per id.
pub fn atom_feed(entry_ids: &[&str]) -> String {
    let entries: String = entry_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            format!(
                r#"<entry>
    <title>Data package {i}</title>
    <link rel="alternate" href="{href}"/>
    <id>{href}</id>
    <updated>2024-01-0{day}T00:00:00Z</updated>
  </entry>"#,
                href = escape(id),
                day = (i % 9) + 1
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Recently published</title>
  <id>http://datadryad.org/feed/atom_1.0/10255/3</id>
  <updated>2024-01-10T00:00:00Z</updated>
  {entries}
</feed>"#
    )
}
