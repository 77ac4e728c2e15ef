// Embargo dates and download links from a METS item description.
//
//   <mets:dmdSec><mets:mdWrap><mets:xmlData><dim:dim>
//     <dim:field mdschema="dc" element="date" qualifier="embargoedUntil">2014-09-25</dim:field>
//   ...
//   <mets:fileSec><mets:fileGrp>
//     <mets:file CHECKSUMTYPE="MD5" ID="file_128474" MIMETYPE="text/plain" SIZE="137110" CHECKSUM="093b...">
//       <mets:FLocat LOCTYPE="URL" xlink:title="data.txt" xlink:label="dataset-file"
//                    xlink:href="/bitstream/handle/10255/dryad.45529/data.txt?sequence=1"/>

use std::collections::HashSet;

use embargo_common::{DownloadLink, Result, UrlVariant};

use crate::document::XmlElement;
use crate::item::DataFile;
use crate::resolver::ItemResolver;

const DIM_FIELD_PATH: &[&str] = &["dmdSec", "mdWrap", "xmlData", "dim", "field"];
const FILE_PATH: &[&str] = &["fileSec", "fileGrp", "file"];

/// Raw embargoedUntil strings of a file, resolving it first if needed.
/// Parsing is left to evaluation so one bad date cannot hide the others.
pub async fn embargo_dates<'a>(resolver: &ItemResolver, file: &'a DataFile) -> Result<&'a [String]> {
    let description = resolver.resolve(&file.item).await?;
    Ok(file
        .embargo_dates
        .get_or_init(|| read_embargo_dates(description)))
}

/// Download links of a file, resolving it first if needed.
pub async fn download_links<'a>(
    resolver: &ItemResolver,
    file: &'a DataFile,
) -> Result<&'a [DownloadLink]> {
    let description = resolver.resolve(&file.item).await?;
    Ok(file
        .download_links
        .get_or_init(|| read_download_links(description)))
}

fn dc_fields<'a>(
    description: &'a XmlElement,
    element: &'a str,
) -> impl Iterator<Item = &'a XmlElement> {
    description
        .find_all(DIM_FIELD_PATH)
        .into_iter()
        .filter(move |f| f.attr("mdschema") == Some("dc") && f.attr("element") == Some(element))
}

pub fn read_embargo_dates(description: &XmlElement) -> Vec<String> {
    dc_fields(description, "date")
        .filter(|f| f.attr("qualifier") == Some("embargoedUntil"))
        .map(|f| f.text().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

/// Distinct DOI values among the description's dc.identifier fields. The
/// same field set also carries handles and citations, which are ignored.
pub fn read_identifiers(description: &XmlElement) -> Vec<String> {
    let mut seen = HashSet::new();
    dc_fields(description, "identifier")
        .map(|f| f.text())
        .filter(|text| text.contains("doi"))
        .filter(|text| seen.insert(text.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn read_download_links(description: &XmlElement) -> Vec<DownloadLink> {
    description
        .find_all(FILE_PATH)
        .into_iter()
        .map(|file| {
            let mut seen = HashSet::new();
            let urls = file
                .children_named("FLocat")
                .map(|locator| UrlVariant {
                    href: locator.attr("href").map(str::to_string),
                    label: locator.attr("label").map(str::to_string),
                    title: locator.attr("title").map(str::to_string),
                })
                .filter(|variant| seen.insert(variant.clone()))
                .collect();

            DownloadLink {
                checksum: file.attr("CHECKSUM").map(str::to_string),
                checksum_type: file.attr("CHECKSUMTYPE").map(str::to_string),
                mime_type: file.attr("MIMETYPE").map(str::to_string),
                size: file.attr("SIZE").and_then(|s| s.trim().parse().ok()),
                id: file.attr("ID").map(str::to_string),
                urls,
            }
        })
        .collect()
}
