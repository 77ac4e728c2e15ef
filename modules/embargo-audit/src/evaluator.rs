// EmbargoEvaluator: dates + links + reference time → EmbargoCheckResult.
//
// Probes are only issued when a leak is suspected (active embargo and at
// least one download link). The evaluator gathers evidence; classifying a
// result as a leak is report::classify's job.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use embargo_common::{DownloadLink, EmbargoCheckResult, ProbeOutcome, Result};

use crate::extractor;
use crate::item::{DataFile, Resolvable};
use crate::resolver::ItemResolver;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unrecognized embargo date {0:?}")]
pub struct DateParseError(pub String);

pub struct EmbargoEvaluator {
    resolver: ItemResolver,
}

impl EmbargoEvaluator {
    pub fn new(resolver: ItemResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &ItemResolver {
        &self.resolver
    }

    /// Check one file against `reference`. Resolution errors propagate; date
    /// and probe failures do not.
    pub async fn evaluate(
        &self,
        file: &DataFile,
        reference: DateTime<Utc>,
    ) -> Result<EmbargoCheckResult> {
        let dates = extractor::embargo_dates(&self.resolver, file).await?;
        let links = extractor::download_links(&self.resolver, file).await?;
        let label = file.item().label();

        debug!(
            file = %label,
            count = dates.len(),
            dates = %dates.join(","),
            "Embargo dates"
        );
        for variant in links.iter().flat_map(|l| &l.urls) {
            debug!(
                file = %label,
                title = variant.title.as_deref().unwrap_or(""),
                label = variant.label.as_deref().unwrap_or(""),
                href = variant.href.as_deref().unwrap_or(""),
                "Download link"
            );
        }

        let scan = scan_embargo_dates(dates, reference);
        for e in &scan.unparseable {
            warn!(file = %label, error = %e, "Skipping embargo date");
        }
        let embargo_active = scan.active;
        let has_download_links = !links.is_empty();

        let probes = if embargo_active && has_download_links {
            info!(
                file = %label,
                links = links.len(),
                "Found download links for embargoed data file"
            );
            let probes = self.probe_links(links).await;
            info!(
                file = %label,
                reachable = probes.iter().filter(|p| p.is_reachable()).count(),
                failed = probes.iter().filter(|p| p.is_failure()).count(),
                "Probed download links"
            );
            probes
        } else {
            Vec::new()
        };

        Ok(EmbargoCheckResult {
            file: file.identifier().cloned(),
            embargo_dates: dates.to_vec(),
            embargo_active,
            has_download_links,
            probes,
        })
    }

    /// HEAD every URL variant of every link. A failed probe becomes a
    /// failed-status entry; the remaining probes still run.
    async fn probe_links(&self, links: &[DownloadLink]) -> Vec<ProbeOutcome> {
        let mut outcomes = Vec::new();

        for variant in links.iter().flat_map(|l| &l.urls) {
            let Some(href) = variant.href.as_deref() else {
                outcomes.push(ProbeOutcome::failed("", "link variant has no href"));
                continue;
            };

            let url = match self.resolver.repository().absolute(href) {
                Ok(url) => url,
                Err(e) => {
                    warn!(href, error = %e, "Unresolvable download link");
                    outcomes.push(ProbeOutcome::failed(href, e.to_string()));
                    continue;
                }
            };

            match self.resolver.fetcher().head(&url).await {
                Ok(status) => outcomes.push(ProbeOutcome::status(url, status)),
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "Probe failed");
                    outcomes.push(ProbeOutcome::failed(url, e.to_string()));
                }
            }
        }

        outcomes
    }
}

/// Outcome of scanning a file's embargo dates against a reference time.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DateScan {
    /// Some parseable date lies strictly after the reference.
    pub active: bool,
    /// Dates that could not be parsed, up to the first active one.
    pub unparseable: Vec<DateParseError>,
}

/// Scan dates in order, stopping at the first one strictly after
/// `reference`. Unparseable dates are collected and skipped.
pub fn scan_embargo_dates(dates: &[String], reference: DateTime<Utc>) -> DateScan {
    let mut scan = DateScan::default();
    for raw in dates {
        match parse_embargo_date(raw) {
            Ok(date) if date > reference => {
                scan.active = true;
                break;
            }
            Ok(_) => {}
            Err(e) => scan.unparseable.push(e),
        }
    }
    scan
}

/// Parse an embargoedUntil value. Accepts RFC 3339 timestamps, naive
/// timestamps (taken as UTC), `YYYY-MM-DD`, `YYYY-MM` and `YYYY`; partial
/// dates mean the start of the period.
pub fn parse_embargo_date(raw: &str) -> std::result::Result<DateTime<Utc>, DateParseError> {
    let value = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc());
        }
    }

    let date = match value.len() {
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        4 if value.bytes().all(|b| b.is_ascii_digit()) => value
            .parse()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        _ => None,
    };

    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| DateParseError(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn dates(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn embargo_active(dates: &[String], reference: DateTime<Utc>) -> bool {
        scan_embargo_dates(dates, reference).active
    }

    #[test]
    fn no_dates_is_inactive() {
        assert!(!embargo_active(&[], reference()));
    }

    #[test]
    fn past_dates_are_inactive() {
        assert!(!embargo_active(&dates(&["2020-01-01", "2023-12-31"]), reference()));
    }

    #[test]
    fn date_equal_to_reference_is_inactive() {
        assert!(!embargo_active(&dates(&["2024-01-01"]), reference()));
    }

    #[test]
    fn any_future_date_activates() {
        assert!(embargo_active(&dates(&["2020-01-01", "2099-01-01"]), reference()));
        assert!(embargo_active(&dates(&["2099-01-01", "2020-01-01"]), reference()));
    }

    #[test]
    fn malformed_date_does_not_mask_valid_future_date() {
        assert!(embargo_active(&dates(&["not-a-date", "2099-01-01"]), reference()));
        assert!(!embargo_active(&dates(&["not-a-date"]), reference()));
    }

    #[test]
    fn unparseable_dates_are_reported_for_logging() {
        let scan = scan_embargo_dates(&dates(&["soon", "2020-01-01", "2099-01-01", "later"]), reference());
        assert!(scan.active);
        assert_eq!(scan.unparseable, vec![DateParseError("soon".into())]);

        let scan = scan_embargo_dates(&dates(&["soon", "later"]), reference());
        assert!(!scan.active);
        assert_eq!(
            scan.unparseable,
            vec![DateParseError("soon".into()), DateParseError("later".into())]
        );
    }

    #[test]
    fn parses_repository_date_shapes() {
        let expect = Utc.with_ymd_and_hms(2014, 9, 25, 0, 0, 0).unwrap();
        assert_eq!(parse_embargo_date("2014-09-25").unwrap(), expect);
        assert_eq!(parse_embargo_date(" 2014-09-25 ").unwrap(), expect);
        assert_eq!(parse_embargo_date("2014-09-25T00:00:00Z").unwrap(), expect);
        assert_eq!(parse_embargo_date("2014-09-25T00:00:00").unwrap(), expect);
        assert_eq!(
            parse_embargo_date("2014-09").unwrap(),
            Utc.with_ymd_and_hms(2014, 9, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_embargo_date("2014").unwrap(),
            Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn offsets_are_normalized_to_utc() {
        assert_eq!(
            parse_embargo_date("2014-09-25T02:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2014, 9, 25, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_embargo_date("forever").unwrap_err(),
            DateParseError("forever".into())
        );
        assert!(parse_embargo_date("").is_err());
        assert!(parse_embargo_date("2014-13-45").is_err());
    }
}
