// Audit: the batch driver.
//
// Discover → expand packages → check each file → write both CSV files.
// Nothing that goes wrong with one file escapes that file's pipeline: the
// failure is logged with identifier, stage and error, and the batch moves
// on. A run therefore reports fewer results than it discovered rather than
// aborting.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rand::Rng;
use tracing::{info, warn};

use embargo_common::{AuditConfig, EmbargoCheckResult, Identifier};

use crate::discovery::{FeedDiscoverer, IndexDiscoverer};
use crate::evaluator::EmbargoEvaluator;
use crate::item::{DataFile, DataPackage, Resolvable};
use crate::report::{classify, write_results_csv};
use crate::resolver::ItemResolver;
use crate::traits::Fetcher;

const PROGRESS_EVERY: usize = 25;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run: String,
    pub discovered: usize,
    pub checked: usize,
    pub skipped: usize,
    pub leaks: usize,
    pub results: Vec<EmbargoCheckResult>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: discovered={} checked={} skipped={} leaks={}",
            self.run, self.discovered, self.checked, self.skipped, self.leaks
        )
    }
}

pub struct Audit {
    config: AuditConfig,
    evaluator: EmbargoEvaluator,
    index: IndexDiscoverer,
    feed: FeedDiscoverer,
}

impl Audit {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: AuditConfig) -> Self {
        let resolver = ItemResolver::new(fetcher.clone(), config.repository.clone());
        Self {
            evaluator: EmbargoEvaluator::new(resolver),
            index: IndexDiscoverer::new(fetcher.clone()),
            feed: FeedDiscoverer::new(fetcher),
            config,
        }
    }

    fn resolver(&self) -> &ItemResolver {
        self.evaluator.resolver()
    }

    /// Files with a future embargoedUntil date according to the search index.
    pub async fn check_search_index(&self, reference: DateTime<Utc>) -> anyhow::Result<RunSummary> {
        let url = self.config.repository.search_index_url();
        let identifiers = self.index.discover(&url).await?;
        info!(
            count = identifiers.len(),
            "Checking items in the search index with an embargoedUntil date in the future"
        );

        self.check_identifiers("solr_index", identifiers, reference).await
    }

    /// Every file of the packages in the recently-published feed.
    pub async fn check_recent_feed(&self, reference: DateTime<Utc>) -> anyhow::Result<RunSummary> {
        let url = self.config.repository.recent_feed_url();
        let packages = self.feed.discover(&url).await?;
        info!(
            count = packages.len(),
            "Checking files in recently published data packages"
        );

        self.check_packages("rss_feed", packages, reference).await
    }

    /// Check file identifiers and write the run's reports.
    pub async fn check_identifiers(
        &self,
        run: &str,
        identifiers: Vec<Identifier>,
        reference: DateTime<Utc>,
    ) -> anyhow::Result<RunSummary> {
        let files = identifiers.into_iter().map(DataFile::with_identifier).collect();
        self.finish_run(run, self.check_files(files, reference).await)
    }

    /// Expand packages to their files, check them, write the run's reports.
    /// A package whose file list cannot be loaded is skipped on its own. A
    /// file listed by several packages is checked once.
    pub async fn check_packages(
        &self,
        run: &str,
        packages: Vec<Identifier>,
        reference: DateTime<Utc>,
    ) -> anyhow::Result<RunSummary> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for identifier in packages {
            let package = DataPackage::with_identifier(identifier);
            match self.resolver().file_locations(&package).await {
                Ok(locations) => {
                    info!(
                        package = %package.item().label(),
                        files = locations.len(),
                        "Expanded package"
                    );
                    files.extend(
                        locations
                            .iter()
                            .filter(|location| seen.insert(location.as_str().to_owned()))
                            .cloned()
                            .map(DataFile::at_location),
                    );
                }
                Err(e) => {
                    warn!(
                        package = %package.item().label(),
                        stage = "package_listing",
                        error = %e,
                        "Skipping package"
                    );
                }
            }
        }

        self.finish_run(run, self.check_files(files, reference).await)
    }

    /// Evaluate files, at most `concurrency` at a time. Output order follows
    /// input order regardless of completion order.
    pub async fn check_files(
        &self,
        files: Vec<DataFile>,
        reference: DateTime<Utc>,
    ) -> (usize, Vec<EmbargoCheckResult>) {
        let discovered = files.len();
        let checked = AtomicUsize::new(0);

        let results: Vec<EmbargoCheckResult> = stream::iter(files)
            .map(|file| {
                let checked = &checked;
                async move {
                    let result = self.check_file(&file, reference).await;
                    if result.is_some() {
                        let n = checked.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % PROGRESS_EVERY == 0 {
                            info!(checked = n, "Checked files");
                        }
                    }
                    result
                }
            })
            .buffered(self.config.concurrency.max(1))
            .filter_map(|result| async move { result })
            .collect()
            .await;

        (discovered, results)
    }

    /// One file's pipeline with retries for transient failures. Work that
    /// succeeded before a failure is cached on the file, so a retry resumes
    /// at the failed stage.
    async fn check_file(
        &self,
        file: &DataFile,
        reference: DateTime<Utc>,
    ) -> Option<EmbargoCheckResult> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 0..max_attempts {
            match self.evaluator.evaluate(file, reference).await {
                Ok(result) => return Some(result),
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let backoff = self.retry_delay(attempt);
                    warn!(
                        file = %file.item().label(),
                        stage = %file.item().stage(),
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        file = %file.item().label(),
                        stage = %file.item().stage(),
                        error = %e,
                        "Skipping file"
                    );
                    return None;
                }
            }
        }

        None
    }

    /// base * 3^attempt, capped at MAX_RETRY_DELAY, plus up to a quarter of
    /// base in jitter.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff;
        let backoff = base
            .saturating_mul(3u32.saturating_pow(attempt))
            .min(MAX_RETRY_DELAY);
        let jitter_ms = (base.as_millis() as u64 / 4).max(1);
        backoff + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }

    fn finish_run(
        &self,
        run: &str,
        (discovered, results): (usize, Vec<EmbargoCheckResult>),
    ) -> anyhow::Result<RunSummary> {
        let (leaks, _clean) = classify(&results);
        let leak_count = leaks.len();

        let all_path = self.config.output_dir.join(format!("embargo_check_{run}.csv"));
        let leaks_path = self.config.output_dir.join(format!("embargo_leaks_{run}.csv"));
        write_results_csv(&all_path, &results)?;
        write_results_csv(&leaks_path, leaks.iter().copied())?;

        if leaks.is_empty() {
            info!(run, path = %all_path.display(), "No embargo leaks detected");
        } else {
            warn!(
                run,
                leaks = leak_count,
                path = %leaks_path.display(),
                "Embargo leak detected"
            );
        }

        Ok(RunSummary {
            run: run.to_string(),
            discovered,
            checked: results.len(),
            skipped: discovered - results.len(),
            leaks: leak_count,
            results,
        })
    }
}
