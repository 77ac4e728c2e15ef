use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use embargo_audit::{Audit, RunSummary};
use embargo_common::{AuditConfig, Identifier};
use repository_client::RepositoryClient;

#[derive(Parser)]
#[command(
    name = "embargo-audit",
    about = "Check that embargoed data files have no reachable download links"
)]
struct Cli {
    /// Directory for the CSV reports (overrides OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the search-index check
    #[arg(long)]
    skip_index: bool,

    /// Skip the recently-published feed check
    #[arg(long)]
    skip_feed: bool,

    /// Check only these packages (repeatable). Disables the index and feed checks.
    #[arg(long = "package", value_name = "IDENTIFIER")]
    packages: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();

    let mut config = AuditConfig::from_env()?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let client = RepositoryClient::new(&config.user_agent, config.http_timeout)
        .context("Failed to build repository client")?;
    let audit = Audit::new(Arc::new(client), config);

    let now = chrono::Utc::now();
    info!(reference = %now, "Embargo audit starting");

    if !cli.packages.is_empty() {
        let packages = cli.packages.iter().map(|p| Identifier::new(p.as_str())).collect();
        let summary = audit.check_packages("packages", packages, now).await?;
        info!("Run complete. {summary}");
        return Ok(());
    }

    let mut failed_runs = 0;

    if !cli.skip_index {
        failed_runs += report(audit.check_search_index(now).await, "solr_index");
    }
    if !cli.skip_feed {
        failed_runs += report(audit.check_recent_feed(now).await, "rss_feed");
    }

    if failed_runs > 0 {
        anyhow::bail!("{failed_runs} run(s) failed before any file could be checked");
    }
    Ok(())
}

/// Log a run's outcome. Returns 1 when the run itself failed.
fn report(outcome: Result<RunSummary>, run: &str) -> usize {
    match outcome {
        Ok(summary) => {
            info!("Run complete. {summary}");
            0
        }
        Err(e) => {
            error!(run, error = %format!("{e:#}"), "Run failed");
            1
        }
    }
}
