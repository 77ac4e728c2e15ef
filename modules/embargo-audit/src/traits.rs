// Fetcher replaces a concrete RepositoryClient so the whole pipeline can run
// against MockFetcher in tests: no network, deterministic responses.

use async_trait::async_trait;
use embargo_common::{AuditError, Result};
use repository_client::{Fetched, RepositoryClient};

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET a document. Transport failures are errors; HTTP statuses are not.
    async fn get(&self, url: &str) -> repository_client::Result<Fetched>;

    /// Reachability probe. Returns the status of the first response.
    async fn head(&self, url: &str) -> repository_client::Result<u16>;
}

#[async_trait]
impl Fetcher for RepositoryClient {
    async fn get(&self, url: &str) -> repository_client::Result<Fetched> {
        RepositoryClient::get(self, url).await
    }

    async fn head(&self, url: &str) -> repository_client::Result<u16> {
        RepositoryClient::head(self, url).await
    }
}

/// GET a metadata document body. A non-2xx response is an `HttpStatus`
/// error; an error page is never a usable metadata document.
pub(crate) async fn fetch_body(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<u8>> {
    let fetched = fetcher
        .get(url)
        .await
        .map_err(|e| AuditError::transport(url, e))?;

    if !fetched.is_success() {
        return Err(AuditError::HttpStatus {
            url: url.to_string(),
            status: fetched.status,
        });
    }

    Ok(fetched.body)
}
