pub mod error;

pub use error::{ClientError, Result};

use std::time::Duration;

/// A fetched document. Non-success statuses are returned, not raised;
/// callers decide whether a 404 body is usable.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Fetched {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct RepositoryClient {
    client: reqwest::Client,
    probe_client: reqwest::Client,
}

impl RepositoryClient {
    /// Every request carries `user_agent` so the repository can tell audit
    /// traffic apart from ordinary downloads.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        // Probes report the first response as served, so a redirect to a
        // login page shows up as a 3xx rather than the login page's 200.
        let probe_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            probe_client,
        })
    }

    /// GET a document and return its raw body with the response status.
    pub async fn get(&self, url: &str) -> Result<Fetched> {
        tracing::debug!(url, "GET");

        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();

        Ok(Fetched { status, body })
    }

    /// HEAD a URL and return the status code of the first response.
    pub async fn head(&self, url: &str) -> Result<u16> {
        tracing::debug!(url, "HEAD");

        let resp = self.probe_client.head(url).send().await?;
        Ok(resp.status().as_u16())
    }
}
