// Uniform request abstraction: every platform exposes its activity feed as
// a cursor-addressed sequence of raw JSON pages.

use std::time::Duration;

use async_trait::async_trait;
use feedloom_common::Platform;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::debug;

use crate::error::{ArchiveError, Result};

pub(crate) const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:130.0) Gecko/20100101 Firefox/130.0";

/// One page of raw upstream records.
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub records: Vec<Value>,
    /// Cursor for the following page. Empty or missing ends the crawl.
    pub next_cursor: Option<String>,
    /// Upstream continuation flag.
    pub has_more: bool,
}

/// An authenticated, paginated activity feed.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Fetch the page addressed by `cursor`; `None` asks for the first page.
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<RawPage>;
}

/// Shared HTTP client. The timeout applies to each request as a whole.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// GET a URL and decode its JSON body. Non-2xx statuses and undecodable
/// bodies are errors.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Value> {
    debug!(url, "GET");
    let resp = client.get(url).headers(headers).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ArchiveError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Malformed(e.to_string()))
}
