//! Fetching distccd's `--stats` page.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::error::{Result, StatsError};

/// Upper bound for one upstream exchange.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// An upstream response, fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Header fields as sent.
    pub headers: HeaderMap,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
}

/// HTTP client for the local stats endpoint.
#[must_use]
pub fn client() -> reqwest::Client {
    // the endpoint is on loopback, never proxied
    reqwest::Client::builder()
        .no_proxy()
        .user_agent(crate::server::COMPONENT)
        .build()
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "falling back to the default HTTP client");
            reqwest::Client::new()
        })
}

/// Requests `/` from the stats endpoint at `addr`.
///
/// # Errors
/// Returns [`StatsError::Upstream`] on connection failure, timeout or a
/// broken response.
pub async fn fetch(client: &reqwest::Client, addr: SocketAddr) -> Result<UpstreamResponse> {
    let response = client
        .get(format!("http://{addr}/"))
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| StatsError::upstream(addr, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| StatsError::upstream(addr, e))?;

    Ok(UpstreamResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
