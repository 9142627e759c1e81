//! Readiness probing.
//!
//! A spawned daemon is not necessarily a serving daemon: distccd forks before
//! its sockets are bound. The probe polls the daemon's endpoint at a fixed
//! interval until it answers or the timeout elapses. There is no backoff and
//! no retry past the timeout.
//!
//! Cancellation is by dropping the future; the supervisor races the probe
//! against incoming signals.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Default pause between probe attempts.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound for a single attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Endpoint a daemon exposes for readiness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeTarget {
    /// Ready once a TCP connection is accepted.
    Tcp {
        /// `host:port`.
        address: String,
    },
    /// Ready once `GET path` answers with a 2xx status.
    Http {
        /// `host:port`.
        address: String,
        /// Request path.
        #[serde(default = "default_http_path")]
        path: String,
    },
}

fn default_http_path() -> String {
    "/".to_string()
}

impl ProbeTarget {
    /// Creates a TCP target.
    #[must_use]
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::Tcp {
            address: address.into(),
        }
    }

    /// Creates an HTTP target for `/`.
    #[must_use]
    pub fn http(address: impl Into<String>) -> Self {
        Self::Http {
            address: address.into(),
            path: default_http_path(),
        }
    }

    /// The `host:port` being probed.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Tcp { address } | Self::Http { address, .. } => address,
        }
    }
}

impl std::fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { address } => write!(f, "tcp://{address}"),
            Self::Http { address, path } => write!(f, "http://{address}{path}"),
        }
    }
}

/// Outcome of one probe cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheckResult {
    /// Whether the endpoint answered in time.
    pub ready: bool,
    /// Time spent probing.
    pub elapsed: Duration,
    /// Last failure seen, if any attempt failed.
    pub last_error: Option<String>,
}

/// Probe gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadinessError {
    /// No attempt succeeded before the timeout.
    #[error("not ready after {}: {}", humantime::format_duration(*elapsed), last_error.as_deref().unwrap_or("no attempt completed"))]
    Timeout {
        /// Time spent probing.
        elapsed: Duration,
        /// Last failure observed.
        last_error: Option<String>,
    },
}

/// Polls a [`ProbeTarget`] until it answers.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    interval: Duration,
    client: reqwest::Client,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_INTERVAL)
    }
}

impl ReadinessProbe {
    /// Creates a probe polling at `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        // probe targets are local addresses, never proxied
        let client = reqwest::Client::builder()
            .no_proxy()
            .user_agent("dccinit")
            .build()
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "falling back to the default HTTP client");
                reqwest::Client::new()
            });
        Self {
            interval,
            client,
        }
    }

    /// Waits until `target` answers or `timeout` elapses.
    ///
    /// # Errors
    /// Returns [`ReadinessError::Timeout`] with the last observed failure.
    pub async fn wait_ready(
        &self,
        target: &ProbeTarget,
        timeout: Duration,
    ) -> Result<Duration, ReadinessError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut last_error = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let budget = ATTEMPT_TIMEOUT.min(remaining);
            match tokio::time::timeout(budget, self.check(target, budget)).await {
                Ok(Ok(())) => {
                    let elapsed = start.elapsed();
                    tracing::debug!(target = %target, elapsed = ?elapsed, "endpoint ready");
                    return Ok(elapsed);
                }
                Ok(Err(e)) => {
                    tracing::trace!(target = %target, error = %e, "probe attempt failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    last_error = Some(format!(
                        "attempt timed out after {}",
                        humantime::format_duration(budget)
                    ));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        Err(ReadinessError::Timeout {
            elapsed: start.elapsed(),
            last_error,
        })
    }

    /// Performs a single attempt against `target`, bounded by `budget`.
    ///
    /// # Errors
    /// Returns a description of why the endpoint is not answering.
    pub async fn check(&self, target: &ProbeTarget, budget: Duration) -> Result<(), String> {
        match target {
            ProbeTarget::Tcp { address } => TcpStream::connect(address.as_str())
                .await
                .map(drop)
                .map_err(|e| format!("connect {address}: {e}")),
            ProbeTarget::Http { address, path } => {
                let url = format!("http://{address}{path}");
                let response = self
                    .client
                    .get(&url)
                    .timeout(budget)
                    .send()
                    .await
                    .map_err(|e| format!("GET {url}: {e}"))?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(format!("GET {url} returned {}", status.as_u16()))
                }
            }
        }
    }

    /// Same as [`wait_ready`](Self::wait_ready), reported as a plain value.
    pub async fn poll(&self, target: &ProbeTarget, timeout: Duration) -> ReadinessCheckResult {
        match self.wait_ready(target, timeout).await {
            Ok(elapsed) => ReadinessCheckResult {
                ready: true,
                elapsed,
                last_error: None,
            },
            Err(ReadinessError::Timeout {
                elapsed,
                last_error,
            }) => ReadinessCheckResult {
                ready: false,
                elapsed,
                last_error,
            },
        }
    }
}
