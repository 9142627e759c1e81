//! The `dcc-free-mem` HTTP server.
//!
//! Every `GET` fetches distccd's statistics page and answers with the same
//! page plus a `dcc_free_mem` line:
//!
//! | Upstream | Answer |
//! |----------|--------|
//! | unreachable | `500`, explanation in the body |
//! | empty or not a stats page | `204`, empty body |
//! | already reports `dcc_free_mem` | passed through unchanged |
//! | memory figure unavailable | `203`, unmodified page |
//! | otherwise | upstream status, page with `dcc_free_mem <N> MB` |

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use tokio::net::TcpListener;

use dccinit_platform::Syslog;

use crate::error::{Result, StatsError};
use crate::logs::RequestLog;
use crate::meminfo::{self, PROC_MEMINFO};
use crate::transform::{has_free_mem, inject_free_mem, is_stats_page};
use crate::upstream;

/// Syslog component of the transformer.
pub const COMPONENT: &str = "dcc-free-mem";

/// Where to listen, where to fetch from, where to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    /// Listen address.
    pub listen: SocketAddr,
    /// distccd's `--stats` endpoint.
    pub upstream: SocketAddr,
    /// Access log file.
    pub access_log: PathBuf,
    /// Error log file.
    pub error_log: PathBuf,
    /// Syslog-style file.
    pub system_log: PathBuf,
    /// Kernel memory report.
    pub meminfo: PathBuf,
}

impl StatsConfig {
    /// Listens on all interfaces at `listen_port`, fetches from the local
    /// `stats_port`, logs to the stock locations.
    #[must_use]
    pub fn new(listen_port: u16, stats_port: u16) -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], listen_port)),
            upstream: SocketAddr::from(([127, 0, 0, 1], stats_port)),
            access_log: PathBuf::from("/var/log/access.log"),
            error_log: PathBuf::from("/var/log/error.log"),
            system_log: PathBuf::from("/var/log/syslog"),
            meminfo: PathBuf::from(PROC_MEMINFO),
        }
    }
}

struct AppState {
    client: reqwest::Client,
    upstream: SocketAddr,
    meminfo: PathBuf,
    log: RequestLog,
    warned_unnecessary: AtomicBool,
}

/// A response before it is turned into HTTP.
struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn plain(status: StatusCode, body: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

impl AppState {
    async fn answer(&self, client: IpAddr) -> Reply {
        let port = self.upstream.port();
        let upstream = match upstream::fetch(&self.client, self.upstream).await {
            Ok(response) => response,
            Err(e) => {
                self.log.error(client, &format!("code 500, message {e}"));
                return Reply::plain(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("An exception occurred when querying the --stats server at :{port}\n{e}\n"),
                );
            }
        };
        let status = upstream.status;

        if !is_stats_page(&upstream.body) {
            self.log.error(
                client,
                &format!("--stats at :{port} returned empty or invalid response"),
            );
            return Reply {
                status: StatusCode::NO_CONTENT,
                headers: upstream.headers,
                body: String::new(),
            };
        }

        if has_free_mem(&upstream.body) {
            if !self.warned_unnecessary.swap(true, Ordering::Relaxed) {
                self.log.syslog().log(
                    "'dcc_free_mem' found in the output of native 'distccd', \
                     the wrapper is now unnecessary!",
                );
                self.log.error(client, "dcc-free-mem is unnecessary!");
            }
            return Reply {
                status,
                headers: upstream.headers,
                body: upstream.body,
            };
        }

        match meminfo::available_mib(&self.meminfo).await {
            Ok(mib) => Reply {
                status,
                body: inject_free_mem(&upstream.body, mib),
                headers: upstream.headers,
            },
            Err(e) => {
                self.log.error(client, &format!("failed to get available memory: {e}"));
                Reply {
                    status: StatusCode::NON_AUTHORITATIVE_INFORMATION,
                    headers: upstream.headers,
                    body: upstream.body,
                }
            }
        }
    }
}

/// The transformer, ready to serve.
pub struct StatsServer {
    listen: SocketAddr,
    upstream: SocketAddr,
    state: Arc<AppState>,
}

impl std::fmt::Debug for StatsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsServer")
            .field("listen", &self.listen)
            .field("upstream", &self.upstream)
            .finish_non_exhaustive()
    }
}

impl StatsServer {
    /// Creates the server.
    #[must_use]
    pub fn new(config: StatsConfig) -> Self {
        let syslog = Syslog::new(&config.system_log, COMPONENT);
        let log = RequestLog::new(config.access_log, config.error_log, syslog);
        Self {
            listen: config.listen,
            upstream: config.upstream,
            state: Arc::new(AppState {
                client: upstream::client(),
                upstream: config.upstream,
                meminfo: config.meminfo,
                log,
                warned_unnecessary: AtomicBool::new(false),
            }),
        }
    }

    /// Routes every path to the stats handler.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(serve_stats)
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the listen socket.
    ///
    /// # Errors
    /// Returns [`StatsError::Bind`] if the address is unavailable.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.listen)
            .await
            .map_err(|source| StatsError::Bind {
                addr: self.listen,
                source,
            })
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    /// Returns an I/O error if the accept loop fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        tracing::info!(listen = %local, upstream = %self.upstream, "serving statistics");
        self.state
            .log
            .syslog()
            .log(format!("listening on {local}, upstream {}", self.upstream));

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("stopped");
        Ok(())
    }

    /// Binds and serves until `shutdown` resolves.
    ///
    /// # Errors
    /// Returns an error if binding or serving fails.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

async fn serve_stats(
    State(state): State<Arc<AppState>>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let request_line = format!(
        "{} {} {:?}",
        request.method(),
        request.uri(),
        request.version()
    );
    let client = client.ip();

    let reply = if request.method() == Method::GET {
        state.answer(client).await
    } else {
        Reply::plain(
            StatusCode::NOT_IMPLEMENTED,
            format!("Unsupported method ({})\n", request.method()),
        )
    };

    state
        .log
        .access(client, &request_line, reply.status.as_u16(), Some(reply.body.len()));
    into_response(reply)
}

/// Headers describing the upstream connection rather than the content.
fn is_hop_header(name: &HeaderName) -> bool {
    [header::CONTENT_LENGTH, header::TRANSFER_ENCODING, header::CONNECTION].contains(name)
}

fn into_response(reply: Reply) -> Response {
    let length = reply.body.len();
    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() = reply.status;

    let headers = response.headers_mut();
    for (name, value) in &reply.headers {
        if !is_hop_header(name) {
            headers.append(name, value.clone());
        }
    }
    if reply.status != StatusCode::NO_CONTENT {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = StatsConfig::new(3633, 3634);
        assert_eq!(config.listen.port(), 3633);
        assert!(config.listen.ip().is_unspecified());
        assert_eq!(config.upstream, SocketAddr::from(([127, 0, 0, 1], 3634)));
        assert_eq!(config.access_log, PathBuf::from("/var/log/access.log"));
    }

    #[test]
    fn test_into_response_recomputes_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        let reply = Reply {
            status: StatusCode::OK,
            headers,
            body: "hello\n".into(),
        };
        let response = into_response(reply);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_no_content_has_no_length() {
        let reply = Reply {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: String::new(),
        };
        let response = into_response(reply);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    }
}
