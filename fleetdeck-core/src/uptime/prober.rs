//! Endpoint probes
//!
//! One probe is one outbound request with its own timeout. Failures are
//! never errors here: they become a `down` result carrying the error text.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::error::{ConnectError, ConnectResult};
use crate::models::{MonitorDefinition, MonitorKind, ProbeStatus};

/// Outcome of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Up or down
    pub status: ProbeStatus,
    /// Latency, measured whatever the outcome
    pub response_ms: u64,
    /// HTTP status code when a response was received
    pub status_code: Option<u16>,
    /// Failure description for down probes
    pub error: Option<String>,
}

impl ProbeResult {
    /// Successful probe
    #[must_use]
    pub const fn up(response_ms: u64, status_code: Option<u16>) -> Self {
        Self {
            status: ProbeStatus::Up,
            response_ms,
            status_code,
            error: None,
        }
    }

    /// Failed probe
    #[must_use]
    pub fn down(response_ms: u64, status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Down,
            response_ms,
            status_code,
            error: Some(error.into()),
        }
    }
}

/// Issues a single request against a monitored endpoint
#[async_trait]
pub trait EndpointProber: Send + Sync {
    /// Probes `monitor` once, honoring its timeout
    async fn probe(&self, monitor: &MonitorDefinition) -> ProbeResult;
}

/// Prober performing real HTTP requests and TCP connects
#[derive(Debug, Clone)]
pub struct NetworkProber {
    client: reqwest::Client,
}

impl NetworkProber {
    /// Creates a prober with a shared HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Transport`] when the TLS backend cannot be
    /// initialised.
    pub fn new() -> ConnectResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fleetdeck/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ConnectError::Transport(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn probe_http(&self, monitor: &MonitorDefinition, timeout: Duration) -> ProbeResult {
        let start = Instant::now();

        let method = match reqwest::Method::from_bytes(monitor.method.trim().as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                return ProbeResult::down(elapsed_ms(start), None, format!("invalid request: {e}"));
            }
        };
        let url = match reqwest::Url::parse(&monitor.url) {
            Ok(url) => url,
            Err(e) => {
                return ProbeResult::down(elapsed_ms(start), None, format!("invalid request: {e}"));
            }
        };

        let result = self
            .client
            .request(method, url)
            .timeout(timeout)
            .send()
            .await;
        let response_ms = elapsed_ms(start);

        match result {
            Ok(response) => {
                let code = response.status().as_u16();
                if code == monitor.expected_status {
                    ProbeResult::up(response_ms, Some(code))
                } else {
                    ProbeResult::down(
                        response_ms,
                        Some(code),
                        format!("expected {}, got {code}", monitor.expected_status),
                    )
                }
            }
            Err(e) => ProbeResult::down(response_ms, None, e.to_string()),
        }
    }
}

#[async_trait]
impl EndpointProber for NetworkProber {
    async fn probe(&self, monitor: &MonitorDefinition) -> ProbeResult {
        let timeout = Duration::from_millis(monitor.timeout_ms.max(1));
        match monitor.kind {
            MonitorKind::Http => self.probe_http(monitor, timeout).await,
            MonitorKind::Tcp => probe_tcp(&monitor.url, timeout).await,
        }
    }
}

/// Accepts `host:port` or `tcp://host:port`
fn tcp_address(target: &str) -> &str {
    let target = target.trim();
    target.strip_prefix("tcp://").unwrap_or(target).trim_end_matches('/')
}

async fn probe_tcp(target: &str, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let address = tcp_address(target);

    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => ProbeResult::up(elapsed_ms(start), None),
        Ok(Err(e)) => ProbeResult::down(elapsed_ms(start), None, e.to_string()),
        Err(_) => ProbeResult::down(
            elapsed_ms(start),
            None,
            format!("connection timed out after {}ms", timeout.as_millis()),
        ),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response per connection
    async fn http_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/health")
    }

    #[tokio::test]
    async fn test_http_expected_status_is_up() {
        let url = http_server("200 OK").await;
        let prober = NetworkProber::new().unwrap();
        let result = prober.probe(&MonitorDefinition::http("api", url)).await;
        assert_eq!(result.status, ProbeStatus::Up);
        assert_eq!(result.status_code, Some(200));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_http_status_mismatch_is_down() {
        let url = http_server("503 Service Unavailable").await;
        let prober = NetworkProber::new().unwrap();
        let result = prober.probe(&MonitorDefinition::http("api", url)).await;
        assert_eq!(result.status, ProbeStatus::Down);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.error.as_deref(), Some("expected 200, got 503"));
    }

    #[tokio::test]
    async fn test_invalid_request_is_down() {
        let prober = NetworkProber::new().unwrap();

        let result = prober.probe(&MonitorDefinition::http("bad", "not a url")).await;
        assert_eq!(result.status, ProbeStatus::Down);
        assert!(result.error.unwrap().starts_with("invalid request: "));

        let mut bad_method = MonitorDefinition::http("bad", "http://127.0.0.1:1/");
        bad_method.method = "GE T".to_string();
        let result = prober.probe(&bad_method).await;
        assert!(result.error.unwrap().starts_with("invalid request: "));
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let prober = NetworkProber::new().unwrap();

        let open = prober
            .probe(&MonitorDefinition::tcp("db", format!("tcp://{addr}")))
            .await;
        assert_eq!(open.status, ProbeStatus::Up);
        assert_eq!(open.status_code, None);

        drop(listener);
        let closed = prober
            .probe(&MonitorDefinition::tcp("db", addr.to_string()))
            .await;
        assert_eq!(closed.status, ProbeStatus::Down);
        assert!(closed.error.is_some());
    }

    #[test]
    fn test_tcp_address_forms() {
        assert_eq!(tcp_address("db.local:5432"), "db.local:5432");
        assert_eq!(tcp_address("tcp://db.local:5432/"), "db.local:5432");
    }
}
