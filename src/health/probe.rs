// src/health/probe.rs
use crate::config::ServiceConfig;
use crate::health::HealthStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// A single named health check the registry can run.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Never fails: every problem is reported as `Unhealthy`.
    async fn check(&self, cancel: &CancellationToken) -> HealthStatus;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub service: String,
    pub status: HealthStatus,
}

impl ProbeResult {
    pub fn new(service: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            service: service.into(),
            status,
        }
    }
}

/// Maps a downstream response onto the health taxonomy.
///
/// Anything but `200 OK` is unhealthy. A `200` body must be exactly
/// `Healthy` or `Degraded`; no trimming or case folding is applied.
pub fn classify(status: StatusCode, body: &[u8]) -> HealthStatus {
    if status != StatusCode::OK {
        return HealthStatus::Unhealthy;
    }

    match body {
        b"Healthy" => HealthStatus::Healthy,
        b"Degraded" => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

/// HTTP probe for one downstream service, bound to its base address.
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    name: String,
    base_url: Url,
    client: Client,
}

#[derive(Debug)]
enum ProbeFailure {
    Transport(reqwest::Error),
    Status(StatusCode),
    Body(String),
    Cancelled,
}

impl ServiceProbe {
    pub fn new(name: impl Into<String>, base_url: Url, timeout: Duration) -> Result<Self> {
        let name = name.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| format!("Failed to create HTTP client for {}", name))?;

        Ok(Self {
            name,
            base_url,
            client,
        })
    }

    pub fn from_config(config: &ServiceConfig, default_timeout: Duration) -> Result<Self> {
        let timeout = config.timeout().unwrap_or(default_timeout);
        Self::new(config.name.clone(), config.url.clone(), timeout)
    }

    async fn fetch(&self) -> std::result::Result<HealthStatus, ProbeFailure> {
        // Empty relative path: the base address itself.
        let response = self
            .client
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(ProbeFailure::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProbeFailure::Status(status));
        }

        let body = response.bytes().await.map_err(ProbeFailure::Transport)?;
        match classify(status, &body) {
            HealthStatus::Unhealthy => Err(ProbeFailure::Body(
                String::from_utf8_lossy(&body).chars().take(64).collect(),
            )),
            status => Ok(status),
        }
    }
}

#[async_trait]
impl HealthCheck for ServiceProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, cancel: &CancellationToken) -> HealthStatus {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ProbeFailure::Cancelled),
            result = self.fetch() => result,
        };

        match outcome {
            Ok(status) => {
                debug!(service = %self.name, %status, "Probe completed");
                status
            }
            Err(failure) => {
                match failure {
                    ProbeFailure::Transport(e) => {
                        warn!(service = %self.name, error = %e, "Probe request failed")
                    }
                    ProbeFailure::Status(code) => {
                        warn!(service = %self.name, status_code = %code, "Probe returned non-OK status")
                    }
                    ProbeFailure::Body(body) => {
                        warn!(service = %self.name, body = %body, "Probe returned unrecognised body")
                    }
                    ProbeFailure::Cancelled => {
                        debug!(service = %self.name, "Probe cancelled")
                    }
                }
                HealthStatus::Unhealthy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn probe_for(url: &str) -> ServiceProbe {
        ServiceProbe::new("Vote", Url::parse(url).unwrap(), Duration::from_millis(500)).unwrap()
    }

    #[test]
    fn test_classify_exact_match() {
        assert_eq!(classify(StatusCode::OK, b"Healthy"), HealthStatus::Healthy);
        assert_eq!(classify(StatusCode::OK, b"Degraded"), HealthStatus::Degraded);
        assert_eq!(classify(StatusCode::OK, b"Unhealthy"), HealthStatus::Unhealthy);
        assert_eq!(classify(StatusCode::OK, b""), HealthStatus::Unhealthy);
        assert_eq!(classify(StatusCode::OK, b"healthy"), HealthStatus::Unhealthy);
        assert_eq!(classify(StatusCode::OK, b"Healthy\n"), HealthStatus::Unhealthy);
        assert_eq!(classify(StatusCode::OK, b" Degraded"), HealthStatus::Unhealthy);
        assert_eq!(
            classify(StatusCode::OK, br#"{"status":"Healthy"}"#),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_classify_non_ok_status() {
        for code in [
            StatusCode::NO_CONTENT,
            StatusCode::MOVED_PERMANENTLY,
            StatusCode::NOT_FOUND,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert_eq!(classify(code, b"Healthy"), HealthStatus::Unhealthy);
        }
    }

    #[tokio::test]
    async fn test_probe_reads_body() {
        let mut server = Server::new_async().await;
        let healthy = server
            .mock("GET", "/healthy")
            .with_status(200)
            .with_body("Healthy")
            .create_async()
            .await;
        server
            .mock("GET", "/degraded")
            .with_status(200)
            .with_body("Degraded")
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let probe = probe_for(&format!("{}/healthy", server.url()));
        assert_eq!(probe.check(&cancel).await, HealthStatus::Healthy);
        healthy.assert_async().await;

        let probe = probe_for(&format!("{}/degraded", server.url()));
        assert_eq!(probe.check(&cancel).await, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_probe_non_ok_is_unhealthy() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(503)
            .with_body("Healthy")
            .create_async()
            .await;

        let probe = probe_for(&server.url());
        assert_eq!(
            probe.check(&CancellationToken::new()).await,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_probe_connection_refused_is_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = probe_for(&format!("http://{}/", addr));
        assert_eq!(
            probe.check(&CancellationToken::new()).await,
            HealthStatus::Unhealthy
        );
    }

    /// Accepts connections and never answers them.
    async fn silent_backend() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_probe_timeout_is_unhealthy() {
        let addr = silent_backend().await;

        let probe = ServiceProbe::new(
            "Election",
            Url::parse(&format!("http://{}/", addr)).unwrap(),
            Duration::from_millis(100),
        )
        .unwrap();
        assert_eq!(
            probe.check(&CancellationToken::new()).await,
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_cancel_abandons_in_flight_request() {
        let addr = silent_backend().await;
        let probe = ServiceProbe::new(
            "Election",
            Url::parse(&format!("http://{}/", addr)).unwrap(),
            Duration::from_secs(10),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        assert_eq!(probe.check(&cancel).await, HealthStatus::Unhealthy);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
