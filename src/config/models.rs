// src/config/models.rs
use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Monitored services, in registration order.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on a whole run; unset means wait for every probe.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            deadline_ms: None,
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: Url,

    /// Overrides `health.probe_timeout_ms` for this service.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ServiceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Name of the variable that overrides this service's URL.
    pub fn env_key(&self) -> String {
        format!("HEALTH_SERVICE_{}_URL", self.name.to_uppercase())
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Config {
    /// Applies environment overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup("HEALTH_LISTEN") {
            self.server.listen = listen
                .parse()
                .with_context(|| format!("Invalid HEALTH_LISTEN address: {}", listen))?;
        }

        for service in &mut self.services {
            let key = service.env_key();
            if let Some(url) = lookup(&key) {
                service.url =
                    Url::parse(&url).with_context(|| format!("Invalid URL in {}: {}", key, url))?;
            }
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.health.probe_timeout_ms > 0,
            "health.probe_timeout_ms must be greater than zero"
        );
        if let Some(deadline) = self.health.deadline_ms {
            ensure!(deadline > 0, "health.deadline_ms must be greater than zero");
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                bail!("Service names must not be empty");
            }
            if !names.insert(service.name.as_str()) {
                bail!("Duplicate service name: {}", service.name);
            }
            if !matches!(service.url.scheme(), "http" | "https") {
                bail!(
                    "Service {} has unsupported URL scheme: {}",
                    service.name,
                    service.url.scheme()
                );
            }
            if service.timeout_ms == Some(0) {
                bail!("Service {} has a zero timeout", service.name);
            }
        }

        if self.metrics.enabled {
            ensure!(
                self.metrics.path.starts_with('/'),
                "metrics.path must start with '/'"
            );
            ensure!(
                self.metrics.port != self.server.listen.port(),
                "metrics.port must differ from the server listen port"
            );
        }

        Ok(())
    }
}
