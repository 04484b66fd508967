// src/health/registry.rs
use crate::config::Config;
use crate::health::{HealthCheck, HealthStatus, ProbeResult, Report, ServiceProbe};
use crate::metrics::MetricsCollector;
use anyhow::{bail, Result};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check run was cancelled")]
    Cancelled,

    #[error("Health check run exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

/// Ordered set of health checks, run together to produce a [`Report`].
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
    deadline: Option<Duration>,
    metrics: Option<Arc<MetricsCollector>>,
}

#[derive(Default)]
pub struct HealthRegistryBuilder {
    checks: Vec<Arc<dyn HealthCheck>>,
    deadline: Option<Duration>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<HealthRegistry> {
        let mut seen = HashSet::new();
        for check in &self.checks {
            if !seen.insert(check.name().to_string()) {
                bail!("Health check '{}' registered more than once", check.name());
            }
        }

        Ok(HealthRegistry {
            checks: self.checks,
            deadline: self.deadline,
            metrics: self.metrics,
        })
    }
}

impl HealthRegistry {
    pub fn builder() -> HealthRegistryBuilder {
        HealthRegistryBuilder::new()
    }

    /// One [`ServiceProbe`] per configured service, in configuration order.
    pub fn from_config(config: &Config, metrics: Option<Arc<MetricsCollector>>) -> Result<Self> {
        let mut builder = HealthRegistryBuilder::new();

        for service in &config.services {
            let probe = ServiceProbe::from_config(service, config.health.probe_timeout())?;
            debug!(service = %service.name, url = %service.url, "Registered service probe");
            builder = builder.register(Arc::new(probe));
        }

        if let Some(deadline) = config.health.deadline() {
            builder = builder.with_deadline(deadline);
        }
        if let Some(metrics) = metrics {
            builder = builder.with_metrics(metrics);
        }

        builder.build()
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check exactly once, concurrently, and waits for all of them.
    ///
    /// Fails only if `cancel` fires or the deadline elapses first; an
    /// unreachable service lowers its status instead.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<Report, HealthError> {
        let started = Instant::now();
        let child = cancel.child_token();
        // Dropping the guard abandons in-flight probes on every exit path.
        let _guard = child.clone().drop_guard();

        let probes = join_all(self.checks.iter().map(|check| {
            let child = &child;
            async move {
                let probe_started = Instant::now();
                let status = check.check(child).await;
                if let Some(metrics) = &self.metrics {
                    metrics.record_probe(check.name(), status, probe_started.elapsed());
                }
                ProbeResult::new(check.name(), status)
            }
        }));

        let deadline = async {
            match self.deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => futures::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HealthError::Cancelled),
            _ = deadline => Err(HealthError::DeadlineExceeded(self.deadline.unwrap_or_default())),
            results = probes => Ok(Report::from_results(results)),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_run(&outcome);
        }

        match &outcome {
            Ok(report) => info!(
                aggregate = %report.status(),
                healthy = report.count(HealthStatus::Healthy),
                degraded = report.count(HealthStatus::Degraded),
                unhealthy = report.count(HealthStatus::Unhealthy),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Health check run complete"
            ),
            Err(e) => info!(
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Health check run aborted"
            ),
        }

        outcome
    }
}
