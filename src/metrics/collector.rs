// src/metrics/collector.rs
use crate::health::{HealthError, HealthStatus, Report};
use anyhow::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Probe metrics
    pub probes_total: IntCounterVec,
    pub probe_duration_seconds: HistogramVec,
    pub service_status: IntGaugeVec,

    // Run metrics
    pub runs_total: IntCounterVec,
    pub aggregate_status: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let probes_total = IntCounterVec::new(
            Opts::new("health_probes_total", "Total service probes by outcome"),
            &["service", "status"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "health_probe_duration_seconds",
                "Service probe duration in seconds",
            ),
            &["service"],
        )?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;

        let service_status = IntGaugeVec::new(
            Opts::new(
                "health_service_status",
                "Last observed service status (0=healthy, 1=degraded, 2=unhealthy)",
            ),
            &["service"],
        )?;
        registry.register(Box::new(service_status.clone()))?;

        let runs_total = IntCounterVec::new(
            Opts::new("health_runs_total", "Total aggregation runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let aggregate_status = IntGauge::new(
            "health_aggregate_status",
            "Last aggregate status (0=healthy, 1=degraded, 2=unhealthy)",
        )?;
        registry.register(Box::new(aggregate_status.clone()))?;

        Ok(Self {
            probes_total,
            probe_duration_seconds,
            service_status,
            runs_total,
            aggregate_status,
        })
    }

    pub fn record_probe(&self, service: &str, status: HealthStatus, duration: Duration) {
        self.probes_total
            .with_label_values(&[service, status.as_str()])
            .inc();

        self.probe_duration_seconds
            .with_label_values(&[service])
            .observe(duration.as_secs_f64());

        self.service_status
            .with_label_values(&[service])
            .set(status.severity());
    }

    pub fn record_run(&self, outcome: &Result<Report, HealthError>) {
        let label = match outcome {
            Ok(report) => {
                self.aggregate_status.set(report.status().severity());
                "ok"
            }
            Err(HealthError::Cancelled) => "cancelled",
            Err(HealthError::DeadlineExceeded(_)) => "deadline_exceeded",
        };

        self.runs_total.with_label_values(&[label]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProbeResult;

    #[test]
    fn test_records_probe_and_run() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();

        metrics.record_probe("Vote", HealthStatus::Degraded, Duration::from_millis(12));
        metrics.record_run(&Ok(Report::from_results(vec![ProbeResult::new(
            "Vote",
            HealthStatus::Degraded,
        )])));
        metrics.record_run(&Err(HealthError::Cancelled));

        assert_eq!(
            metrics
                .probes_total
                .with_label_values(&["Vote", "Degraded"])
                .get(),
            1
        );
        assert_eq!(metrics.service_status.with_label_values(&["Vote"]).get(), 1);
        assert_eq!(metrics.aggregate_status.get(), 1);
        assert_eq!(metrics.runs_total.with_label_values(&["cancelled"]).get(), 1);

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("health_probes_total"));
        assert!(text.contains("service=\"Vote\""));
    }
}
