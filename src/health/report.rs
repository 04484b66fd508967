// src/health/report.rs
use crate::health::{HealthStatus, ProbeResult};
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};

/// Outcome of one aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    status: HealthStatus,
    results: Vec<ProbeResult>,
}

impl Report {
    /// Aggregates results in the order given. An empty set is `Healthy`.
    pub fn from_results(results: Vec<ProbeResult>) -> Self {
        let status = results
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self { status, results }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn get(&self, service: &str) -> Option<HealthStatus> {
        self.results
            .iter()
            .find(|r| r.service == service)
            .map(|r| r.status)
    }

    pub fn count(&self, status: HealthStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Pretty-printed UTF-8 JSON: `{"status": ..., "results": {name: status}}`.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

struct ResultsMap<'a>(&'a [ProbeResult]);

impl Serialize for ResultsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(&result.service, &result.status)?;
        }
        map.end()
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_struct("Report", 2)?;
        report.serialize_field("status", &self.status)?;
        report.serialize_field("results", &ResultsMap(&self.results))?;
        report.end()
    }
}
