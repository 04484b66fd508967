// src/health/mod.rs
mod probe;
mod registry;
mod report;
mod status;

pub use probe::{classify, HealthCheck, ProbeResult, ServiceProbe};
pub use registry::{HealthError, HealthRegistry, HealthRegistryBuilder};
pub use report::Report;
pub use status::HealthStatus;
