pub mod builder;
pub mod handler;

pub use builder::ServerBuilder;
pub use handler::{HealthHandler, HEALTH_PATH, JSON_CONTENT_TYPE};
