// src/telemetry/mod.rs
// Logging context built once at startup and handed to whatever needs it;
// nothing is installed as the process-wide default subscriber.
use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::io::{self, Write};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

pub const SERVICE_NAME: &str = "Health";

pub struct Telemetry {
    dispatch: Dispatch,
}

impl Telemetry {
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let filter = EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log filter: {}", config.level))?
            .add_directive("hyper=info".parse()?)
            .add_directive("reqwest=info".parse()?);

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let dispatch = match config.format {
            LogFormat::Text => Dispatch::new(builder.finish()),
            LogFormat::Json => Dispatch::new(builder.json().finish()),
        };

        Ok(Self { dispatch })
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch.clone()
    }

    /// Runs `f` with this context as the current subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Flushes buffered output. Call on every exit path.
    pub fn shutdown(self) -> io::Result<()> {
        io::stdout().flush()?;
        io::stderr().flush()
    }
}
