// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use anyhow::{Context, Result};
use hyper::{server::conn::Http, Body, Request, Response};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument};

/// Builder pattern so `main.rs` can inject its handler and logging context.
pub struct ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    addr: SocketAddr,
    handler: Option<H>,
    shutdown: CancellationToken,
    dispatch: Option<Dispatch>,
}

impl<H> ServerBuilder<H>
where
    H: Service<Request<Body>, Response = Response<Body>> + Send + Clone + 'static,
    H::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    H::Future: Send + 'static,
{
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            handler: None,
            shutdown: CancellationToken::new(),
            dispatch: None,
        }
    }

    pub fn with_handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The accept loop stops once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Logging context attached to every connection task.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        let handler = self
            .handler
            .context("handler must be set via with_handler()")?;
        let dispatch = self
            .dispatch
            .unwrap_or_else(|| tracing::dispatcher::get_default(|d| d.clone()));

        tracing::info!("HTTP server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };
            let svc = handler.clone();

            // One task per connection.
            tokio::spawn(
                async move {
                    let http = Http::new();
                    if let Err(err) = http.serve_connection(stream, svc).await {
                        tracing::warn!(%peer, %err, "connection error");
                    }
                }
                .in_current_span()
                .with_subscriber(dispatch.clone()),
            );
        }

        tracing::info!("HTTP server stopped accepting connections");
        Ok(())
    }
}
