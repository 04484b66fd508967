// src/server/handler.rs
use crate::health::{HealthError, HealthRegistry, Report};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{error, info, Instrument};

pub const HEALTH_PATH: &str = "/health";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Serves the aggregated health document at `GET /health`.
#[derive(Clone)]
pub struct HealthHandler {
    registry: Arc<HealthRegistry>,
    shutdown: CancellationToken,
}

impl HealthHandler {
    pub fn new(registry: Arc<HealthRegistry>) -> Self {
        Self {
            registry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling `shutdown` fails every in-flight run with 503.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        if req.uri().path() != HEALTH_PATH {
            return text_response(StatusCode::NOT_FOUND, "Not Found");
        }

        if req.method() != Method::GET && req.method() != Method::HEAD {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        match self.registry.run_all(&self.shutdown).await {
            Ok(report) => report_response(&report),
            Err(e) => e.into(),
        }
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

fn report_response(report: &Report) -> Response<Body> {
    match report.to_json() {
        Ok(json) => {
            let mut response = Response::new(Body::from(json));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            response
        }
        Err(e) => {
            error!(%e, "Failed to serialize health report");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

// No health document is written when the run itself fails.
impl From<HealthError> for Response<Body> {
    fn from(err: HealthError) -> Self {
        match err {
            HealthError::Cancelled => {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
            HealthError::DeadlineExceeded(_) => {
                text_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout")
            }
        }
    }
}

impl Service<Request<Body>> for HealthHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        let span = tracing::info_span!("request", request_id = %uuid::Uuid::new_v4());

        Box::pin(
            async move {
                let started = Instant::now();
                let method = req.method().clone();
                let path = req.uri().path().to_string();

                let response = handler.handle(req).await;

                info!(
                    %method,
                    %path,
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "HTTP request handled"
                );
                Ok(response)
            }
            .instrument(span),
        )
    }
}
