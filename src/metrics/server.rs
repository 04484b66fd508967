// src/metrics/server.rs
use super::MetricsRegistry;
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch, Instrument};

fn metrics_response(registry: &MetricsRegistry, path: &str, req: &Request<Body>) -> Response<Body> {
    if req.uri().path() != path {
        let mut response = Response::new(Body::from("Not Found"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    }

    match registry.gather() {
        Ok(metrics) => {
            let mut response = Response::new(Body::from(metrics));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// Serves the prometheus exposition on its own listener until `shutdown` fires.
pub async fn start_metrics_server(
    addr: SocketAddr,
    registry: Arc<MetricsRegistry>,
    path: String,
    shutdown: CancellationToken,
    dispatch: Dispatch,
) -> Result<()> {
    let path = Arc::new(path);
    let service_path = path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let response = metrics_response(&registry, path.as_str(), &req);
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });

    let server = Server::try_bind(&addr)?
        .serve(make_service)
        .with_graceful_shutdown(async move { shutdown.cancelled().await });

    info!("Metrics server listening on http://{}{}", addr, path.as_str());

    tokio::spawn(
        async move {
            if let Err(e) = server.await {
                error!("Metrics server error: {}", e);
            }
        }
        .in_current_span()
        .with_subscriber(dispatch),
    );

    Ok(())
}
