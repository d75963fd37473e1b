//! HTTP surface: `GET /list`.

use super::{Aggregator, RemoteStorage, SnapshotSource};
use crate::config::AggregatorConfig;
use crate::error::ServiceError;
use crate::service::Runnable;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Set to `true` when the body is the cached listing
pub const STALE_HEADER: &str = "x-filewatch-stale";

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/list", get(list_files))
        .layer(TraceLayer::new_for_http())
        .with_state(aggregator)
}

async fn list_files(State(aggregator): State<Arc<Aggregator>>) -> Response {
    let listing = match aggregator.list().await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(error = %e, "No listing to serve");
            return (StatusCode::BAD_GATEWAY, "Server unreachable").into_response();
        }
    };

    let body = match serde_json::to_vec(listing.nodes()) {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to encode listing");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode listing").into_response();
        }
    };

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();
    if listing.is_stale() {
        response.headers_mut().insert(
            HeaderName::from_static(STALE_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    response
}

pub struct AggregatorService {
    config: AggregatorConfig,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl AggregatorService {
    pub fn initialize(config: AggregatorConfig) -> Self {
        let source = RemoteStorage::new(
            config.storage_address.clone(),
            Duration::from_millis(config.request_timeout_ms),
        );
        Self::with_source(config, Arc::new(source))
    }

    /// Pull from `source` instead of the configured storage address.
    pub fn with_source(config: AggregatorConfig, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            config,
            aggregator: Arc::new(Aggregator::new(source)),
            cancel: CancellationToken::new(),
            server: None,
            local_addr: None,
        }
    }

    /// Bound address, once running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl Runnable for AggregatorService {
    fn name(&self) -> &'static str {
        "aggregator"
    }

    async fn run(&mut self) -> Result<(), ServiceError> {
        if self.server.is_some() {
            return Err(ServiceError::AlreadyRunning(self.name()));
        }

        let bind_error = |source| ServiceError::Bind {
            address: self.config.listen_address.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.config.listen_address)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        self.local_addr = Some(local_addr);

        let app = router(Arc::clone(&self.aggregator));
        let shutdown = self.cancel.clone().cancelled_owned();
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "HTTP server failed");
            }
        }));
        info!(
            address = %local_addr,
            storage = %self.config.storage_address,
            "Aggregator listening"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            if let Err(e) = server.await {
                error!(error = %e, "HTTP server task failed");
            }
            info!("Aggregator stopped");
        }
    }
}
