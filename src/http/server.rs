//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the shared gateway state from configuration
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, metrics, timeout, body limit)
//! - Run the API listener, the admin listener and the retry dispatcher
//!   until shutdown, then snapshot the retry queue

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::aggregation::Aggregator;
use crate::config::GatewayConfig;
use crate::http::handlers;
use crate::lifecycle::shutdown::wait_for;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::{Breakers, RetryDispatcher, RetryPolicy, RetryQueue};
use crate::saga::Orchestrator;
use crate::services::{Services, UpstreamError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<RetryQueue>,
    pub breakers: Breakers,
    pub admin_api_key: Arc<str>,
    pub started_at: Instant,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to set up dependency clients: {0}")]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
    dispatcher: RetryDispatcher,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let services = Services::from_config(&config.services, &config.timeouts)?;
        let breakers = Breakers::from_config(&config.circuit_breaker);
        let queue = Arc::new(RetryQueue::new());
        let policy = RetryPolicy::from(&config.retry);

        let aggregator = Arc::new(Aggregator::new(services.clone(), breakers.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            services.clone(),
            aggregator.clone(),
            queue.clone(),
            policy,
            &config.sagas,
        ));
        let dispatcher = RetryDispatcher::new(
            queue.clone(),
            services.http.clone(),
            policy,
            Duration::from_secs(config.retry.tick_secs),
        );

        let state = AppState {
            aggregator,
            orchestrator,
            queue,
            breakers,
            admin_api_key: Arc::from(config.admin.api_key.as_str()),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            state,
            dispatcher,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/manage/health", get(handlers::health))
            .route("/api/v1/libraries", get(handlers::list_libraries))
            .route("/api/v1/libraries/{library_uid}/books", get(handlers::list_library_books))
            .route(
                "/api/v1/reservations",
                get(handlers::list_reservations).post(handlers::create_reservation),
            )
            .route(
                "/api/v1/reservations/{reservation_uid}/return",
                post(handlers::return_book),
            )
            .route("/api/v1/rating", get(handlers::get_rating))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(config.timeouts.request()))
            .layer(middleware::from_fn(track_metrics))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The API router, for serving or driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn admin_router(&self) -> Router {
        setup_admin_router(self.state.clone())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatcher(&self) -> &RetryDispatcher {
        &self.dispatcher
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run until `shutdown` fires.
    ///
    /// Restores the retry queue snapshot first, and writes it back once the
    /// dispatcher has stopped.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let snapshot = self.config.retry.persistence_path.clone();
        if let Some(path) = &snapshot {
            if let Err(e) = self.state.queue.load_from_file(Path::new(path)) {
                tracing::warn!(path = %path, error = %e, "Failed to restore retry queue, starting empty");
            }
        }

        let dispatcher = tokio::spawn(self.dispatcher.run(shutdown.subscribe()));

        let admin = if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let app = setup_admin_router(self.state.clone());
            let stop = wait_for(shutdown.subscribe());
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, app).with_graceful_shutdown(stop).await
            }))
        } else {
            None
        };

        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown.subscribe()))
            .await;

        // Stop everything else even if the API server failed on its own.
        shutdown.trigger();

        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Retry dispatcher task failed");
        }
        if let Some(admin) = admin {
            match admin.await {
                Ok(Err(e)) => tracing::error!(error = %e, "Admin server error"),
                Err(e) => tracing::error!(error = %e, "Admin server task failed"),
                Ok(Ok(())) => {}
            }
        }

        if let Some(path) = &snapshot {
            if let Err(e) = self.state.queue.save_to_file(Path::new(path)) {
                tracing::error!(path = %path, error = %e, "Failed to save retry queue");
            }
        }

        tracing::info!("HTTP server stopped");
        served.map_err(ServerError::from)
    }
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&method, &route, response.status().as_u16(), start);
    response
}
