//! SPEAR Ranking Service
//!
//! HTTP front for the ranking engine.
//! Handles:
//! - Single and batch ranking runs over JSON activity logs
//! - Rate limiting and concurrency limits
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use spear_common::{
    config::{AppConfig, ObservabilityConfig},
    errors::Result,
    metrics, VERSION,
};
use spear_engine::{CreditKind, SpearConfig};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::watch};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::{create_rate_limiter, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: Option<Arc<GlobalRateLimiter>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: AppConfig, metrics: Option<PrometheusHandle>) -> Result<Self> {
        let limiter = if config.rate_limit.enabled {
            Some(create_rate_limiter(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
            )?)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            limiter,
            metrics,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting SPEAR ranking service v{}",
        VERSION
    );

    // Reject bad ranking defaults before accepting traffic
    config.ranking.credit.parse::<CreditKind>()?;
    let defaults = SpearConfig::try_from(&config.ranking)?;
    info!(
        credit = %config.ranking.credit,
        max_iterations = defaults.solver.max_iterations,
        tolerance = defaults.solver.tolerance,
        "Ranking defaults loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        Some(install_metrics()?)
    } else {
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    // Create app state
    let state = AppState::new(config, metrics_handle)?;
    let shutdown_timeout = state.config.shutdown_timeout();

    // Build the router
    let app = create_router(state);

    // Start the server
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // In-flight requests get `shutdown_timeout` to drain once a signal arrives
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let drain_deadline = async move {
        if shutdown_rx.wait_for(|&stopping| stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server.into_future() => result?,
        _ = drain_deadline => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Shutdown timeout elapsed, dropping in-flight requests"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder and describe all metrics
fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets(metrics::LATENCY_BUCKETS)?
        .install_recorder()?;

    metrics::register_metrics();
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let server = &state.config.server;

    // API routes
    let api_routes = Router::new()
        // Ranking endpoints
        .route("/rank", post(handlers::rank::rank))
        .route("/rank/batch", post(handlers::rank::batch_rank))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .route_layer(from_fn(middleware::metrics::track_requests))

        // Health endpoint (not rate limited)
        .route("/health", get(handlers::health::health));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .route("/metrics", get(handlers::metrics::render))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(server.max_concurrent_requests))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.ranking.max_activities = 50;
    AppState::new(config, None).expect("default config is valid")
}
