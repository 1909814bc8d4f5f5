//! knotstats relay server.
//!
//! Serves the dashboard page at `/` and relays the resolver's statistics at
//! `/api/stats`. Every poll performs one upstream fetch bounded by the
//! configured timeout; nothing is cached or retained between requests.

use anyhow::{Context, anyhow};
use axum::{Router, body::Body, extract::MatchedPath, http::Request};
use listenfd::ListenFd;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, error, info};

pub mod api;
pub mod config;
pub mod errors;
pub mod ui;
pub mod upstream;

#[cfg(test)]
pub mod test_helpers;

pub use config::RelayConfig;
pub use errors::RelayError;
pub use ui::TemplateEnv;
pub use upstream::{FetchedStats, UpstreamClient};

/// Process-scoped state, built once at startup and shared read-only by handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub upstream: UpstreamClient,
    pub template_env: TemplateEnv,
}

impl AppState {
    pub fn new(config: RelayConfig) -> anyhow::Result<Self> {
        let upstream = UpstreamClient::new(config.upstream_url.clone(), config.upstream_timeout())
            .context("Failed to build upstream HTTP client")?;
        let template_env = TemplateEnv::from_config(&config)
            .map_err(|e| anyhow!("Failed to set up templates: {}", e))?;
        Ok(Self {
            config: Arc::new(config),
            upstream,
            template_env,
        })
    }
}

/// All routes with tracing and panic handling applied.
pub fn app_router(state: AppState) -> Router {
    let routes = Router::new()
        .merge(ui::ui_router())
        .nest("/api", api::api_router())
        .with_state(state);
    with_relay_layers(routes)
}

/// Request tracing, plus a JSON 500 instead of a dropped connection when a
/// handler panics.
pub fn with_relay_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str)
                        .unwrap_or(request.uri().path());

                    tracing::debug_span!(
                        "http-request",
                        method = %request.method(),
                        uri = %request.uri(),
                        matched_path = matched_path,
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(tower_http::LatencyUnit::Micros),
                )
                .on_failure(
                    |error: tower_http::classify::ServerErrorsFailureClass,
                     latency: Duration,
                     span: &Span| {
                        tracing::warn!(parent: span, latency = ?latency, error = ?error, "Request failed");
                    },
                ),
        )
}

/// Use a socket handed over by systemd if there is one, otherwise bind.
async fn acquire_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let mut listenfd = ListenFd::from_env();
    match listenfd.take_tcp_listener(0) {
        Ok(Some(listener)) => {
            info!("Acquired socket via socket activation");
            listener
                .set_nonblocking(true)
                .context("Failed to set inherited socket non-blocking")?;
            TcpListener::from_std(listener).context("Failed to convert TCP listener")
        }
        Ok(None) => TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr)),
        Err(e) => Err(anyhow!("Failed to take TCP listener from env: {}", e)),
    }
}

pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    info!("Fetching stats from: {}", config.upstream_url);
    info!("Upstream timeout: {} ms", config.upstream_timeout_ms);

    let listen_addr = config.listen_addr;
    let state = AppState::new(config)?;
    let app = app_router(state);

    let listener = acquire_listener(listen_addr).await?;
    info!(
        "knotstats listening on http://{}",
        listener.local_addr().context("Failed to get local address")?
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down, waiting for in-flight polls");

    // In-flight polls are bounded by the upstream timeout; don't wait forever.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        error!("Forcing exit after timeout");
        std::process::exit(0);
    });
}
