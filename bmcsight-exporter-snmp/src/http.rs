//! HTTP server exposing the scrape endpoint.
//!
//! `GET {path}?type=qct&host=10.0.0.5&secret=public` (or the same fields as a
//! POST form body) walks the device and answers with its metrics.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{HEALTH_PATH, PROFILES_PATH};
use crate::error::{ProfileError, ScrapeError};
use crate::metric::render;
use crate::profile::ProfileRegistry;
use crate::scrape::{ScrapeTarget, scrape};
use crate::walker::OidWalker;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
struct AppState<W> {
    registry: Arc<ProfileRegistry>,
    walker: Arc<W>,
    scrape_timeout: Duration,
}

impl<W> Clone for AppState<W> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            walker: self.walker.clone(),
            scrape_timeout: self.scrape_timeout,
        }
    }
}

/// Why a scrape request produced no metrics.
#[derive(Debug)]
enum ScrapeFailure {
    MissingParam(&'static str),
    Profile(ProfileError),
    Collection(ScrapeError),
    Timeout(Duration),
}

impl IntoResponse for ScrapeFailure {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ScrapeFailure::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                format!("missing parameter '{}'", name),
            ),
            ScrapeFailure::Profile(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ScrapeFailure::Collection(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            ScrapeFailure::Timeout(limit) => (
                StatusCode::GATEWAY_TIMEOUT,
                format!("scrape exceeded {}s", limit.as_secs_f64()),
            ),
        };
        (status, format!("{}\n", message)).into_response()
    }
}

/// Create the HTTP router.
fn create_router<W>(state: AppState<W>, metrics_path: &str) -> Router
where
    W: OidWalker + 'static,
{
    Router::new()
        .route(
            metrics_path,
            get(metrics_handler::<W>).post(metrics_handler::<W>),
        )
        .route(HEALTH_PATH, get(health_handler))
        .route(PROFILES_PATH, get(profiles_handler::<W>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn required<'a>(
    params: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ScrapeFailure> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(ScrapeFailure::MissingParam(name))
}

/// Handler for the scrape endpoint.
///
/// `Form` reads the query string for GET and the urlencoded body for POST.
async fn metrics_handler<W>(
    State(state): State<AppState<W>>,
    Form(params): Form<HashMap<String, String>>,
) -> Result<Response, ScrapeFailure>
where
    W: OidWalker + 'static,
{
    let device_type = required(&params, "type")?;
    let host = required(&params, "host")?;
    let credential = required(&params, "secret")
        .or_else(|missing| required(&params, "community").map_err(|_| missing))?;

    let profile = state.registry.resolve(device_type).map_err(|e| {
        tracing::warn!(device_type = %device_type, host = %host, "Unknown device type");
        ScrapeFailure::Profile(e)
    })?;

    let target = ScrapeTarget::new(device_type, host, credential);
    let report = tokio::time::timeout(
        state.scrape_timeout,
        scrape(state.walker.as_ref(), &profile, &target),
    )
    .await
    .map_err(|_| {
        tracing::warn!(
            device_type = %device_type,
            host = %host,
            timeout_secs = state.scrape_timeout.as_secs(),
            "Scrape timed out"
        );
        ScrapeFailure::Timeout(state.scrape_timeout)
    })?
    .map_err(|e| {
        tracing::warn!(device_type = %device_type, host = %host, error = %e, "Scrape failed");
        ScrapeFailure::Collection(e)
    })?;

    tracing::debug!(
        device_type = %device_type,
        host = %host,
        sensors = report.sensors,
        lines = report.lines.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Scrape complete"
    );

    Ok((
        StatusCode::OK,
        [("content-type", CONTENT_TYPE)],
        render(&report.lines),
    )
        .into_response())
}

/// Handler for the /health endpoint.
async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// Handler for the /profiles endpoint: registered device types.
async fn profiles_handler<W>(State(state): State<AppState<W>>) -> Json<Vec<String>>
where
    W: OidWalker + 'static,
{
    Json(state.registry.device_types().map(str::to_string).collect())
}

/// HTTP server configuration.
pub struct HttpServer<W> {
    registry: Arc<ProfileRegistry>,
    walker: Arc<W>,
    listen_addr: SocketAddr,
    metrics_path: String,
    scrape_timeout: Duration,
}

impl<W> HttpServer<W>
where
    W: OidWalker + 'static,
{
    /// Create a new HTTP server.
    pub fn new(
        registry: Arc<ProfileRegistry>,
        walker: Arc<W>,
        listen_addr: SocketAddr,
        metrics_path: String,
        scrape_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            walker,
            listen_addr,
            metrics_path,
            scrape_timeout,
        }
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        create_router(
            AppState {
                registry: self.registry.clone(),
                walker: self.walker.clone(),
                scrape_timeout: self.scrape_timeout,
            },
            &self.metrics_path,
        )
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let router = self.router();

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            device_types = self.registry.len(),
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
