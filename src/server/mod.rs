//! HTTP surface: router, startup and shutdown.

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod handlers;
pub mod rate_limit;

pub use handlers::VersionInfo;
pub use rate_limit::RateLimiter;

use crate::config::Config;
use crate::download::{spawn_reaper, sweep, DownloadService};
use crate::extractors::youtube::YtDlpExtractor;
use crate::extractors::ExtractionOptions;
use crate::utils;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self' 'unsafe-inline'; \
     style-src 'self' 'unsafe-inline'; img-src 'self' data:";

/// Shared, read-only handles for the handlers
#[derive(Clone)]
pub struct AppState {
    pub downloads: Arc<DownloadService>,
    pub limiter: Arc<RateLimiter>,
    pub versions: Arc<VersionInfo>,
    pub public_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        downloads: DownloadService,
        limiter: RateLimiter,
        versions: VersionInfo,
        public_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloads: Arc::new(downloads),
            limiter: Arc::new(limiter),
            versions: Arc::new(versions),
            public_dir: Arc::new(public_dir.into()),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let downloads = Router::new()
        .route("/download", get(handlers::download))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_requests,
        ));

    let static_files = ServeDir::new(state.public_dir.as_path())
        .not_found_service(handlers::not_found.with_state(state.clone()));

    Router::new()
        .merge(downloads)
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        .fallback_service(static_files)
        .layer(middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn add_security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    response
}

/// One-time initialization, then serve until a shutdown signal arrives
pub async fn run(config: Config) -> Result<()> {
    let downloads_dir = config.downloads.dir.clone();
    tokio::fs::create_dir_all(&downloads_dir)
        .await
        .context("Failed to create downloads directory")?;

    let extractor = YtDlpExtractor::with_path(config.downloads.yt_dlp_path.clone());
    for tool in utils::check_dependencies(extractor.path()).await {
        if !tool.available {
            tracing::warn!(tool = tool.name, purpose = tool.purpose, "Dependency check failed");
        }
    }
    let versions = VersionInfo::detect(&extractor).await;
    tracing::info!(?versions, "Version info");

    match sweep(&downloads_dir, config.retention()).await {
        Ok(report) => tracing::debug!(?report, "Initial cleanup finished"),
        Err(e) => tracing::warn!(error = %e, "Initial cleanup failed"),
    }

    let service = DownloadService::new(
        &downloads_dir,
        Arc::new(extractor),
        ExtractionOptions::new(config.debug),
        config.extraction_timeout(),
    );
    let limiter = RateLimiter::new(config.rate_limit.max_requests, config.rate_limit_window());
    let state = AppState::new(service, limiter, versions, config.server.public_dir.clone());

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let reaper = spawn_reaper(downloads_dir, config.reaper_interval(), config.retention());

    let base_url = format!("http://localhost:{}", addr.port());
    tracing::info!("Server running at {}", base_url);
    tracing::info!("Download: {}/download?url=YOUTUBE_URL", base_url);
    tracing::info!("Health: {}/health", base_url);
    tracing::info!("Version: {}/version", base_url);

    if !config.is_production() {
        tokio::spawn(async move {
            if let Err(e) = utils::open_browser(&base_url).await {
                tracing::warn!(error = %e, "Failed to open browser");
            }
        });
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.shutdown_grace()))
    .await
    .context("HTTP server failed")?;

    reaper.abort();
    tracing::info!("HTTP server closed");
    Ok(())
}

/// Resolves on SIGINT/SIGTERM and arms a hard exit after `grace`
async fn shutdown_signal(grace: Duration) {
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::error!("Forced shutdown after timeout");
        std::process::exit(1);
    });
}
