//! HTTP surface: `GET /download?tumblr=<name>`.

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::info;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::ServerConfig;
use crate::coordinator::{RequestCoordinator, RequestError};
use crate::utils::config::ServerDefaults;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    tumblr: Option<String>,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Validation(_) => StatusCode::BAD_REQUEST,
            RequestError::WorkspaceReset(_)
            | RequestError::Extraction(_)
            | RequestError::Cancelled
            | RequestError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let prefix = status.canonical_reason().unwrap_or("Error");
        let body = format!("{prefix}: {self}");
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
    }
}

async fn download(
    State(coordinator): State<Arc<RequestCoordinator>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, RequestError> {
    let download = coordinator.handle(query.tumblr.as_deref()).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.key.archive_filename()
    );
    // The encoder task is detached; it cleans up on its own when the body ends or is dropped.
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(download.body),
    )
        .into_response())
}

async fn banner() -> &'static str {
    "GET /download?tumblr=<name> - zip of a fresh backup of <name>\n"
}

/// Router with the download endpoint bound to `coordinator`.
pub fn router(coordinator: Arc<RequestCoordinator>) -> Router {
    Router::new()
        .route(ServerDefaults::DOWNLOAD_ROUTE, get(download))
        .route("/", get(banner))
        .with_state(coordinator)
}

/// Bind `hostname:port` from `cfg`.
pub async fn bind(cfg: &ServerConfig) -> Result<TcpListener> {
    TcpListener::bind((cfg.hostname.as_str(), cfg.port))
        .await
        .with_context(|| format!("bind {}:{}", cfg.hostname, cfg.port))
}

/// Serve on `listener` until `shutdown` resolves. In-flight downloads finish first.
pub async fn serve<F>(listener: TcpListener, cfg: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let coordinator = Arc::new(RequestCoordinator::new(cfg));
    let addr = listener.local_addr().context("listener address")?;
    info!(
        "listening on http://{}{} (workspaces in {})",
        addr,
        ServerDefaults::DOWNLOAD_ROUTE,
        cfg.workspace_root.display()
    );
    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}
