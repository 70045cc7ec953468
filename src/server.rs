//! HTTP API server
//!
//! One POST endpoint per capture, each taking a [`PageRequest`] JSON body,
//! plus `GET /ping` for liveness checks. Failures are answered with a plain
//! text message.

use crate::page_service::PageService;
use crate::request::PageRequest;
use crate::{Report, ScrapeError, ServerConfig};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PageService>,
}

pub fn create_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/screenshot", post(screenshot))
        .route("/pdf", post(pdf))
        .route("/html", post(html))
        .route("/ping", get(ping))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Error answered as `text/plain`
#[derive(Debug)]
pub struct ApiError(pub ScrapeError);

impl From<ScrapeError> for ApiError {
    fn from(error: ScrapeError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!("Request failed with {}: {}", status, self.0);
        (status, self.0.to_string()).into_response()
    }
}

async fn scrape(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> Result<Json<Report>, ApiError> {
    debug!("Scrape request");
    Ok(Json(state.service.scrape(&request).await?))
}

async fn screenshot(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> Result<Response, ApiError> {
    debug!("Screenshot request");
    let capture = state.service.screenshot(&request).await?;
    Ok(([(header::CONTENT_TYPE, capture.format.content_type())], capture.data).into_response())
}

async fn pdf(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> Result<Response, ApiError> {
    debug!("PDF request");
    let data = state.service.pdf(&request).await?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], data).into_response())
}

async fn html(
    State(state): State<AppState>,
    Json(request): Json<PageRequest>,
) -> Result<Html<String>, ApiError> {
    debug!("HTML request");
    Ok(Html(state.service.html(&request).await?))
}

async fn ping() -> &'static str {
    "pong"
}

/// HTTP API server
pub struct HttpServer {
    config: ServerConfig,
    service: Arc<PageService>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, service: Arc<PageService>) -> Self {
        Self { config, service }
    }

    /// Serve until `shutdown` fires, then finish in-flight requests.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ScrapeError> {
        let addr = self.config.listen_addr()?;
        let state = AppState {
            service: self.service.clone(),
        };
        let app = create_router(state, self.config.body_limit);

        let listener = TcpListener::bind(addr).await?;
        info!("Block scraper listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping() {
        assert_eq!(ping().await, "pong");
    }

    #[test]
    fn test_error_status() {
        let missing = ApiError::from(ScrapeError::InvalidRequest("no source".to_string()));
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let bad_url = ApiError::from(ScrapeError::InvalidUrl("ftp://x".to_string()));
        assert_eq!(bad_url.status(), StatusCode::BAD_REQUEST);

        let navigation = ApiError::from(ScrapeError::NavigationFailed("dns".to_string()));
        assert_eq!(navigation.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response() {
        let response = ApiError::from(ScrapeError::ElementNotFound("#hero".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
