//! Endpoints of HTTP server.
//!
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    response::Html,
    routing::{get, post},
    Extension, Json, Router,
};
use common::protocol::{FrameRequest, FrameResponse};

use crate::{error::FrameError, meter::METER, service::FrameService};

const INDEX_PAGE: &str = include_str!("../resources/index.html");

/// Build the router with all endpoints around a shared service.
///
/// Frames are accepted at any size.
pub fn app(service: Arc<FrameService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/process_frame", post(process_frame))
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(service))
}

/// Page that streams the browser camera to `/process_frame`.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Run detection on a single posted frame.
pub async fn process_frame(
    Extension(service): Extension<Arc<FrameService>>,
    payload: Result<Json<FrameRequest>, JsonRejection>,
) -> Result<Json<FrameResponse>, FrameError> {
    let result = handle_frame(service, payload).await;
    match &result {
        Ok(_) => METER.tick_processed(),
        Err(_) => METER.tick_failed(),
    }
    result.map(Json)
}

async fn handle_frame(
    service: Arc<FrameService>,
    payload: Result<Json<FrameRequest>, JsonRejection>,
) -> Result<FrameResponse, FrameError> {
    let Json(request) = payload.map_err(|rejection| FrameError::Request(rejection.body_text()))?;
    log::debug!("Frame received ({} bytes)", request.image.len());

    // Decoding and inference are CPU bound
    tokio::task::spawn_blocking(move || service.process_frame(&request.image)).await?
}
