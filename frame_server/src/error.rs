//! Failure kinds of a frame request.
//!
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a frame could not be processed.
///
/// Details are only logged; the client always receives the same generic body.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("request body rejected: {0}")]
    Request(String),

    #[error("failed to decode frame: {0}")]
    Decode(#[source] BoxError),

    #[error("inference failed: {0}")]
    Inference(#[source] BoxError),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] BoxError),

    #[error("frame task failed: {0}")]
    Internal(#[from] tokio::task::JoinError),
}

impl FrameError {
    pub fn status(&self) -> StatusCode {
        match self {
            FrameError::Request(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FrameError::Decode(_) => StatusCode::BAD_REQUEST,
            FrameError::Inference(_) | FrameError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            FrameError::Encode(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for FrameError {
    fn into_response(self) -> Response {
        log::error!("Error processing frame: {self}");
        (self.status(), Json(ErrorResponse::frame_error())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses() {
        let decode = FrameError::Decode("bad".into());
        let inference = FrameError::Inference("bad".into());
        let encode = FrameError::Encode("bad".into());

        assert_eq!(decode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(encode.status(), StatusCode::BAD_GATEWAY);
        assert_ne!(encode.status(), inference.status());
        assert_eq!(
            FrameError::Request("missing field".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn response_carries_status() {
        let response = FrameError::Decode("bad".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
