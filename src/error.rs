use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Body of every generate request while the model could not be loaded.
pub const MODEL_UNAVAILABLE: &str = "Model is not available.";

/// Failures the generate endpoint reports to its caller.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{}", MODEL_UNAVAILABLE)]
    ModelUnavailable,

    #[error("generation failed: {0:#}")]
    Generation(#[from] anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        // An unloaded model is reported in the body; the status stays 200.
        let status = match self {
            Self::ModelUnavailable => StatusCode::OK,
            Self::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_message_is_fixed() {
        assert_eq!(ServiceError::ModelUnavailable.to_string(), "Model is not available.");
        assert_eq!(ServiceError::ModelUnavailable.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn generation_failure_is_server_error() {
        let err = ServiceError::from(anyhow::anyhow!("decode step"));
        assert!(err.to_string().contains("decode step"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
