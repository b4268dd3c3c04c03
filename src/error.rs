use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::ModelError;
use crate::preprocess::PreprocessError;
use crate::upload::UploadError;

/// Everything `/predict` can report back to a client.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Invalid file type")]
    InvalidFileType,

    #[error("Invalid multipart body: {0}")]
    Multipart(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Storage(#[from] UploadError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] ModelError),

    #[error("Prediction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::NoFilePart
            | PredictError::NoSelectedFile
            | PredictError::InvalidFileType
            | PredictError::Multipart(_) => StatusCode::BAD_REQUEST,
            PredictError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::Storage(_)
            | PredictError::Preprocess(_)
            | PredictError::Inference(_)
            | PredictError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Prediction failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Rejected upload");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_request() {
        for err in [
            PredictError::NoFilePart,
            PredictError::NoSelectedFile,
            PredictError::InvalidFileType,
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(PredictError::InvalidFileType.to_string(), "Invalid file type");
    }

    #[test]
    fn unavailable_model_is_distinct_from_internal_error() {
        let err = PredictError::ModelUnavailable("file not found".into());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Model unavailable: file not found");

        let err = PredictError::from(ModelError::UnexpectedOutput("empty".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().is_empty());
    }
}
