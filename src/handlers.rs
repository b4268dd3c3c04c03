use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::PredictError;
use crate::labels::EyeDisease;
use crate::model::{ModelState, Prediction};
use crate::preprocess::load_image_tensor;
use crate::upload::{allowed_file, UploadStore};

/// Route prefix under which the upload directory is served.
pub const STATIC_PREFIX: &str = "static";

pub struct AppState {
    pub model: ModelState,
    pub uploads: UploadStore,
    pub index_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub class: EyeDisease,
    pub confidence: f32,
    pub image_url: String,
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Finds the first `file` field that carries a filename. Fields without a
/// filename are plain form values, not uploads.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, PredictError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Multipart(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PredictError::Multipart(e.to_string()))?;
        return Ok(Upload { filename, bytes });
    }

    Err(PredictError::NoFilePart)
}

pub async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    // A body that is not multipart carries no file part at all.
    let multipart = multipart.map_err(|_| PredictError::NoFilePart)?;
    let upload = read_upload(multipart).await?;

    if upload.filename.is_empty() {
        return Err(PredictError::NoSelectedFile);
    }
    if !allowed_file(&upload.filename) {
        return Err(PredictError::InvalidFileType);
    }

    let classifier = state.model.classifier()?;
    let path = state.uploads.save(&upload.filename, &upload.bytes).await?;

    let image_path = path.clone();
    let prediction = tokio::task::spawn_blocking(move || -> Result<Prediction, PredictError> {
        let tensor = load_image_tensor(&image_path)?;
        let probabilities = classifier.predict(&tensor)?;
        Ok(Prediction::from_probabilities(&probabilities)?)
    })
    .await??;

    let stored_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        filename = %upload.filename,
        stored = %stored_name,
        class = %prediction.class,
        confidence = prediction.confidence,
        "Prediction complete"
    );

    Ok(Json(PredictResponse {
        class: prediction.class,
        confidence: prediction.confidence,
        image_url: format!("{STATIC_PREFIX}/{stored_name}"),
    }))
}

pub async fn index_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, (StatusCode, Json<Value>)> {
    tokio::fs::read_to_string(&state.index_path)
        .await
        .map(Html)
        .map_err(|e| {
            error!(path = %state.index_path.display(), error = %e, "Index page unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Index page unavailable" })),
            )
        })
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "OK", "model_loaded": state.model.is_ready() }))
}
