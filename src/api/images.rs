//! Inline image management.

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::storage::validate_name;

/// Multipart field carrying the uploaded image
const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
}

/// Browsers may send a full client-side path as the file name.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
}

/// GET /api/images - List image names
#[tracing::instrument(name = "http.list_images", skip(state))]
pub async fn list_images(State(state): State<AppState>) -> Result<Json<ImageListResponse>> {
    let images = state.image_files.list().await?;
    Ok(Json(ImageListResponse { images }))
}

/// POST /api/images - Upload an image (multipart field `file`)
#[tracing::instrument(name = "http.upload_image", skip_all)]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(base_name)
            .unwrap_or_default()
            .to_string();
        validate_name(&filename)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;
        state.image_files.write(&filename, &data).await?;

        tracing::info!(filename = %filename, size = data.len(), "Image uploaded");
        return Ok(Json(UploadResponse { filename }));
    }

    Err(AppError::Validation(format!(
        "Multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

/// GET /api/images/{name} - Image bytes
#[tracing::instrument(name = "http.get_image", skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let data = state.image_files.read(&name).await?;
    let mime = mime_guess::from_path(&name).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.to_string())], data))
}

/// DELETE /api/images/{name} - Remove an image
#[tracing::instrument(name = "http.delete_image", skip(state))]
pub async fn delete_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    state.image_files.remove(&name).await?;
    tracing::info!(image = %name, "Image deleted");
    Ok(Json(json!({ "message": "Image deleted successfully" })))
}
