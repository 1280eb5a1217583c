//! Template CRUD and preview endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Html,
    Json,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::storage::{validate_name, StorageError};
use crate::template::{inline_css, CompiledTemplate, RenderContext};

/// Template that always exists and cannot be deleted
pub const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveTemplateRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub content: Option<String>,
}

/// Context used for previews
fn sample_context() -> RenderContext {
    RenderContext::new("홍길동", "test@example.com", Utc::now().year())
}

/// GET /api/templates - List template names
#[tracing::instrument(name = "http.list_templates", skip(state))]
pub async fn list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let mut templates = state.templates.list();
    templates.sort();
    Json(TemplateListResponse { templates })
}

/// GET /api/templates/{name} - Template source
#[tracing::instrument(name = "http.get_template", skip(state))]
pub async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateResponse>> {
    validate_name(&name)?;
    let compiled = state.templates.get(&name)?;

    Ok(Json(TemplateResponse {
        name: compiled.name.clone(),
        content: compiled.source.clone(),
    }))
}

/// POST /api/templates/{name} - Create or replace a template
///
/// The source is compiled before anything is written, so a rejected template
/// leaves both the file and the loaded version untouched.
#[tracing::instrument(name = "http.save_template", skip(state, request))]
pub async fn save_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SaveTemplateRequest>,
) -> Result<Json<Value>> {
    validate_name(&name)?;
    if request.content.trim().is_empty() {
        return Err(AppError::Validation("Template content is required".to_string()));
    }

    let compiled = CompiledTemplate::compile(&name, &request.content)?;
    state
        .template_files
        .write(&name, request.content.as_bytes())
        .await?;
    state.templates.insert(compiled);

    tracing::info!(template = %name, "Template saved");
    Ok(Json(json!({ "message": "Template saved successfully" })))
}

/// DELETE /api/templates/{name} - Remove a template
#[tracing::instrument(name = "http.delete_template", skip(state))]
pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    if name == DEFAULT_TEMPLATE {
        return Err(AppError::Validation(
            "Cannot delete default template".to_string(),
        ));
    }
    validate_name(&name)?;
    if !state.templates.exists(&name) {
        return Err(AppError::NotFound(format!("Template not found: {}", name)));
    }

    match state.template_files.remove(&name).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    state.templates.delete(&name)?;

    tracing::info!(template = %name, "Template deleted");
    Ok(Json(json!({ "message": "Template deleted successfully" })))
}

/// POST /api/templates/preview/{name} - Render with sample data
///
/// With a non-empty `content` the unsaved source is rendered; otherwise the
/// stored template `name`.
#[tracing::instrument(name = "http.preview_template", skip(state, body))]
pub async fn preview_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Html<String>> {
    let request: PreviewRequest = if body.is_empty() {
        PreviewRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid preview request: {}", e)))?
    };

    let renderer = state.renderer.clone();
    let html = tokio::task::spawn_blocking(move || {
        let context = sample_context();
        let rendered = match request.content.filter(|c| !c.trim().is_empty()) {
            Some(source) => renderer.render_source(&name, &source, &context)?,
            None => renderer.render(&name, &context)?,
        };
        inline_css(&rendered.html)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??;

    Ok(Html(html))
}
