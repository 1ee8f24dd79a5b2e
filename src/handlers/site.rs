use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use crate::errors::{AppError, AppResult};
use crate::extract::JsonOrForm;
use crate::models::UploadFromUrlForm;
use crate::state::AppState;

pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";

pub async fn index() -> Redirect {
    Redirect::to("/dashboard/")
}

pub async fn health() -> &'static str {
    "OK"
}

fn required(value: Option<String>, message: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(message.to_string()))
}

/// Copies an image from a remote URL into storage under `{folder}/{filename}`.
pub async fn upload_from_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonOrForm(form): JsonOrForm<UploadFromUrlForm>,
) -> AppResult<Response> {
    let expected = &state.config.upload.callback_token;
    if !expected.is_empty() {
        let given = headers
            .get(UPLOAD_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return Err(AppError::Unauthorized("Invalid upload token".into()));
        }
    }

    let image_url = required(form.image_url, "Missing image URL")?;
    let folder = required(form.folder, "Missing folder")?;
    let filename = required(form.filename, "Missing filename")?;
    if folder.split('/').any(|seg| seg == "..") || filename.contains('/') || filename == ".." {
        return Err(AppError::Validation("Invalid upload target".into()));
    }

    let response = state.http.get(&image_url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(AppError::Validation(format!(
            "Failed to fetch image: {}",
            response.status().as_u16()
        )));
    }
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let body = response.bytes().await?;

    let key = state
        .config
        .storage
        .folder_key(&format!("{}/{}", folder.trim_matches('/'), filename));
    let url = state.storage.upload(&key, body, &content_type).await?;

    tracing::info!("Stored {} at {}", image_url, url);
    Ok(Json(json!({ "url": url })).into_response())
}
