use axum::{
    extract::{multipart::Field, rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;
use crate::errors::{AppError, AppResult};
use crate::models::{CurrentUser, DeleteImagesForm, ImageLink};
use crate::state::AppState;

const BASKET: &str = "my_images";

pub async fn list_images(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    let images: Vec<ImageLink> = state
        .tables
        .basket_images(&user.email)
        .await?
        .into_iter()
        .map(|image| ImageLink {
            url: state.image_url(&user.email, BASKET, &image.id),
            id: image.id,
        })
        .collect();

    Ok(Json(json!({ "images": images })).into_response())
}

// Reads one uploaded file, skipping parts that carry no file or no bytes.
async fn read_image(field: Field<'_>) -> AppResult<Option<(String, Bytes)>> {
    if field.file_name().map_or(true, str::is_empty) {
        return Ok(None);
    }
    let content_type = field.content_type().unwrap_or("image/jpeg").to_string();
    let data = field.bytes().await.map_err(|e| {
        tracing::error!("Failed to read uploaded image: {}", e);
        AppError::Validation(format!("Failed to read uploaded image: {}", e))
    })?;

    Ok((!data.is_empty()).then_some((content_type, data)))
}

pub async fn upload_images(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("Failed to get next field from multipart form: {}", e);
        AppError::Validation(format!("Failed to process form field: {}", e))
    })? {
        match field.name().unwrap_or("") {
            "new_images" => {
                if let Some(file) = read_image(field).await? {
                    files.push(file);
                }
            }
            field_name => tracing::warn!("Unexpected form field: {}", field_name),
        }
    }

    if files.is_empty() {
        return Err(AppError::rejected(StatusCode::BAD_REQUEST, "No files uploaded"));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for (content_type, data) in files {
        let image_id = Uuid::new_v4().to_string();
        let key = state.config.storage.image_key(&user.email, BASKET, &image_id);
        let url = state.storage.upload(&key, data, &content_type).await?;
        state.tables.insert_basket_image(&user.email, &image_id).await?;
        uploaded.push(ImageLink { id: image_id, url });
    }

    tracing::info!("Uploaded {} basket image(s) for {}", uploaded.len(), user.email);
    Ok(Json(json!({
        "success": true,
        "message": format!("Uploaded {} image(s) successfully.", uploaded.len()),
        "uploaded": uploaded,
    }))
    .into_response())
}

pub async fn delete_images(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    form: Result<Json<DeleteImagesForm>, JsonRejection>,
) -> AppResult<Response> {
    let Json(form) = form.map_err(|_| AppError::Validation("Invalid request".into()))?;

    let mut deleted_ids = Vec::new();
    for image_id in form.delete_images {
        let key = state.config.storage.image_key(&user.email, BASKET, &image_id);
        if !state.storage.delete(&key).await {
            tracing::warn!("Basket object {} was not removed from storage", key);
        }
        state
            .tables
            .delete_basket_image(&user.email, &image_id)
            .await
            .map_err(|e| AppError::rejected(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        deleted_ids.push(image_id);
    }

    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} image(s).", deleted_ids.len()),
        "deleted_ids": deleted_ids,
    }))
    .into_response())
}
