use std::time::Duration;
use axum::{
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use crate::errors::{AppError, AppResult};
use crate::models::CurrentUser;
use crate::services::CachedImage;
use crate::state::AppState;

const CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("cdn-cache-control");
const VERCEL_CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("vercel-cdn-cache-control");

fn valid_path(path: &str) -> bool {
    !path.is_empty() && path.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

// The first path segment names the owning account.
fn owned_by(path: &str, email: &str) -> bool {
    path.split('/').next() == Some(email)
}

fn image_response(image: CachedImage, max_age: u64) -> Response {
    let shared = format!("public, max-age={}", max_age);
    (
        [
            (header::CONTENT_TYPE, image.content_type),
            (header::CACHE_CONTROL, format!("{}, immutable", shared)),
            (CDN_CACHE_CONTROL, shared.clone()),
            (VERCEL_CDN_CACHE_CONTROL, shared),
        ],
        image.body,
    )
        .into_response()
}

/// Relays an object from the caller's own storage folder with long-lived
/// cache headers.
pub async fn proxy_image(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    if !valid_path(&path) {
        return Err(AppError::Validation("Invalid image path".into()));
    }
    if !owned_by(&path, &user.email) {
        tracing::warn!("{} asked for another account's image {}", user.email, path);
        return Err(AppError::Forbidden("Not allowed to read this image.".into()));
    }
    let max_age = state.config.cache.image_max_age_secs;

    match state.store.cached_image(&path).await {
        Ok(Some(image)) => return Ok(image_response(image, max_age)),
        Ok(None) => {}
        Err(e) => tracing::warn!("Image cache lookup failed for {}: {}", path, e),
    }

    let object = state
        .storage
        .fetch(&state.config.storage.folder_key(&path))
        .await?;
    if !object.is_ok() {
        tracing::debug!("Storage answered {} for {}", object.status, path);
        let status = StatusCode::from_u16(object.status).unwrap_or(StatusCode::BAD_GATEWAY);
        return Ok((status, "Image not found").into_response());
    }

    let image = CachedImage {
        content_type: object
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string()),
        body: object.body,
    };
    if let Err(e) = state
        .store
        .cache_image(&path, &image, Duration::from_secs(max_age))
        .await
    {
        tracing::warn!("Failed to cache image {}: {}", path, e);
    }

    Ok(image_response(image, max_age))
}
