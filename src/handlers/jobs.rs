use std::time::Duration;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use async_zip::{base::write::ZipFileWriter, Compression, ZipEntryBuilder};
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;
use crate::errors::{AppError, AppResult};
use crate::middleware::session::store_job_counts;
use crate::models::{
    CurrentUser, DeleteJobsForm, DownloadProgress, JobCounts, JobStatus, PageQuery, ProgressEntry,
    ProgressQuery,
};
use crate::state::AppState;

const GENERATED: &str = "generated_images";
const MAX_PER_PAGE: i64 = 100;

pub const DOWNLOAD_ID_HEADER: &str = "x-download-id";

// Scans every status row for the caller and caches the counters in the session.
async fn refresh_counts(state: &AppState, session: &Session, email: &str) -> AppResult<JobCounts> {
    let rows = state.tables.job_statuses(email).await?;
    let counts = JobCounts::from_statuses(rows.into_iter().map(|r| r.status));
    store_job_counts(session, counts).await?;
    Ok(counts)
}

pub async fn list_jobs(
    State(state): State<AppState>,
    session: Session,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    if query.page < 1 || query.per_page < 1 || query.per_page > MAX_PER_PAGE {
        return Err(AppError::Validation(format!(
            "page must be >= 1 and per_page between 1 and {}",
            MAX_PER_PAGE
        )));
    }

    let offset = (query.page - 1)
        .checked_mul(query.per_page)
        .ok_or_else(|| AppError::Validation("page is out of range".into()))?;
    let counts = refresh_counts(&state, &session, &user.email).await?;
    let jobs = state
        .tables
        .job_page(&user.email, offset, query.per_page)
        .await?;

    tracing::debug!(
        "Listed {} job(s) on page {} for {}",
        jobs.len(),
        query.page,
        user.email
    );

    Ok(Json(json!({
        "jobs": jobs,
        "page": query.page,
        "per_page": query.per_page,
        "counts": counts,
        "storage_link": state.storage_link(),
    }))
    .into_response())
}

pub async fn count_completed(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    let total = state.tables.completed_count(&user.email).await?;
    Ok(Json(json!({ "total_completed": total })).into_response())
}

pub async fn delete_selected(
    State(state): State<AppState>,
    session: Session,
    Extension(user): Extension<CurrentUser>,
    form: Result<Json<DeleteJobsForm>, JsonRejection>,
) -> AppResult<Response> {
    let job_ids = form.map(|Json(f)| f.job_ids).unwrap_or_default();
    if job_ids.is_empty() {
        return Err(AppError::rejected(StatusCode::BAD_REQUEST, "No jobs selected"));
    }

    let mut deleted_jobs = Vec::new();
    let mut errors = Vec::new();

    for job_id in job_ids {
        match state.tables.delete_job(&user.email, &job_id).await {
            Ok(true) => {
                let key = state.config.storage.image_key(&user.email, GENERATED, &job_id);
                if !state.storage.delete(&key).await {
                    errors.push(json!({
                        "job_id": job_id,
                        "error": "Failed to delete image from storage",
                    }));
                }
                deleted_jobs.push(job_id);
            }
            Ok(false) => errors.push(json!({ "job_id": job_id, "error": "Job not found" })),
            Err(e) => {
                tracing::error!("Failed to delete job {} for {}: {}", job_id, user.email, e);
                errors.push(json!({ "job_id": job_id, "error": e.to_string() }));
            }
        }
    }

    if let Err(e) = refresh_counts(&state, &session, &user.email).await {
        tracing::error!("Failed to update session counts: {}", e);
    }

    tracing::info!("Deleted {} job(s) for {}", deleted_jobs.len(), user.email);
    Ok(Json(json!({
        "success": true,
        "message": format!("{} job(s) deleted successfully", deleted_jobs.len()),
        "deleted_jobs": deleted_jobs,
        "errors": errors,
    }))
    .into_response())
}

pub async fn delete_all(
    State(state): State<AppState>,
    session: Session,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    let upstream = |e: AppError| {
        AppError::rejected(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error deleting jobs: {}", e),
        )
    };

    let job_ids: Vec<String> = state
        .tables
        .job_statuses(&user.email)
        .await
        .map_err(upstream)?
        .into_iter()
        .map(|r| r.id)
        .collect();

    if job_ids.is_empty() {
        return Err(AppError::rejected(StatusCode::NOT_FOUND, "No jobs found to delete."));
    }

    let mut deleted_files = Vec::new();
    let mut errors = Vec::new();
    for job_id in &job_ids {
        let key = state.config.storage.image_key(&user.email, GENERATED, job_id);
        if state.storage.delete(&key).await {
            deleted_files.push(key);
        } else {
            errors.push(json!({ "job_id": job_id, "error": "Failed to delete image from storage" }));
        }
    }

    state
        .tables
        .delete_all_jobs(&user.email)
        .await
        .map_err(upstream)?;
    store_job_counts(&session, JobCounts::default()).await?;

    tracing::info!("Deleted all {} job(s) for {}", job_ids.len(), user.email);
    Ok(Json(json!({
        "success": true,
        "message": format!("Deleted {} job(s) and related files successfully.", job_ids.len()),
        "deleted_jobs": job_ids,
        "deleted_files": deleted_files,
        "errors": errors,
    }))
    .into_response())
}

// Progress writes are best effort; a lost update only affects the progress bar.
async fn report_progress(state: &AppState, download_id: &str, owner: &str, current: usize, total: usize) {
    let entry = ProgressEntry {
        owner: owner.to_string(),
        progress: DownloadProgress { current, total },
    };
    let ttl = Duration::from_secs(state.config.cache.progress_ttl_secs);
    if let Err(e) = state.store.put_progress(download_id, &entry, ttl).await {
        tracing::warn!("Failed to record progress for download {}: {}", download_id, e);
    }
}

// Fetches each image in turn and deflates it into an in-memory archive.
// Images that cannot be fetched are left out.
async fn build_archive(
    state: &AppState,
    download_id: &str,
    owner: &str,
    job_ids: &[String],
) -> AppResult<Vec<u8>> {
    let total = job_ids.len();
    let mut writer = ZipFileWriter::new(Vec::<u8>::new());

    for (i, job_id) in job_ids.iter().enumerate() {
        let key = state.config.storage.image_key(owner, GENERATED, job_id);
        match state.storage.fetch(&key).await {
            Ok(object) if object.is_ok() => {
                let entry = ZipEntryBuilder::new(format!("{}.jpeg", job_id).into(), Compression::Deflate);
                writer
                    .write_entry_whole(entry, &object.body)
                    .await
                    .map_err(|e| AppError::Archive(e.to_string()))?;
            }
            Ok(object) => tracing::warn!("Skipping {}: storage answered {}", key, object.status),
            Err(e) => tracing::warn!("Skipping {}: {}", key, e),
        }
        report_progress(state, download_id, owner, i + 1, total).await;
    }

    writer
        .close()
        .await
        .map_err(|e| AppError::Archive(e.to_string()))
}

pub async fn download_all(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    let completed: Vec<String> = state
        .tables
        .job_statuses(&user.email)
        .await
        .map_err(|e| AppError::rejected(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .into_iter()
        .filter(|r| r.status == JobStatus::Completed)
        .map(|r| r.id)
        .collect();

    if completed.is_empty() {
        return Err(AppError::rejected(StatusCode::NOT_FOUND, "No completed jobs found"));
    }

    let download_id = Uuid::new_v4().to_string();
    tracing::info!(
        "Starting download {} of {} image(s) for {}",
        download_id,
        completed.len(),
        user.email
    );
    report_progress(&state, &download_id, &user.email, 0, completed.len()).await;

    let archive = build_archive(&state, &download_id, &user.email, &completed).await?;
    report_progress(&state, &download_id, &user.email, completed.len(), completed.len()).await;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_DISPOSITION, "attachment; filename=\"all_jobs.zip\"")
        .header(header::CONTENT_LENGTH, archive.len().to_string())
        .header(DOWNLOAD_ID_HEADER, &download_id)
        .body(Body::from(archive))
        .map_err(|e| AppError::Archive(format!("Failed to build download response: {}", e)))
}

pub async fn download_progress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ProgressQuery>,
) -> AppResult<Response> {
    let download_id = match query.download_id {
        Some(id) => Some(id),
        None => state.store.latest_download(&user.email).await?,
    };

    let progress = match download_id {
        Some(id) => state
            .store
            .get_progress(&id)
            .await?
            .filter(|entry| entry.owner == user.email)
            .map(|entry| entry.progress)
            .unwrap_or_default(),
        None => DownloadProgress::default(),
    };

    Ok(Json(progress).into_response())
}

pub async fn download_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    if job_id.is_empty() || job_id.contains('/') || job_id.contains("..") {
        return Err(AppError::Validation("Invalid job id".into()));
    }

    let key = state.config.storage.image_key(&user.email, GENERATED, &job_id);
    let object = state.storage.fetch(&key).await?;
    if !object.is_ok() {
        return Err(AppError::NotFound(format!("Failed to fetch image: {}", object.status)));
    }

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.jpeg\"", job_id),
            ),
        ],
        object.body,
    )
        .into_response())
}
