use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use tower_sessions::Session;
use crate::dispatch::{self, GenerationRequest, SubmissionOutcome};
use crate::errors::{AppError, AppResult};
use crate::middleware::session::LAST_DATA;
use crate::models::{CurrentUser, GenerateForm, ImageLink, LastData, ProfileForm};
use crate::state::AppState;

pub async fn serve_dashboard(
    State(state): State<AppState>,
    session: Session,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Response> {
    tracing::info!("Accessing dashboard for {}", user.email);

    let credits = user.metadata.credits;
    let images: Vec<ImageLink> = state
        .tables
        .basket_images(&user.email)
        .await?
        .into_iter()
        .map(|image| ImageLink {
            url: state.image_url(&user.email, "my_images", &image.id),
            id: image.id,
        })
        .collect();

    let last_data = match session.get::<LastData>(LAST_DATA).await? {
        Some(last) => Some(last),
        None => user.metadata.last_data.clone(),
    };
    let max_repeat = state.config.generation.max_repeat_display.min(credits).max(0);

    Ok(Json(json!({
        "email": user.email,
        "full_name": user.metadata.full_name,
        "credits": credits,
        "max_repeat": max_repeat,
        "restricted": !user.metadata.email_verified.unwrap_or(false),
        "images": images,
        "last_data": last_data,
    }))
    .into_response())
}

// Write-through cache of the last used form: session first, then user metadata.
// A failed metadata write is logged and does not block the submission.
async fn remember_last_data(
    state: &AppState,
    session: &Session,
    user: &CurrentUser,
    last_data: LastData,
) -> AppResult<()> {
    let cached = session.get::<LastData>(LAST_DATA).await?;
    if cached.as_ref() == Some(&last_data) {
        return Ok(());
    }
    session.insert(LAST_DATA, &last_data).await?;

    let persisted = async {
        let record = state
            .identity
            .get_user(&user.id)
            .await?
            .ok_or_else(|| AppError::Upstream(format!("User {} not found", user.id)))?;
        let mut metadata = record.user_metadata;
        metadata.last_data = Some(last_data);
        state.identity.update_metadata(&user.id, &metadata).await
    }
    .await;

    if let Err(e) = persisted {
        tracing::warn!("Failed to persist last form values for {}: {}", user.email, e);
    }
    Ok(())
}

pub async fn submit_generation(
    State(state): State<AppState>,
    session: Session,
    Extension(user): Extension<CurrentUser>,
    form: Result<Json<GenerateForm>, JsonRejection>,
) -> AppResult<Response> {
    let Json(form) = form.map_err(|_| AppError::Validation("Invalid request".into()))?;
    let request = GenerationRequest::validate(form, state.config.generation.max_batch)?;

    let balance = dispatch::prepare(&state, &user).await?;
    remember_last_data(&state, &session, &user, request.last_data()).await?;

    let response = match dispatch::submit(&state, &user, &request, balance).await? {
        SubmissionOutcome::Charged { report, remaining } => {
            tracing::info!(
                "{} job(s) submitted for {}, {} credit(s) left",
                request.repeat,
                user.email,
                remaining
            );
            Json(json!({
                "message": format!("{} job(s) submitted successfully.", request.repeat),
                "job_ids": report.succeeded_ids(),
            }))
            .into_response()
        }
        SubmissionOutcome::NotCharged { report } => {
            let failures = report.failures();
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Some jobs failed to submit.",
                    "submitted": report.outcomes.len() - failures.len(),
                    "failed": failures.len(),
                    "failures": failures,
                })),
            )
                .into_response()
        }
        SubmissionOutcome::ChargeFailed { report } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Job submitted but credits not updated.",
                "job_ids": report.succeeded_ids(),
            })),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn serve_profile(Extension(user): Extension<CurrentUser>) -> Response {
    Json(json!({
        "email": user.email,
        "full_name": user.metadata.full_name,
        "credits": user.metadata.credits,
        "email_verified": user.metadata.email_verified.unwrap_or(false),
        "disabled": user.metadata.is_disabled(),
    }))
    .into_response()
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    form: Result<Json<ProfileForm>, JsonRejection>,
) -> AppResult<Response> {
    let Json(form) = form.map_err(|_| AppError::Validation("Invalid request".into()))?;

    let full_name = form.full_name.as_deref().map(str::trim).unwrap_or("");
    if !full_name.is_empty() {
        let record = state
            .identity
            .get_user(&user.id)
            .await?
            .ok_or_else(|| AppError::Upstream(format!("User {} not found", user.id)))?;
        let mut metadata = record.user_metadata;
        metadata.full_name = Some(full_name.to_string());
        state.identity.update_metadata(&user.id, &metadata).await?;
    }

    let password = form.password.as_deref().map(str::trim).unwrap_or("");
    if !password.is_empty() {
        state.identity.update_password(&user.id, password).await?;
    }

    tracing::info!("Profile updated for {}", user.email);
    Ok(Json(json!({ "message": "Profile updated successfully." })).into_response())
}
