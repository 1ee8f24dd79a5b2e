use axum::{
    extract::State,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use tower_sessions::Session;
use crate::errors::AppResult;
use crate::extract::JsonOrForm;
use crate::middleware::session::{IS_ADMIN, REALTIME, USER, USER_ID};
use crate::models::ImpersonateForm;
use crate::state::AppState;

fn back_to_admin(error: &str) -> Response {
    Redirect::to(&format!("/admin/?error={}", urlencoding::encode(error))).into_response()
}

pub async fn serve_admin() -> Response {
    Json(json!({ "page": "admin" })).into_response()
}

/// Turns the admin session into a session of the chosen user.
pub async fn impersonate(
    State(state): State<AppState>,
    session: Session,
    JsonOrForm(form): JsonOrForm<ImpersonateForm>,
) -> AppResult<Response> {
    let Some(user_id) = form.user_id.filter(|id| !id.is_empty()) else {
        return Ok(back_to_admin("No user ID provided for impersonation."));
    };

    let record = match state.identity.get_user(&user_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(back_to_admin("User not found.")),
        Err(e) => {
            tracing::error!("Impersonation lookup failed for {}: {}", user_id, e);
            return Ok(back_to_admin("User not found."));
        }
    };
    let Some(email) = record.email else {
        return Ok(back_to_admin("User not found."));
    };

    session.insert(USER_ID, &record.id).await?;
    session.insert(USER, &email).await?;
    session.insert(REALTIME, true).await?;

    tracing::info!("Admin is now impersonating {}", email);
    Ok(Redirect::to("/dashboard/").into_response())
}

pub async fn stop_impersonation(session: Session) -> AppResult<Response> {
    session.flush().await?;
    session.insert(IS_ADMIN, true).await?;
    tracing::info!("Admin stopped impersonation");
    Ok(Redirect::to("/admin/").into_response())
}
