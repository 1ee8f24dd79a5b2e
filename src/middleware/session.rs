use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::JobCounts;
use crate::state::AppState;

// Session keys
pub const USER: &str = "user";
pub const USER_ID: &str = "user_id";
pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";
pub const REALTIME: &str = "realtime";
pub const IS_ADMIN: &str = "is_admin";
pub const LAST_DATA: &str = "last_data";
pub const JOB_COUNTS: &str = "job_counts";

async fn flag(session: &Session, key: &str) -> bool {
    matches!(session.get::<bool>(key).await, Ok(Some(true)))
}

pub async fn is_admin(session: &Session) -> bool {
    flag(session, IS_ADMIN).await
}

pub async fn store_job_counts(session: &Session, counts: JobCounts) -> AppResult<()> {
    session.insert(JOB_COUNTS, counts).await?;
    Ok(())
}

/// Runs before routing: answers 503 on dashboard pages during maintenance
/// (except for allow-listed users) and drops any session that is neither an
/// end-user nor an admin session.
pub async fn session_gate(
    State(state): State<AppState>,
    session: Session,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    let maintenance = &state.config.maintenance;

    if maintenance.enabled && !path.starts_with("/api") && path.starts_with("/dashboard") {
        if let Ok(Some(user)) = session.get::<String>(USER).await {
            if !maintenance.allowed_users.iter().any(|u| u == &user) {
                tracing::info!("Maintenance mode, turning away {}", user);
                return AppError::Maintenance.into_response();
            }
        }
    }

    if !flag(&session, REALTIME).await && !is_admin(&session).await && !session.is_empty().await {
        tracing::debug!("Dropping session without realtime or admin marker");
        if let Err(e) = session.flush().await {
            tracing::warn!("Failed to flush session: {}", e);
        }
    }

    next.run(req).await
}
