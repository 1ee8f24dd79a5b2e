use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use crate::errors::AppError;
use crate::models::CurrentUser;
use crate::state::AppState;
use super::session::{is_admin, USER, USER_ID};

/// Re-validates the session user against the identity service. Any failure
/// clears the session. There is no local caching of validity.
async fn resolve_user(state: &AppState, session: &Session) -> Result<CurrentUser, String> {
    let user_id = match session.get::<String>(USER_ID).await {
        Ok(Some(id)) => id,
        Ok(None) => return Err("Not authenticated".into()),
        Err(e) => return Err(format!("Session error: {}", e)),
    };

    let failure = match state.identity.get_user(&user_id).await {
        Ok(Some(record)) => {
            let session_email = session.get::<String>(USER).await.ok().flatten();
            match record.email.or(session_email) {
                Some(email) => {
                    return Ok(CurrentUser {
                        id: record.id,
                        email,
                        metadata: record.user_metadata,
                    })
                }
                None => format!("User {} has no email", user_id),
            }
        }
        Ok(None) => format!("User {} not found", user_id),
        Err(e) => {
            tracing::error!("Session validation failed for {}: {}", user_id, e);
            format!("Session validation failed: {}", e)
        }
    };

    if let Err(e) = session.flush().await {
        tracing::warn!("Failed to clear session: {}", e);
    }
    Err(failure)
}

/// Gate for page routes: unauthenticated requests are sent to the login page.
pub async fn require_user(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_user(&state, &session).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(reason) => {
            tracing::debug!("Redirecting {} to login: {}", req.uri().path(), reason);
            Redirect::to("/auth/login").into_response()
        }
    }
}

/// Gate for JSON routes: unauthenticated requests get 401.
pub async fn require_api_user(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_user(&state, &session).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(reason) => AppError::Unauthorized(reason).into_response(),
    }
}

pub async fn require_admin(session: Session, req: Request, next: Next) -> Response {
    if is_admin(&session).await {
        next.run(req).await
    } else {
        Redirect::to("/auth/login").into_response()
    }
}
