use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use tower_sessions::Session;
use bcrypt::verify;
use crate::errors::{AppError, AppResult};
use crate::extract::JsonOrForm;
use crate::middleware::session::{
    is_admin, ACCESS_TOKEN, IS_ADMIN, LAST_DATA, REALTIME, REFRESH_TOKEN, USER, USER_ID,
};
use crate::models::{LoginForm, RegisterForm, ResendForm, ResetPasswordForm};
use crate::services::SignUp;
use crate::state::AppState;

const STORAGE_SUBFOLDERS: [&str; 2] = ["my_images", "generated_images"];

// Logged-in visitors skip the login and register pages.
async fn already_signed_in(session: &Session) -> Option<Response> {
    if let Ok(Some(_)) = session.get::<String>(USER).await {
        return Some(Redirect::to("/dashboard/").into_response());
    }
    if is_admin(session).await {
        return Some(Redirect::to("/admin/").into_response());
    }
    None
}

pub async fn login_page(session: Session) -> Response {
    match already_signed_in(&session).await {
        Some(redirect) => redirect,
        None => Json(json!({ "page": "login" })).into_response(),
    }
}

pub async fn register_page(session: Session) -> Response {
    match already_signed_in(&session).await {
        Some(redirect) => redirect,
        None => Json(json!({ "page": "register" })).into_response(),
    }
}

fn admin_credentials_match(state: &AppState, email: &str, password: &str) -> bool {
    let admin = &state.config.admin;
    !admin.password_hash.is_empty()
        && email == admin.email
        && verify(password, &admin.password_hash).unwrap_or(false)
}

pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> AppResult<Response> {
    let Json(form) =
        form.map_err(|_| AppError::rejected(StatusCode::BAD_REQUEST, "Request must be JSON"))?;

    let (email, password) = match (form.email, form.password) {
        (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => (e, p),
        _ => {
            return Err(AppError::rejected(
                StatusCode::BAD_REQUEST,
                "Email and password are required",
            ))
        }
    };

    tracing::info!("Login attempt for user: {}", email);

    if admin_credentials_match(&state, &email, &password) {
        session.insert(IS_ADMIN, true).await?;
        tracing::info!("Admin signed in");
        return Ok(Json(json!({ "success": true, "redirect": "/admin/" })).into_response());
    }

    let sign_in = match state.identity.sign_in(&email, &password).await {
        Ok(Some(sign_in)) => sign_in,
        Ok(None) => {
            tracing::info!("Invalid credentials for user: {}", email);
            return Err(AppError::rejected(
                StatusCode::UNAUTHORIZED,
                "Invalid email or password",
            ));
        }
        Err(e) => {
            tracing::error!("Login failed for {}: {}", email, e);
            return Err(AppError::rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Login failed: {}", e),
            ));
        }
    };

    let user = sign_in.user;
    session.insert(USER, user.email.clone().unwrap_or(email)).await?;
    session.insert(USER_ID, &user.id).await?;
    session.insert(ACCESS_TOKEN, sign_in.access_token).await?;
    session.insert(REFRESH_TOKEN, sign_in.refresh_token).await?;
    session.insert(REALTIME, true).await?;

    // Restore the last used generation form
    if let Some(last_data) = user.user_metadata.last_data {
        session.insert(LAST_DATA, last_data).await?;
    }

    tracing::info!("User {} signed in", user.id);
    Ok(Json(json!({ "success": true, "redirect": "/dashboard/" })).into_response())
}

pub async fn handle_register(
    State(state): State<AppState>,
    JsonOrForm(form): JsonOrForm<RegisterForm>,
) -> AppResult<Response> {
    let (email, password) = match (form.email, form.password) {
        (Some(e), Some(p)) if !e.is_empty() && !p.is_empty() => (e, p),
        _ => {
            return Err(AppError::rejected(
                StatusCode::BAD_REQUEST,
                "Email and password are required",
            ))
        }
    };

    if state.identity.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::rejected(
            StatusCode::BAD_REQUEST,
            "This email is already registered. Please log in.",
        ));
    }

    let full_name = format!(
        "{} {}",
        form.fname.unwrap_or_default(),
        form.lname.unwrap_or_default()
    );
    let request = SignUp {
        email: email.clone(),
        password,
        metadata: json!({ "full_name": full_name.trim(), "disabled": "True" }),
        redirect_to: format!("{}/auth/login", state.config.server.public_url.trim_end_matches('/')),
    };

    let user = match state.identity.sign_up(&request).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return Err(AppError::rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                "User registration failed.",
            ))
        }
        Err(e) => {
            return Err(AppError::rejected(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Registration failed: {}", e),
            ))
        }
    };

    // Storage layout failures do not undo the registration
    let owner = user.email.unwrap_or(email);
    let storage = &state.config.storage;
    state.storage.create_folder(&storage.folder_key(&owner)).await;
    for sub in STORAGE_SUBFOLDERS {
        let key = storage.folder_key(&format!("{}/{}", owner, sub));
        if !state.storage.create_folder(&key).await {
            tracing::warn!("Storage setup incomplete for {}", owner);
        }
    }

    tracing::info!("Registered user {}", owner);
    Ok(Json(json!({
        "success": true,
        "message": "Registration successful! Please verify your email.",
    }))
    .into_response())
}

pub async fn handle_logout(session: Session) -> AppResult<Response> {
    session.flush().await?;
    Ok(Json(json!({ "success": true })).into_response())
}

pub async fn reset_password(
    State(state): State<AppState>,
    session: Session,
    JsonOrForm(form): JsonOrForm<ResetPasswordForm>,
) -> AppResult<Response> {
    if session.get::<String>(USER).await?.is_none() {
        return Err(AppError::Unauthorized(
            "You must be logged in to reset your password.".into(),
        ));
    }
    let access_token = session
        .get::<String>(ACCESS_TOKEN)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session has no access token.".into()))?;

    let password = form.new_password.unwrap_or_default();
    if password.chars().count() < 6 {
        return Err(AppError::Validation(
            "Password must be at least 6 characters long.".into(),
        ));
    }

    state.identity.update_own_password(&access_token, &password).await?;
    Ok(Json(json!({ "message": "Password reset successfully." })).into_response())
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    JsonOrForm(form): JsonOrForm<ResendForm>,
) -> AppResult<Response> {
    let user = state
        .identity
        .find_user_by_email(&form.email)
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to resend confirmation email: {}", e)))?
        .ok_or_else(|| AppError::NotFound("No account found with that email.".into()))?;
    if user.is_confirmed() {
        return Err(AppError::Validation(
            "Your email is already confirmed. Please log in.".into(),
        ));
    }

    let redirect_to = format!("{}/auth/login", state.config.server.public_url.trim_end_matches('/'));
    state
        .identity
        .resend_confirmation(&form.email, &redirect_to)
        .await
        .map_err(|e| AppError::Upstream(format!("Failed to resend confirmation email: {}", e)))?;

    Ok(Json(json!({
        "message": "A new confirmation email has been sent. Check your inbox.",
    }))
    .into_response())
}
