pub mod config;
pub mod dispatch;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::cookie::SameSite;
use tower_sessions::{MemoryStore, SessionManagerLayer};
use crate::middleware::{require_admin, require_api_user, require_user, session_gate};
use crate::state::AppState;

/// Full application router: page routes redirect to the login form when the
/// session is not authenticated, API routes answer 401.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.session.secure)
        .with_same_site(SameSite::Lax)
        .with_name(config.session.cookie_name.clone());

    let pages = Router::new()
        .route("/dashboard/", get(handlers::serve_dashboard))
        .route("/dashboard/profile/", get(handlers::serve_profile))
        .route_layer(from_fn_with_state(state.clone(), require_user));

    let api = Router::new()
        .route("/dashboard/", post(handlers::submit_generation))
        .route("/dashboard/profile/", post(handlers::update_profile))
        .route(
            "/dashboard/jobs/",
            get(handlers::list_jobs).post(handlers::delete_selected),
        )
        .route("/dashboard/jobs", delete(handlers::delete_all))
        .route("/dashboard/jobs/count", get(handlers::count_completed))
        .route("/dashboard/jobs/download", post(handlers::download_all))
        .route(
            "/dashboard/jobs/download/progress",
            get(handlers::download_progress),
        )
        .route("/dashboard/jobs/download/:job_id", get(handlers::download_one))
        .route(
            "/dashboard/basket/",
            get(handlers::list_images)
                .post(handlers::upload_images)
                .delete(handlers::delete_images),
        )
        .route("/images/*path", get(handlers::proxy_image))
        .route_layer(from_fn_with_state(state.clone(), require_api_user));

    let admin = Router::new()
        .route("/admin/", get(handlers::serve_admin))
        .route("/admin/impersonate", post(handlers::impersonate))
        .route("/admin/stop_impersonation", post(handlers::stop_impersonation))
        .route_layer(from_fn(require_admin));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(
            "/auth/login",
            get(handlers::login_page).post(handlers::handle_login),
        )
        .route(
            "/auth/register",
            get(handlers::register_page).post(handlers::handle_register),
        )
        .route("/auth/logout", post(handlers::handle_logout))
        .route("/auth/reset_password", post(handlers::reset_password))
        .route("/auth/resend", post(handlers::resend_confirmation))
        .route("/upload", post(handlers::upload_from_url))
        .merge(pages)
        .merge(api)
        .merge(admin)
        .nest_service("/static", ServeDir::new("static"))
        .layer(from_fn_with_state(state.clone(), session_gate))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.upload.max_body_size))
        .with_state(state)
}
