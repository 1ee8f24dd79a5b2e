use thiserror::Error;

pub mod dispatch;
pub mod response;

pub use dispatch::DispatchError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Page-style authentication failure, answered with a redirect to the login page.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// API-style authentication failure, answered with 401.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Service under maintenance.")]
    Maintenance,

    /// Failure reported by the identity service, the tables API or object storage.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Error answered in the `{success: false, message}` shape used by the batch endpoints.
    #[error("{message}")]
    Rejected {
        status: axum::http::StatusCode,
        message: String,
    },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl AppError {
    pub fn rejected(status: axum::http::StatusCode, message: impl Into<String>) -> Self {
        AppError::Rejected {
            status,
            message: message.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
