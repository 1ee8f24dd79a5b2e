use thiserror::Error;

/// Failure of a single generation webhook call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Webhook call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Webhook answered with status {0}")]
    Status(u16),

    #[error("Webhook transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            DispatchError::Status(status.as_u16())
        } else {
            DispatchError::Transport(err.to_string())
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
