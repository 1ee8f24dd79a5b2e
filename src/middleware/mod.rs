pub mod auth;
pub mod session;

pub use auth::{require_admin, require_api_user, require_user};
pub use session::session_gate;
