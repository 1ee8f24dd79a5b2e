mod admin;
mod auth;
mod basket;
mod dashboard;
mod images;
mod jobs;
mod site;

pub use admin::{impersonate, serve_admin, stop_impersonation};
pub use auth::{
    handle_login, handle_logout, handle_register, login_page, register_page, resend_confirmation,
    reset_password,
};
pub use basket::{delete_images, list_images, upload_images};
pub use dashboard::{serve_dashboard, serve_profile, submit_generation, update_profile};
pub use images::proxy_image;
pub use jobs::{
    count_completed, delete_all, delete_selected, download_all, download_one, download_progress,
    list_jobs, DOWNLOAD_ID_HEADER,
};
pub use site::{health, index, upload_from_url, UPLOAD_TOKEN_HEADER};
