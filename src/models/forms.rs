use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub fname: Option<String>,
    #[serde(default)]
    pub lname: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResendForm {
    pub email: String,
}

/// Body of a generation request submitted from the dashboard.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct GenerateForm {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_repeat() -> u32 {
    1
}

fn default_resolution() -> String {
    "1:1-1K".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    12
}

#[derive(Debug, Deserialize)]
pub struct DeleteJobsForm {
    #[serde(default)]
    pub job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImagesForm {
    #[serde(default)]
    pub delete_images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(default)]
    pub download_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImpersonateForm {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadFromUrlForm {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}
