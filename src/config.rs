use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub redis: RedisConfig,
    pub identity: IdentityConfig,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub maintenance: MaintenanceConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub secure: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub enabled: bool,
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    pub url: String,
    pub service_key: String,
    pub anon_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub api_base: String,
    pub bucket: String,
    pub root: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub webhook_url: String,
    pub timeout_secs: u64,
    pub primary_model: String,
    pub alternate_model: String,
    pub alternate_type: String,
    pub max_batch: u32,
    pub max_repeat_display: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub image_max_age_secs: u64,
    pub progress_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_body_size: usize,
    pub callback_token: String,
}

impl Config {
    /// Built-in defaults, then `config/local.*` if present, then `APP_*` variables
    /// (`APP_IDENTITY__SERVICE_KEY`, `APP_MAINTENANCE__ALLOWED_USERS=a@x,b@y`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("maintenance.allowed_users")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(overrides: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(overrides, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

impl StorageConfig {
    /// Public prefix every stored image is reachable under.
    pub fn storage_link(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_base.trim_end_matches('/'),
            self.bucket,
            self.root.trim_matches('/')
        )
    }

    /// Bucket-relative key of `{root}/{owner}/{kind}/{id}.jpeg`.
    pub fn image_key(&self, owner: &str, kind: &str, id: &str) -> String {
        format!("{}/{}/{}/{}.jpeg", self.root.trim_matches('/'), owner, kind, id)
    }

    pub fn folder_key(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.root.trim_matches('/').to_string()
        } else {
            format!("{}/{}", self.root.trim_matches('/'), path)
        }
    }
}
