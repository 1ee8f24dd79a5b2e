use std::sync::Arc;
use crate::config::Config;
use crate::services::{
    EphemeralStore, GcsStorage, GenerationWebhook, HttpWebhook, IdentityService, InProcessStore,
    ObjectStorage, PostgrestTables, RedisService, SupabaseIdentity, TableService,
};

/// Application state that can be shared between handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: Arc<dyn IdentityService>,
    pub tables: Arc<dyn TableService>,
    pub storage: Arc<dyn ObjectStorage>,
    pub webhook: Arc<dyn GenerationWebhook>,
    pub store: Arc<dyn EphemeralStore>,
    /// Plain client for fetching caller-supplied URLs.
    pub http: reqwest::Client,
}

impl AppState {
    /// Wires the production clients described by `config`.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store: Arc<dyn EphemeralStore> = if config.redis.enabled {
            let client = redis::Client::open(config.redis.url.as_str())?;
            tracing::info!("Using Redis at {} for download progress and image cache", config.redis.url);
            Arc::new(RedisService::connect(client).await?)
        } else {
            tracing::warn!("Redis disabled, keeping ephemeral state in process");
            Arc::new(InProcessStore::new())
        };

        Ok(Self {
            identity: Arc::new(SupabaseIdentity::new(http.clone(), config.identity.clone())),
            tables: Arc::new(PostgrestTables::new(http.clone(), config.identity.clone())),
            storage: Arc::new(GcsStorage::new(http.clone(), config.storage.clone())),
            webhook: Arc::new(HttpWebhook::new(
                http.clone(),
                config.generation.webhook_url.clone(),
                config.generation.timeout_secs,
            )),
            store,
            http,
            config: Arc::new(config),
        })
    }

    pub fn storage_link(&self) -> String {
        self.config.storage.storage_link()
    }

    /// Public URL of `{owner}/{kind}/{id}.jpeg`.
    pub fn image_url(&self, owner: &str, kind: &str, id: &str) -> String {
        format!("{}/{}/{}/{}.jpeg", self.storage_link(), owner, kind, id)
    }
}
