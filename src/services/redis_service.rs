use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use crate::errors::{AppError, AppResult};
use crate::models::{ProgressEntry, UnsettledCharge};
use super::ephemeral::{CachedImage, EphemeralStore};

/// Redis-backed ephemeral state, shared by every worker pointing at the same server.
#[derive(Clone)]
pub struct RedisService {
    conn: ConnectionManager,
}

impl RedisService {
    pub async fn connect(client: Client) -> Result<Self, redis::RedisError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn progress_key(download_id: &str) -> String {
    format!("download:{}", download_id)
}

fn latest_key(owner: &str) -> String {
    format!("download:latest:{}", owner)
}

fn image_key(key: &str) -> String {
    format!("image_cache:{}", key)
}

fn ledger_key(user_id: &str) -> String {
    format!("credit_ledger:{}", user_id)
}

// SETEX rejects a zero expiry.
fn ttl_secs(ttl: Duration) -> usize {
    ttl.as_secs().max(1) as usize
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> AppResult<T> {
    serde_json::from_str(raw).map_err(|e| {
        AppError::Redis(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "Failed to parse stored value",
            e.to_string(),
        )))
    })
}

fn encode<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string(value).map_err(|e| {
        AppError::Redis(redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "Failed to serialize value",
            e.to_string(),
        )))
    })
}

#[async_trait]
impl EphemeralStore for RedisService {
    async fn put_progress(&self, download_id: &str, entry: &ProgressEntry, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set_ex(progress_key(download_id), encode(entry)?, ttl_secs(ttl))
            .ignore()
            .set_ex(latest_key(&entry.owner), download_id, ttl_secs(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_progress(&self, download_id: &str) -> AppResult<Option<ProgressEntry>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(progress_key(download_id)).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn latest_download(&self, owner: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(latest_key(owner)).await?)
    }

    async fn cached_image(&self, key: &str) -> AppResult<Option<CachedImage>> {
        let mut conn = self.conn.clone();
        let (content_type, body): (Option<String>, Option<Vec<u8>>) =
            conn.hget(image_key(key), &["content_type", "body"]).await?;
        Ok(match (content_type, body) {
            (Some(content_type), Some(body)) => Some(CachedImage {
                content_type,
                body: Bytes::from(body),
            }),
            _ => None,
        })
    }

    async fn cache_image(&self, key: &str, image: &CachedImage, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = image_key(key);
        redis::pipe()
            .atomic()
            .hset(&key, "content_type", &image.content_type)
            .ignore()
            .hset(&key, "body", image.body.as_ref())
            .ignore()
            .expire(&key, ttl_secs(ttl))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn push_unsettled_charge(&self, charge: &UnsettledCharge) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(ledger_key(&charge.user_id), encode(charge)?)
            .await?;
        Ok(())
    }

    async fn take_unsettled_charges(&self, user_id: &str) -> AppResult<Vec<UnsettledCharge>> {
        let mut conn = self.conn.clone();
        let key = ledger_key(user_id);
        let (raw,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(&key, 0, -1)
            .del(&key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        raw.iter().map(|r| decode(r)).collect()
    }
}
