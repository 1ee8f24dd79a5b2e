use std::collections::HashMap;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use crate::errors::AppResult;
use crate::models::{ProgressEntry, UnsettledCharge};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedImage {
    pub content_type: String,
    pub body: Bytes,
}

/// Short-lived shared state: download progress, the image response cache and
/// the ledger of credits that could not be charged.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Stores the entry and makes it the owner's latest download.
    async fn put_progress(&self, download_id: &str, entry: &ProgressEntry, ttl: Duration) -> AppResult<()>;
    async fn get_progress(&self, download_id: &str) -> AppResult<Option<ProgressEntry>>;
    async fn latest_download(&self, owner: &str) -> AppResult<Option<String>>;
    async fn cached_image(&self, key: &str) -> AppResult<Option<CachedImage>>;
    async fn cache_image(&self, key: &str, image: &CachedImage, ttl: Duration) -> AppResult<()>;
    async fn push_unsettled_charge(&self, charge: &UnsettledCharge) -> AppResult<()>;
    /// Removes and returns every outstanding charge for the user.
    async fn take_unsettled_charges(&self, user_id: &str) -> AppResult<Vec<UnsettledCharge>>;
}

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self, now: Instant) -> Option<T> {
        (self.expires_at > now).then(|| self.value.clone())
    }
}

/// Single-process store. State is not shared between workers.
#[derive(Default)]
pub struct InProcessStore {
    progress: RwLock<HashMap<String, Expiring<ProgressEntry>>>,
    latest: RwLock<HashMap<String, Expiring<String>>>,
    images: RwLock<HashMap<String, Expiring<CachedImage>>>,
    ledger: RwLock<HashMap<String, Vec<UnsettledCharge>>>,
}

impl InProcessStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn purge<T>(map: &mut HashMap<String, Expiring<T>>, now: Instant) {
    map.retain(|_, item| item.expires_at > now);
}

#[async_trait]
impl EphemeralStore for InProcessStore {
    async fn put_progress(&self, download_id: &str, entry: &ProgressEntry, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        {
            let mut progress = self.progress.write();
            purge(&mut progress, now);
            progress.insert(download_id.to_string(), Expiring::new(entry.clone(), ttl));
        }
        let mut latest = self.latest.write();
        purge(&mut latest, now);
        latest.insert(entry.owner.clone(), Expiring::new(download_id.to_string(), ttl));
        Ok(())
    }

    async fn get_progress(&self, download_id: &str) -> AppResult<Option<ProgressEntry>> {
        let now = Instant::now();
        Ok(self.progress.read().get(download_id).and_then(|e| e.live(now)))
    }

    async fn latest_download(&self, owner: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        Ok(self.latest.read().get(owner).and_then(|e| e.live(now)))
    }

    async fn cached_image(&self, key: &str) -> AppResult<Option<CachedImage>> {
        let now = Instant::now();
        Ok(self.images.read().get(key).and_then(|e| e.live(now)))
    }

    async fn cache_image(&self, key: &str, image: &CachedImage, ttl: Duration) -> AppResult<()> {
        let mut images = self.images.write();
        purge(&mut images, Instant::now());
        images.insert(key.to_string(), Expiring::new(image.clone(), ttl));
        Ok(())
    }

    async fn push_unsettled_charge(&self, charge: &UnsettledCharge) -> AppResult<()> {
        self.ledger
            .write()
            .entry(charge.user_id.clone())
            .or_default()
            .push(charge.clone());
        Ok(())
    }

    async fn take_unsettled_charges(&self, user_id: &str) -> AppResult<Vec<UnsettledCharge>> {
        Ok(self.ledger.write().remove(user_id).unwrap_or_default())
    }
}
