use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub current: usize,
    pub total: usize,
}

/// Credits owed after a fully dispatched batch whose credit write failed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnsettledCharge {
    pub user_id: String,
    pub amount: i64,
    pub job_ids: Vec<String>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Progress of one bulk download, tagged with the email that started it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressEntry {
    pub owner: String,
    #[serde(flatten)]
    pub progress: DownloadProgress,
}
