use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Row of the `generated_images` table.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub prompt: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Projection used for counters and bulk operations.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobStatusRow {
    pub id: String,
    pub status: JobStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: usize,
    pub failed: usize,
    pub completed: usize,
    pub total: usize,
}

impl JobCounts {
    /// Rows with an unrecognised status are not counted, so `total` always
    /// equals the sum of the three buckets.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = JobStatus>,
    {
        let mut counts = JobCounts::default();
        for status in statuses {
            match status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Unknown => {}
            }
        }
        counts.total = counts.pending + counts.failed + counts.completed;
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_add_up() {
        let statuses = [
            JobStatus::Pending,
            JobStatus::Completed,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Unknown,
        ];
        let counts = JobCounts::from_statuses(statuses);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.total, counts.pending + counts.failed + counts.completed);
    }

    #[test]
    fn unexpected_status_is_tolerated() {
        let row: JobStatusRow = serde_json::from_str(r#"{"id":"1","status":"queued"}"#).unwrap();
        assert_eq!(row.status, JobStatus::Unknown);
    }
}
