use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chrono::{DateTime, Utc};
use crate::error::ModelError;
use crate::ids::JobId;

/// Lifecycle status of an extraction job. The set is closed; the server
/// owns every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    #[serde(alias = "processing", alias = "running")]
    Active,
    Completed,
    Failed,
    #[serde(alias = "no-data-found", alias = "noDataFound")]
    NoDataFound,
    Deleted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Active,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::NoDataFound,
        JobStatus::Deleted,
    ];

    /// No further transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::Failed
                | JobStatus::NoDataFound
                | JobStatus::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::NoDataFound => "no_data_found",
            JobStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ModelError::InvalidStatus(s.to_string()))
    }
}

/// A server-owned extraction job as returned by the jobs listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(alias = "_id")]
    pub id: JobId,
    #[serde(default)]
    pub keyword: String,
    /// Human readable location label, e.g. `"CA, US"`.
    #[serde(default)]
    pub location: Option<String>,
    pub status: JobStatus,
    /// Server-confirmed completion percentage.
    #[serde(default)]
    pub progress: f32,
    #[serde(default, alias = "totalRecords", alias = "recordsCount")]
    pub record_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Only completed jobs carry a downloadable result file.
    pub fn is_downloadable(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(JobStatus::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::NoDataFound,
                JobStatus::Deleted
            ]
        );
    }

    #[test]
    fn status_parses_wire_spellings() {
        assert_eq!(
            "no-data-found".parse::<JobStatus>().unwrap(),
            JobStatus::NoDataFound
        );
        let status: JobStatus =
            serde_json::from_str("\"noDataFound\"").unwrap();
        assert_eq!(status, JobStatus::NoDataFound);
        assert!("exploded".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_accepts_document_id() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "_id": "65f0c2",
            "keyword": "coffee shops",
            "location": "CA, US",
            "status": "completed",
            "progress": 100,
            "totalRecords": 42,
            "completedAt": "2024-03-15T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(job.id.as_str(), "65f0c2");
        assert_eq!(job.record_count, 42);
        assert!(job.is_downloadable());
        assert!(job.completed_at.is_some());
    }
}
