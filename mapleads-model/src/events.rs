//! Payloads pushed over the real-time job channel.

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::job::JobStatus;

/// `data.type` of a `job_update` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobUpdateKind {
    JobCompleted,
    JobNoDataFound,
    JobFailed,
    JobStarted,
    JobDeleted,
}

impl JobUpdateKind {
    /// The status the job is in after this transition.
    pub fn resulting_status(&self) -> JobStatus {
        match self {
            JobUpdateKind::JobCompleted => JobStatus::Completed,
            JobUpdateKind::JobNoDataFound => JobStatus::NoDataFound,
            JobUpdateKind::JobFailed => JobStatus::Failed,
            JobUpdateKind::JobStarted => JobStatus::Active,
            JobUpdateKind::JobDeleted => JobStatus::Deleted,
        }
    }
}

/// Lifecycle transition for a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    #[serde(rename = "type")]
    pub kind: JobUpdateKind,
    pub job_id: JobId,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub record_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub percentage: f32,
}

/// Incremental progress for a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub job_id: JobId,
    pub progress: ProgressPayload,
}

impl JobProgress {
    pub fn new(job_id: impl Into<JobId>, percentage: f32) -> Self {
        Self {
            job_id: job_id.into(),
            progress: ProgressPayload { percentage },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobEntry {
    pub job_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub progress: Option<ProgressPayload>,
}

/// Snapshot of the caller's running jobs, sent by the server after the
/// socket authenticates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveJobsStatus {
    #[serde(default)]
    pub jobs: Vec<ActiveJobEntry>,
}
