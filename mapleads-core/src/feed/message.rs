use mapleads_model::{ActiveJobsStatus, JobProgress, JobUpdate};
use serde_json::Value;

/// Event names emitted by the backend on the job channel.
pub mod events {
    pub const JOB_UPDATE: &str = "job_update";
    pub const JOB_PROGRESS: &str = "job_progress";
    pub const ACTIVE_JOBS_STATUS: &str = "active_jobs_status";
}

/// Typed message delivered by the feed transport.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Socket authenticated and joined.
    Connected,
    /// Handshake rejected by the server, usually a bad token.
    ConnectError(String),
    /// Transport dropped or the server closed the socket.
    Disconnected(String),
    JobUpdate(JobUpdate),
    JobProgress(JobProgress),
    ActiveJobs(ActiveJobsStatus),
}

impl FeedMessage {
    /// Map a socket event to a message. Unknown names and payloads that do
    /// not decode are dropped; the channel is advisory so a bad frame must
    /// never take the feed down.
    pub fn from_event(name: &str, args: &[Value]) -> Option<Self> {
        let Some(data) = args.first() else {
            log::debug!("[JobFeed] event '{}' without payload ignored", name);
            return None;
        };

        let decoded = match name {
            events::JOB_UPDATE => serde_json::from_value(data.clone())
                .map(FeedMessage::JobUpdate),
            events::JOB_PROGRESS => serde_json::from_value(data.clone())
                .map(FeedMessage::JobProgress),
            events::ACTIVE_JOBS_STATUS => {
                serde_json::from_value(data.clone()).map(FeedMessage::ActiveJobs)
            }
            other => {
                log::debug!("[JobFeed] unhandled event '{}'", other);
                return None;
            }
        };

        match decoded {
            Ok(message) => Some(message),
            Err(err) => {
                log::warn!(
                    "[JobFeed] failed to decode '{}' payload: {} - data: {}",
                    name,
                    err,
                    data
                );
                None
            }
        }
    }
}
