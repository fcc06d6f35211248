//! Reducer for the real-time job channel.
//!
//! The overlay is a best-effort progress cache painted between
//! authoritative refetches. Pushes may arrive reordered or duplicated;
//! correctness comes from every lifecycle transition triggering a full
//! refetch, never from patching local job state.

use std::collections::HashMap;

use mapleads_model::{Job, JobId};

use super::message::FeedMessage;

/// Side effect requested by [`FeedState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedEffect {
    RefetchJobs,
    RefetchUser,
}

const REFETCH_ALL: [FeedEffect; 2] =
    [FeedEffect::RefetchJobs, FeedEffect::RefetchUser];

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    connected: bool,
    /// Set once a connection has been lost, so the next `Connected` knows
    /// pushes may have been missed.
    interrupted: bool,
    overlay: HashMap<JobId, f32>,
    torn_down: bool,
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn overlay(&self) -> &HashMap<JobId, f32> {
        &self.overlay
    }

    pub fn progress(&self, job_id: &JobId) -> Option<f32> {
        self.overlay.get(job_id).copied()
    }

    /// Apply one message and return the refetches it calls for. After
    /// [`teardown`](Self::teardown) every message is ignored.
    pub fn apply(&mut self, message: FeedMessage) -> Vec<FeedEffect> {
        if self.torn_down {
            log::trace!("[JobFeed] message after teardown dropped");
            return Vec::new();
        }

        match message {
            FeedMessage::Connected => {
                self.connected = true;
                if std::mem::take(&mut self.interrupted) {
                    // Pushes sent while we were away are gone.
                    return REFETCH_ALL.to_vec();
                }
                Vec::new()
            }
            FeedMessage::ConnectError(reason) => {
                log::warn!("[JobFeed] connect error: {}", reason);
                self.connected = false;
                Vec::new()
            }
            FeedMessage::Disconnected(reason) => {
                log::info!("[JobFeed] disconnected: {}", reason);
                if self.connected {
                    self.interrupted = true;
                }
                self.connected = false;
                Vec::new()
            }
            FeedMessage::JobProgress(progress) => {
                let percentage = progress.progress.percentage;
                if percentage.is_finite() {
                    self.overlay
                        .insert(progress.job_id, percentage.clamp(0.0, 100.0));
                }
                Vec::new()
            }
            FeedMessage::JobUpdate(update) => {
                log::debug!(
                    "[JobFeed] job {} -> {:?}",
                    update.job_id,
                    update.kind
                );
                self.overlay.remove(&update.job_id);
                REFETCH_ALL.to_vec()
            }
            FeedMessage::ActiveJobs(status) => {
                for entry in status.jobs {
                    if entry.status.is_some_and(|s| s.is_terminal()) {
                        self.overlay.remove(&entry.job_id);
                        continue;
                    }
                    if let Some(progress) = entry.progress
                        && progress.percentage.is_finite()
                    {
                        self.overlay.insert(
                            entry.job_id,
                            progress.percentage.clamp(0.0, 100.0),
                        );
                    }
                }
                Vec::new()
            }
        }
    }

    /// Let an authoritative job listing win over the overlay: every listed
    /// job falls back to the progress the server reported. Jobs outside
    /// the page keep their entries.
    pub fn supersede<'a>(&mut self, jobs: impl IntoIterator<Item = &'a Job>) {
        for job in jobs {
            self.overlay.remove(&job.id);
        }
    }

    /// Idempotent. Resets connectivity and drops the overlay.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.connected = false;
        self.interrupted = false;
        self.overlay.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapleads_model::{
        ActiveJobEntry, ActiveJobsStatus, JobProgress, JobStatus, JobUpdate,
        JobUpdateKind, ProgressPayload,
    };

    fn update(job: &str, kind: JobUpdateKind) -> FeedMessage {
        FeedMessage::JobUpdate(JobUpdate {
            kind,
            job_id: JobId::from(job),
            message: None,
            record_count: None,
        })
    }

    fn progress(job: &str, percentage: f32) -> FeedMessage {
        FeedMessage::JobProgress(JobProgress::new(job, percentage))
    }

    #[test]
    fn progress_is_last_write_wins() {
        let mut state = FeedState::new();
        state.apply(progress("x", 42.0));
        state.apply(progress("x", 37.0));
        assert_eq!(state.progress(&JobId::from("x")), Some(37.0));
    }

    #[test]
    fn progress_is_clamped_and_nan_ignored() {
        let mut state = FeedState::new();
        state.apply(progress("x", 140.0));
        assert_eq!(state.progress(&JobId::from("x")), Some(100.0));
        state.apply(progress("x", f32::NAN));
        assert_eq!(state.progress(&JobId::from("x")), Some(100.0));
    }

    #[test]
    fn every_lifecycle_update_clears_entry_and_refetches() {
        for kind in [
            JobUpdateKind::JobCompleted,
            JobUpdateKind::JobNoDataFound,
            JobUpdateKind::JobFailed,
            JobUpdateKind::JobStarted,
            JobUpdateKind::JobDeleted,
        ] {
            let mut state = FeedState::new();
            state.apply(progress("x", 50.0));
            let effects = state.apply(update("x", kind));
            assert_eq!(state.progress(&JobId::from("x")), None);
            assert_eq!(
                effects,
                vec![FeedEffect::RefetchJobs, FeedEffect::RefetchUser]
            );
        }
    }

    #[test]
    fn duplicate_terminal_update_is_harmless() {
        let mut state = FeedState::new();
        state.apply(update("x", JobUpdateKind::JobCompleted));
        let effects = state.apply(update("x", JobUpdateKind::JobCompleted));
        assert_eq!(effects.len(), 2);
        assert!(state.overlay().is_empty());
    }

    #[test]
    fn connectivity_tracks_transport_events() {
        let mut state = FeedState::new();
        assert!(state.apply(FeedMessage::Connected).is_empty());
        assert!(state.is_connected());
        state.apply(FeedMessage::Disconnected("transport close".into()));
        assert!(!state.is_connected());
        // Reconnecting after an interruption refetches what was missed.
        assert_eq!(state.apply(FeedMessage::Connected).len(), 2);
        state.apply(FeedMessage::ConnectError("bad token".into()));
        assert!(!state.is_connected());
    }

    #[test]
    fn active_jobs_seed_overlay() {
        let mut state = FeedState::new();
        state.apply(progress("done", 80.0));
        state.apply(FeedMessage::ActiveJobs(ActiveJobsStatus {
            jobs: vec![
                ActiveJobEntry {
                    job_id: JobId::from("a"),
                    status: Some(JobStatus::Active),
                    progress: Some(ProgressPayload { percentage: 10.0 }),
                },
                ActiveJobEntry {
                    job_id: JobId::from("done"),
                    status: Some(JobStatus::Completed),
                    progress: None,
                },
            ],
        }));
        assert_eq!(state.progress(&JobId::from("a")), Some(10.0));
        assert_eq!(state.progress(&JobId::from("done")), None);
    }

    fn listed(id: &str, status: JobStatus, progress: f32) -> Job {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "keyword": "bakeries",
            "status": status.as_str(),
            "progress": progress,
        }))
        .unwrap()
    }

    #[test]
    fn refetch_supersedes_running_and_terminal_entries() {
        let mut state = FeedState::new();
        state.apply(progress("running", 37.0));
        state.apply(progress("done", 90.0));
        state.apply(progress("offpage", 12.0));

        state.supersede(&[
            listed("running", JobStatus::Active, 60.0),
            listed("done", JobStatus::Completed, 100.0),
        ]);

        assert_eq!(state.progress(&JobId::from("running")), None);
        assert_eq!(state.progress(&JobId::from("done")), None);
        assert_eq!(state.progress(&JobId::from("offpage")), Some(12.0));
    }

    #[test]
    fn teardown_is_idempotent_and_final() {
        let mut state = FeedState::new();
        state.apply(FeedMessage::Connected);
        state.apply(progress("x", 5.0));
        state.teardown();
        state.teardown();
        assert!(!state.is_connected());
        assert!(state.apply(progress("x", 9.0)).is_empty());
        assert!(state.apply(update("x", JobUpdateKind::JobFailed)).is_empty());
        assert!(state.overlay().is_empty());
    }
}
