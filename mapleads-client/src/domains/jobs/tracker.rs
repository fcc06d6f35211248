//! Job table state driven by the real-time feed.
//!
//! The tracker is the single consumer of a [`JobFeed`]. It runs every
//! message through the [`FeedState`] reducer, performs the refetches the
//! reducer asks for and publishes the result as a [`JobBoard`] snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use mapleads_core::{FeedEffect, FeedMessage, FeedState};
use mapleads_model::{Job, JobId, JobListQuery, Page, User};
use tokio::sync::watch;

use super::backend::JobsBackend;
use super::feed::JobFeed;
use crate::infra::api_error::ApiError;

/// What a job table renders.
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    pub jobs: Page<Job>,
    pub user: Option<User>,
    /// Live progress painted over `jobs` until the next refetch.
    pub overlay: HashMap<JobId, f32>,
    pub connected: bool,
    /// Last error, as shown to the user.
    pub notice: Option<String>,
    pub session_expired: bool,
}

impl JobBoard {
    /// Overlay progress when known, else what the listing reported.
    pub fn progress_of(&self, job: &Job) -> f32 {
        self.overlay.get(&job.id).copied().unwrap_or(job.progress)
    }
}

pub struct JobTracker<B: ?Sized> {
    backend: Arc<B>,
    query: JobListQuery,
    state: FeedState,
    board: watch::Sender<JobBoard>,
}

impl<B: ?Sized> std::fmt::Debug for JobTracker<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("query", &self.query)
            .field("state", &self.state)
            .finish()
    }
}

impl<B> JobTracker<B>
where
    B: JobsBackend + ?Sized,
{
    pub fn new(backend: Arc<B>, query: JobListQuery) -> Self {
        let (board, _) = watch::channel(JobBoard::default());
        Self {
            backend,
            query,
            state: FeedState::new(),
            board,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<JobBoard> {
        self.board.subscribe()
    }

    pub fn board(&self) -> JobBoard {
        self.board.borrow().clone()
    }

    pub fn query(&self) -> &JobListQuery {
        &self.query
    }

    /// Change filters or page; takes effect on the next refetch.
    pub fn set_query(&mut self, query: JobListQuery) {
        self.query = query;
    }

    /// Refetch both the listing and the user summary.
    pub async fn refresh(&mut self) {
        self.execute(&[FeedEffect::RefetchJobs, FeedEffect::RefetchUser])
            .await;
    }

    pub async fn handle(&mut self, message: FeedMessage) {
        let effects = self.state.apply(message);
        self.publish_feed_state();
        if !effects.is_empty() {
            self.execute(&effects).await;
        }
    }

    /// Drive the tracker until the feed ends, the tracker is torn down or
    /// the session expires.
    pub async fn run(&mut self, feed: &mut JobFeed) {
        while let Some(message) = feed.recv().await {
            self.handle(message).await;
            if self.state.is_torn_down() || self.board.borrow().session_expired
            {
                break;
            }
        }
        log::debug!("[JobTracker] feed loop finished");
    }

    /// Idempotent. Drops the overlay and marks the board offline; later
    /// messages are ignored.
    pub fn teardown(&mut self) {
        if self.state.is_torn_down() {
            return;
        }
        self.state.teardown();
        self.publish_feed_state();
        log::debug!("[JobTracker] torn down");
    }

    fn publish_feed_state(&self) {
        let connected = self.state.is_connected();
        let overlay = self.state.overlay().clone();
        self.board.send_modify(|board| {
            board.connected = connected;
            board.overlay = overlay;
        });
    }

    async fn execute(&mut self, effects: &[FeedEffect]) {
        let want_jobs = effects.contains(&FeedEffect::RefetchJobs);
        let want_user = effects.contains(&FeedEffect::RefetchUser);
        let backend = Arc::clone(&self.backend);
        let query = self.query.clone();

        let (jobs, user) = tokio::join!(
            async {
                if want_jobs {
                    Some(backend.list_jobs(&query).await)
                } else {
                    None
                }
            },
            async {
                if want_user {
                    Some(backend.current_user().await)
                } else {
                    None
                }
            },
        );

        if self.state.is_torn_down() {
            return;
        }

        let mut notice = None;
        let mut session_expired = false;
        let mut note = |err: ApiError| {
            log::warn!("[JobTracker] refetch failed: {}", err);
            session_expired |= err.is_fatal();
            notice = Some(err.user_message());
        };

        let jobs = match jobs {
            Some(Ok(page)) => {
                self.state.supersede(&page.data);
                Some(page)
            }
            Some(Err(err)) => {
                note(err);
                None
            }
            None => None,
        };
        let user = match user {
            Some(Ok(user)) => Some(user),
            Some(Err(err)) => {
                note(err);
                None
            }
            None => None,
        };

        let overlay = self.state.overlay().clone();
        self.board.send_modify(|board| {
            if let Some(page) = jobs {
                board.jobs = page;
            }
            if let Some(user) = user {
                board.user = Some(user);
            }
            board.overlay = overlay;
            board.session_expired |= session_expired;
            board.notice = notice;
        });
    }
}
