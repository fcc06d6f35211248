//! Core data model definitions shared across mapleads crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod auth;
pub mod error;
pub mod events;
pub mod extraction;
pub mod ids;
pub mod job;
pub mod page;
pub mod prelude;
pub mod user;

// Intentionally curated re-exports for downstream consumers.
pub use auth::{
    AuthResponse, GoogleTokenRequest, LoginRequest, RefreshRequest,
    RefreshResponse, SessionTokens, SignupRequest,
};
pub use error::{ModelError, Result as ModelResult};
pub use events::{
    ActiveJobEntry, ActiveJobsStatus, JobProgress, JobUpdate, JobUpdateKind,
    ProgressPayload,
};
pub use extraction::{
    CreateJobResponse, DeleteJobResponse, ExtractionFilters, ExtractionRequest,
};
pub use ids::JobId;
pub use job::{Job, JobStatus};
pub use page::{JobListQuery, JobSort, Page};
pub use user::User;
