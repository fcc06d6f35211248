pub use crate::chrono::{DateTime, Utc};
pub use crate::{
    ActiveJobsStatus, AuthResponse, ExtractionFilters, ExtractionRequest, Job,
    JobId, JobListQuery, JobProgress, JobSort, JobStatus, JobUpdate,
    JobUpdateKind, ModelError, Page, SessionTokens, User,
};
