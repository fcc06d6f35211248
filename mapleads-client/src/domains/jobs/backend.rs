use async_trait::async_trait;
use mapleads_model::{Job, JobListQuery, Page, User};

use crate::infra::api_client::ApiClient;
use crate::infra::api_error::ApiError;

/// The two queries the job table is rebuilt from.
#[async_trait]
pub trait JobsBackend: Send + Sync {
    async fn list_jobs(&self, query: &JobListQuery) -> Result<Page<Job>, ApiError>;
    async fn current_user(&self) -> Result<User, ApiError>;
}

#[async_trait]
impl JobsBackend for ApiClient {
    async fn list_jobs(&self, query: &JobListQuery) -> Result<Page<Job>, ApiError> {
        ApiClient::list_jobs(self, query).await
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        ApiClient::current_user(self).await
    }
}
