use std::sync::Arc;

use mapleads_core::api::{fill, routes};
use mapleads_core::{PlanLimits, validate_extraction};
use mapleads_core::download::job_download_filename;
use mapleads_model::{
    AuthResponse, CreateJobResponse, DeleteJobResponse, ExtractionRequest,
    GoogleTokenRequest, Job, JobId, JobListQuery, LoginRequest, Page,
    RefreshRequest, RefreshResponse, SignupRequest, User,
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::domains::auth::SessionService;
use crate::infra::api_error::ApiError;
use crate::infra::config::{ClientConfig, normalize_base_url};
use crate::infra::single_flight::SingleFlight;

const REFRESH_FLIGHT: &str = "refresh";

/// Description of one API call. Cloneable so it can be rebuilt with a new
/// bearer after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<Value>,
    authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, pairs: Vec<(&'static str, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Send without a bearer and without the refresh flow.
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// A downloaded result file.
#[derive(Debug, Clone)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// API client guarding every authenticated call with the token refresh
/// flow.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionService>,
    refresh: Arc<SingleFlight<&'static str, String, ApiError>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("has_token", &self.session.is_authenticated())
            .field("refresh", &self.refresh)
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        session: Arc<SessionService>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let base_url = normalize_base_url(config.api_url.clone());
        log::info!(
            "[ApiClient] Creating new API client with base URL: {}",
            base_url
        );

        Ok(Self {
            client,
            base_url,
            session,
            refresh: Arc::new(SingleFlight::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionService> {
        &self.session
    }

    /// Refresh flights started so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh.leader_count()
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.build_url(&request.path);
        log::debug!("[ApiClient] {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        Ok(builder.send().await?)
    }

    /// Send `request`, recovering once from an expired access token.
    ///
    /// A request never passes this point while a refresh is running. On a
    /// 401 it either replays with a token rotated while it was in flight or
    /// joins the single refresh flight; a replay that is still rejected
    /// fails with [`ApiError::Unauthorized`].
    pub async fn execute(
        &self,
        request: &ApiRequest,
    ) -> Result<Response, ApiError> {
        if !request.authenticated {
            return Self::check(self.send(request, None).await?).await;
        }

        self.refresh.wait_idle(&REFRESH_FLIGHT).await;
        let sent_with = self.session.access_token();
        let response = self.send(request, sent_with.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }

        let token = match self.session.access_token() {
            None => {
                log::info!("[ApiClient] 401 without a session");
                return Err(ApiError::SessionExpired);
            }
            Some(current) if Some(&current) != sent_with.as_ref() => {
                log::debug!(
                    "[ApiClient] Token rotated while request was in flight, replaying"
                );
                current
            }
            Some(_) => {
                log::info!("[ApiClient] Token expired, attempting refresh");
                self.refresh_access_token().await?
            }
        };

        let response = self.send(request, Some(&token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            log::warn!(
                "[ApiClient] {} {} still unauthorized after refresh",
                request.method,
                request.path
            );
            return Err(ApiError::Unauthorized);
        }
        Self::check(response).await
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        log::debug!("[ApiClient] request failed with {}: {}", status, body);
        Err(ApiError::from_response(status.as_u16(), body))
    }

    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ApiError> {
        let bytes = self.execute(request).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Join or lead the refresh flight and return the new access token.
    async fn refresh_access_token(&self) -> Result<String, ApiError> {
        let client = self.clone();
        self.refresh
            .run(REFRESH_FLIGHT, move || async move {
                client.run_refresh().await
            })
            .await
    }

    async fn run_refresh(&self) -> Result<String, ApiError> {
        match self.request_access_token().await {
            Ok(access) => {
                if self.session.rotate_access(access.clone()).await.is_err() {
                    log::info!(
                        "[ApiClient] Session ended while refreshing, dropping new token"
                    );
                    return Err(ApiError::SessionExpired);
                }
                log::info!("[ApiClient] Token refreshed successfully");
                Ok(access)
            }
            Err(reason) => {
                log::warn!("[ApiClient] Token refresh failed: {}", reason);
                self.session.invalidate(reason).await;
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn request_access_token(&self) -> Result<String, String> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or_else(|| "no refresh token stored".to_string())?;

        let url = self.build_url(routes::token::REFRESH);
        let mut builder = self.client.post(&url).json(&RefreshRequest {
            token: refresh_token,
        });
        if let Some(access) = self.session.access_token() {
            builder = builder.bearer_auth(access);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("refresh request failed: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("refresh rejected with status {}", status));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| format!("refresh response undecodable: {}", e))?;
        if body.access.is_empty() {
            return Err("refresh response carried no token".to_string());
        }
        Ok(body.access)
    }

    async fn authenticate(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<AuthResponse, ApiError> {
        let request = ApiRequest::post(path).json(body)?.public();
        let response: AuthResponse = self.execute_json(&request).await?;
        if let Err(e) = self.session.establish(response.tokens()).await {
            log::warn!("[ApiClient] Session established but not persisted: {}", e);
        }
        Ok(response)
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(routes::users::LOGIN, &body).await
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = SignupRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.authenticate(routes::users::SIGNUP, &body).await
    }

    /// Exchange a Google credential for a session.
    pub async fn google_login(
        &self,
        credential: &str,
    ) -> Result<AuthResponse, ApiError> {
        let body = GoogleTokenRequest {
            token: credential.to_string(),
        };
        self.authenticate(routes::users::GOOGLE_TOKEN, &body).await
    }

    /// Drop the local session. The backend keeps no logout state.
    pub async fn logout(&self) {
        if let Err(e) = self.session.sign_out().await {
            log::warn!("[ApiClient] Failed to clear stored session: {}", e);
        }
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        let value: Value = self
            .execute_json(&ApiRequest::get(routes::users::CURRENT))
            .await?;
        // Some deployments wrap the summary as `{"user": {...}}`.
        let user = match value {
            Value::Object(mut map) if map.contains_key("user") => {
                map.remove("user").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(user)?)
    }

    pub async fn list_jobs(
        &self,
        query: &JobListQuery,
    ) -> Result<Page<Job>, ApiError> {
        let request =
            ApiRequest::get(routes::jobs::COLLECTION).query(query.to_pairs());
        self.execute_json(&request).await
    }

    /// Validate locally, then submit a new extraction job.
    pub async fn create_job(
        &self,
        request: &ExtractionRequest,
        limits: &PlanLimits,
    ) -> Result<CreateJobResponse, ApiError> {
        validate_extraction(request, limits)
            .into_result()
            .map_err(ApiError::Rejected)?;
        let request = ApiRequest::post(routes::jobs::COLLECTION).json(request)?;
        self.execute_json(&request).await
    }

    pub async fn delete_job(
        &self,
        id: &JobId,
    ) -> Result<DeleteJobResponse, ApiError> {
        let path = fill(routes::jobs::DELETE, id.as_str());
        self.execute_json(&ApiRequest::delete(path)).await
    }

    pub async fn download_job(&self, job: &Job) -> Result<Download, ApiError> {
        let path = fill(routes::jobs::DOWNLOAD, job.id.as_str());
        let response = self.execute(&ApiRequest::get(path)).await?;
        let bytes = response.bytes().await?.to_vec();
        let filename = job_download_filename(job);
        log::info!(
            "[ApiClient] Downloaded {} bytes for job {} as {}",
            bytes.len(),
            job.id,
            filename
        );
        Ok(Download { filename, bytes })
    }
}
