//! In-process stand-in for the mapleads backend: the REST endpoints the
//! client uses plus a minimal Socket.IO websocket endpoint.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use mapleads_client::domains::auth::{MemorySessionStore, SessionService};
use mapleads_client::{ApiClient, ClientConfig};
use mapleads_model::SessionTokens;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const REFRESH_TOKEN: &str = "refresh-1";
pub const PASSWORD: &str = "secret";

#[derive(Debug)]
pub struct MockBackend {
    /// The access token the backend currently accepts.
    pub valid_token: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub refresh_delay: Mutex<Duration>,
    /// Reject every authenticated call even with a fresh token.
    pub reject_all: AtomicBool,
    pub jobs_requests: AtomicUsize,
    pub bearers_seen: Mutex<Vec<String>>,
    pub jobs: Mutex<Vec<Value>>,

    /// Frames pushed to every socket after a successful connect.
    pub socket_frames: Mutex<Vec<String>>,
    pub drop_first_socket: AtomicBool,
    pub socket_connections: AtomicUsize,
    pub socket_tokens: Mutex<Vec<String>>,
    pub pongs: AtomicUsize,
    pub client_disconnects: AtomicUsize,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            valid_token: Mutex::new("access-0".to_string()),
            refresh_calls: AtomicUsize::new(0),
            refresh_fails: AtomicBool::new(false),
            refresh_delay: Mutex::new(Duration::from_millis(150)),
            reject_all: AtomicBool::new(false),
            jobs_requests: AtomicUsize::new(0),
            bearers_seen: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
            socket_frames: Mutex::new(Vec::new()),
            drop_first_socket: AtomicBool::new(false),
            socket_connections: AtomicUsize::new(0),
            socket_tokens: Mutex::new(Vec::new()),
            pongs: AtomicUsize::new(0),
            client_disconnects: AtomicUsize::new(0),
        }
    }

    pub fn valid_token(&self) -> String {
        self.valid_token.lock().clone()
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
            .to_string();
        self.bearers_seen.lock().push(bearer.clone());

        if self.reject_all.load(Ordering::SeqCst)
            || bearer != *self.valid_token.lock()
        {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "Given token not valid for any token type" })),
            )
                .into_response());
        }
        Ok(())
    }
}

pub struct TestServer {
    pub base_url: String,
    pub backend: Arc<MockBackend>,
}

impl TestServer {
    pub async fn start() -> Self {
        let backend = Arc::new(MockBackend::new());
        let router = Router::new()
            .route("/users/login", post(login))
            .route("/token/refresh/", post(refresh))
            .route("/users/me", get(current_user))
            .route("/jobs", get(list_jobs).post(create_job))
            .route("/delete/{id}", delete(delete_job))
            .route("/{id}/download", get(download))
            .route("/socket.io/", get(socket_io))
            .with_state(Arc::clone(&backend));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            backend,
        }
    }

    pub fn config(&self) -> ClientConfig {
        let mut config =
            ClientConfig::new(self.base_url.clone(), PathBuf::from("/unused"));
        config.request_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(2);
        config.reconnect.base_delay = Duration::from_millis(20);
        config.reconnect.max_delay = Duration::from_millis(100);
        config
    }

    /// Client whose session holds `access` and the backend's refresh token.
    pub fn client_with_token(
        &self,
        access: &str,
    ) -> (ApiClient, Arc<SessionService>, Arc<MemorySessionStore>) {
        let tokens = SessionTokens {
            auth_token: access.to_string(),
            refresh_token: Some(REFRESH_TOKEN.to_string()),
        };
        let store = Arc::new(MemorySessionStore::with_tokens(tokens.clone()));
        let session =
            Arc::new(SessionService::with_tokens(store.clone(), Some(tokens)));
        let api = ApiClient::new(&self.config(), Arc::clone(&session)).unwrap();
        (api, session, store)
    }

    pub fn anonymous_client(
        &self,
    ) -> (ApiClient, Arc<SessionService>, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let session = Arc::new(SessionService::with_tokens(store.clone(), None));
        let api = ApiClient::new(&self.config(), Arc::clone(&session)).unwrap();
        (api, session, store)
    }
}

type AppState = State<Arc<MockBackend>>;

async fn login(State(backend): AppState, Json(body): Json<Value>) -> Response {
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "status": "error", "message": "Invalid email or password" })),
        )
            .into_response();
    }
    Json(json!({
        "status": "success",
        "token": backend.valid_token(),
        "refresh": REFRESH_TOKEN,
        "user": { "_id": "u1", "email": body["email"], "name": "Dana", "credits": 250 }
    }))
    .into_response()
}

async fn refresh(State(backend): AppState, Json(body): Json<Value>) -> Response {
    let call = backend.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = *backend.refresh_delay.lock();
    tokio::time::sleep(delay).await;

    if backend.refresh_fails.load(Ordering::SeqCst) || body["token"] != REFRESH_TOKEN
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })),
        )
            .into_response();
    }

    let access = format!("access-{}", call);
    *backend.valid_token.lock() = access.clone();
    Json(json!({ "access": access })).into_response()
}

async fn current_user(State(backend): AppState, headers: HeaderMap) -> Response {
    if let Err(denied) = backend.authorize(&headers) {
        return denied;
    }
    Json(json!({
        "user": { "_id": "u1", "email": "dana@example.com", "name": "Dana",
                  "credits": 250, "maxRecords": 500 }
    }))
    .into_response()
}

async fn list_jobs(State(backend): AppState, headers: HeaderMap) -> Response {
    backend.jobs_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(denied) = backend.authorize(&headers) {
        return denied;
    }
    let jobs = backend.jobs.lock().clone();
    Json(json!({
        "data": jobs,
        "page": 1,
        "limit": 10,
        "totalPages": 1,
        "total": jobs.len(),
        "hasNextPage": false,
        "hasPrevPage": false
    }))
    .into_response()
}

async fn create_job(
    State(backend): AppState,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(denied) = backend.authorize(&headers) {
        return denied;
    }
    let job = json!({
        "_id": "job-new",
        "keyword": body["keyword"],
        "location": body["country"],
        "status": "pending",
        "progress": 0
    });
    backend.jobs.lock().push(job.clone());
    (
        StatusCode::CREATED,
        Json(json!({ "message": "Job created", "job": job })),
    )
        .into_response()
}

async fn delete_job(
    State(backend): AppState,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = backend.authorize(&headers) {
        return denied;
    }
    backend.jobs.lock().retain(|job| job["_id"] != id.as_str());
    Json(json!({ "message": format!("Job {} deleted", id) })).into_response()
}

async fn download(
    State(backend): AppState,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = backend.authorize(&headers) {
        return denied;
    }
    (
        [(header::CONTENT_TYPE, "text/csv")],
        format!("name,phone\n{},555-0100\n", id),
    )
        .into_response()
}

async fn socket_io(ws: WebSocketUpgrade, State(backend): AppState) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, backend))
}

async fn send_text(socket: &mut WebSocket, text: String) -> bool {
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn run_socket(mut socket: WebSocket, backend: Arc<MockBackend>) {
    let n = backend.socket_connections.fetch_add(1, Ordering::SeqCst) + 1;
    let open = json!({
        "sid": format!("engine-{}", n),
        "upgrades": [],
        "pingInterval": 300,
        "pingTimeout": 200,
        "maxPayload": 1_000_000
    });
    if !send_text(&mut socket, format!("0{}", open)).await {
        return;
    }

    let Some(Ok(Message::Text(connect))) = socket.recv().await else {
        return;
    };
    let auth: Value = connect
        .as_str()
        .strip_prefix("40")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or(Value::Null);
    let token = auth["token"].as_str().unwrap_or_default().to_string();
    backend.socket_tokens.lock().push(token.clone());

    if token != backend.valid_token() {
        let _ = send_text(
            &mut socket,
            r#"44{"message":"Authentication error"}"#.to_string(),
        )
        .await;
        return;
    }
    if !send_text(&mut socket, format!(r#"40{{"sid":"socket-{}"}}"#, n)).await {
        return;
    }

    if n == 1 && backend.drop_first_socket.load(Ordering::SeqCst) {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let frames = backend.socket_frames.lock().clone();
    for frame in frames {
        if !send_text(&mut socket, frame).await {
            return;
        }
    }

    let mut ping = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = ping.tick() => {
                if !send_text(&mut socket, "2".to_string()).await {
                    return;
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) if text.as_str() == "3" => {
                    backend.pongs.fetch_add(1, Ordering::SeqCst);
                }
                Some(Ok(Message::Text(text))) if text.as_str() == "41" => {
                    backend.client_disconnects.fetch_add(1, Ordering::SeqCst);
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
