//! Real-time job channel transport.
//!
//! Speaks Socket.IO v5 over an Engine.IO v4 websocket. A background task
//! owns the socket and forwards typed [`FeedMessage`]s over a bounded
//! channel; consumers only ever see the receiving end. Closing the feed
//! drops the receiver first, so nothing is delivered once `close` returns.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mapleads_core::api::routes;
use mapleads_core::feed::codec::{ENGINE_IO_VERSION, connect_error_reason};
use mapleads_core::feed::{FeedMessage, Handshake, Packet, SocketPacket};
use rand::Rng;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::domains::auth::SessionService;
use crate::infra::config::{ClientConfig, ReconnectPolicy};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FEED_CHANNEL_CAPACITY: usize = 256;
/// How long a closing socket task may spend saying goodbye.
const CLOSE_GRACE: Duration = Duration::from_secs(1);
const SERVER_DISCONNECT: &str = "io server disconnect";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid socket URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported socket URL scheme '{0}'")]
    UnsupportedScheme(String),
}

/// `<base>/socket.io/?EIO=4&transport=websocket` with a websocket scheme.
pub fn socket_endpoint(base: &str) -> Result<Url, FeedError> {
    let mut url = Url::parse(base)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(FeedError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| FeedError::UnsupportedScheme(scheme.to_string()))?;
    url.set_path(routes::SOCKET_IO);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Full jitter: uniform in `[0, ceiling]`.
fn jittered(ceiling: Duration) -> Duration {
    let max_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[derive(Debug)]
pub struct JobFeed {
    rx: Option<mpsc::Receiver<FeedMessage>>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl JobFeed {
    /// Open the channel with the session's access token. Returns `None`
    /// when there is no session or the socket URL is unusable.
    pub fn connect(
        config: &ClientConfig,
        session: Arc<SessionService>,
    ) -> Option<Self> {
        if session.access_token().is_none() {
            log::info!("[JobFeed] no access token, not connecting");
            return None;
        }

        let endpoint = match socket_endpoint(&config.socket_url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                log::error!("[JobFeed] {}", e);
                return None;
            }
        };
        log::info!("[JobFeed] connecting to {}", endpoint);

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        let worker = FeedWorker {
            endpoint,
            session,
            policy: config.reconnect,
            connect_timeout: config.connect_timeout,
            tx,
        };
        let task = tokio::spawn(worker.run(close_rx));

        Some(Self {
            rx: Some(rx),
            close_tx: Some(close_tx),
            task: Some(task),
        })
    }

    /// Feed backed by an arbitrary message source.
    pub fn from_receiver(rx: mpsc::Receiver<FeedMessage>) -> Self {
        Self {
            rx: Some(rx),
            close_tx: None,
            task: None,
        }
    }

    /// Next message, or `None` once the feed has ended or been closed.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// Stop delivery and shut the socket down. Idempotent.
    pub fn close(&mut self) {
        // Listeners go first; the socket task can no longer deliver.
        let had_listener = self.rx.take().is_some();
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        if let Some(task) = self.task.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        let mut task = task;
                        if tokio::time::timeout(CLOSE_GRACE, &mut task)
                            .await
                            .is_err()
                        {
                            task.abort();
                        }
                    });
                }
                Err(_) => task.abort(),
            }
        }
        if had_listener {
            log::debug!("[JobFeed] closed");
        }
    }
}

impl Drop for JobFeed {
    fn drop(&mut self) {
        self.close();
    }
}

/// Why one socket session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Closed locally, or nobody is listening any more.
    Closed,
    /// Do not reconnect.
    Stopped,
    /// Transport failure; reconnect with backoff.
    Lost { reason: String, was_connected: bool },
}

struct FeedWorker {
    endpoint: Url,
    session: Arc<SessionService>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    tx: mpsc::Sender<FeedMessage>,
}

impl FeedWorker {
    async fn run(self, mut close_rx: oneshot::Receiver<()>) {
        let mut attempt: u32 = 0;
        loop {
            // Re-read per attempt: the token may have been refreshed.
            let Some(token) = self.session.access_token() else {
                log::info!("[JobFeed] session ended, not reconnecting");
                return;
            };

            match self.run_session(&token, &mut close_rx).await {
                SessionEnd::Closed | SessionEnd::Stopped => return,
                SessionEnd::Lost {
                    reason,
                    was_connected,
                } => {
                    if was_connected {
                        attempt = 0;
                        if !self.emit(FeedMessage::Disconnected(reason)).await {
                            return;
                        }
                    } else {
                        log::debug!("[JobFeed] connection attempt failed: {}", reason);
                    }
                }
            }

            attempt += 1;
            if !self.policy.allows(attempt) {
                log::error!(
                    "[JobFeed] giving up after {} reconnect attempts",
                    self.policy.max_attempts
                );
                return;
            }
            let delay = jittered(self.policy.ceiling(attempt));
            log::info!(
                "[JobFeed] reconnecting in {:?} (attempt #{})",
                delay,
                attempt
            );
            tokio::select! {
                biased;
                _ = &mut close_rx => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// `false` once the consumer is gone.
    async fn emit(&self, message: FeedMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    async fn open(&self) -> Result<(Socket, Handshake), String> {
        let (mut ws, _) = tokio::time::timeout(
            self.connect_timeout,
            connect_async(self.endpoint.as_str()),
        )
        .await
        .map_err(|_| "connect timed out".to_string())?
        .map_err(|e| e.to_string())?;

        let first = tokio::time::timeout(self.connect_timeout, ws.next())
            .await
            .map_err(|_| "handshake timed out".to_string())?;
        match first {
            Some(Ok(Message::Text(text))) => match Packet::decode(&text) {
                Ok(Packet::Open(handshake)) => Ok((ws, handshake)),
                Ok(other) => Err(format!("expected open packet, got {:?}", other)),
                Err(e) => Err(e.to_string()),
            },
            Some(Ok(other)) => Err(format!("unexpected handshake frame {:?}", other)),
            Some(Err(e)) => Err(e.to_string()),
            None => Err("closed during handshake".to_string()),
        }
    }

    async fn run_session(
        &self,
        token: &str,
        close_rx: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        let opened = tokio::select! {
            biased;
            _ = &mut *close_rx => return SessionEnd::Closed,
            opened = self.open() => opened,
        };
        let (mut ws, handshake) = match opened {
            Ok(opened) => opened,
            Err(reason) => {
                return SessionEnd::Lost {
                    reason,
                    was_connected: false,
                };
            }
        };
        log::debug!(
            "[JobFeed] engine open sid={} ping={}ms/{}ms",
            handshake.sid,
            handshake.ping_interval,
            handshake.ping_timeout
        );

        let connect = Packet::Message(SocketPacket::connect_with_auth(
            json!({ "token": token }),
        ));
        if let Err(e) = ws.send(Message::Text(connect.encode().into())).await {
            return SessionEnd::Lost {
                reason: e.to_string(),
                was_connected: false,
            };
        }

        let liveness = Duration::from_millis(
            handshake.ping_interval.saturating_add(handshake.ping_timeout),
        );
        let mut deadline = Instant::now() + liveness;
        let mut connected = false;
        let lost = |reason: String, was_connected: bool| SessionEnd::Lost {
            reason,
            was_connected,
        };

        loop {
            let frame = tokio::select! {
                biased;
                _ = &mut *close_rx => {
                    let goodbye = Packet::Message(SocketPacket::Disconnect {
                        namespace: "/".to_string(),
                    });
                    let _ = ws.send(Message::Text(goodbye.encode().into())).await;
                    let _ = ws.close(None).await;
                    return SessionEnd::Closed;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return lost("ping timeout".to_string(), connected);
                }
                frame = ws.next() => frame,
            };
            deadline = Instant::now() + liveness;

            let text = match frame {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | None => {
                    return lost("transport close".to_string(), connected);
                }
                Some(Ok(Message::Binary(_))) => {
                    log::debug!("[JobFeed] binary frame ignored");
                    continue;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return lost(e.to_string(), connected),
            };

            let packet = match Packet::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    log::warn!("[JobFeed] undecodable frame: {} - {}", e, text.as_str());
                    continue;
                }
            };

            let message = match packet {
                Packet::Ping => {
                    let pong = Message::Text(Packet::Pong.encode().into());
                    if let Err(e) = ws.send(pong).await {
                        return lost(e.to_string(), connected);
                    }
                    continue;
                }
                Packet::Close => {
                    return lost("transport close".to_string(), connected);
                }
                Packet::Message(SocketPacket::Connect { .. }) => {
                    connected = true;
                    FeedMessage::Connected
                }
                Packet::Message(SocketPacket::ConnectError { data, .. }) => {
                    let reason = connect_error_reason(data.as_ref());
                    self.emit(FeedMessage::ConnectError(reason)).await;
                    return SessionEnd::Stopped;
                }
                Packet::Message(SocketPacket::Disconnect { .. }) => {
                    if connected {
                        self.emit(FeedMessage::Disconnected(
                            SERVER_DISCONNECT.to_string(),
                        ))
                        .await;
                    }
                    return SessionEnd::Stopped;
                }
                Packet::Message(SocketPacket::Event { name, args, .. }) => {
                    match FeedMessage::from_event(&name, &args) {
                        Some(message) => message,
                        None => continue,
                    }
                }
                Packet::Message(SocketPacket::Ack { .. })
                | Packet::Open(_)
                | Packet::Pong
                | Packet::Upgrade
                | Packet::Noop => continue,
            };

            if !self.emit(message).await {
                let _ = ws.close(None).await;
                return SessionEnd::Closed;
            }
        }
    }
}
