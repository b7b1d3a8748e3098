//! The live push connection to the analysis backend.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{PushEvent, parse_push_message, ping_message, subscribe_message};
use crate::error::{Result, ViewerError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// An open text-frame socket.
pub trait PushSocket: Send + 'static {
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<()>> + Send;

    /// Next text frame; `None` once the peer has closed.
    fn next_text(&mut self) -> impl Future<Output = Option<Result<String>>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Opens sockets to the backend.
pub trait PushConnector: Send + Sync + 'static {
    type Socket: PushSocket;

    fn connect(&self) -> impl Future<Output = Result<Self::Socket>> + Send;
}

pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl PushConnector for WebSocketConnector {
    type Socket = WebSocket;

    async fn connect(&self) -> Result<WebSocket> {
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        Ok(WebSocket { stream })
    }
}

pub struct WebSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PushSocket for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes.to_vec()).map_err(|error| {
                        ViewerError::Protocol(format!("binary frame is not UTF-8: {error}"))
                    }));
                }
                Ok(Message::Close(_)) => return None,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(error) => return Some(Err(error.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.stream.close(None).await {
            debug!(%error, "error while closing push socket");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    State(ConnectionState),
    Push(PushEvent),
}

#[derive(Clone, Copy, Debug)]
pub struct PushSettings {
    pub reconnect_delay: Duration,
    /// Ping period while connected. `None` or a zero period disables pings.
    pub keepalive: Option<Duration>,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keepalive: Some(DEFAULT_KEEPALIVE),
        }
    }
}

pub struct ConnectionManager {
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    reconnects: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawns the connection task. Events are delivered in arrival order on `events`.
    pub fn start<C: PushConnector>(
        connector: C,
        settings: PushSettings,
        runtime: &Handle,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let reconnects = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            connector,
            settings,
            events,
            state: state_tx,
            cancel: cancel.clone(),
            reconnects: Arc::clone(&reconnects),
        };
        let task = runtime.spawn(worker.run());

        Self {
            cancel,
            state,
            reconnects,
            task: Some(task),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Reconnect attempts scheduled so far (the first connect is not counted).
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Stops the task. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.task.take().is_some() {
            info!("shutting down push connection");
        }
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

struct Worker<C> {
    connector: C,
    settings: PushSettings,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    reconnects: Arc<AtomicU64>,
}

impl<C: PushConnector> Worker<C> {
    async fn run(self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(mut socket) => {
                    self.set_state(ConnectionState::Connected);
                    info!("push connection established");
                    match self.session(&mut socket).await {
                        SessionEnd::Cancelled => {
                            socket.close().await;
                            break;
                        }
                        SessionEnd::Lost(reason) => {
                            warn!(%reason, "push connection lost");
                        }
                    }
                }
                Err(error) => warn!(%error, "push connection failed"),
            }

            self.set_state(ConnectionState::Disconnected);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.settings.reconnect_delay) => {}
            }
            let attempt = self.reconnects.fetch_add(1, Ordering::Relaxed) + 1;
            info!(attempt, "reconnecting push channel");
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("push connection task finished");
    }

    async fn session(&self, socket: &mut C::Socket) -> SessionEnd {
        if let Err(error) = socket.send_text(subscribe_message()).await {
            return SessionEnd::Lost(error.to_string());
        }

        // A zero period counts as disabled; the far-future deadline stands in for it.
        let enabled = self.settings.keepalive.filter(|period| !period.is_zero());
        let period = enabled.unwrap_or(Duration::from_secs(60 * 60 * 24 * 365));
        let mut keepalive = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                _ = keepalive.tick(), if enabled.is_some() => {
                    if let Err(error) = socket.send_text(ping_message()).await {
                        return SessionEnd::Lost(error.to_string());
                    }
                }
                frame = socket.next_text() => match frame {
                    Some(Ok(text)) => match parse_push_message(&text) {
                        Ok(PushEvent::Ignored(_)) => {}
                        Ok(event) => {
                            if self.events.send(ConnectionEvent::Push(event)).is_err() {
                                return SessionEnd::Cancelled;
                            }
                        }
                        Err(error) => warn!(%error, "dropping malformed push message"),
                    },
                    Some(Err(error)) => return SessionEnd::Lost(error.to_string()),
                    None => return SessionEnd::Lost("closed by peer".to_owned()),
                },
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            let _ = self.events.send(ConnectionEvent::State(next));
        }
    }
}
