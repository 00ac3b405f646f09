//! Single WebSocket price-stream connection with bounded linear reconnect.
//!
//! Each `StreamTransport` runs as a tokio task that:
//! 1. Waits idle until [`connect`](StreamTransport::connect) is called.
//! 2. Connects to the feed endpoint and sends the subscription message.
//! 3. Reads text frames and forwards them to a callback.
//! 4. Optionally sends periodic ping frames.
//! 5. On failure, retries up to `max_retries` times, waiting `n * retry_base`
//!    before retry `n`, then parks in `Disconnected`.
//!
//! The task is the only writer of the retry counter and the published
//! [`ConnectionState`]. Callers talk to it through a command channel, so no
//! transport error ever reaches them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::PulseError;
use crate::types::ConnectionState;

/// Close code sent on a client-initiated disconnect. A server close with
/// this code ends the session without a retry.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Upper bound on a single dial (TCP + TLS + WebSocket handshake).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback invoked for each received text message.
pub type OnMessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a [`StreamTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Full WebSocket URL (e.g. `wss://ws.example-market.io/stream`).
    pub url: String,
    /// Message to send immediately after each successful open.
    pub subscribe_msg: Option<String>,
    /// Interval between ping frames while connected.
    pub ping_interval: Option<Duration>,
    /// Scheduled retries after a failure before giving up.
    pub max_retries: u32,
    /// Linear backoff step.
    pub retry_base: Duration,
}

/// Delay before retry number `attempt` (1-based): `attempt * base`.
pub fn retry_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

/// Retry counter for one connection cycle.
#[derive(Debug, Clone, Copy)]
struct RetryBudget {
    count: u32,
    max: u32,
    base: Duration,
}

impl RetryBudget {
    fn new(max: u32, base: Duration) -> Self {
        Self {
            count: 0,
            max,
            base,
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    /// Spend the whole budget so no retry can be scheduled.
    fn exhaust(&mut self) {
        self.count = self.max;
    }

    /// Consume one retry, returning its attempt number and delay, or `None`
    /// once the budget is spent.
    fn next(&mut self) -> Option<(u32, Duration)> {
        if self.count >= self.max {
            return None;
        }
        self.count += 1;
        Some((self.count, retry_delay(self.count, self.base)))
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// How a connected (or attempted) session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Dial failure, abnormal close, read/write error.
    Failed,
    /// Server closed with code 1000.
    NormalClose,
    /// `disconnect()` was called.
    Disconnect,
    /// Transport is being dropped.
    Shutdown,
}

/// A price-stream connection managed by a background tokio task.
pub struct StreamTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamTransport {
    /// Spawn the transport task. It stays idle (`Disconnected`) until
    /// [`connect`](Self::connect) is called.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: TransportConfig, on_text: OnMessageCallback) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = tokio::spawn(async move {
            transport_loop(config, on_text, cmd_rx, state_tx).await;
        });

        Self {
            cmd_tx,
            state_rx,
            task: Some(task),
        }
    }

    /// Start a connection cycle with the retry counter at zero. Ignored if a
    /// cycle is already connecting, retrying or connected.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the socket with code 1000 and cancel any scheduled retry. The
    /// next published state is `Disconnected`.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Observable connection state; late subscribers see the last value.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Close any open socket and wait for the task to finish.
    pub async fn stop(&mut self) {
        self.command(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn command(&self, cmd: Command) {
        if self.cmd_tx.send(cmd).is_err() {
            debug!("[stream] transport task gone, dropping {cmd:?}");
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Publish `state` unless it is already the current value.
fn publish(state_tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            debug!("[stream] state {current} -> {state}");
            *current = state;
            true
        }
    });
}

/// Main state-machine loop.
async fn transport_loop(
    config: TransportConfig,
    on_text: OnMessageCallback,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut retries = RetryBudget::new(config.max_retries, config.retry_base);

    loop {
        // Idle: only an explicit connect starts a cycle.
        match cmd_rx.recv().await {
            Some(Command::Connect) => {}
            Some(Command::Disconnect) => {
                retries.exhaust();
                publish(&state_tx, ConnectionState::Disconnected);
                continue;
            }
            Some(Command::Shutdown) | None => return,
        }

        retries.reset();

        loop {
            publish(&state_tx, ConnectionState::Connecting);
            info!("[stream] connecting to {}", config.url);

            let end = run_session(&config, &on_text, &mut cmd_rx, &state_tx, &mut retries).await;

            match end {
                SessionEnd::Shutdown => {
                    publish(&state_tx, ConnectionState::Disconnected);
                    return;
                }
                SessionEnd::Disconnect => {
                    info!("[stream] disconnected by request");
                    retries.exhaust();
                    publish(&state_tx, ConnectionState::Disconnected);
                    break;
                }
                SessionEnd::NormalClose => {
                    info!("[stream] server closed the stream normally");
                    publish(&state_tx, ConnectionState::Disconnected);
                    break;
                }
                SessionEnd::Failed => {}
            }

            let Some((attempt, delay)) = retries.next() else {
                error!("[stream] giving up after {} retries", config.max_retries);
                publish(&state_tx, ConnectionState::Disconnected);
                break;
            };

            warn!("[stream] retry {attempt}/{} in {delay:?}", config.max_retries);
            publish(&state_tx, ConnectionState::Retrying { attempt });

            match wait_backoff(delay, &mut cmd_rx).await {
                None => {}
                Some(Command::Disconnect) => {
                    info!("[stream] scheduled retry cancelled by disconnect");
                    retries.exhaust();
                    publish(&state_tx, ConnectionState::Disconnected);
                    break;
                }
                Some(_) => {
                    publish(&state_tx, ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }
}

/// Sleep for `delay` unless a disconnect or shutdown arrives first.
///
/// Returns the interrupting command, or `None` once the delay elapsed.
async fn wait_backoff(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<Command> {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return None,
            cmd = cmd_rx.recv() => match cmd {
                // Already in a connecting cycle.
                Some(Command::Connect) => continue,
                Some(Command::Disconnect) => return Some(Command::Disconnect),
                Some(Command::Shutdown) | None => return Some(Command::Shutdown),
            },
        }
    }
}

/// One connection attempt: dial, subscribe, then pump frames until the
/// session ends.
async fn run_session(
    config: &TransportConfig,
    on_text: &OnMessageCallback,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    state_tx: &watch::Sender<ConnectionState>,
    retries: &mut RetryBudget,
) -> SessionEnd {
    let dial = connect_ws(&config.url);
    tokio::pin!(dial);

    let ws_stream = loop {
        tokio::select! {
            res = &mut dial => match res {
                Ok(s) => break s,
                Err(e) => {
                    warn!("[stream] connection failed: {e}");
                    return SessionEnd::Failed;
                }
            },
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Connect) => continue,
                Some(Command::Disconnect) => return SessionEnd::Disconnect,
                Some(Command::Shutdown) | None => return SessionEnd::Shutdown,
            },
        }
    };

    retries.reset();
    publish(state_tx, ConnectionState::Connected);
    info!("[stream] connected");

    let (mut ws_write, mut ws_read) = ws_stream.split();

    if let Some(ref sub_msg) = config.subscribe_msg {
        debug!("[stream] subscribing: {sub_msg}");
        if let Err(e) = ws_write.send(Message::Text(sub_msg.clone().into())).await {
            error!("[stream] subscribe send failed: {e}");
            return SessionEnd::Failed;
        }
    }

    let mut ping_tick = config.ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Connect) => {}
                Some(Command::Disconnect) => {
                    close_normal(&mut ws_write).await;
                    return SessionEnd::Disconnect;
                }
                Some(Command::Shutdown) | None => {
                    close_normal(&mut ws_write).await;
                    return SessionEnd::Shutdown;
                }
            },

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_text(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        if code == Some(NORMAL_CLOSURE) {
                            return SessionEnd::NormalClose;
                        }
                        warn!("[stream] received close frame (code {code:?})");
                        return SessionEnd::Failed;
                    }
                    Some(Err(e)) => {
                        error!("[stream] read error: {e}");
                        return SessionEnd::Failed;
                    }
                    None => {
                        warn!("[stream] stream ended");
                        return SessionEnd::Failed;
                    }
                    _ => {} // Binary, Pong, Frame
                }
            }

            _ = next_ping(&mut ping_tick) => {
                if let Err(e) = ws_write.send(Message::Ping(vec![].into())).await {
                    error!("[stream] ping send error: {e}");
                    return SessionEnd::Failed;
                }
            }
        }
    }
}

/// Resolve on the next ping tick, or never when pinging is off.
async fn next_ping(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Send a close frame with code 1000.
async fn close_normal<S>(ws_write: &mut S)
where
    S: Sink<Message> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "client disconnect".into(),
    };
    let _ = ws_write.send(Message::Close(Some(frame))).await;
    let _ = ws_write.close().await;
}

/// Establish a WebSocket connection (plain or TLS, per the URL scheme).
async fn connect_ws(url: &str) -> Result<WsStream, PulseError> {
    let request = url.into_client_request().map_err(|e| PulseError::WebSocket(e.to_string()))?;

    match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(PulseError::WebSocket(e.to_string())),
        Err(_) => Err(PulseError::WebSocket(format!(
            "connect timed out after {CONNECT_TIMEOUT:?}"
        ))),
    }
}
