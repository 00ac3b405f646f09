//! In-process WebSocket server used by the transport tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Notify, broadcast};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// How the server treats each accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Drop the socket before the WebSocket handshake.
    RefuseHandshake,
    /// Complete the handshake and follow pushed [`Action`]s.
    Serve,
}

/// Something the test asks every open server connection to do.
#[derive(Debug, Clone)]
pub enum Action {
    Text(String),
    CloseNormal,
    CloseAbnormal,
    Drop,
}

pub struct MockWsServer {
    pub addr: SocketAddr,
    accepts: Arc<Mutex<Vec<Instant>>>,
    open: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    close_codes: Arc<Mutex<Vec<u16>>>,
    actions: broadcast::Sender<Action>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    pub async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(Mutex::new(Vec::new()));
        let open = Arc::new(AtomicUsize::new(0));
        let pings = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let close_codes = Arc::new(Mutex::new(Vec::new()));
        let (actions, _) = broadcast::channel(16);
        let shutdown = Arc::new(Notify::new());

        let server = Self {
            addr,
            accepts: accepts.clone(),
            open: open.clone(),
            pings: pings.clone(),
            received: received.clone(),
            close_codes: close_codes.clone(),
            actions: actions.clone(),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        accepts.lock().unwrap().push(Instant::now());
                        if mode == Mode::RefuseHandshake {
                            drop(stream);
                            continue;
                        }
                        let ctx = ConnCtx {
                            open: open.clone(),
                            pings: pings.clone(),
                            received: received.clone(),
                            close_codes: close_codes.clone(),
                            actions: actions.subscribe(),
                        };
                        tokio::spawn(handle_connection(stream, ctx));
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accept_count(&self) -> usize {
        self.accepts.lock().unwrap().len()
    }

    pub fn accept_times(&self) -> Vec<Instant> {
        self.accepts.lock().unwrap().clone()
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Ping frames received across all connections.
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn close_codes(&self) -> Vec<u16> {
        self.close_codes.lock().unwrap().clone()
    }

    pub fn push(&self, action: Action) {
        let _ = self.actions.send(action);
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

struct ConnCtx {
    open: Arc<AtomicUsize>,
    pings: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    close_codes: Arc<Mutex<Vec<u16>>>,
    actions: broadcast::Receiver<Action>,
}

async fn handle_connection(stream: tokio::net::TcpStream, mut ctx: ConnCtx) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else { return };
    ctx.open.fetch_add(1, Ordering::SeqCst);
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    ctx.received.lock().unwrap().push(text.to_string());
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(f) = frame {
                        ctx.close_codes.lock().unwrap().push(u16::from(f.code));
                    }
                    break;
                }
                Some(Ok(Message::Ping(_))) => {
                    ctx.pings.fetch_add(1, Ordering::SeqCst);
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            action = ctx.actions.recv() => match action {
                Ok(Action::Text(t)) => {
                    if write.send(Message::Text(t.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Action::CloseNormal) => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "bye".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break;
                }
                Ok(Action::CloseAbnormal) => {
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: "restart".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    break;
                }
                Ok(Action::Drop) | Err(_) => break,
            },
        }
    }

    ctx.open.fetch_sub(1, Ordering::SeqCst);
}

/// Poll `cond` every 5ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
