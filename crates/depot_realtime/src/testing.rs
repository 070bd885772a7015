//! Scriptable in-process socket server

use crate::protocol::Frame;
use crate::transport::{Connector, Transport};
use crate::{ChannelError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How the fake server answers one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse,
    /// Never completes the handshake
    Hang,
}

enum ServerMsg {
    Frame(Frame),
    Raw(String),
    Close,
    Fail(String),
}

struct ServerState {
    script: VecDeque<ConnectBehavior>,
    default_behavior: ConnectBehavior,
    connect_count: usize,
    auto_pong: bool,
    sent: Vec<(Instant, Frame)>,
    current: Option<mpsc::UnboundedSender<ServerMsg>>,
}

/// Test double for the event socket endpoint
#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::with_default(ConnectBehavior::Accept)
    }

    pub fn with_default(behavior: ConnectBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                script: VecDeque::new(),
                default_behavior: behavior,
                connect_count: 0,
                auto_pong: false,
                sent: Vec::new(),
                current: None,
            })),
        }
    }

    pub fn connector(&self) -> Arc<FakeConnector> {
        Arc::new(FakeConnector {
            server: self.clone(),
        })
    }

    /// Behaviors for the next attempts, consumed before the default
    pub fn script(&self, behaviors: &[ConnectBehavior]) {
        self.lock().script.extend(behaviors.iter().copied());
    }

    pub fn set_default(&self, behavior: ConnectBehavior) {
        self.lock().default_behavior = behavior;
    }

    /// Answer every ping with a pong carrying the same timestamp
    pub fn set_auto_pong(&self, enabled: bool) {
        self.lock().auto_pong = enabled;
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Push a frame to the live connection. False if there is none.
    pub fn push(&self, frame: Frame) -> bool {
        self.deliver(ServerMsg::Frame(frame))
    }

    pub fn push_event(&self, name: &str, data: serde_json::Value) -> bool {
        self.push(Frame::event(name, data))
    }

    /// Push arbitrary text, decoded by the client as if it came off the wire
    pub fn push_raw(&self, text: &str) -> bool {
        self.deliver(ServerMsg::Raw(text.to_string()))
    }

    /// Close the live connection from the server side
    pub fn close_current(&self) -> bool {
        self.deliver(ServerMsg::Close)
    }

    pub fn fail_current(&self, message: &str) -> bool {
        self.deliver(ServerMsg::Fail(message.to_string()))
    }

    /// Frames received from the client, oldest first
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.lock().sent.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Arrival instants of the client's pings
    pub fn ping_times(&self) -> Vec<Instant> {
        self.lock()
            .sent
            .iter()
            .filter(|(_, frame)| matches!(frame, Frame::Ping { .. }))
            .map(|(at, _)| *at)
            .collect()
    }

    fn deliver(&self, msg: ServerMsg) -> bool {
        match &self.lock().current {
            Some(sender) => sender.send(msg).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FakeServer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FakeConnector {
    server: FakeServer,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        let behavior = {
            let mut state = self.server.lock();
            state.connect_count += 1;
            let default = state.default_behavior;
            state.script.pop_front().unwrap_or(default)
        };

        match behavior {
            ConnectBehavior::Refuse => Err(ChannelError::Transport("connection refused".into())),
            ConnectBehavior::Hang => std::future::pending().await,
            ConnectBehavior::Accept => {
                let (sender, inbound) = mpsc::unbounded_channel();
                self.server.lock().current = Some(sender.clone());
                Ok(Box::new(FakeTransport {
                    server: self.server.clone(),
                    inbound,
                    loopback: sender,
                    closed: false,
                }))
            }
        }
    }
}

struct FakeTransport {
    server: FakeServer,
    inbound: mpsc::UnboundedReceiver<ServerMsg>,
    loopback: mpsc::UnboundedSender<ServerMsg>,
    closed: bool,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(ChannelError::Transport("socket closed".into()));
        }

        let auto_pong = {
            let mut state = self.server.lock();
            state.sent.push((Instant::now(), frame.clone()));
            state.auto_pong
        };
        if let (true, Frame::Ping { timestamp }) = (auto_pong, frame) {
            let _ = self.loopback.send(ServerMsg::Frame(Frame::Pong {
                timestamp: *timestamp,
            }));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        if self.closed {
            return None;
        }
        match self.inbound.recv().await {
            Some(ServerMsg::Frame(frame)) => Some(Ok(frame)),
            Some(ServerMsg::Raw(text)) => Some(Frame::from_text(&text)),
            Some(ServerMsg::Fail(message)) => Some(Err(ChannelError::Transport(message))),
            Some(ServerMsg::Close) | None => {
                self.closed = true;
                None
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
