//! Channel driver task
//!
//! The driver exclusively owns the socket and both timers. Each loop turn
//! waits for exactly one [`Activity`] appropriate to the current status and
//! then applies it, so no timer or frame is ever handled against stale state.

use crate::config::ChannelConfig;
use crate::events::{ChannelEvent, ChannelState, ConnectionStatus, DisconnectReason};
use crate::protocol::Frame;
use crate::timer::Timer;
use crate::transport::{Connector, Transport};
use crate::{ChannelError, Result};
use depot_common::ListenerRegistry;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Emit {
        frame: Frame,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Per-socket state, never shared outside the driver
struct RealtimeConnection {
    status: ConnectionStatus,
    reconnect_attempts: u32,
    last_ping_sent_at: Option<Instant>,
    /// Timestamp of the ping still waiting for its pong
    pending_ping: Option<i64>,
    reconnect_timer: Timer,
    pong_timer: Timer,
}

enum Activity {
    Command(Option<Command>),
    ReconnectDue,
    Inbound(Option<Result<Frame>>),
    HeartbeatDue,
    PongOverdue,
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct Driver {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    commands: mpsc::Receiver<Command>,
    listeners: Arc<ListenerRegistry<ChannelEvent>>,
    state: watch::Sender<ChannelState>,
    conn: RealtimeConnection,
    transport: Option<Box<dyn Transport>>,
    heartbeat: Option<Interval>,
}

impl Driver {
    pub(crate) fn new(
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        commands: mpsc::Receiver<Command>,
        listeners: Arc<ListenerRegistry<ChannelEvent>>,
        state: watch::Sender<ChannelState>,
    ) -> Self {
        Self {
            config,
            connector,
            commands,
            listeners,
            state,
            conn: RealtimeConnection {
                status: ConnectionStatus::Disconnected,
                reconnect_attempts: 0,
                last_ping_sent_at: None,
                pending_ping: None,
                reconnect_timer: Timer::new(),
                pong_timer: Timer::new(),
            },
            transport: None,
            heartbeat: None,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("Realtime driver started for {}", self.config.url);
        loop {
            let flow = match self.next_activity().await {
                Activity::Command(None) => Flow::Stop,
                Activity::Command(Some(command)) => self.handle_command(command).await,
                Activity::ReconnectDue => self.establish().await,
                Activity::Inbound(frame) => self.handle_inbound(frame).await,
                Activity::HeartbeatDue => self.send_heartbeat().await,
                Activity::PongOverdue => {
                    tracing::warn!("No pong within {:?}, reconnecting", self.config.pong_timeout);
                    self.connection_lost(DisconnectReason::HeartbeatTimeout).await;
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }

        self.close_transport().await;
        self.conn.reconnect_timer.cancel();
        self.set_status(ConnectionStatus::Disconnected);
        tracing::debug!("Realtime driver stopped");
    }

    async fn next_activity(&mut self) -> Activity {
        match self.conn.status {
            ConnectionStatus::Connected => {
                let (Some(transport), Some(heartbeat)) =
                    (self.transport.as_mut(), self.heartbeat.as_mut())
                else {
                    return Activity::Inbound(None);
                };
                tokio::select! {
                    command = self.commands.recv() => Activity::Command(command),
                    frame = transport.recv() => Activity::Inbound(frame),
                    _ = heartbeat.tick() => Activity::HeartbeatDue,
                    _ = self.conn.pong_timer.fired() => Activity::PongOverdue,
                }
            }
            ConnectionStatus::ReconnectScheduled => {
                tokio::select! {
                    command = self.commands.recv() => Activity::Command(command),
                    _ = self.conn.reconnect_timer.fired() => Activity::ReconnectDue,
                }
            }
            _ => Activity::Command(self.commands.recv().await),
        }
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Shutdown => Flow::Stop,
            Command::Connect { reply } => match self.conn.status {
                ConnectionStatus::Failed => {
                    let _ = reply.send(Err(ChannelError::Exhausted {
                        attempts: self.conn.reconnect_attempts,
                    }));
                    Flow::Continue
                }
                ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                    let _ = reply.send(Ok(()));
                    Flow::Continue
                }
                ConnectionStatus::ReconnectScheduled => {
                    tracing::debug!("Connect requested, skipping pending backoff");
                    self.conn.reconnect_timer.cancel();
                    let _ = reply.send(Ok(()));
                    self.establish().await
                }
                ConnectionStatus::Disconnected => {
                    self.conn.reconnect_attempts = 0;
                    let _ = reply.send(Ok(()));
                    self.establish().await
                }
            },
            Command::Disconnect { reply } => {
                match self.conn.status {
                    ConnectionStatus::Connected => {
                        tracing::info!("Disconnecting from {}", self.config.url);
                        self.close_transport().await;
                        self.set_status(ConnectionStatus::Disconnected);
                        self.listeners.emit(&ChannelEvent::Disconnected {
                            reason: DisconnectReason::ClientRequested,
                        });
                    }
                    ConnectionStatus::ReconnectScheduled => {
                        self.conn.reconnect_timer.cancel();
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                    _ => {}
                }
                let _ = reply.send(());
                Flow::Continue
            }
            Command::Emit { frame, reply } => {
                let Some(transport) = self.transport.as_mut() else {
                    let _ = reply.send(Err(ChannelError::NotConnected));
                    return Flow::Continue;
                };
                match transport.send(&frame).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let reason = DisconnectReason::TransportError(e.to_string());
                        let _ = reply.send(Err(e));
                        self.connection_lost(reason).await;
                    }
                }
                Flow::Continue
            }
        }
    }

    /// Connecting state: one handshake attempt, bounded by the connect
    /// timeout. Commands keep being served while it is in progress.
    async fn establish(&mut self) -> Flow {
        self.set_status(ConnectionStatus::Connecting);
        tracing::info!(
            "Connecting to {} (attempt {})",
            self.config.url,
            self.conn.reconnect_attempts + 1
        );

        let connector = Arc::clone(&self.connector);
        let url = self.config.url.clone();
        let timeout = self.config.connect_timeout;
        let handshake = tokio::time::timeout(timeout, async move { connector.connect(&url).await });
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => {
                    match result {
                        Ok(Ok(transport)) => self.on_connected(transport),
                        Ok(Err(e)) => {
                            tracing::warn!("Connection failed: {}", e);
                            self.schedule_reconnect();
                        }
                        Err(_) => {
                            tracing::warn!("{}", ChannelError::ConnectTimeout(timeout));
                            self.schedule_reconnect();
                        }
                    }
                    return Flow::Continue;
                }
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Flow::Stop,
                    Some(Command::Connect { reply }) => {
                        let _ = reply.send(Ok(()));
                    }
                    Some(Command::Disconnect { reply }) => {
                        tracing::info!("Connect abandoned on request");
                        self.set_status(ConnectionStatus::Disconnected);
                        let _ = reply.send(());
                        return Flow::Continue;
                    }
                    Some(Command::Emit { reply, .. }) => {
                        let _ = reply.send(Err(ChannelError::NotConnected));
                    }
                },
            }
        }
    }

    fn on_connected(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.conn.reconnect_attempts = 0;
        self.conn.pending_ping = None;
        self.conn.last_ping_sent_at = None;
        self.conn.pong_timer.cancel();

        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);

        self.set_status(ConnectionStatus::Connected);
        tracing::info!("Connected to {}", self.config.url);
        self.listeners.emit(&ChannelEvent::Connected);
    }

    async fn handle_inbound(&mut self, inbound: Option<Result<Frame>>) -> Flow {
        match inbound {
            Some(Ok(Frame::Event { event, data })) => {
                tracing::debug!("Event {}", event);
                self.listeners.emit(&ChannelEvent::Server { name: event, data });
            }
            Some(Ok(Frame::Pong { timestamp })) => {
                if self.conn.pending_ping == Some(timestamp) {
                    self.conn.pending_ping = None;
                    self.conn.pong_timer.cancel();
                    tracing::trace!("Pong received");
                } else {
                    tracing::debug!(
                        "Ignoring pong {} (waiting for {:?})",
                        timestamp,
                        self.conn.pending_ping
                    );
                }
            }
            Some(Ok(Frame::Ping { timestamp })) => {
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.send(&Frame::Pong { timestamp }).await {
                        self.connection_lost(DisconnectReason::TransportError(e.to_string()))
                            .await;
                    }
                }
            }
            Some(Ok(other)) => {
                tracing::debug!("Ignoring unexpected frame {:?}", other);
            }
            Some(Err(ChannelError::InvalidMessage(e))) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
            }
            Some(Err(e)) => {
                tracing::warn!("Transport error: {}", e);
                self.connection_lost(DisconnectReason::TransportError(e.to_string()))
                    .await;
            }
            None => {
                tracing::warn!("Connection closed by server");
                self.connection_lost(DisconnectReason::ServerClosed).await;
            }
        }
        Flow::Continue
    }

    async fn send_heartbeat(&mut self) -> Flow {
        if self.conn.pending_ping.is_some() {
            return Flow::Continue;
        }
        let now = Instant::now();
        if let Some(last) = self.conn.last_ping_sent_at {
            if now.duration_since(last) < self.config.min_ping_interval {
                return Flow::Continue;
            }
        }

        let Some(transport) = self.transport.as_mut() else {
            return Flow::Continue;
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        match transport.send(&Frame::Ping { timestamp }).await {
            Ok(()) => {
                self.conn.pending_ping = Some(timestamp);
                self.conn.last_ping_sent_at = Some(now);
                self.conn.pong_timer.schedule(self.config.pong_timeout);
                tracing::trace!("Ping sent");
            }
            Err(e) => {
                self.connection_lost(DisconnectReason::TransportError(e.to_string()))
                    .await;
            }
        }
        Flow::Continue
    }

    async fn connection_lost(&mut self, reason: DisconnectReason) {
        self.close_transport().await;
        self.listeners.emit(&ChannelEvent::Disconnected { reason });
        self.schedule_reconnect();
    }

    /// Back off before the next attempt, or give up for good once the
    /// attempt budget is spent.
    fn schedule_reconnect(&mut self) {
        if self.conn.reconnect_attempts >= self.config.max_attempts {
            self.conn.reconnect_timer.cancel();
            self.set_status(ConnectionStatus::Failed);
            tracing::error!(
                "Giving up on {} after {} reconnect attempts",
                self.config.url,
                self.conn.reconnect_attempts
            );
            self.listeners.emit(&ChannelEvent::GaveUp {
                attempts: self.conn.reconnect_attempts,
            });
            return;
        }

        self.conn.reconnect_attempts += 1;
        let attempt = self.conn.reconnect_attempts;
        let delay = self.config.backoff(attempt);
        self.conn.reconnect_timer.schedule(delay);
        self.set_status(ConnectionStatus::ReconnectScheduled);

        tracing::info!("Reconnecting in {:?} (attempt {})", delay, attempt);
        self.listeners
            .emit(&ChannelEvent::ReconnectScheduled { attempt, delay });
    }

    async fn close_transport(&mut self) {
        self.heartbeat = None;
        self.conn.pending_ping = None;
        self.conn.pong_timer.cancel();
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.conn.status = status;
        self.state.send_replace(ChannelState {
            status,
            reconnect_attempts: self.conn.reconnect_attempts,
        });
    }
}
