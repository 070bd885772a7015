//! Public handle of a realtime channel

use crate::config::ChannelConfig;
use crate::engine::{Command, Driver};
use crate::events::{ChannelEvent, ChannelState, ConnectionStatus};
use crate::protocol::Frame;
use crate::transport::Connector;
use crate::{ChannelError, Result};
use depot_common::{ListenerRegistry, SubscriptionId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 32;

/// Handle to one logical connection
///
/// Dropping the handle stops the driver task; [`RealtimeChannel::shutdown`]
/// additionally waits for it to finish. A channel that reached
/// [`ConnectionStatus::Failed`] stays failed; build a new one to retry.
pub struct RealtimeChannel {
    commands: mpsc::Sender<Command>,
    listeners: Arc<ListenerRegistry<ChannelEvent>>,
    state: watch::Receiver<ChannelState>,
    url: String,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Validate `config` and start the driver. Does not connect yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ChannelConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(ChannelState::default());
        let listeners = Arc::new(ListenerRegistry::new());
        let url = config.url.clone();

        let driver = Driver::new(config, connector, receiver, Arc::clone(&listeners), state_tx);
        let handle = tokio::spawn(driver.run());

        Ok(Self {
            commands,
            listeners,
            state,
            url,
            driver: Mutex::new(Some(handle)),
        })
    }

    /// Start connecting. Returns once the driver accepted the request, not
    /// when the handshake completes; watch `connected` for that.
    pub async fn connect(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Connect { reply }).await?;
        response.await.map_err(|_| ChannelError::Closed)?
    }

    /// Close the connection without reconnecting; cancels a pending backoff.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Disconnect { reply }).await?;
        response.await.map_err(|_| ChannelError::Closed)
    }

    /// Send a named event. Fails with `NotConnected` unless connected.
    pub async fn emit(&self, event: &str, data: serde_json::Value) -> Result<()> {
        self.send_frame(Frame::event(event, data)).await
    }

    pub async fn subscribe_stock(&self, product_id: &str) -> Result<()> {
        self.send_frame(Frame::stock_subscription(product_id, true))
            .await
    }

    pub async fn unsubscribe_stock(&self, product_id: &str) -> Result<()> {
        self.send_frame(Frame::stock_subscription(product_id, false))
            .await
    }

    async fn send_frame(&self, frame: Frame) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Emit { frame, reply }).await?;
        response.await.map_err(|_| ChannelError::Closed)?
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Listen for `topic`: a server event name, a lifecycle topic such as
    /// `connected`, or `"*"` for everything.
    pub fn on<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(topic, listener)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.borrow().reconnect_attempts
    }

    pub fn status_watch(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop the driver, closing any open socket, and wait for it.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Realtime driver ended abnormally: {}", e);
            }
        }
        self.listeners.clear();
    }
}
