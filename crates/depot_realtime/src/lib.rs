//! # Depot Realtime Channel
//!
//! Reconnecting, heartbeat-monitored event client for warehouse stock events.
//!
//! ## Architecture
//!
//! - **Driver**: one task owns the socket, the reconnect timer and the
//!   pong-timeout timer; the [`RealtimeChannel`] handle talks to it over a
//!   command channel
//! - **Transport**: JSON text frames over WebSocket (tokio-tungstenite),
//!   behind the [`Connector`] / [`Transport`] traits
//! - **Recovery**: exponential backoff capped at `max_delay`, terminal
//!   `Failed` state after `max_attempts`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use depot_realtime::{ChannelConfig, RealtimeChannel, WsConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> depot_realtime::Result<()> {
//!     let config = ChannelConfig::new("ws://localhost:8000/ws/stock");
//!     let channel = RealtimeChannel::spawn(config, Arc::new(WsConnector))?;
//!
//!     channel.on("stock.entry", |event| println!("{:?}", event));
//!     channel.connect().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
mod engine;
pub mod events;
pub mod protocol;
pub mod timer;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use channel::RealtimeChannel;
pub use config::{backoff_delay, resolve_url, ChannelConfig};
pub use events::{ChannelEvent, ChannelState, ConnectionStatus, DisconnectReason};
pub use protocol::Frame;
pub use timer::Timer;
pub use transport::{Connector, Transport, WsConnector};

/// Common result type for channel operations
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors surfaced by the realtime channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocketError(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("Not connected")]
    NotConnected,

    #[error("Reconnect attempts exhausted after {attempts}")]
    Exhausted { attempts: u32 },

    #[error("Channel driver stopped")]
    Closed,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::WebSocketError(Box::new(e))
    }
}
