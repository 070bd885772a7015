//! Lifecycle and server events delivered to channel listeners

use depot_common::Topic;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const TOPIC_CONNECTED: &str = "connected";
pub const TOPIC_DISCONNECTED: &str = "disconnected";
pub const TOPIC_RECONNECT_SCHEDULED: &str = "reconnect_scheduled";
pub const TOPIC_GAVE_UP: &str = "max_reconnect_attempts_reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    ReconnectScheduled,
    /// Terminal: reconnect attempts exhausted
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::ReconnectScheduled => "reconnect_scheduled",
            ConnectionStatus::Failed => "failed",
        })
    }
}

/// Snapshot published by the driver on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    HeartbeatTimeout,
    TransportError(String),
    ServerClosed,
    ClientRequested,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            DisconnectReason::TransportError(e) => write!(f, "transport error: {}", e),
            DisconnectReason::ServerClosed => f.write_str("closed by server"),
            DisconnectReason::ClientRequested => f.write_str("closed by client"),
        }
    }
}

/// Everything a listener can observe; the topic of a server event is its name
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
    ReconnectScheduled { attempt: u32, delay: Duration },
    GaveUp { attempts: u32 },
    Server { name: String, data: serde_json::Value },
}

impl Topic for ChannelEvent {
    fn topic(&self) -> &str {
        match self {
            ChannelEvent::Connected => TOPIC_CONNECTED,
            ChannelEvent::Disconnected { .. } => TOPIC_DISCONNECTED,
            ChannelEvent::ReconnectScheduled { .. } => TOPIC_RECONNECT_SCHEDULED,
            ChannelEvent::GaveUp { .. } => TOPIC_GAVE_UP,
            ChannelEvent::Server { name, .. } => name,
        }
    }
}

impl ChannelEvent {
    /// Payload of a server event, `None` for lifecycle events
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            ChannelEvent::Server { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(ChannelEvent::Connected.topic(), "connected");
        assert_eq!(ChannelEvent::GaveUp { attempts: 5 }.topic(), "max_reconnect_attempts_reached");
        let server = ChannelEvent::Server {
            name: "stock.exit".into(),
            data: serde_json::json!({"quantity": 1}),
        };
        assert_eq!(server.topic(), "stock.exit");
        assert_eq!(server.data().unwrap()["quantity"], 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::ReconnectScheduled.to_string(), "reconnect_scheduled");
        assert_eq!(DisconnectReason::HeartbeatTimeout.to_string(), "heartbeat timeout");
    }
}
