//! Wire frames of the stock event socket

use serde::{Deserialize, Serialize};

/// JSON text frames, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Named event, pushed by the server or emitted by the client
    Event {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Liveness probe, answered with a `pong` carrying the same timestamp
    Ping { timestamp: i64 },

    Pong { timestamp: i64 },

    /// Ask for per-product stock events
    Subscribe {
        resource: String,
        #[serde(rename = "productId")]
        product_id: String,
    },

    Unsubscribe {
        resource: String,
        #[serde(rename = "productId")]
        product_id: String,
    },
}

impl Frame {
    pub fn event(name: impl Into<String>, data: serde_json::Value) -> Self {
        Frame::Event {
            event: name.into(),
            data,
        }
    }

    pub fn stock_subscription(product_id: impl Into<String>, subscribe: bool) -> Self {
        let resource = "stock".to_string();
        let product_id = product_id.into();
        if subscribe {
            Frame::Subscribe {
                resource,
                product_id,
            }
        } else {
            Frame::Unsubscribe {
                resource,
                product_id,
            }
        }
    }

    /// Serialize frame to JSON text
    pub fn to_text(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize frame from JSON text
    pub fn from_text(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::ChannelError::InvalidMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_frame_shape() {
        let frame = Frame::event("stock.entry", json!({"productId": "p1", "quantity": 4}));
        let value: serde_json::Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "stock.entry");
        assert_eq!(value["data"]["quantity"], 4);
    }

    #[test]
    fn test_subscribe_frame_uses_camel_case_product_id() {
        let text = Frame::stock_subscription("p-9", true).to_text().unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            json!({"type": "subscribe", "resource": "stock", "productId": "p-9"})
        );
    }

    #[test]
    fn test_parse_server_frames() {
        assert_eq!(
            Frame::from_text(r#"{"type":"pong","timestamp":42}"#).unwrap(),
            Frame::Pong { timestamp: 42 }
        );
        assert_eq!(
            Frame::from_text(r#"{"type":"event","event":"stock.alert.low"}"#).unwrap(),
            Frame::event("stock.alert.low", serde_json::Value::Null)
        );
    }

    #[test]
    fn test_unknown_frame_is_invalid_message() {
        assert!(matches!(
            Frame::from_text(r#"{"type":"shout"}"#),
            Err(crate::ChannelError::InvalidMessage(_))
        ));
        assert!(Frame::from_text("not json").is_err());
    }
}
