//! Socket seam between the driver and the network

use crate::protocol::Frame;
use crate::{ChannelError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One established connection
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Next inbound frame. `None` once the peer closed the connection;
    /// `Some(Err(InvalidMessage))` for an undecodable frame, after which
    /// the connection is still usable.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    async fn close(&mut self);
}

/// Opens transports; the driver calls it once per connection attempt
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// tokio-tungstenite connector
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, _) = connect_async(url).await?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.stream.send(Message::Text(frame.to_text()?)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Frame::from_text(&text)),
                Some(Ok(Message::Close(_))) | None => return None,
                // Binary and protocol-level ping/pong frames carry no events.
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(Err(ChannelError::from(e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("Error while closing socket: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_url;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_wss_reaches_tls_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let url = resolve_url(&format!("https://127.0.0.1:{}/ws/stock", port));
        assert!(url.starts_with("wss://"));

        // A plain TCP peer cannot finish a TLS handshake, but the attempt must get that far.
        let err = match WsConnector.connect(&url).await {
            Err(e) => e,
            Ok(_) => panic!("plain TCP peer completed a TLS handshake"),
        };
        assert!(
            !err.to_string().contains("TLS support not compiled in"),
            "{}",
            err
        );
    }
}
