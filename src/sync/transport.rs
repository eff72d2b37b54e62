//! Transports carrying text frames between the session and the server.

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::protocol::ProtocolError;
use super::{ChannelError, ChannelResult};

/// Outgoing half of an open channel
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChannelError> + Send>>;

/// Incoming half of an open channel. Ends when the server closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = ChannelResult<String>> + Send>>;

/// Something that can open a bidirectional frame channel.
///
/// Frames sent through one sink must arrive in order.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &str, credential: &str) -> ChannelResult<(FrameSink, FrameStream)>;
}

/// WebSocket transport. The credential travels as a bearer token.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str, credential: &str) -> ChannelResult<(FrameSink, FrameStream)> {
        let mut request = url.into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential))
            .map_err(|e| ChannelError::Connect(format!("invalid credential: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, response) = tokio_tungstenite::connect_async(request).await?;
        debug!("WebSocket handshake complete: {}", response.status());

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(ChannelError::from)
            .with(|frame: String| future::ready(Ok::<_, ChannelError>(Message::Text(frame))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(String::from_utf8(bytes).map_err(|e| {
                    ChannelError::Protocol(ProtocolError::InvalidFormat(e.to_string()))
                })),
                Ok(Message::Close(frame)) => Some(Err(ChannelError::Closed(
                    frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string()),
                ))),
                // Ping/pong are answered by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let transport = WebSocketTransport::new();
        let result = transport.open("not a url", "token").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = WebSocketTransport::new();
        let result = transport.open(&format!("ws://{}", addr), "token").await;
        assert!(matches!(result, Err(ChannelError::Transport(_))));
    }
}
