//! WebSocket transport for the telemetry stream.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::reconnect::{Connector, FrameStream};

/// [`Connector`] that opens a WebSocket with `tokio-tungstenite`.
///
/// Text frames are forwarded as-is. Binary frames are forwarded as lossy
/// UTF-8 and will usually fail to decode downstream. Control frames are
/// dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> crate::Result<FrameStream> {
        let (stream, response) = connect_async(url.as_str()).await?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let frames = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "server closed the stream");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        });
        Ok(Box::pin(frames))
    }
}
