use crate::error::AppError;
use crate::market::frame::subscribe_frame;
use futures_util::SinkExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type StreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect_stream(url: &str, timeout: Duration) -> Result<StreamSocket, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let connect = connect_async_with_config(url, Some(ws_config), true);
    let (stream, _) = tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| {
            AppError::ConnectionClosed(format!("connect timed out after {}ms", timeout.as_millis()))
        })??;
    Ok(stream)
}

pub async fn send_subscribe(socket: &mut StreamSocket, symbol: &str) -> Result<(), AppError> {
    let frame = subscribe_frame(symbol)?;
    socket.send(Message::Text(frame)).await?;
    Ok(())
}

/// Best-effort close handshake; the socket is unusable afterwards either way.
pub async fn close_stream(socket: &mut StreamSocket) {
    if let Err(error) = socket.close(None).await {
        tracing::debug!(%error, "websocket close handshake failed");
    }
}
