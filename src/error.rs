use crate::market::frame::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("websocket error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("application error: {0}")]
    Application(String),
    #[error("history load failed: {0}")]
    SeedLoad(String),
    #[error("series lengths diverged (prices={prices}, asks={asks}, bids={bids})")]
    InvariantViolation {
        prices: usize,
        asks: usize,
        bids: usize,
    },
    #[error("request error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(value))
    }
}
