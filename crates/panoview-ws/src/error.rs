use thiserror::Error;

use panoview_core::ViewerError;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] ViewerError),
}
