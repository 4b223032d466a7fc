//! Viewer side of the WebSocket transport.
//!
//! [`connect`] opens the socket, builds a [`ViewerSession`] on top of it and
//! runs two tasks: a writer draining an outbound queue, and a reader that
//! hands each inbound envelope to the session on the blocking pool.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use panoview_core::{TransportError, Transport, ViewerConfig, ViewerSession};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::WsError;
use crate::frame;

/// [`Transport`] that queues encoded frames for the writer task.
#[derive(Debug, Clone)]
pub struct WsTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl Transport for WsTransport {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let text = frame::encode(event, &payload).map_err(|source| TransportError::Encode {
            event: event.to_owned(),
            source,
        })?;
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

/// A live session bound to one WebSocket connection.
pub struct ViewerConnection {
    session: Arc<ViewerSession>,
    url: String,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Connect to the server named by `config` and start a session on it.
pub async fn connect(config: ViewerConfig) -> Result<ViewerConnection, WsError> {
    let viewer_id = config.resolve_viewer_id();
    let url = config.connect_url(&viewer_id);
    tracing::info!(url = %url, viewer_id = %viewer_id, "connecting");

    let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session = Arc::new(ViewerSession::with_id(
        viewer_id,
        config,
        Arc::new(WsTransport { tx }),
    )?);
    let cancel = CancellationToken::new();

    let writer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    text = rx.recv() => {
                        let Some(text) = text else { break };
                        if let Err(e) = ws_tx.send(Message::Text(text)).await {
                            tracing::debug!(error = %e, "ws write failed");
                            break;
                        }
                    }
                    _ = cancel.cancelled() => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        })
    };

    let reader = {
        let cancel = cancel.clone();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = ws_rx.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!(viewer_id = %session.viewer_id(), "server closed the connection");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "ws read error, dropping connection");
                                break;
                            }
                        };
                        let envelope = match frame::decode(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::debug!(error = %e, "ignoring malformed frame");
                                continue;
                            }
                        };
                        let session = Arc::clone(&session);
                        tokio::task::spawn_blocking(move || {
                            session.handle(&envelope.event, &envelope.data);
                        });
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            session.mark_closed();
            cancel.cancel();
        })
    };

    Ok(ViewerConnection {
        session,
        url,
        cancel,
        reader,
        writer,
    })
}

impl ViewerConnection {
    pub fn session(&self) -> &Arc<ViewerSession> {
        &self.session
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for ctrl-c or for the server to drop the connection.
    pub async fn hold(&self) {
        self.session.hold().await;
    }

    /// Send a close frame and wait for both tasks to finish.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.writer.await;
        let _ = self.reader.await;
        self.session.mark_closed();
    }
}

impl std::fmt::Debug for ViewerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerConnection")
            .field("url", &self.url)
            .field("viewer_id", self.session.viewer_id())
            .finish_non_exhaustive()
    }
}
