//! Transport boundary: the session only needs `emit(event, payload)`.
//! Inbound delivery is the transport's job; it calls `ViewerSession::handle`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::TransportError;
use crate::types::ViewerId;

/// Outbound half of a named-event channel. Enables mock injection for testing.
pub trait Transport: Send + Sync {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        (**self).emit(event, payload)
    }
}

// ─── Outbound ────────────────────────────────────────────────────────

/// A transport handle bound to one viewer. Every payload sent through it is
/// tagged with the owning `viewer_id`.
#[derive(Clone)]
pub struct Outbound {
    viewer_id: ViewerId,
    transport: Arc<dyn Transport>,
}

impl Outbound {
    pub fn new(viewer_id: ViewerId, transport: Arc<dyn Transport>) -> Self {
        Self {
            viewer_id,
            transport,
        }
    }

    pub fn viewer_id(&self) -> &ViewerId {
        &self.viewer_id
    }

    /// Emit `event`, inserting `viewer_id` into object payloads.
    /// Non-object payloads are wrapped as `{"viewer_id", "data"}`.
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        let tagged = match payload {
            Value::Object(mut map) => {
                map.insert(
                    "viewer_id".to_owned(),
                    Value::String(self.viewer_id.as_str().to_owned()),
                );
                Value::Object(map)
            }
            other => serde_json::json!({
                "viewer_id": self.viewer_id.as_str(),
                "data": other,
            }),
        };
        self.transport.emit(event, tagged)
    }

    /// Fire-and-forget emit: failures are logged, never propagated.
    pub fn emit_or_log(&self, event: &str, payload: Value) {
        if let Err(e) = self.emit(event, payload) {
            tracing::warn!(viewer_id = %self.viewer_id, event, error = %e, "emit failed");
        }
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("viewer_id", &self.viewer_id)
            .finish_non_exhaustive()
    }
}

// ─── RecordingTransport ──────────────────────────────────────────────

/// In-memory transport that records every emitted message in order.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages emitted so far.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    /// Event names emitted so far, in order.
    pub fn events(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(e, _)| e.clone()).collect()
    }

    /// Payloads of every message emitted under `event`.
    pub fn payloads(&self, event: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(e, _)| e == event)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for RecordingTransport {
    fn emit(&self, event: &str, payload: Value) -> Result<(), TransportError> {
        self.sent.lock().push((event.to_owned(), payload));
        Ok(())
    }
}
