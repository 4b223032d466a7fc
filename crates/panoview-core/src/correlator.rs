//! Pull-style requests over a push transport.
//!
//! Each outgoing state request carries a fresh `request_id` and owns a
//! oneshot slot. Replies that echo the id resolve exactly that request.
//! Replies without an id resolve only the most recent pending request of
//! their kind; older requests of the same kind then time out.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ViewerError;
use crate::transport::Outbound;

pub const RELAY_STATE_REQUEST: &str = "relay_state_request";

/// The fixed set of things a session can ask the frontend for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    CameraInfo,
    SelectedObject,
    Screenshot,
}

impl RequestKind {
    pub const ALL: [RequestKind; 3] = [Self::CameraInfo, Self::SelectedObject, Self::Screenshot];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CameraInfo => "camera_info",
            Self::SelectedObject => "selected_object",
            Self::Screenshot => "screenshot",
        }
    }

    /// Name carried in the `event` field of `relay_state_request`.
    pub fn request_event(self) -> &'static str {
        match self {
            Self::CameraInfo => "request_camera_info",
            Self::SelectedObject => "request_selected_object",
            Self::Screenshot => "request_screenshot",
        }
    }

    /// Parse `request_<kind>` or a bare `<kind>`.
    pub fn from_event(event: &str) -> Result<Self, ViewerError> {
        let base = event.strip_prefix("request_").unwrap_or(event);
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == base)
            .ok_or_else(|| ViewerError::UnknownRequestKind(event.to_owned()))
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable state of one request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Pending,
    /// A reply arrived and has not been collected by `wait` yet.
    Fulfilled,
}

/// Handle for one in-flight request; pass it to [`RequestCorrelator::wait`].
///
/// Dropping the handle releases its slot, whether or not the wait ran to
/// completion.
#[derive(Debug)]
pub struct PendingRequest {
    id: String,
    kind: RequestKind,
    rx: oneshot::Receiver<Value>,
    slots: Weak<Mutex<Slots>>,
}

impl PendingRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.lock().by_id.remove(&self.id);
        }
    }
}

// ─── Correlator ──────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    kind: RequestKind,
    seq: u64,
    /// `None` once the reply has been delivered.
    tx: Option<oneshot::Sender<Value>>,
}

#[derive(Debug, Default)]
struct Slots {
    by_id: HashMap<String, Slot>,
    next_seq: u64,
}

#[derive(Debug)]
pub struct RequestCorrelator {
    outbound: Outbound,
    slots: Arc<Mutex<Slots>>,
}

impl RequestCorrelator {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            slots: Arc::new(Mutex::new(Slots::default())),
        }
    }

    /// Open a slot for `kind` and emit `relay_state_request`.
    ///
    /// `extra` travels as the request's `data` (`Null` becomes `{}`).
    pub fn emit_state_request(
        &self,
        kind: RequestKind,
        extra: Value,
    ) -> Result<PendingRequest, ViewerError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock();
            let seq = slots.next_seq;
            slots.next_seq += 1;
            slots.by_id.insert(
                id.clone(),
                Slot {
                    kind,
                    seq,
                    tx: Some(tx),
                },
            );
        }

        let data = if extra.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            extra
        };
        let payload = serde_json::json!({
            "event": kind.request_event(),
            "data": data,
            "request_id": id,
        });
        if let Err(e) = self.outbound.emit(RELAY_STATE_REQUEST, payload) {
            self.slots.lock().by_id.remove(&id);
            return Err(e.into());
        }
        tracing::debug!(
            viewer_id = %self.outbound.viewer_id(),
            kind = %kind,
            request_id = %id,
            "state request sent"
        );
        Ok(PendingRequest {
            id,
            kind,
            rx,
            slots: Arc::downgrade(&self.slots),
        })
    }

    /// Deliver an inbound reply. `event` names the kind (`camera_info` or
    /// `request_camera_info`); a payload `event` field takes precedence.
    ///
    /// Returns `true` when a pending request was resolved.
    pub fn handle_state_request(&self, event: &str, payload: &Value) -> Result<bool, ViewerError> {
        let event = payload.get("event").and_then(Value::as_str).unwrap_or(event);
        let kind = RequestKind::from_event(event)?;
        let data = payload.get("data").cloned().unwrap_or(Value::Null);
        let request_id = payload.get("request_id").and_then(Value::as_str);

        let mut slots = self.slots.lock();
        let target = match request_id {
            Some(id) => slots
                .by_id
                .get(id)
                .filter(|s| s.kind == kind && s.tx.is_some())
                .map(|_| id.to_owned()),
            None => slots
                .by_id
                .iter()
                .filter(|(_, s)| s.kind == kind && s.tx.is_some())
                .max_by_key(|(_, s)| s.seq)
                .map(|(id, _)| id.clone()),
        };
        let Some(id) = target else {
            tracing::debug!(kind = %kind, ?request_id, "reply without pending request");
            return Ok(false);
        };
        let Some(tx) = slots.by_id.get_mut(&id).and_then(|s| s.tx.take()) else {
            return Ok(false);
        };
        if tx.send(data).is_err() {
            // waiter gave up already
            slots.by_id.remove(&id);
            return Ok(false);
        }
        tracing::debug!(kind = %kind, request_id = %id, "state request fulfilled");
        Ok(true)
    }

    /// Wait up to `timeout` for the reply to `pending`.
    ///
    /// `None` means no data arrived in time. Either way the slot is
    /// released and the kind returns to idle.
    pub async fn wait(&self, pending: PendingRequest, timeout: Duration) -> Option<Value> {
        let mut pending = pending;
        let result = tokio::time::timeout(timeout, &mut pending.rx).await;
        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => None,
            Err(_) => {
                tracing::debug!(
                    kind = %pending.kind,
                    request_id = %pending.id,
                    ?timeout,
                    "state request timed out"
                );
                None
            }
        }
    }

    /// Emit a request and wait for its reply.
    pub async fn request(
        &self,
        kind: RequestKind,
        extra: Value,
        timeout: Duration,
    ) -> Result<Option<Value>, ViewerError> {
        let pending = self.emit_state_request(kind, extra)?;
        Ok(self.wait(pending, timeout).await)
    }

    pub fn state(&self, kind: RequestKind) -> RequestState {
        let slots = self.slots.lock();
        let mut state = RequestState::Idle;
        for slot in slots.by_id.values().filter(|s| s.kind == kind) {
            if slot.tx.is_none() {
                return RequestState::Fulfilled;
            }
            state = RequestState::Pending;
        }
        state
    }
}
