//! One viewer session: identity, registry, events, pulls and the console
//! bound to a single transport.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::camera::{CameraInfo, CameraUpdate};
use crate::config::{RestartPolicy, ViewerConfig};
use crate::console::{ConsoleColor, ConsoleScope, ConsoleSession, Segment};
use crate::correlator::{RequestCorrelator, RequestKind};
use crate::entity::{
    AnimatedMesh, Arrows, ControlEntity, ControlKind, Mesh, Points, SceneEntity,
};
use crate::error::ViewerError;
use crate::events::{self, EventDispatcher, HandlerResult};
use crate::registry::{Entity, Registry, SET_CAMERA, UpdateOutcome};
use crate::screenshot::{self, Screenshot, ScreenshotOptions};
use crate::transport::{Outbound, Transport};
use crate::types::{Rgba, Vec3, ViewerId};

// ─── Wire events ─────────────────────────────────────────────────────

pub const VIEWER_HEARTBEAT: &str = "viewer_heartbeat";
pub const CLIENT_HEARTBEAT: &str = "client_heartbeat";
pub const REQUEST_STATE_FROM_CLIENT: &str = "request_state_from_client";
pub const UI_EVENT_RESPONSE: &str = "ui_event_response";
pub const UPDATE_OBJECT: &str = "update_object";
pub const RESTART_SCRIPT: &str = "restart_script";
pub const DOWNLOAD_FILE: &str = "download_file";

/// What [`ViewerSession::handle`] did with an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Handled,
    /// Addressed to another viewer (or to none); dropped.
    Foreign,
    /// No handler for this event name.
    Unhandled,
}

pub struct ViewerSession {
    viewer_id: ViewerId,
    config: ViewerConfig,
    outbound: Outbound,
    registry: Registry,
    events: EventDispatcher,
    correlator: RequestCorrelator,
    console: ConsoleSession,
    closed: watch::Sender<bool>,
}

impl ViewerSession {
    /// Create a session with the id from `config` (generated if absent).
    pub fn new(config: ViewerConfig, transport: Arc<dyn Transport>) -> Result<Self, ViewerError> {
        let viewer_id = config.resolve_viewer_id();
        Self::with_id(viewer_id, config, transport)
    }

    pub fn with_id(
        viewer_id: ViewerId,
        config: ViewerConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ViewerError> {
        let outbound = Outbound::new(viewer_id.clone(), transport);
        let console = ConsoleSession::new(outbound.clone(), config.interactive_console)?;
        let (closed, _) = watch::channel(false);
        let session = Self {
            registry: Registry::new(outbound.clone()),
            events: EventDispatcher::new(),
            correlator: RequestCorrelator::new(outbound.clone()),
            console,
            viewer_id,
            config,
            outbound,
            closed,
        };
        if session.console.is_enabled() {
            tracing::warn!(
                viewer_id = %session.viewer_id,
                "interactive console enabled: the frontend can execute code in this process"
            );
            session.console.announce();
        }
        Ok(session)
    }

    pub fn viewer_id(&self) -> &ViewerId {
        &self.viewer_id
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn console(&self) -> &ConsoleSession {
        &self.console
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    /// Subscribe to a built-in or custom event.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&[Value]) -> HandlerResult + Send + Sync + 'static,
    {
        self.events.subscribe(event, handler);
    }

    // ─── Scene objects ───────────────────────────────────────────────

    /// Register any scene object; `None` synthesizes a name.
    pub fn add_object(
        &self,
        entity: impl Into<SceneEntity>,
        name: Option<&str>,
    ) -> Result<String, ViewerError> {
        self.registry
            .register_object(entity.into(), name.map(str::to_owned))
    }

    pub fn add_mesh(&self, name: &str, mesh: Mesh) -> Result<String, ViewerError> {
        self.add_object(mesh, Some(name))
    }

    pub fn add_animated_mesh(&self, name: &str, mesh: AnimatedMesh) -> Result<String, ViewerError> {
        self.add_object(mesh, Some(name))
    }

    pub fn add_points(&self, name: &str, points: Points) -> Result<String, ViewerError> {
        self.add_object(points, Some(name))
    }

    pub fn add_arrows(&self, name: &str, arrows: Arrows) -> Result<String, ViewerError> {
        self.add_object(arrows, Some(name))
    }

    /// Look up an object or control by name.
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.registry.lookup(name)
    }

    /// Mutate an object or control locally and push the accepted fields to
    /// the frontend.
    pub fn update_object(
        &self,
        name: &str,
        updates: &Map<String, Value>,
    ) -> Result<UpdateOutcome, ViewerError> {
        let outcome = self.apply_update(name, updates)?;
        let applied: Map<String, Value> = updates
            .iter()
            .filter(|(k, _)| outcome.applied.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if !applied.is_empty() {
            self.outbound.emit_or_log(
                UPDATE_OBJECT,
                serde_json::json!({ "id": name, "updates": applied }),
            );
        }
        Ok(outcome)
    }

    /// Scene objects first, then controls, same order as [`Self::get`].
    fn apply_update(
        &self,
        name: &str,
        updates: &Map<String, Value>,
    ) -> Result<UpdateOutcome, ViewerError> {
        match self.registry.apply_update(name, updates) {
            Err(ViewerError::UnknownEntity(_)) => self.registry.apply_control_update(name, updates),
            other => other,
        }
    }

    // ─── Controls ────────────────────────────────────────────────────

    /// Register any control; `None` synthesizes a name.
    pub fn add_control(
        &self,
        control: ControlEntity,
        name: Option<&str>,
    ) -> Result<String, ViewerError> {
        self.registry
            .register_control(control, name.map(str::to_owned))
    }

    fn control_with<F>(&self, name: &str, kind: ControlKind, callback: F) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.add_control(ControlEntity::new(kind).with_callback(callback), Some(name))
    }

    pub fn slider<F>(
        &self,
        name: &str,
        min: f64,
        max: f64,
        step: f64,
        initial: f64,
        callback: F,
    ) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::slider(min, max, step, initial), callback)
    }

    pub fn button<F>(&self, name: &str, callback: F) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::Button, callback)
    }

    /// Text label; unnamed labels get a `label_xxxxxxxx` name.
    pub fn label(&self, text: &str, name: Option<&str>) -> Result<String, ViewerError> {
        self.add_control(ControlEntity::new(ControlKind::label(text)), name)
    }

    pub fn checkbox<F>(&self, name: &str, initial: bool, callback: F) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::checkbox(initial), callback)
    }

    pub fn dropdown<F>(
        &self,
        name: &str,
        options: Vec<String>,
        initial: Option<String>,
        callback: F,
    ) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::dropdown(options, initial), callback)
    }

    /// Download button; the callback usually ends in [`Self::send_download`].
    pub fn download_button<F>(&self, name: &str, filename: &str, callback: F) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::download_button(filename), callback)
    }

    pub fn color_picker<F>(&self, name: &str, initial: Rgba, callback: F) -> Result<String, ViewerError>
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.control_with(name, ControlKind::color_picker(initial), callback)
    }

    pub fn add_plotly(&self, name: &str, spec: Value) -> Result<String, ViewerError> {
        self.add_control(ControlEntity::new(ControlKind::PlotlyPlot { spec }), Some(name))
    }

    /// Push a file to the frontend for download.
    pub fn send_download(&self, filename: &str, bytes: &[u8]) -> Result<(), ViewerError> {
        let data = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.outbound.emit(
            DOWNLOAD_FILE,
            serde_json::json!({ "filename": filename, "data": data }),
        )?;
        Ok(())
    }

    // ─── Camera & pulls ──────────────────────────────────────────────

    pub fn set_camera(&self, update: &CameraUpdate) {
        self.outbound
            .emit_or_log(SET_CAMERA, serde_json::json!({ "camera": update.to_wire() }));
    }

    pub fn look_at(&self, position: Vec3, target: Vec3) {
        self.set_camera(&CameraInfo::look_at(position, target));
    }

    /// Current frontend camera, or `None` if the frontend did not answer
    /// within `timeout` (default: the configured request timeout).
    pub async fn camera(&self, timeout: Option<Duration>) -> Result<Option<CameraInfo>, ViewerError> {
        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let Some(data) = self
            .correlator
            .request(RequestKind::CameraInfo, Value::Null, timeout)
            .await?
        else {
            return Ok(None);
        };
        if data.is_null() {
            return Ok(None);
        }
        let info = serde_json::from_value(data).map_err(|source| ViewerError::Decode {
            what: "camera_info",
            source,
        })?;
        Ok(Some(info))
    }

    /// Name of the object selected in the frontend, if any.
    pub async fn selected_object(&self, timeout: Option<Duration>) -> Result<Option<String>, ViewerError> {
        let timeout = timeout.unwrap_or_else(|| self.config.request_timeout());
        let data = self
            .correlator
            .request(RequestKind::SelectedObject, Value::Null, timeout)
            .await?;
        Ok(data.and_then(|v| v.as_str().map(str::to_owned)))
    }

    /// Capture the frontend's rendering. PNG targets decode to RGBA, JPEG
    /// to RGB; a `filename` saves the image too.
    pub async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Option<Screenshot>, ViewerError> {
        let (path, format) = options.target()?;
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.screenshot_timeout());
        let data = self
            .correlator
            .request(RequestKind::Screenshot, options.request_data(), timeout)
            .await?;
        let Some(encoded) = data.as_ref().and_then(Value::as_str).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let shot = screenshot::decode(encoded, format, path.as_deref())?;
        Ok(Some(shot))
    }

    // ─── Console ─────────────────────────────────────────────────────

    /// Write text straight to the frontend console.
    pub fn print_colored(&self, text: &str, color: Option<ConsoleColor>, end: &str) {
        self.console
            .output()
            .emit_segments(vec![Segment::new(format!("{text}{end}"), color)]);
    }

    /// Mirror interpreter `print` output to the frontend from now on.
    pub fn capture_prints(&self) {
        self.console.capture_prints();
    }

    pub fn set_console_scope(&self, scope: ConsoleScope) -> Result<(), ViewerError> {
        self.console.set_scope(scope)?;
        Ok(())
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Block until ctrl-c or until the transport reports the connection
    /// closed.
    pub async fn hold(&self) {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(viewer_id = %self.viewer_id, "interrupted, exiting");
            }
            _ = closed.wait_for(|c| *c) => {
                tracing::info!(viewer_id = %self.viewer_id, "connection closed");
            }
        }
    }

    /// Mark the connection closed; wakes [`Self::hold`].
    pub fn mark_closed(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Replace the process with a fresh copy of itself. Only returns on
    /// failure.
    pub fn restart(&self) -> Result<(), ViewerError> {
        let exe = std::env::current_exe()?;
        let args: Vec<_> = std::env::args_os().skip(1).collect();
        tracing::info!(viewer_id = %self.viewer_id, exe = %exe.display(), "restarting");

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            let err = std::process::Command::new(&exe).args(&args).exec();
            Err(err.into())
        }
        #[cfg(not(unix))]
        {
            std::process::Command::new(&exe).args(&args).spawn()?;
            std::process::exit(0)
        }
    }

    // ─── Inbound routing ─────────────────────────────────────────────

    /// Route one inbound message. Messages for other viewers are dropped
    /// before any state is touched.
    ///
    /// Runs handlers, callbacks and console commands on the calling
    /// thread; transports call this off their reader task.
    pub fn handle(&self, event: &str, payload: &Value) -> HandleOutcome {
        if !self.viewer_id.matches(payload) {
            tracing::trace!(viewer_id = %self.viewer_id, event, "dropping message for another viewer");
            return HandleOutcome::Foreign;
        }
        tracing::trace!(viewer_id = %self.viewer_id, event, "inbound");

        match event {
            VIEWER_HEARTBEAT => {
                self.outbound
                    .emit_or_log(CLIENT_HEARTBEAT, Value::Object(Map::new()));
            }
            REQUEST_STATE_FROM_CLIENT => {
                self.registry
                    .resync(self.console.is_enabled(), &self.console.history());
            }
            UI_EVENT_RESPONSE => self.handle_ui_event(payload),
            UPDATE_OBJECT => self.handle_update_object(payload),
            RESTART_SCRIPT => self.handle_restart(),
            crate::console::CONSOLE_COMMAND => self.console.execute(command_of(payload)),
            crate::console::CONSOLE_COMPLETE => self.console.complete(command_of(payload)),
            "camera_info" | "selected_object" | "screenshot" => {
                if let Err(e) = self.correlator.handle_state_request(event, payload) {
                    tracing::warn!(viewer_id = %self.viewer_id, error = %e, "bad state reply");
                }
            }
            "events.camera" => self.trigger_field(events::CAMERA, payload, "camera"),
            "events.inspect" => self.trigger_field(events::INSPECT, payload, "inspection"),
            "events.select_object" => {
                self.trigger_field(events::SELECT_OBJECT, payload, "selected_object");
            }
            "events.gizmo" => self.trigger_field(events::GIZMO, payload, "gizmo"),
            _ => {
                tracing::debug!(viewer_id = %self.viewer_id, event, "unhandled event");
                return HandleOutcome::Unhandled;
            }
        }
        HandleOutcome::Handled
    }

    fn trigger_field(&self, event: &str, payload: &Value, field: &str) {
        let arg = payload.get(field).cloned().unwrap_or(Value::Null);
        self.events.trigger(event, &[arg]);
    }

    fn handle_ui_event(&self, payload: &Value) {
        let Some(control_id) = payload.get("controlId").and_then(Value::as_str) else {
            tracing::debug!(viewer_id = %self.viewer_id, "ui event without controlId");
            return;
        };
        let event_type = payload.get("eventType").and_then(Value::as_str).unwrap_or("");
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        match self.registry.record_control_event(control_id, &value) {
            Some((callback, result)) => {
                if let Err(e) = result {
                    tracing::warn!(control = control_id, error = %e, "control value rejected");
                }
                if let Some(callback) = callback {
                    match catch_unwind(AssertUnwindSafe(|| callback(self, &value))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(control = control_id, event_type, error = %e, "control callback failed");
                        }
                        Err(_) => {
                            tracing::warn!(control = control_id, event_type, "control callback panicked");
                        }
                    }
                }
            }
            None => {
                tracing::debug!(control = control_id, "ui event for unknown control");
            }
        }
        self.events
            .trigger(events::CONTROL, &[Value::String(control_id.to_owned()), value]);
    }

    fn handle_update_object(&self, payload: &Value) {
        let Some(id) = payload.get("id").and_then(Value::as_str) else {
            return;
        };
        let empty = Map::new();
        let updates = payload
            .get("updates")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        match self.apply_update(id, updates) {
            Ok(outcome) => {
                for (field, e) in &outcome.rejected {
                    tracing::debug!(object = id, field, error = %e, "frontend update field rejected");
                }
                self.events.trigger(
                    events::UPDATE_OBJECT,
                    &[Value::String(id.to_owned()), Value::Object(updates.clone())],
                );
            }
            Err(e) => tracing::debug!(object = id, error = %e, "frontend update ignored"),
        }
    }

    fn handle_restart(&self) {
        match self.config.restart {
            RestartPolicy::Ignore => {
                tracing::info!(viewer_id = %self.viewer_id, "restart requested, ignored by policy");
            }
            RestartPolicy::Exec => {
                if let Err(e) = self.restart() {
                    tracing::error!(viewer_id = %self.viewer_id, error = %e, "restart failed");
                }
            }
        }
    }
}

fn command_of(payload: &Value) -> &str {
    payload.get("command").and_then(Value::as_str).unwrap_or("")
}

impl std::fmt::Debug for ViewerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerSession")
            .field("viewer_id", &self.viewer_id)
            .field("console", &self.console)
            .finish_non_exhaustive()
    }
}
