//! Registry of named scene objects and UI controls.
//!
//! Objects and controls live in separate ordered namespaces. A name may not
//! be used in both at once; re-adding a name within its own namespace
//! replaces the entry in place, keeping its original position.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::camera::CameraInfo;
use crate::console::output::split_text_to_segments;
use crate::entity::{ControlCallback, ControlEntity, FieldResult, SceneEntity};
use crate::error::{FieldError, ViewerError};
use crate::transport::Outbound;
use crate::types::synthesize_name;

pub const ADD_GEOMETRY: &str = "add_geometry";
pub const ADD_CONTROL: &str = "add_control";
pub const SET_CAMERA: &str = "set_camera";
pub const CONSOLE_META: &str = "console_meta";
pub const CONSOLE_OUTPUT: &str = "console_output";

// ─── OrderedStore ────────────────────────────────────────────────────

/// Insertion-ordered map; replacing a key keeps its slot.
#[derive(Debug)]
struct OrderedStore<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for OrderedStore<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> OrderedStore<T> {
    /// Insert or replace. Returns `true` when an entry was replaced.
    fn upsert(&mut self, name: String, item: T) -> bool {
        if let Some(&slot) = self.index.get(&name) {
            self.items[slot] = item;
            true
        } else {
            self.index.insert(name, self.items.len());
            self.items.push(item);
            false
        }
    }

    fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&slot| &self.items[slot])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index.get(name).map(|&slot| &mut self.items[slot])
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

// ─── Lookup & update results ─────────────────────────────────────────

/// A registry entry returned by [`Registry::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Object(SceneEntity),
    Control(ControlEntity),
}

/// Per-field outcome of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub applied: Vec<String>,
    pub rejected: Vec<(String, FieldError)>,
    /// Non-fatal decode warnings (the field was still set).
    pub warnings: Vec<String>,
}

impl UpdateOutcome {
    fn record(&mut self, name: &str, field: &str, result: FieldResult) {
        match result {
            Ok(warning) => {
                self.applied.push(field.to_owned());
                if let Some(warning) = warning {
                    tracing::warn!(entity = name, field, "{warning}");
                    self.warnings.push(warning);
                }
            }
            Err(e) => {
                tracing::debug!(entity = name, field, error = %e, "update field rejected");
                self.rejected.push((field.to_owned(), e));
            }
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RegistryInner {
    objects: OrderedStore<SceneEntity>,
    controls: OrderedStore<ControlEntity>,
}

/// Owns all scene objects and controls of one session and mirrors every
/// addition to the transport.
#[derive(Debug)]
pub struct Registry {
    outbound: Outbound,
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Store a scene object under `name` (or a synthesized `{kind}_xxxxxxxx`)
    /// and emit `add_geometry`. Returns the final name.
    pub fn register_object(
        &self,
        mut entity: SceneEntity,
        name: Option<String>,
    ) -> Result<String, ViewerError> {
        let name = name.unwrap_or_else(|| synthesize_name(entity.kind()));
        let mut inner = self.inner.lock();
        if inner.controls.contains(&name) {
            return Err(ViewerError::NameCollision {
                name,
                existing: "control",
            });
        }
        entity.set_name(name.clone());
        let wire = entity.to_wire();
        let replaced = inner.objects.upsert(name.clone(), entity);
        tracing::debug!(name = %name, replaced, "object registered");
        self.outbound.emit_or_log(ADD_GEOMETRY, wire);
        Ok(name)
    }

    /// Store a control under `name` (or a synthesized `{kind}_xxxxxxxx`)
    /// and emit `add_control`. Returns the final name.
    pub fn register_control(
        &self,
        mut control: ControlEntity,
        name: Option<String>,
    ) -> Result<String, ViewerError> {
        let name = name.unwrap_or_else(|| synthesize_name(control.kind.as_str()));
        let mut inner = self.inner.lock();
        if inner.objects.contains(&name) {
            return Err(ViewerError::NameCollision {
                name,
                existing: "scene object",
            });
        }
        control.name = name.clone();
        let wire = control.to_wire();
        let replaced = inner.controls.upsert(name.clone(), control);
        tracing::debug!(name = %name, replaced, "control registered");
        self.outbound.emit_or_log(ADD_CONTROL, wire);
        Ok(name)
    }

    /// Find an entry by name: scene objects first, then controls.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        let inner = self.inner.lock();
        if let Some(obj) = inner.objects.get(name) {
            return Some(Entity::Object(obj.clone()));
        }
        inner.controls.get(name).cloned().map(Entity::Control)
    }

    pub fn object(&self, name: &str) -> Option<SceneEntity> {
        self.inner.lock().objects.get(name).cloned()
    }

    pub fn control(&self, name: &str) -> Option<ControlEntity> {
        self.inner.lock().controls.get(name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.objects.items.iter().map(|o| o.name().to_owned()).collect()
    }

    pub fn control_names(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner.controls.items.iter().map(|c| c.name.clone()).collect()
    }

    /// Apply `updates` to the scene object `name`, field by field.
    ///
    /// Fields outside the kind's settable table are rejected and reported;
    /// the remaining fields are still applied.
    pub fn apply_update(
        &self,
        name: &str,
        updates: &Map<String, Value>,
    ) -> Result<UpdateOutcome, ViewerError> {
        let mut inner = self.inner.lock();
        let entity = inner
            .objects
            .get_mut(name)
            .ok_or_else(|| ViewerError::UnknownEntity(name.to_owned()))?;
        let mut outcome = UpdateOutcome::default();
        for (field, value) in updates {
            outcome.record(name, field, entity.set_field(field, value.clone()));
        }
        Ok(outcome)
    }

    /// Apply `updates` to the control `name`, field by field.
    pub fn apply_control_update(
        &self,
        name: &str,
        updates: &Map<String, Value>,
    ) -> Result<UpdateOutcome, ViewerError> {
        let mut inner = self.inner.lock();
        let control = inner
            .controls
            .get_mut(name)
            .ok_or_else(|| ViewerError::UnknownEntity(name.to_owned()))?;
        let mut outcome = UpdateOutcome::default();
        for (field, value) in updates {
            outcome.record(name, field, control.set_field(field, value.clone()));
        }
        Ok(outcome)
    }

    /// Record a frontend-reported value on control `name` and return its
    /// callback. `None` when no such control exists.
    pub fn record_control_event(
        &self,
        name: &str,
        value: &Value,
    ) -> Option<(Option<ControlCallback>, FieldResult)> {
        let mut inner = self.inner.lock();
        let control = inner.controls.get_mut(name)?;
        let result = control.apply_event_value(value);
        Some((control.callback(), result))
    }

    /// Re-emit the full session state so a fresh frontend can rebuild its
    /// view without diffing.
    ///
    /// Order: console flag, camera reset, objects, controls, console history.
    pub fn resync(&self, console_enabled: bool, console_history: &str) {
        self.outbound
            .emit_or_log(CONSOLE_META, serde_json::json!({ "enabled": console_enabled }));
        self.outbound.emit_or_log(
            SET_CAMERA,
            serde_json::json!({ "camera": CameraInfo::reset_default().to_wire() }),
        );

        let (objects, controls) = {
            let inner = self.inner.lock();
            let objects: Vec<Value> = inner.objects.items.iter().map(|o| o.to_wire()).collect();
            let controls: Vec<Value> = inner.controls.items.iter().map(|c| c.to_wire()).collect();
            (objects, controls)
        };
        tracing::debug!(
            viewer_id = %self.outbound.viewer_id(),
            objects = objects.len(),
            controls = controls.len(),
            "resync"
        );
        for wire in objects {
            self.outbound.emit_or_log(ADD_GEOMETRY, wire);
        }
        for wire in controls {
            self.outbound.emit_or_log(ADD_CONTROL, wire);
        }

        if !console_history.is_empty() {
            let segments = split_text_to_segments(console_history);
            self.outbound
                .emit_or_log(CONSOLE_OUTPUT, serde_json::json!({ "segments": segments }));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entity::{ControlKind, Mesh, Points};
    use crate::transport::RecordingTransport;
    use crate::types::ViewerId;

    fn registry() -> (Registry, Arc<RecordingTransport>) {
        let rec = Arc::new(RecordingTransport::new());
        let outbound = Outbound::new(ViewerId::new("v1"), rec.clone());
        (Registry::new(outbound), rec)
    }

    fn points(n: usize) -> SceneEntity {
        Points::new(vec![[0.0; 3]; n]).into()
    }

    #[test]
    fn control_update_sets_known_fields_only() {
        let (reg, _rec) = registry();
        reg.register_control(ControlEntity::new(ControlKind::checkbox(false)), Some("grid".into()))
            .expect("register");
        let updates = serde_json::json!({"value": true, "min": 3});
        let outcome = reg
            .apply_control_update("grid", updates.as_object().expect("map"))
            .expect("known control");
        assert_eq!(outcome.applied, vec!["value"]);
        assert_eq!(outcome.rejected[0].0, "min");
        assert_eq!(reg.control("grid").expect("control").value(), serde_json::json!(true));

        let err = reg
            .apply_control_update("mesh", &Map::new())
            .expect_err("no such control");
        assert!(matches!(err, ViewerError::UnknownEntity(_)));
    }

    #[test]
    fn register_emits_add_with_viewer_id() {
        let (reg, rec) = registry();
        let name = reg
            .register_object(points(2), Some("cloud".into()))
            .expect("register");
        assert_eq!(name, "cloud");
        let adds = rec.payloads(ADD_GEOMETRY);
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0]["viewer_id"], "v1");
        assert_eq!(adds[0]["name"], "cloud");
        assert_eq!(adds[0]["type"], "points");
    }

    #[test]
    fn missing_name_is_synthesized_from_kind() {
        let (reg, _rec) = registry();
        let name = reg.register_object(points(1), None).expect("register");
        assert!(name.starts_with("points_"), "{name}");
        assert_eq!(name.len(), "points_".len() + 8);
        let label = reg
            .register_control(ControlEntity::new(ControlKind::label("hi")), None)
            .expect("register");
        assert!(label.starts_with("label_"), "{label}");
    }

    #[test]
    fn reregister_replaces_in_place() {
        let (reg, _rec) = registry();
        reg.register_object(points(1), Some("a".into())).expect("a");
        reg.register_object(points(1), Some("b".into())).expect("b");
        reg.register_object(points(5), Some("a".into())).expect("a again");

        assert_eq!(reg.object_names(), vec!["a", "b"]);
        let Some(Entity::Object(SceneEntity::Points(p))) = reg.lookup("a") else {
            panic!("a is a points object");
        };
        assert_eq!(p.points.len(), 5, "latest version wins");
    }

    #[test]
    fn cross_namespace_collision_rejected() {
        let (reg, rec) = registry();
        reg.register_object(points(1), Some("shared".into()))
            .expect("object");
        let err = reg
            .register_control(ControlEntity::new(ControlKind::Button), Some("shared".into()))
            .expect_err("name taken by object");
        assert!(matches!(err, ViewerError::NameCollision { existing: "scene object", .. }));
        assert!(rec.payloads(ADD_CONTROL).is_empty());
        assert!(matches!(reg.lookup("shared"), Some(Entity::Object(_))));
    }

    #[test]
    fn lookup_finds_controls() {
        let (reg, _rec) = registry();
        reg.register_control(ControlEntity::new(ControlKind::checkbox(true)), Some("wire".into()))
            .expect("control");
        assert!(matches!(reg.lookup("wire"), Some(Entity::Control(_))));
        assert!(reg.lookup("missing").is_none());
    }

    #[test]
    fn apply_update_sets_known_and_rejects_unknown() {
        let (reg, _rec) = registry();
        let mesh = Mesh::new(vec![[0.0; 3]; 3], vec![[0, 1, 2]]);
        reg.register_object(mesh.into(), Some("m".into())).expect("mesh");

        let updates = serde_json::json!({
            "visible": false,
            "position": [1.0, 2.0, 3.0],
            "opacity": 0.2,
        });
        let outcome = reg
            .apply_update("m", updates.as_object().expect("map"))
            .expect("m exists");
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, "opacity");

        let Some(SceneEntity::Mesh(m)) = reg.object("m") else {
            panic!("mesh");
        };
        assert!(!m.visible);
        assert_eq!(m.position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn apply_update_with_unknown_material_type_keeps_raw_and_warns() {
        let (reg, _rec) = registry();
        let mesh = Mesh::new(vec![], vec![]);
        reg.register_object(mesh.into(), Some("m".into())).expect("mesh");

        let raw = serde_json::json!({"type": "NotAMaterial", "shine": 11});
        let updates = serde_json::json!({ "material": raw });
        let outcome = reg
            .apply_update("m", updates.as_object().expect("map"))
            .expect("update never aborts");
        assert_eq!(outcome.applied, vec!["material"]);
        assert_eq!(outcome.warnings.len(), 1);

        let Some(SceneEntity::Mesh(m)) = reg.object("m") else {
            panic!("mesh");
        };
        assert_eq!(m.material, Some(crate::entity::MaterialValue::Raw(raw)));
    }

    #[test]
    fn apply_update_unknown_entity() {
        let (reg, _rec) = registry();
        let err = reg
            .apply_update("ghost", &Map::new())
            .expect_err("no such object");
        assert!(matches!(err, ViewerError::UnknownEntity(ref n) if n == "ghost"));
    }

    #[test]
    fn resync_order_matches_registration() {
        let (reg, rec) = registry();
        reg.register_object(points(1), Some("p1".into())).expect("p1");
        reg.register_control(ControlEntity::new(ControlKind::Button), Some("c1".into()))
            .expect("c1");
        reg.register_object(points(1), Some("p2".into())).expect("p2");
        reg.register_control(ControlEntity::new(ControlKind::label("x")), Some("c2".into()))
            .expect("c2");
        rec.take();

        reg.resync(true, "hello\n");

        let sent = rec.sent();
        let events: Vec<&str> = sent.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(
            events,
            vec![
                CONSOLE_META,
                SET_CAMERA,
                ADD_GEOMETRY,
                ADD_GEOMETRY,
                ADD_CONTROL,
                ADD_CONTROL,
                CONSOLE_OUTPUT,
            ]
        );
        assert_eq!(sent[0].1["enabled"], true);
        assert_eq!(sent[1].1["camera"]["projection_mode"], "perspective");
        assert_eq!(sent[1].1["camera"]["fov"], 50.0);
        assert_eq!(sent[2].1["name"], "p1");
        assert_eq!(sent[3].1["name"], "p2");
        assert_eq!(sent[4].1["name"], "c1");
        assert_eq!(sent[5].1["name"], "c2");
        assert_eq!(sent[6].1["segments"][0]["text"], "hello\n");
    }

    #[test]
    fn resync_without_history_skips_console_output() {
        let (reg, rec) = registry();
        reg.resync(false, "");
        assert_eq!(rec.events(), vec![CONSOLE_META, SET_CAMERA]);
        assert_eq!(rec.sent()[0].1["enabled"], false);
    }

    #[test]
    fn control_event_updates_value_and_returns_callback() {
        let (reg, _rec) = registry();
        let slider = ControlEntity::new(ControlKind::slider(0.0, 1.0, 0.1, 0.5))
            .with_callback(|_session, _value| Ok(()));
        reg.register_control(slider, Some("s".into())).expect("slider");

        let (callback, result) = reg
            .record_control_event("s", &serde_json::json!(0.9))
            .expect("control exists");
        assert!(callback.is_some());
        assert!(result.is_ok());
        assert_eq!(reg.control("s").expect("s").value(), serde_json::json!(0.9));
        assert!(reg.record_control_event("nope", &Value::Null).is_none());
    }
}
