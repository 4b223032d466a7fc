//! UI controls: sliders, buttons, labels and friends.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{FieldResult, parse, unknown};
use crate::events::HandlerResult;
use crate::session::ViewerSession;
use crate::types::Rgba;

/// Callback invoked with the owning session and the new control value.
pub type ControlCallback = Arc<dyn Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync>;

/// Kind-specific control state, tagged on the wire as `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlKind {
    Slider {
        min: f64,
        max: f64,
        step: f64,
        value: f64,
        description: String,
    },
    Button,
    Label {
        text: String,
    },
    Checkbox {
        value: bool,
        description: String,
    },
    Dropdown {
        options: Vec<String>,
        value: Option<String>,
        description: String,
    },
    DownloadButton {
        filename: String,
    },
    ColorPicker {
        value: Rgba,
    },
    PlotlyPlot {
        spec: Value,
    },
}

impl ControlKind {
    pub fn slider(min: f64, max: f64, step: f64, initial: f64) -> Self {
        Self::Slider {
            min,
            max,
            step,
            value: initial,
            description: String::new(),
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        Self::Label { text: text.into() }
    }

    pub fn checkbox(initial: bool) -> Self {
        Self::Checkbox {
            value: initial,
            description: String::new(),
        }
    }

    /// Dropdown whose initial value defaults to the first option.
    pub fn dropdown(options: Vec<String>, initial: Option<String>) -> Self {
        let value = initial.or_else(|| options.first().cloned());
        Self::Dropdown {
            options,
            value,
            description: String::new(),
        }
    }

    pub fn download_button(filename: impl Into<String>) -> Self {
        Self::DownloadButton {
            filename: filename.into(),
        }
    }

    pub fn color_picker(initial: Rgba) -> Self {
        Self::ColorPicker { value: initial }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slider { .. } => "slider",
            Self::Button => "button",
            Self::Label { .. } => "label",
            Self::Checkbox { .. } => "checkbox",
            Self::Dropdown { .. } => "dropdown",
            Self::DownloadButton { .. } => "download_button",
            Self::ColorPicker { .. } => "color_picker",
            Self::PlotlyPlot { .. } => "plotly_plot",
        }
    }

    pub fn settable_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Slider { .. } => &["min", "max", "step", "value", "description"],
            Self::Button => &[],
            Self::Label { .. } => &["text"],
            Self::Checkbox { .. } => &["value", "description"],
            Self::Dropdown { .. } => &["options", "value", "description"],
            Self::DownloadButton { .. } => &["filename"],
            Self::ColorPicker { .. } => &["value"],
            Self::PlotlyPlot { .. } => &["spec"],
        }
    }

    /// Attach a description to kinds that show one; no-op otherwise.
    #[must_use]
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Slider { description, .. }
            | Self::Checkbox { description, .. }
            | Self::Dropdown { description, .. } => *description = text.into(),
            _ => {}
        }
        self
    }

    fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        let kind = self.as_str();
        match (self, field) {
            (Self::Slider { min, .. }, "min") => *min = parse(field, value)?,
            (Self::Slider { max, .. }, "max") => *max = parse(field, value)?,
            (Self::Slider { step, .. }, "step") => *step = parse(field, value)?,
            (Self::Slider { value: v, .. }, "value") => *v = parse(field, value)?,
            (Self::Label { text }, "text") => *text = parse(field, value)?,
            (Self::Checkbox { value: v, .. }, "value") => *v = parse(field, value)?,
            (Self::Dropdown { options, .. }, "options") => *options = parse(field, value)?,
            (Self::Dropdown { value: v, .. }, "value") => *v = parse(field, value)?,
            (Self::DownloadButton { filename }, "filename") => *filename = parse(field, value)?,
            (Self::ColorPicker { value: v }, "value") => *v = parse(field, value)?,
            (Self::PlotlyPlot { spec }, "spec") => *spec = value,
            (
                Self::Slider { description, .. }
                | Self::Checkbox { description, .. }
                | Self::Dropdown { description, .. },
                "description",
            ) => *description = parse(field, value)?,
            _ => return Err(unknown(kind, field)),
        }
        Ok(None)
    }
}

// ─── ControlEntity ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct ControlEntity {
    pub name: String,
    pub kind: ControlKind,
    callback: Option<ControlCallback>,
}

impl ControlEntity {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            name: String::new(),
            kind,
            callback: None,
        }
    }

    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ViewerSession, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn callback(&self) -> Option<ControlCallback> {
        self.callback.clone()
    }

    pub fn set_field(&mut self, field: &str, value: Value) -> FieldResult {
        self.kind.set_field(field, value)
    }

    /// Record a value reported by the frontend. Stateless kinds accept any
    /// value unchanged.
    pub fn apply_event_value(&mut self, value: &Value) -> FieldResult {
        match &self.kind {
            ControlKind::Slider { .. }
            | ControlKind::Checkbox { .. }
            | ControlKind::Dropdown { .. }
            | ControlKind::ColorPicker { .. } => self.kind.set_field("value", value.clone()),
            _ => Ok(None),
        }
    }

    /// Current value of value-carrying controls.
    pub fn value(&self) -> Value {
        match &self.kind {
            ControlKind::Slider { value, .. } => serde_json::json!(value),
            ControlKind::Checkbox { value, .. } => serde_json::json!(value),
            ControlKind::Dropdown { value, .. } => serde_json::json!(value),
            ControlKind::ColorPicker { value } => serde_json::json!(value),
            ControlKind::Label { text } => serde_json::json!(text),
            _ => Value::Null,
        }
    }

    /// Wire form: the tagged kind fields plus `name`.
    pub fn to_wire(&self) -> Value {
        let mut wire = serde_json::to_value(&self.kind).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut wire {
            map.insert("name".to_owned(), Value::String(self.name.clone()));
        }
        wire
    }
}

impl fmt::Debug for ControlEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlEntity")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl PartialEq for ControlEntity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}
