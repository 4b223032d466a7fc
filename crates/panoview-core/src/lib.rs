//! panoview-core: viewer session protocol layer.
//!
//! A long-running process registers scene objects and UI controls with a
//! [`ViewerSession`]; the session mirrors them to remote frontends over a
//! [`Transport`], routes inbound events by `viewer_id`, turns push replies
//! into pull calls with timeouts, and optionally hosts a remote console.

pub mod camera;
pub mod config;
pub mod console;
pub mod correlator;
pub mod entity;
pub mod error;
pub mod events;
pub mod registry;
pub mod screenshot;
pub mod session;
pub mod transport;
pub mod types;

pub use camera::{CameraInfo, CameraUpdate, ProjectionMode};
pub use config::{RelayConfig, RestartPolicy, ViewerConfig};
pub use console::{ConsoleColor, ConsoleScope, ConsoleSession, Segment};
pub use correlator::{RequestCorrelator, RequestKind, RequestState};
pub use entity::{
    AnimatedMesh, Arrows, ControlEntity, ControlKind, Material, MaterialValue, Mesh, Points,
    SceneEntity,
};
pub use error::{ConfigError, FieldError, ScreenshotError, TransportError, ViewerError};
pub use events::{EventDispatcher, HandlerError, HandlerResult, TriggerReport};
pub use registry::{Entity, Registry, UpdateOutcome};
pub use screenshot::{Screenshot, ScreenshotOptions};
pub use session::{HandleOutcome, ViewerSession};
pub use transport::{Outbound, RecordingTransport, Transport};
pub use types::{ColorSpec, ViewerId};

/// Lua interpreter re-export so callers can build scopes and values.
pub use mlua;
