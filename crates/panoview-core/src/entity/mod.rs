//! Scene objects and UI controls held by the registry.

pub mod control;
mod field;
pub mod material;
pub mod scene;

pub use control::{ControlCallback, ControlEntity, ControlKind};
pub use field::FieldResult;
pub use material::{Material, MaterialDecode, MaterialValue, Side};
pub use scene::{AnimatedMesh, Arrows, Mesh, Points, SceneEntity};
