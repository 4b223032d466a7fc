//! Error types for the viewer session layer.

use thiserror::Error;

/// Failure to hand a message to the underlying transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("failed to encode payload for {event}: {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Rejection of a single field in an entity update.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{kind} has no settable field `{field}`")]
    UnknownField { kind: &'static str, field: String },

    #[error("invalid value for `{field}`: {detail}")]
    InvalidValue { field: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("unsupported file extension: {0}. Supported extensions are: .png, .jpg, .jpeg")]
    UnsupportedExtension(String),

    #[error("screenshot payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decode screenshot image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level error for session operations.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("unknown state request event: {0}")]
    UnknownRequestKind(String),

    #[error("name `{name}` is already used by a {existing}")]
    NameCollision { name: String, existing: &'static str },

    #[error("no entity named `{0}`")]
    UnknownEntity(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Screenshot(#[from] ScreenshotError),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("console scope error: {0}")]
    Scope(#[from] mlua::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
