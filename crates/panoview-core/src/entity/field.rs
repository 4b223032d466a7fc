//! Typed field decoding shared by the per-kind setter tables.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::FieldError;

/// Decode `value` as the declared type of `field`.
pub(crate) fn parse<T: DeserializeOwned>(field: &str, value: Value) -> Result<T, FieldError> {
    serde_json::from_value(value).map_err(|e| FieldError::InvalidValue {
        field: field.to_owned(),
        detail: e.to_string(),
    })
}

pub(crate) fn unknown(kind: &'static str, field: &str) -> FieldError {
    FieldError::UnknownField {
        kind,
        field: field.to_owned(),
    }
}

/// Outcome of applying a single field: set, possibly with a non-fatal warning.
pub type FieldResult = Result<Option<String>, FieldError>;
