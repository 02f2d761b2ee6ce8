//! Errors reported by field operations.

use std::fmt;

use super::node::FieldId;
use crate::curve::CurveError;
use crate::mesh::MeshError;

/// Failure of a field operation.
///
/// Numeric degradation (singular Jacobians, compose lookups outside the
/// embedding) is not an error: those paths substitute a sentinel value and
/// log a warning instead.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Invalid or incompatible input; the call left all state unchanged.
    Argument { message: String },
    /// The field has no value at the requested location.
    NotDefined { field: String, location: String },
    /// The field type has no implementation for the request.
    Unsupported { field: String, operation: String },
    UnknownField(FieldId),
    DuplicateName(String),
    /// Establishing the type would make a field its own source.
    Cycle { cycle: Vec<FieldId> },
    /// The field is still a source of other fields.
    InUse { field: String, dependents: Vec<String> },
    Mesh(MeshError),
    Curve(CurveError),
}

impl FieldError {
    #[must_use]
    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_defined(field: impl Into<String>, location: impl fmt::Display) -> Self {
        Self::NotDefined {
            field: field.into(),
            location: location.to_string(),
        }
    }

    #[must_use]
    pub fn unsupported(field: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            field: field.into(),
            operation: operation.into(),
        }
    }

    /// Whether this is the "no value here" outcome rather than a fault.
    #[must_use]
    pub const fn is_not_defined(&self) -> bool {
        matches!(self, Self::NotDefined { .. })
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument { message } => write!(f, "invalid argument: {message}"),
            Self::NotDefined { field, location } => {
                write!(f, "field `{field}` is not defined at {location}")
            }
            Self::Unsupported { field, operation } => {
                write!(f, "field `{field}` does not support {operation}")
            }
            Self::UnknownField(id) => write!(f, "unknown field {}", id.0),
            Self::DuplicateName(name) => write!(f, "a field named `{name}` already exists"),
            Self::Cycle { cycle } => {
                if cycle.is_empty() {
                    f.write_str("field would depend on itself")
                } else {
                    let chain = cycle
                        .iter()
                        .map(|FieldId(id)| id.to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    write!(f, "field would depend on itself: {chain}")
                }
            }
            Self::InUse { field, dependents } => write!(
                f,
                "field `{field}` is in use by {}",
                dependents.join(", ")
            ),
            Self::Mesh(error) => write!(f, "mesh error: {error}"),
            Self::Curve(error) => write!(f, "curve error: {error}"),
        }
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mesh(error) => Some(error),
            Self::Curve(error) => Some(error),
            _ => None,
        }
    }
}

impl From<MeshError> for FieldError {
    fn from(error: MeshError) -> Self {
        match error {
            MeshError::NotDefined { field, location } => Self::NotDefined { field, location },
            other => Self::Mesh(other),
        }
    }
}

impl From<CurveError> for FieldError {
    fn from(error: CurveError) -> Self {
        Self::Curve(error)
    }
}
