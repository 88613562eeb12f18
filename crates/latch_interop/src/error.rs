use thiserror::Error;

/// Errors raised while moving a value across the interop boundary.
///
/// `path` is a JSON-pointer style location of the offending element,
/// empty for the root value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteropError {
    #[error("type `{type_name}` has no dynamic representation (at '{path}')")]
    UnsupportedType { type_name: String, path: String },

    #[error("expected {expected}, found `{found}` (at '{path}')")]
    ConversionMismatch {
        expected: String,
        found: String,
        path: String,
    },
}

impl InteropError {
    pub fn unsupported(type_name: impl Into<String>, path: &str) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
            path: path.to_string(),
        }
    }

    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>, path: &str) -> Self {
        Self::ConversionMismatch {
            expected: expected.into(),
            found: found.into(),
            path: path.to_string(),
        }
    }

    /// Location of the element that failed to convert.
    pub fn path(&self) -> &str {
        match self {
            Self::UnsupportedType { path, .. } | Self::ConversionMismatch { path, .. } => path,
        }
    }
}
