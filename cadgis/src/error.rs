//! Error types used by the crate.

use std::path::PathBuf;

use cadgis_types::error::{CadgisTypesError, CrsError};
use thiserror::Error;

/// Cadgis error type.
#[derive(Debug, Error)]
pub enum CadgisError {
    /// Source could not be reached, or rejected the credentials.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Source rejected the request or returned data that cannot be read.
    #[error("query failed: {0}")]
    Query(String),
    /// Coordinate system lookup or transformation error.
    #[error(transparent)]
    Crs(#[from] CrsError),
    /// Symbol is not defined in the drawing.
    #[error("symbol '{0}' is not defined in the drawing")]
    UnknownSymbol(String),
    /// Attribute chosen for symbol labels is not one of the feature's attributes.
    #[error("attribute '{attribute}' cannot be used for labels, available attributes: {}", .available.join(", "))]
    InvalidLabelAttribute {
        /// Requested attribute.
        attribute: String,
        /// Attributes that can be used.
        available: Vec<String>,
    },
    /// Drawing surface refused an operation.
    #[error("drawing error: {0}")]
    Surface(String),
    /// Error reading or writing a file.
    #[error("failed to access {path:?}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },
    /// Invalid JSON in a settings, ledger or drawing file.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Settings are missing or invalid.
    #[error("settings: {0}")]
    Settings(String),
    /// Error that happened while processing a specific layer.
    #[error("layer '{layer}': {source}")]
    Layer {
        /// Layer name.
        layer: String,
        /// Cause.
        source: Box<CadgisError>,
    },
}

impl CadgisError {
    /// Attaches the layer name to the error. Errors that already carry a layer are returned
    /// unchanged.
    pub fn in_layer(self, layer: impl Into<String>) -> Self {
        match self {
            err @ Self::Layer { .. } => err,
            err => Self::Layer {
                layer: layer.into(),
                source: Box::new(err),
            },
        }
    }

    /// Error wrapped by [`CadgisError::Layer`], or the error itself.
    pub fn root(&self) -> &CadgisError {
        match self {
            Self::Layer { source, .. } => source.root(),
            err => err,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for CadgisError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Query(value.to_string())
        } else {
            Self::Connection(value.to_string())
        }
    }
}

impl From<sqlx::Error> for CadgisError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(_)
            | sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => Self::Query(value.to_string()),
            _ => Self::Connection(value.to_string()),
        }
    }
}

impl From<CadgisTypesError> for CadgisError {
    fn from(value: CadgisTypesError) -> Self {
        Self::Query(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn layer_wrapping() {
        let err = CadgisError::UnknownSymbol("Tree".into())
            .in_layer("trees")
            .in_layer("other");

        assert_matches!(&err, CadgisError::Layer { layer, .. } if layer == "trees");
        assert_matches!(err.root(), CadgisError::UnknownSymbol(name) if name == "Tree");
        assert_eq!(
            err.to_string(),
            "layer 'trees': symbol 'Tree' is not defined in the drawing"
        );
    }

    #[test]
    fn crs_errors_are_transparent() {
        let err = CadgisError::from(CrsError::UnknownCrs(2154));
        assert_eq!(err.to_string(), "unknown CRS EPSG:2154");
    }
}
