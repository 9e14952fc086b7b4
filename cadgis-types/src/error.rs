//! Error types used by the crate.

use thiserror::Error;

/// Error enum for geometry conversion.
#[derive(Debug, Error)]
pub enum CadgisTypesError {
    /// Geometry conversion error.
    #[error("invalid input geometry: {0}")]
    Conversion(String),
}

/// Errors of the CRS registry and of coordinate transformation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrsError {
    /// No definition is registered for the identifier.
    #[error("unknown CRS EPSG:{0}")]
    UnknownCrs(i32),
    /// The definition text could not be parsed or uses features that are not supported.
    #[error("invalid definition for EPSG:{epsg}: {reason}")]
    InvalidCrsDefinition {
        /// Identifier the definition was registered with.
        epsg: i32,
        /// Human-readable cause.
        reason: String,
    },
    /// The transform could not be built or failed for a coordinate.
    #[error("cannot transform EPSG:{source_epsg} to EPSG:{target_epsg}: {reason}")]
    Projection {
        /// Source system.
        source_epsg: i32,
        /// Target system.
        target_epsg: i32,
        /// Human-readable cause.
        reason: String,
    },
}
