//! Conversion of points between coordinate systems.

mod geodesy;

pub use self::geodesy::{CoordinateUnits, GeodesyProjection};

/// Converts points from one coordinate system into another and back.
pub trait Projection {
    /// Type of the input point.
    type InPoint;
    /// Type of the output point.
    type OutPoint;

    /// Projects a point. Returns `None` if the point cannot be projected.
    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint>;
}
