//! Geometry model and coordinate reference systems used by the `cadgis` import pipeline.
//!
//! The crate is split into two independent halves:
//!
//! * the [`Geom`] enum and its building blocks ([`Contour`], [`Polygon`], [`MultiPoint`],
//!   [`MultiContour`], [`MultiPolygon`]) describe the shapes a feature can have, independent of
//!   the format the feature was read from;
//! * the [`crs`] module holds a registry of coordinate reference system definitions and builds
//!   [`Transform`](crs::Transform)s between them.
//!
//! Coordinates are always [`Point3d`] values. For geographic systems `x` is the longitude and `y`
//! is the latitude, both in degrees.

pub mod contour;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod multi_contour;
pub mod multi_point;
pub mod multi_polygon;
pub mod orient;
pub mod polygon;
pub mod projection;

#[cfg(feature = "geojson")]
pub mod geojson;

pub use contour::{ClosedContour, Contour};
pub use geometry::{Geom, GeometryKind};
pub use multi_contour::MultiContour;
pub use multi_point::MultiPoint;
pub use multi_polygon::MultiPolygon;
pub use polygon::Polygon;

pub use nalgebra::Point3;

/// 3d point with `f64` coordinates. This is the point type all geometries of the pipeline use.
pub type Point3d = Point3<f64>;
