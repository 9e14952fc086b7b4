//! Feature services of an ArcGIS portal.
//!
//! [`ArcGisClient`] logs in to the portal, lists the user's folders and feature services, and
//! reads service layers as [`FeatureBatch`](crate::source::FeatureBatch)es. Geometries come in
//! Esri JSON and are converted with the ring orientation rules of that format.

mod client;
mod geometry;
mod model;

pub use client::{ArcGisClient, LayerRequest, ServiceWalker, DEFAULT_SOURCE_EPSG};
pub use geometry::parse_geometry;
pub use model::{Folder, Item, ServiceInfo, ServiceLayer};
