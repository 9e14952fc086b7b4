//! Cadgis imports geographic features into CAD drawings. Features are read from ArcGIS feature
//! services and PostGIS tables, reprojected into the coordinate system of the drawing, and drawn
//! as points, polylines and symbol instances.
//!
//! # Quick start
//!
//! Drawing a batch of features into an in-memory drawing:
//!
//! ```no_run
//! use cadgis::cadgis_types::crs::CrsRegistry;
//! use cadgis::cadgis_types::Point3d;
//! use cadgis::feature::{Attributes, FeatureRecord};
//! use cadgis::import::{import_batch, ImportOptions};
//! use cadgis::source::FeatureBatch;
//! use cadgis::surface::Drawing;
//! use cadgis::symbol::SymbolLibrary;
//!
//! let features = vec![FeatureRecord::new(
//!     Attributes::new(),
//!     Some(Point3d::new(-0.1276, 51.5072, 0.0).into()),
//! )];
//! let batch = FeatureBatch::new("poi", Some("esriGeometryPoint"), 4326, features);
//!
//! let mut drawing = Drawing::new();
//! let summary = import_batch(
//!     &mut drawing,
//!     &CrsRegistry::with_builtin(),
//!     &mut SymbolLibrary::new(),
//!     &batch,
//!     &ImportOptions::new(27700),
//! )
//! .unwrap();
//! println!("{}", summary.total());
//! ```
//!
//! # Main components
//!
//! * [`source`] adapters read features into a [`FeatureBatch`](source::FeatureBatch),
//! * [`symbol`] resolves how point features are symbolized,
//! * [`render`] reprojects features and draws them into a [`DrawingSurface`](surface::DrawingSurface),
//! * [`split`] partitions a batch into one layer per attribute value,
//! * [`ledger`] remembers what was imported from the database so it can be [refreshed](import::refresh).
//!
//! [`import`] ties these together, [`config`] holds the settings persisted between sessions.

pub mod config;
pub mod error;
pub mod feature;
pub mod import;
pub mod ledger;
pub mod render;
pub mod source;
pub mod split;
pub mod surface;
pub mod symbol;

pub use cadgis_types;
pub use error::CadgisError;
