//! Sources of feature records.
//!
//! Each source turns its native encoding into [`FeatureRecord`]s and returns them as a fully read
//! [`FeatureBatch`]. Rendering only starts after the whole batch is available.

use async_trait::async_trait;
use cadgis_types::GeometryKind;

use crate::error::CadgisError;
use crate::feature::FeatureRecord;
use crate::symbol::label_candidates;

pub mod arcgis;
pub mod postgis;

/// Features read from one layer or table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    /// Suggested name of the drawing layer.
    pub layer_name: String,
    /// Kind of the geometries, inferred once for the whole batch.
    pub kind: GeometryKind,
    /// Coordinate system of the geometries.
    pub source_epsg: i32,
    /// Features in the order the source returned them.
    pub features: Vec<FeatureRecord>,
}

impl FeatureBatch {
    /// Creates a batch. The kind is inferred from the declared type tag and, when it does not
    /// name a known kind, from the first feature with a geometry.
    pub fn new(
        layer_name: impl Into<String>,
        declared_kind: Option<&str>,
        source_epsg: i32,
        features: Vec<FeatureRecord>,
    ) -> Self {
        let kind = GeometryKind::infer(declared_kind, features.iter().map(|f| f.geometry.as_ref()));
        Self {
            layer_name: layer_name.into(),
            kind,
            source_epsg,
            features,
        }
    }

    /// Returns true if the source returned no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Attribute keys of the first feature that can be used for symbol labels.
    pub fn label_candidates(&self, excluded: &[&str]) -> Vec<String> {
        self.features
            .first()
            .map(|feature| label_candidates(feature.attributes.keys(), excluded))
            .unwrap_or_default()
    }
}

/// Source of features.
#[async_trait]
pub trait FeatureSource {
    /// Description of what to read.
    type Request: Sync;

    /// Reads all the features the request describes.
    async fn fetch(&self, request: &Self::Request) -> Result<FeatureBatch, CadgisError>;
}
