//! See [`MultiPolygon`].

use serde::{Deserialize, Serialize};

use crate::polygon::Polygon;

/// A set of polygons.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MultiPolygon<P> {
    /// Inner polygons.
    pub parts: Vec<Polygon<P>>,
}

impl<P> From<Vec<Polygon<P>>> for MultiPolygon<P> {
    fn from(parts: Vec<Polygon<P>>) -> Self {
        Self { parts }
    }
}

impl<P> MultiPolygon<P> {
    /// Returns reference to the inner polygons.
    pub fn parts(&self) -> &[Polygon<P>] {
        &self.parts
    }

    /// Iterates over the polygons of the set.
    pub fn polygons(&self) -> impl Iterator<Item = &Polygon<P>> {
        self.parts.iter()
    }
}
