//! See [`MultiPoint`].

use serde::{Deserialize, Serialize};

/// A set of points.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MultiPoint<P>(Vec<P>);

impl<P> MultiPoint<P> {
    /// Iterates over the points of the set.
    pub fn iter_points(&self) -> impl Iterator<Item = &'_ P> {
        self.0.iter()
    }

    /// Number of points in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no points.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<P> From<Vec<P>> for MultiPoint<P> {
    fn from(value: Vec<P>) -> Self {
        Self(value)
    }
}
