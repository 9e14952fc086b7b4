//! See [`MultiContour`].

use serde::{Deserialize, Serialize};

use crate::contour::Contour;

/// A set of contours.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MultiContour<P>(Vec<Contour<P>>);

impl<P> MultiContour<P> {
    /// Iterates over the contours of the set.
    pub fn contours(&self) -> impl Iterator<Item = &Contour<P>> {
        self.0.iter()
    }

    /// Number of contours in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set has no contours.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_inner(self) -> Vec<Contour<P>> {
        self.0
    }
}

impl<P> From<Vec<Contour<P>>> for MultiContour<P> {
    fn from(value: Vec<Contour<P>>) -> Self {
        Self(value)
    }
}
