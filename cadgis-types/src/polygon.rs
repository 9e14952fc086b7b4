//! Polygon with an exterior ring and optional holes.

use serde::{Deserialize, Serialize};

use crate::contour::ClosedContour;
use crate::projection::Projection;

/// A polygon: an exterior ring and any number of interior rings.
///
/// The pipeline only draws the exterior ring, inner rings are kept so that a source's geometry is
/// not lost when it passes through the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Polygon<P> {
    /// Outer contour.
    pub outer_contour: ClosedContour<P>,
    /// Inner contours.
    pub inner_contours: Vec<ClosedContour<P>>,
}

impl<P> Polygon<P> {
    /// Creates a new polygon.
    pub fn new(outer_contour: ClosedContour<P>, inner_contours: Vec<ClosedContour<P>>) -> Self {
        Self {
            outer_contour,
            inner_contours,
        }
    }

    /// Projects the points of all the rings.
    pub fn project_points<Out, Proj>(&self, projection: &Proj) -> Option<Polygon<Out>>
    where
        Proj: Projection<InPoint = P, OutPoint = Out> + ?Sized,
    {
        Some(Polygon {
            outer_contour: self.outer_contour.project_points(projection)?,
            inner_contours: self
                .inner_contours
                .iter()
                .map(|c| c.project_points(projection))
                .collect::<Option<Vec<_>>>()?,
        })
    }
}

impl<P> From<ClosedContour<P>> for Polygon<P> {
    fn from(value: ClosedContour<P>) -> Self {
        Self {
            outer_contour: value,
            inner_contours: vec![],
        }
    }
}

impl<P> From<Vec<P>> for Polygon<P> {
    fn from(value: Vec<P>) -> Self {
        Self {
            outer_contour: ClosedContour::new(value),
            inner_contours: vec![],
        }
    }
}
