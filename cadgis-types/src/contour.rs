//! Contours are sequences of points: line strings and polygon rings.

use serde::{Deserialize, Serialize};

use crate::projection::Projection;

/// An ordered sequence of points. An open contour is a line string, a closed one is a ring.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Contour<Point> {
    points: Vec<Point>,
    is_closed: bool,
}

impl<Point> std::ops::Deref for Contour<Point> {
    type Target = Vec<Point>;

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl<Point> std::ops::DerefMut for Contour<Point> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl<Point> Contour<Point> {
    /// Creates a new contour.
    pub fn new(points: Vec<Point>, is_closed: bool) -> Self {
        Self { points, is_closed }
    }

    /// Creates a new open contour.
    pub fn open(points: Vec<Point>) -> Self {
        Self {
            points,
            is_closed: false,
        }
    }

    /// Creates a new closed contour.
    pub fn closed(points: Vec<Point>) -> Self {
        Self {
            points,
            is_closed: true,
        }
    }

    /// Returns true if the contour is a ring.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// Converts self into a `ClosedContour` instance if the contour is closed, or returns `None` if the contour is
    /// open.
    pub fn into_closed(self) -> Option<ClosedContour<Point>> {
        if self.is_closed {
            Some(ClosedContour {
                points: self.points,
            })
        } else {
            None
        }
    }

    /// Consumes the contour and returns its points.
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Projects all the points of the contour with the given projection.
    pub fn project_points<P, Proj>(&self, projection: &Proj) -> Option<Contour<P>>
    where
        Proj: Projection<InPoint = Point, OutPoint = P> + ?Sized,
    {
        let points = self
            .points
            .iter()
            .map(|p| projection.project(p))
            .collect::<Option<Vec<P>>>()?;
        Some(Contour {
            points,
            is_closed: self.is_closed,
        })
    }
}

/// A ring. The last point may or may not repeat the first one; consumers that need an explicitly
/// closed point list use [`ClosedContour::closing_points`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClosedContour<Point> {
    /// Points of the contour.
    pub points: Vec<Point>,
}

impl<Point> ClosedContour<Point> {
    /// Creates a new closed contour.
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Returns true if the ring has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Projects all the points of the contour with the given projection.
    pub fn project_points<P, Proj>(&self, projection: &Proj) -> Option<ClosedContour<P>>
    where
        Proj: Projection<InPoint = Point, OutPoint = P> + ?Sized,
    {
        let points = self
            .points
            .iter()
            .map(|p| projection.project(p))
            .collect::<Option<Vec<P>>>()?;
        Some(ClosedContour { points })
    }
}

impl<Point: Clone + PartialEq> ClosedContour<Point> {
    /// Returns the ring's points with the first point repeated at the end, unless the ring already
    /// ends with it.
    pub fn closing_points(&self) -> Vec<Point> {
        let mut points = self.points.clone();
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() > 1 && first != last => {
                points.push(first.clone())
            }
            _ => {}
        }

        points
    }
}

impl<P> From<ClosedContour<P>> for Contour<P> {
    fn from(value: ClosedContour<P>) -> Self {
        Self {
            points: value.points,
            is_closed: true,
        }
    }
}
