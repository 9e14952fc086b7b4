//! Orientation of rings.

use serde::{Deserialize, Serialize};

use crate::Point3d;

/// Orientation of a ring, with the `y` axis pointing up.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Clockwise
    Clockwise,
    /// Counterclockwise
    Counterclockwise,
    /// Collinear
    Collinear,
}

impl Orientation {
    /// Determines orientation of a ring from its signed area. Only `x` and `y` are considered.
    ///
    /// The ring may or may not repeat its first point at the end.
    pub fn ring(points: &[Point3d]) -> Self {
        if points.len() < 3 {
            return Self::Collinear;
        }

        let mut doubled_area = 0.0;
        for (i, p) in points.iter().enumerate() {
            let next = &points[(i + 1) % points.len()];
            doubled_area += (next.x - p.x) * (next.y + p.y);
        }

        Self::from_signed(doubled_area)
    }

    fn from_signed(value: f64) -> Self {
        if value > 0.0 {
            Self::Clockwise
        } else if value < 0.0 {
            Self::Counterclockwise
        } else {
            Self::Collinear
        }
    }
}
