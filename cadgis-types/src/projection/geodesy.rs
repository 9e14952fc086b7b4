use geodesy::prelude::*;

use crate::projection::Projection;
use crate::Point3d;

/// Units of the `x` and `y` coordinates on one side of a [`GeodesyProjection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateUnits {
    /// Longitude and latitude in degrees.
    Degrees,
    /// Projected coordinates, passed to the operation as they are.
    Metres,
}

/// Projection backed by a `geodesy` operation.
///
/// Geographic coordinates are given in degrees (`x` = longitude, `y` = latitude) and converted to
/// radians for the operation. The operation works on 4D coordinates so that pipelines going
/// through geocentric cartesian space keep their third ordinate between steps. The `z` of the
/// input point is not passed to the operation and is returned unchanged.
///
/// Every run starts from zero ellipsoidal height and drops the height a datum shift produces, so
/// projecting a point and unprojecting the result returns it within a few millimetres, not
/// exactly.
pub struct GeodesyProjection {
    definition: String,
    context: Minimal,
    op: OpHandle,
    input_units: CoordinateUnits,
    output_units: CoordinateUnits,
}

impl GeodesyProjection {
    /// Compiles the operation `definition`, e.g. `tmerc lat_0=49 lon_0=-2 ellps=airy`.
    pub fn new(
        definition: &str,
        input_units: CoordinateUnits,
        output_units: CoordinateUnits,
    ) -> Result<Self, String> {
        let mut context = Minimal::new();
        let op = context
            .op(definition)
            .map_err(|err| format!("invalid operation '{definition}': {err}"))?;

        Ok(Self {
            definition: definition.to_string(),
            context,
            op,
            input_units,
            output_units,
        })
    }

    /// Definition of the operation.
    pub fn definition(&self) -> &str {
        &self.definition
    }

    fn apply(
        &self,
        point: &Point3d,
        direction: Direction,
        from: CoordinateUnits,
        to: CoordinateUnits,
    ) -> Option<Point3d> {
        let (x, y) = match from {
            CoordinateUnits::Degrees => (point.x.to_radians(), point.y.to_radians()),
            CoordinateUnits::Metres => (point.x, point.y),
        };

        let mut data = [Coor4D([x, y, 0.0, 0.0])];
        self.context.apply(self.op, direction, &mut data).ok()?;

        let [x, y, _, _] = data[0].0;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        let (x, y) = match to {
            CoordinateUnits::Degrees => (x.to_degrees(), y.to_degrees()),
            CoordinateUnits::Metres => (x, y),
        };

        Some(Point3d::new(x, y, point.z))
    }
}

impl std::fmt::Debug for GeodesyProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeodesyProjection")
            .field("definition", &self.definition)
            .field("input_units", &self.input_units)
            .field("output_units", &self.output_units)
            .finish()
    }
}

impl Projection for GeodesyProjection {
    type InPoint = Point3d;
    type OutPoint = Point3d;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        self.apply(input, Fwd, self.input_units, self.output_units)
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        self.apply(input, Inv, self.output_units, self.input_units)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn web_mercator_projection() {
        let projection = GeodesyProjection::new(
            "webmerc",
            CoordinateUnits::Degrees,
            CoordinateUnits::Metres,
        )
        .expect("valid operation");

        let projected = projection
            .project(&Point3d::new(10.0, 0.0, 5.0))
            .expect("projected");
        assert_abs_diff_eq!(projected.x, 1_113_194.907_932_735_7, epsilon = 1e-6);
        assert_abs_diff_eq!(projected.y, 0.0, epsilon = 1e-6);
        assert_eq!(projected.z, 5.0);

        let unprojected = projection.unproject(&projected).expect("unprojected");
        assert_abs_diff_eq!(unprojected.x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(unprojected.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_operation() {
        assert!(GeodesyProjection::new(
            "no_such_operation",
            CoordinateUnits::Degrees,
            CoordinateUnits::Metres
        )
        .is_err());
    }
}
