/// Reference ellipsoid, identified by the name `geodesy` knows it under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    name: &'static str,
    semimajor: f64,
    inv_flattening: f64,
}

impl Ellipsoid {
    /// WGS 84.
    pub const WGS84: Self = Self {
        name: "WGS84",
        semimajor: 6_378_137.0,
        inv_flattening: 298.257223563,
    };

    /// GRS 1980.
    pub const GRS80: Self = Self {
        name: "GRS80",
        semimajor: 6_378_137.0,
        inv_flattening: 298.257222101,
    };

    /// Airy 1830, used by OSGB 1936.
    pub const AIRY: Self = Self {
        name: "airy",
        semimajor: 6_377_563.396,
        inv_flattening: 299.3249646,
    };

    /// International 1924 (Hayford).
    pub const INTERNATIONAL: Self = Self {
        name: "intl",
        semimajor: 6_378_388.0,
        inv_flattening: 297.0,
    };

    const KNOWN: [Self; 4] = [Self::WGS84, Self::GRS80, Self::AIRY, Self::INTERNATIONAL];

    /// Finds a known ellipsoid by its axis and inverse flattening.
    pub fn from_parameters(semimajor: f64, inv_flattening: f64) -> Option<Self> {
        Self::KNOWN.into_iter().find(|known| {
            (known.semimajor - semimajor).abs() < 1e-3
                && (known.inv_flattening - inv_flattening).abs() < 1e-7
        })
    }

    /// Name of the ellipsoid in `geodesy` operation definitions.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Semi-major axis in metres.
    pub fn semimajor(&self) -> f64 {
        self.semimajor
    }

    /// Inverse flattening.
    pub fn inv_flattening(&self) -> f64 {
        self.inv_flattening
    }
}

/// Geodetic datum: an ellipsoid and the shift of the datum to WGS 84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    ellipsoid: Ellipsoid,
    to_wgs84: Option<[f64; 7]>,
}

impl Datum {
    /// WGS 84.
    pub const WGS84: Self = Self {
        ellipsoid: Ellipsoid::WGS84,
        to_wgs84: None,
    };

    /// Creates a datum. `to_wgs84` holds the seven `TOWGS84` parameters: translations in metres,
    /// rotations in arc seconds (position vector convention) and scale in ppm. A shift with all
    /// parameters zero is the same as no shift.
    pub fn new(ellipsoid: Ellipsoid, to_wgs84: Option<[f64; 7]>) -> Self {
        Self {
            ellipsoid,
            to_wgs84: to_wgs84.filter(|params| params.iter().any(|v| *v != 0.0)),
        }
    }

    /// Ellipsoid of the datum.
    pub fn ellipsoid(&self) -> Ellipsoid {
        self.ellipsoid
    }

    /// Shift to WGS 84, if any.
    pub fn to_wgs84(&self) -> Option<[f64; 7]> {
        self.to_wgs84
    }

    /// `helmert` step shifting geocentric coordinates of this datum to WGS 84.
    pub(crate) fn helmert_step(&self) -> Option<String> {
        let [x, y, z, rx, ry, rz, s] = self.to_wgs84?;
        let mut step = format!("helmert x={x} y={y} z={z}");
        if rx != 0.0 || ry != 0.0 || rz != 0.0 || s != 0.0 {
            step.push_str(&format!(
                " rx={rx} ry={ry} rz={rz} s={s} convention=position_vector"
            ));
        }

        Some(step)
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::WGS84
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsoid_lookup() {
        assert_eq!(
            Ellipsoid::from_parameters(6377563.396, 299.3249646),
            Some(Ellipsoid::AIRY)
        );
        assert_eq!(
            Ellipsoid::from_parameters(6378137.0, 298.257222101),
            Some(Ellipsoid::GRS80)
        );
        assert_eq!(
            Ellipsoid::from_parameters(6378137.0, 298.257223563),
            Some(Ellipsoid::WGS84)
        );
        assert_eq!(Ellipsoid::from_parameters(6378206.4, 294.9786982), None);
    }

    #[test]
    fn helmert_steps() {
        let three = Datum::new(Ellipsoid::AIRY, Some([375.0, -111.0, 431.0, 0.0, 0.0, 0.0, 0.0]));
        assert_eq!(
            three.helmert_step().as_deref(),
            Some("helmert x=375 y=-111 z=431")
        );

        let seven = Datum::new(
            Ellipsoid::AIRY,
            Some([446.448, -125.157, 542.06, 0.15, 0.247, 0.842, -20.489]),
        );
        assert_eq!(
            seven.helmert_step().as_deref(),
            Some("helmert x=446.448 y=-125.157 z=542.06 rx=0.15 ry=0.247 rz=0.842 s=-20.489 convention=position_vector")
        );

        let zero = Datum::new(Ellipsoid::WGS84, Some([0.0; 7]));
        assert_eq!(zero, Datum::WGS84);
        assert!(zero.helmert_step().is_none());
    }
}
