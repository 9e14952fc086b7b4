//! Coordinate reference systems: definitions in WKT1, the registry of definitions known to the
//! application and transforms between them.

mod datum;
mod registry;
pub mod wkt;

pub use datum::{Datum, Ellipsoid};
pub use registry::{CrsDefinition, CrsRegistry, Transform, DEFAULT_EPSG};

use wkt::WktNode;

/// Interpreted coordinate reference system: a datum and, for projected systems, a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    datum: Datum,
    projection_type: ProjectionType,
    parameters: ProjectionParameters,
}

/// Map projection of a [`Crs`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProjectionType {
    /// Geographic system, coordinates are longitude and latitude in degrees.
    None,
    /// Transverse Mercator.
    TransverseMercator,
    /// Spherical ("pseudo") Mercator used by web maps.
    WebMercator,
    /// Mercator with one standard parallel.
    Mercator,
    /// Lambert Azimuthal Equal Area.
    LambertAzimuthalEqualArea,
    /// Lambert Conformal Conic with two standard parallels.
    LambertConformalConic,
}

/// Parameters of a projection, in degrees and metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParameters {
    /// Latitude of origin.
    pub latitude_of_origin: f64,
    /// Central meridian.
    pub central_meridian: f64,
    /// Scale factor on the central meridian.
    pub scale_factor: f64,
    /// False easting.
    pub false_easting: f64,
    /// False northing.
    pub false_northing: f64,
    /// First standard parallel.
    pub standard_parallel_1: f64,
    /// Second standard parallel.
    pub standard_parallel_2: f64,
}

impl Default for ProjectionParameters {
    fn default() -> Self {
        Self {
            latitude_of_origin: 0.0,
            central_meridian: 0.0,
            scale_factor: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
            standard_parallel_1: 0.0,
            standard_parallel_2: 0.0,
        }
    }
}

const DEGREE: f64 = 0.017_453_292_519_943_3;

impl Crs {
    /// Geographic WGS 84.
    pub const WGS84: Crs = Crs {
        datum: Datum::WGS84,
        projection_type: ProjectionType::None,
        parameters: ProjectionParameters {
            latitude_of_origin: 0.0,
            central_meridian: 0.0,
            scale_factor: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
            standard_parallel_1: 0.0,
            standard_parallel_2: 0.0,
        },
    };

    /// Interprets a WKT1 definition with a `GEOGCS` or `PROJCS` root.
    pub fn from_wkt(wkt: &str) -> Result<Self, String> {
        let root = WktNode::parse(wkt)?;

        if root.is("GEOGCS") {
            return Ok(Self {
                datum: read_geographic(&root)?,
                projection_type: ProjectionType::None,
                parameters: ProjectionParameters::default(),
            });
        }

        if !root.is("PROJCS") {
            return Err(format!("unsupported root node {}", root.keyword));
        }

        let geographic = root
            .child("GEOGCS")
            .ok_or("PROJCS without GEOGCS")?;
        let datum = read_geographic(geographic)?;

        let unit = root
            .child("UNIT")
            .and_then(|unit| unit.number(1))
            .ok_or("PROJCS without linear UNIT")?;
        if (unit - 1.0).abs() > 1e-9 {
            return Err(format!("unsupported linear unit with factor {unit}"));
        }

        let projection_name = root
            .child("PROJECTION")
            .and_then(WktNode::name)
            .ok_or("PROJCS without PROJECTION")?;
        let projection_type = match normalize(projection_name).as_str() {
            "transverse_mercator" => ProjectionType::TransverseMercator,
            "popular_visualisation_pseudo_mercator" | "mercator_auxiliary_sphere" => {
                ProjectionType::WebMercator
            }
            "mercator_1sp" | "mercator" => ProjectionType::Mercator,
            "lambert_azimuthal_equal_area" => ProjectionType::LambertAzimuthalEqualArea,
            "lambert_conformal_conic_2sp" | "lambert_conformal_conic" => {
                ProjectionType::LambertConformalConic
            }
            _ => return Err(format!("unsupported projection {projection_name}")),
        };

        let mut parameters = ProjectionParameters::default();
        for parameter in root.children("PARAMETER") {
            let (Some(name), Some(value)) = (parameter.name(), parameter.number(1)) else {
                return Err("PARAMETER without name or value".into());
            };

            match normalize(name).as_str() {
                "latitude_of_origin" | "latitude_of_center" => {
                    parameters.latitude_of_origin = value
                }
                "central_meridian" | "longitude_of_center" | "longitude_of_origin" => {
                    parameters.central_meridian = value
                }
                "scale_factor" => parameters.scale_factor = value,
                "false_easting" => parameters.false_easting = value,
                "false_northing" => parameters.false_northing = value,
                "standard_parallel_1" => parameters.standard_parallel_1 = value,
                "standard_parallel_2" => parameters.standard_parallel_2 = value,
                "auxiliary_sphere_type" => {}
                _ => return Err(format!("unsupported projection parameter {name}")),
            }
        }

        Ok(Self {
            datum,
            projection_type,
            parameters,
        })
    }

    /// Datum of the system.
    pub fn datum(&self) -> Datum {
        self.datum
    }

    /// Projection of the system.
    pub fn projection_type(&self) -> ProjectionType {
        self.projection_type
    }

    /// Projection parameters. Meaningless for geographic systems.
    pub fn parameters(&self) -> ProjectionParameters {
        self.parameters
    }

    /// Returns true if coordinates are longitude and latitude.
    pub fn is_geographic(&self) -> bool {
        self.projection_type == ProjectionType::None
    }

    /// `geodesy` operation projecting geographic coordinates of this system's datum to the
    /// system's coordinates. `inverse` produces the step going the other way.
    ///
    /// `None` for geographic systems.
    pub fn projection_step(&self, inverse: bool) -> Option<String> {
        let p = &self.parameters;
        let (operator, params) = match self.projection_type {
            ProjectionType::None => return None,
            ProjectionType::TransverseMercator => (
                "tmerc",
                format!(
                    "lat_0={} lon_0={} k_0={} x_0={} y_0={}",
                    p.latitude_of_origin,
                    p.central_meridian,
                    p.scale_factor,
                    p.false_easting,
                    p.false_northing
                ),
            ),
            ProjectionType::WebMercator => ("webmerc", String::new()),
            ProjectionType::Mercator => (
                "merc",
                format!(
                    "lon_0={} k_0={} x_0={} y_0={}",
                    p.central_meridian, p.scale_factor, p.false_easting, p.false_northing
                ),
            ),
            ProjectionType::LambertAzimuthalEqualArea => (
                "laea",
                format!(
                    "lat_0={} lon_0={} x_0={} y_0={}",
                    p.latitude_of_origin, p.central_meridian, p.false_easting, p.false_northing
                ),
            ),
            ProjectionType::LambertConformalConic => (
                "lcc",
                format!(
                    "lat_1={} lat_2={} lat_0={} lon_0={} x_0={} y_0={}",
                    p.standard_parallel_1,
                    p.standard_parallel_2,
                    p.latitude_of_origin,
                    p.central_meridian,
                    p.false_easting,
                    p.false_northing
                ),
            ),
        };

        let mut step = operator.to_string();
        if inverse {
            step.push_str(" inv");
        }
        if !params.is_empty() {
            step.push(' ');
            step.push_str(&params);
        }
        step.push_str(" ellps=");
        step.push_str(self.datum.ellipsoid().name());

        Some(step)
    }
}

/// Steps of the `geodesy` pipeline converting coordinates from `source` to `target`.
///
/// An empty list means the coordinates do not change.
pub(crate) fn pipeline(source: &Crs, target: &Crs) -> Vec<String> {
    let mut steps = vec![];
    if let Some(step) = source.projection_step(true) {
        steps.push(step);
    }

    if source.datum != target.datum {
        steps.push(format!("cart ellps={}", source.datum.ellipsoid().name()));
        if let Some(step) = source.datum.helmert_step() {
            steps.push(step);
        }
        if let Some(step) = target.datum.helmert_step() {
            steps.push(step.replacen("helmert", "helmert inv", 1));
        }
        steps.push(format!("cart inv ellps={}", target.datum.ellipsoid().name()));
    }

    if let Some(step) = target.projection_step(false) {
        steps.push(step);
    }

    // Projecting and unprojecting with the same system cancels out.
    if source == target {
        steps.clear();
    }

    steps
}

fn read_geographic(node: &WktNode) -> Result<Datum, String> {
    let datum = node.child("DATUM").ok_or("GEOGCS without DATUM")?;
    let spheroid = datum.child("SPHEROID").ok_or("DATUM without SPHEROID")?;
    let (Some(semimajor), Some(inv_flattening)) = (spheroid.number(1), spheroid.number(2)) else {
        return Err("SPHEROID without axis or flattening".into());
    };
    let ellipsoid = Ellipsoid::from_parameters(semimajor, inv_flattening).ok_or_else(|| {
        format!(
            "unsupported ellipsoid {} ({semimajor}, {inv_flattening})",
            spheroid.name().unwrap_or_default()
        )
    })?;

    let to_wgs84 = match datum.child("TOWGS84").or_else(|| node.child("TOWGS84")) {
        Some(shift) => {
            let values = shift.numbers();
            match values.len() {
                3 => Some([values[0], values[1], values[2], 0.0, 0.0, 0.0, 0.0]),
                7 => Some([
                    values[0], values[1], values[2], values[3], values[4], values[5], values[6],
                ]),
                count => return Err(format!("TOWGS84 with {count} parameters")),
            }
        }
        None => None,
    };

    if let Some(meridian) = node.child("PRIMEM").and_then(|primem| primem.number(1)) {
        if meridian != 0.0 {
            return Err(format!("unsupported prime meridian {meridian}"));
        }
    }

    if let Some(unit) = node.child("UNIT").and_then(|unit| unit.number(1)) {
        if (unit - DEGREE).abs() > 1e-12 {
            return Err(format!("unsupported angular unit with factor {unit}"));
        }
    }

    Ok(Datum::new(ellipsoid, to_wgs84))
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}
