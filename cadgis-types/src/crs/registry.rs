use std::collections::HashMap;
use std::sync::Arc;

use super::{pipeline, Crs};
use crate::error::CrsError;
use crate::projection::{CoordinateUnits, GeodesyProjection, Projection};
use crate::Point3d;

/// Identifier used when a source does not report its coordinate system (or reports `0`):
/// British National Grid.
pub const DEFAULT_EPSG: i32 = 27700;

const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

const WEB_MERCATOR_WKT: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Popular_Visualisation_Pseudo_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",0],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["X",EAST],AXIS["Y",NORTH],AUTHORITY["EPSG","3857"]]"#;

const BRITISH_NATIONAL_GRID_WKT: &str = r#"PROJCS["OSGB 1936 / British National Grid",GEOGCS["OSGB 1936",DATUM["OSGB_1936",SPHEROID["Airy 1830",6377563.396,299.3249646,AUTHORITY["EPSG","7001"]],TOWGS84[375,-111,431,0,0,0,0],AUTHORITY["EPSG","6277"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4277"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",49],PARAMETER["central_meridian",-2],PARAMETER["scale_factor",0.9996012717],PARAMETER["false_easting",400000],PARAMETER["false_northing",-100000],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","27700"]]"#;

/// Identifiers REST services use for Web Mercator instead of 3857.
const WEB_MERCATOR_ALIASES: [i32; 3] = [102100, 102113, 900913];

/// A registered coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsDefinition {
    epsg: i32,
    wkt: String,
    crs: Crs,
}

impl CrsDefinition {
    /// EPSG identifier.
    pub fn epsg(&self) -> i32 {
        self.epsg
    }

    /// WKT1 text the definition was registered with.
    pub fn wkt(&self) -> &str {
        &self.wkt
    }

    /// Interpreted definition.
    pub fn crs(&self) -> &Crs {
        &self.crs
    }
}

/// Set of coordinate systems known to the application, keyed by EPSG identifier.
#[derive(Debug, Clone, Default)]
pub struct CrsRegistry {
    definitions: HashMap<i32, CrsDefinition>,
    aliases: HashMap<i32, i32>,
}

impl CrsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with WGS 84 (4326), Web Mercator (3857) and British National Grid
    /// (27700), and the ESRI identifiers of Web Mercator registered as aliases of 3857.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (epsg, wkt) in [
            (4326, WGS84_WKT),
            (3857, WEB_MERCATOR_WKT),
            (DEFAULT_EPSG, BRITISH_NATIONAL_GRID_WKT),
        ] {
            if let Err(err) = registry.register(epsg, wkt) {
                log::error!("Failed to register built-in CRS: {err}");
            }
        }

        for alias in WEB_MERCATOR_ALIASES {
            registry.add_alias(alias, 3857);
        }

        registry
    }

    /// Registers a definition, replacing the previous one with the same identifier.
    ///
    /// The WKT is parsed and its projection compiled here, so an unsupported definition is
    /// reported at registration and never at transform time.
    pub fn register(&mut self, epsg: i32, wkt: impl Into<String>) -> Result<(), CrsError> {
        let wkt = wkt.into();
        let invalid = |reason: String| CrsError::InvalidCrsDefinition { epsg, reason };

        let crs = Crs::from_wkt(&wkt).map_err(invalid)?;
        if let Some(step) = crs.projection_step(false) {
            GeodesyProjection::new(&step, CoordinateUnits::Degrees, CoordinateUnits::Metres)
                .map_err(invalid)?;
        }

        log::debug!("Registered CRS EPSG:{epsg}");
        self.definitions
            .insert(epsg, CrsDefinition { epsg, wkt, crs });
        Ok(())
    }

    /// Makes `alias` resolve to the definition registered as `epsg`.
    pub fn add_alias(&mut self, alias: i32, epsg: i32) {
        self.aliases.insert(alias, epsg);
    }

    /// Identifier the definition of `epsg` is registered under: aliases are replaced by their
    /// target and `0` falls back to [`DEFAULT_EPSG`].
    pub fn canonical_epsg(&self, epsg: i32) -> i32 {
        if epsg == 0 {
            log::warn!("Coordinate system is not specified, assuming EPSG:{DEFAULT_EPSG}");
            return DEFAULT_EPSG;
        }

        self.aliases.get(&epsg).copied().unwrap_or(epsg)
    }

    /// Returns the definition for the identifier.
    pub fn resolve(&self, epsg: i32) -> Result<&CrsDefinition, CrsError> {
        let canonical = self.canonical_epsg(epsg);
        self.definitions
            .get(&canonical)
            .ok_or(CrsError::UnknownCrs(epsg))
    }

    /// Builds the transform from `source` to `target` coordinates.
    pub fn transform(&self, source: i32, target: i32) -> Result<Transform, CrsError> {
        let source_definition = self.resolve(source)?;
        let target_definition = self.resolve(target)?;
        let (source, target) = (source_definition.epsg, target_definition.epsg);

        if source == target {
            return Ok(Transform::identity(source));
        }

        let steps = pipeline(&source_definition.crs, &target_definition.crs);
        if steps.is_empty() {
            return Ok(Transform {
                source_epsg: source,
                target_epsg: target,
                operation: None,
                inverted: false,
            });
        }

        let definition = steps.join(" | ");
        log::debug!("Transform EPSG:{source} -> EPSG:{target}: {definition}");

        let units = |crs: &Crs| match crs.is_geographic() {
            true => CoordinateUnits::Degrees,
            false => CoordinateUnits::Metres,
        };
        let operation = GeodesyProjection::new(
            &definition,
            units(&source_definition.crs),
            units(&target_definition.crs),
        )
        .map_err(|reason| CrsError::Projection {
            source_epsg: source,
            target_epsg: target,
            reason,
        })?;

        Ok(Transform {
            source_epsg: source,
            target_epsg: target,
            operation: Some(Arc::new(operation)),
            inverted: false,
        })
    }
}

/// Conversion of coordinates between two registered systems.
///
/// Geographic coordinates are `x` = longitude and `y` = latitude in degrees. `z` is never
/// transformed.
#[derive(Debug, Clone)]
pub struct Transform {
    source_epsg: i32,
    target_epsg: i32,
    operation: Option<Arc<GeodesyProjection>>,
    inverted: bool,
}

impl Transform {
    /// Transform that returns coordinates unchanged.
    pub fn identity(epsg: i32) -> Self {
        Self {
            source_epsg: epsg,
            target_epsg: epsg,
            operation: None,
            inverted: false,
        }
    }

    /// Returns true if the transform does not change coordinates.
    pub fn is_identity(&self) -> bool {
        self.operation.is_none()
    }

    /// System of the input coordinates.
    pub fn source_epsg(&self) -> i32 {
        self.source_epsg
    }

    /// System of the output coordinates.
    pub fn target_epsg(&self) -> i32 {
        self.target_epsg
    }

    /// Transform from the target system to the source one.
    pub fn inverse(&self) -> Self {
        Self {
            source_epsg: self.target_epsg,
            target_epsg: self.source_epsg,
            operation: self.operation.clone(),
            inverted: !self.inverted,
        }
    }

    /// Transforms a coordinate pair.
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        let point = self.apply_point(&Point3d::new(x, y, 0.0))?;
        Ok((point.x, point.y))
    }

    /// Transforms a point. `z` is returned unchanged.
    pub fn apply_point(&self, point: &Point3d) -> Result<Point3d, CrsError> {
        let Some(operation) = &self.operation else {
            return Ok(*point);
        };

        let result = match self.inverted {
            false => operation.project(point),
            true => operation.unproject(point),
        };

        result.ok_or_else(|| CrsError::Projection {
            source_epsg: self.source_epsg,
            target_epsg: self.target_epsg,
            reason: format!("coordinate ({}, {}) cannot be transformed", point.x, point.y),
        })
    }
}

impl Projection for Transform {
    type InPoint = Point3d;
    type OutPoint = Point3d;

    fn project(&self, input: &Self::InPoint) -> Option<Self::OutPoint> {
        self.apply_point(input).ok()
    }

    fn unproject(&self, input: &Self::OutPoint) -> Option<Self::InPoint> {
        self.inverse().apply_point(input).ok()
    }
}
