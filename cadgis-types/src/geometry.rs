//! See [`Geom`].

use serde::{Deserialize, Serialize};

use crate::contour::Contour;
use crate::multi_contour::MultiContour;
use crate::multi_point::MultiPoint;
use crate::multi_polygon::MultiPolygon;
use crate::polygon::Polygon;
use crate::projection::Projection;
use crate::Point3d;

/// Geometry of a feature, independent of the format it was read from.
///
/// This is a closed set: every consumer matches on all the variants, so adding a shape is a
/// compile error at every place that has to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geom<P = Point3d> {
    /// Single point.
    Point(P),
    /// Open sequence of points.
    LineString(Contour<P>),
    /// Polygon. Only the exterior ring is drawn.
    Polygon(Polygon<P>),
    /// Set of points.
    MultiPoint(MultiPoint<P>),
    /// Set of line strings.
    MultiLineString(MultiContour<P>),
    /// Set of polygons.
    MultiPolygon(MultiPolygon<P>),
}

/// Kind of the geometries a layer or a table contains.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    /// Points and multipoints.
    Point,
    /// Line strings and multi line strings.
    Line,
    /// Polygons and multipolygons.
    Polygon,
    /// The kind could not be determined.
    Unknown,
}

impl GeometryKind {
    /// Infers the kind from a declared type tag, such as `esriGeometryPolyline` or `MULTIPOLYGON`.
    ///
    /// Matching is a case-insensitive substring search for `point`, `line` and `polygon`, in this
    /// order.
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_lowercase();
        if declared.contains("point") {
            Self::Point
        } else if declared.contains("line") {
            Self::Line
        } else if declared.contains("polygon") {
            Self::Polygon
        } else {
            Self::Unknown
        }
    }

    /// Table level inference: the declared type wins if it names a known kind, otherwise the kind
    /// of the first geometry is used.
    pub fn infer<'a, P: 'a>(
        declared: Option<&str>,
        geometries: impl IntoIterator<Item = Option<&'a Geom<P>>>,
    ) -> Self {
        if let Some(kind) = declared
            .map(Self::from_declared)
            .filter(|kind| *kind != Self::Unknown)
        {
            return kind;
        }

        geometries
            .into_iter()
            .flatten()
            .next()
            .map(Geom::kind)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl<P> Geom<P> {
    /// Kind of the geometry. `Multi*` variants have the kind of their elements.
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geom::Point(_) | Geom::MultiPoint(_) => GeometryKind::Point,
            Geom::LineString(_) | Geom::MultiLineString(_) => GeometryKind::Line,
            Geom::Polygon(_) | Geom::MultiPolygon(_) => GeometryKind::Polygon,
        }
    }

    /// Number of primitives the geometry draws as: one for singular geometries, the number of
    /// elements for `Multi*` ones.
    pub fn part_count(&self) -> usize {
        match self {
            Geom::Point(_) | Geom::LineString(_) | Geom::Polygon(_) => 1,
            Geom::MultiPoint(points) => points.iter_points().count(),
            Geom::MultiLineString(lines) => lines.contours().count(),
            Geom::MultiPolygon(polygons) => polygons.polygons().count(),
        }
    }

    /// Drops elements without points.
    ///
    /// Returns `None` if a single line string or polygon has no points. Multi geometries are
    /// returned even if all of their elements were dropped.
    pub fn non_degenerate(self) -> Option<Self> {
        match self {
            Geom::Point(p) => Some(Geom::Point(p)),
            Geom::LineString(line) => (!line.is_empty()).then_some(Geom::LineString(line)),
            Geom::Polygon(polygon) => {
                (!polygon.outer_contour.is_empty()).then_some(Geom::Polygon(polygon))
            }
            Geom::MultiPoint(points) => Some(Geom::MultiPoint(points)),
            Geom::MultiLineString(lines) => Some(Geom::MultiLineString(
                lines
                    .into_inner()
                    .into_iter()
                    .filter(|line| !line.is_empty())
                    .collect::<Vec<_>>()
                    .into(),
            )),
            Geom::MultiPolygon(polygons) => Some(Geom::MultiPolygon(
                polygons
                    .parts
                    .into_iter()
                    .filter(|polygon| !polygon.outer_contour.is_empty())
                    .collect::<Vec<_>>()
                    .into(),
            )),
        }
    }

    /// Projects every point of the geometry. Returns `None` if any of the points cannot be
    /// projected.
    pub fn project<Proj>(&self, projection: &Proj) -> Option<Geom<Proj::OutPoint>>
    where
        Proj: Projection<InPoint = P> + ?Sized,
    {
        Some(match self {
            Geom::Point(p) => Geom::Point(projection.project(p)?),
            Geom::LineString(line) => Geom::LineString(line.project_points(projection)?),
            Geom::Polygon(polygon) => Geom::Polygon(polygon.project_points(projection)?),
            Geom::MultiPoint(points) => Geom::MultiPoint(
                points
                    .iter_points()
                    .map(|p| projection.project(p))
                    .collect::<Option<Vec<_>>>()?
                    .into(),
            ),
            Geom::MultiLineString(lines) => Geom::MultiLineString(
                lines
                    .contours()
                    .map(|line| line.project_points(projection))
                    .collect::<Option<Vec<_>>>()?
                    .into(),
            ),
            Geom::MultiPolygon(polygons) => Geom::MultiPolygon(
                polygons
                    .polygons()
                    .map(|polygon| polygon.project_points(projection))
                    .collect::<Option<Vec<_>>>()?
                    .into(),
            ),
        })
    }
}

impl<P> From<P> for Geom<P> {
    fn from(value: P) -> Self {
        Self::Point(value)
    }
}

impl<P> From<Contour<P>> for Geom<P> {
    fn from(value: Contour<P>) -> Self {
        Self::LineString(value)
    }
}

impl<P> From<Polygon<P>> for Geom<P> {
    fn from(value: Polygon<P>) -> Self {
        Self::Polygon(value)
    }
}

impl<P> From<MultiPoint<P>> for Geom<P> {
    fn from(value: MultiPoint<P>) -> Self {
        Self::MultiPoint(value)
    }
}

impl<P> From<MultiContour<P>> for Geom<P> {
    fn from(value: MultiContour<P>) -> Self {
        Self::MultiLineString(value)
    }
}

impl<P> From<MultiPolygon<P>> for Geom<P> {
    fn from(value: MultiPolygon<P>) -> Self {
        Self::MultiPolygon(value)
    }
}
