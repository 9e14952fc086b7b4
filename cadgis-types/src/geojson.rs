//! Conversion of GeoJSON geometries into [`Geom`].

use geojson::{LineStringType, PolygonType, Position, Value};

use crate::contour::{ClosedContour, Contour};
use crate::error::CadgisTypesError;
use crate::geometry::Geom;
use crate::multi_contour::MultiContour;
use crate::multi_point::MultiPoint;
use crate::multi_polygon::MultiPolygon;
use crate::polygon::Polygon;
use crate::Point3d;

impl TryFrom<&geojson::Geometry> for Geom {
    type Error = CadgisTypesError;

    fn try_from(geometry: &geojson::Geometry) -> Result<Self, Self::Error> {
        Geom::try_from(&geometry.value)
    }
}

impl TryFrom<&Value> for Geom {
    type Error = CadgisTypesError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Point(p) => Geom::Point(convert_point(p)?),
            Value::MultiPoint(points) => Geom::MultiPoint(convert_multi_point(points)?),
            Value::LineString(points) => Geom::LineString(convert_contour(points)?),
            Value::MultiLineString(lines) => Geom::MultiLineString(convert_multi_contour(lines)?),
            Value::Polygon(polygon) => Geom::Polygon(convert_polygon(polygon)?),
            Value::MultiPolygon(mp) => Geom::MultiPolygon(convert_multi_polygon(mp)?),
            Value::GeometryCollection(_) => {
                return Err(CadgisTypesError::Conversion(
                    "geometry collections are not supported".into(),
                ))
            }
        })
    }
}

fn convert_point(position: &Position) -> Result<Point3d, CadgisTypesError> {
    match position.as_slice() {
        [x, y] => Ok(Point3d::new(*x, *y, 0.0)),
        [x, y, z, ..] => Ok(Point3d::new(*x, *y, *z)),
        _ => Err(CadgisTypesError::Conversion(format!(
            "position with {} coordinates",
            position.len()
        ))),
    }
}

fn convert_points(positions: &[Position]) -> Result<Vec<Point3d>, CadgisTypesError> {
    positions.iter().map(convert_point).collect()
}

fn convert_contour(line_string: &LineStringType) -> Result<Contour<Point3d>, CadgisTypesError> {
    Ok(Contour::open(convert_points(line_string)?))
}

fn convert_multi_point(points: &[Position]) -> Result<MultiPoint<Point3d>, CadgisTypesError> {
    Ok(MultiPoint::from(convert_points(points)?))
}

fn convert_multi_contour(
    lines: &[LineStringType],
) -> Result<MultiContour<Point3d>, CadgisTypesError> {
    Ok(MultiContour::from(
        lines
            .iter()
            .map(convert_contour)
            .collect::<Result<Vec<_>, _>>()?,
    ))
}

fn convert_polygon(polygon: &PolygonType) -> Result<Polygon<Point3d>, CadgisTypesError> {
    let mut rings = polygon
        .iter()
        .map(|ring| convert_points(ring).map(ClosedContour::new));
    let outer = rings
        .next()
        .transpose()?
        .unwrap_or_else(|| ClosedContour::new(vec![]));

    Ok(Polygon::new(outer, rings.collect::<Result<Vec<_>, _>>()?))
}

fn convert_multi_polygon(
    mp: &[PolygonType],
) -> Result<MultiPolygon<Point3d>, CadgisTypesError> {
    Ok(MultiPolygon::from(
        mp.iter()
            .map(convert_polygon)
            .collect::<Result<Vec<_>, _>>()?,
    ))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(json: &str) -> Result<Geom, CadgisTypesError> {
        let geojson: geojson::GeoJson = json.parse().expect("valid geojson");
        let geometry = geojson::Geometry::try_from(geojson).expect("geometry");
        Geom::try_from(&geometry)
    }

    #[test]
    fn point_with_and_without_z() {
        assert_eq!(
            parse(r#"{"type":"Point","coordinates":[1.5,2.5]}"#).expect("point"),
            Geom::Point(Point3d::new(1.5, 2.5, 0.0))
        );
        assert_eq!(
            parse(r#"{"type":"Point","coordinates":[1.5,2.5,7.0]}"#).expect("point"),
            Geom::Point(Point3d::new(1.5, 2.5, 7.0))
        );
    }

    #[test]
    fn polygon_with_hole() {
        let geom = parse(
            r#"{"type":"Polygon","coordinates":[
                [[0,0],[10,0],[10,10],[0,10],[0,0]],
                [[2,2],[2,4],[4,4],[2,2]]
            ]}"#,
        )
        .expect("polygon");

        let Geom::Polygon(polygon) = geom else {
            panic!("polygon expected");
        };
        assert_eq!(polygon.outer_contour.points.len(), 5);
        assert_eq!(polygon.inner_contours.len(), 1);
    }

    #[test]
    fn multi_line_string() {
        let geom = parse(
            r#"{"type":"MultiLineString","coordinates":[[[0,0],[1,1]],[[2,2],[3,3],[4,4]]]}"#,
        )
        .expect("multi line string");

        let Geom::MultiLineString(lines) = geom else {
            panic!("multi line string expected");
        };
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.contours().map(|line| line.len()).sum::<usize>(), 5);
    }

    #[test]
    fn geometry_collection_is_rejected() {
        assert_matches!(
            parse(r#"{"type":"GeometryCollection","geometries":[]}"#),
            Err(CadgisTypesError::Conversion(_))
        );
    }
}
