//! Conversion of Esri JSON geometries into [`Geom`].

use cadgis_types::orient::Orientation;
use cadgis_types::{ClosedContour, Contour, Geom, MultiContour, MultiPoint, MultiPolygon, Point3d, Polygon};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EsriGeometry {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    points: Option<Vec<Vec<f64>>>,
    paths: Option<Vec<Vec<Vec<f64>>>>,
    rings: Option<Vec<Vec<Vec<f64>>>>,
}

/// Converts an Esri JSON geometry.
///
/// Returns `Ok(None)` for empty geometries. `has_z` tells whether the third ordinate of a
/// position is the elevation; otherwise it is ignored and `z` is 0.
pub fn parse_geometry(value: &Value, has_z: bool) -> Result<Option<Geom>, String> {
    if value.is_null() {
        return Ok(None);
    }

    let geometry: EsriGeometry =
        serde_json::from_value(value.clone()).map_err(|err| err.to_string())?;

    if let (Some(x), Some(y)) = (geometry.x, geometry.y) {
        let z = if has_z { geometry.z.unwrap_or(0.0) } else { 0.0 };
        return Ok(Some(Geom::Point(Point3d::new(x, y, z))));
    }

    if let Some(points) = geometry.points {
        let points = positions(&points, has_z)?;
        return Ok((!points.is_empty()).then(|| Geom::MultiPoint(MultiPoint::from(points))));
    }

    if let Some(paths) = geometry.paths {
        let mut lines = paths
            .iter()
            .map(|path| positions(path, has_z).map(Contour::open))
            .collect::<Result<Vec<_>, _>>()?;
        lines.retain(|line| !line.is_empty());

        return Ok(match lines.len() {
            0 => None,
            1 => lines.pop().map(Geom::LineString),
            _ => Some(Geom::MultiLineString(MultiContour::from(lines))),
        });
    }

    if let Some(rings) = geometry.rings {
        let rings = rings
            .iter()
            .map(|ring| positions(ring, has_z))
            .collect::<Result<Vec<_>, _>>()?;
        let mut polygons = group_rings(rings);

        return Ok(match polygons.len() {
            0 => None,
            1 => polygons.pop().map(Geom::Polygon),
            _ => Some(Geom::MultiPolygon(MultiPolygon::from(polygons))),
        });
    }

    Ok(None)
}

fn positions(coordinates: &[Vec<f64>], has_z: bool) -> Result<Vec<Point3d>, String> {
    coordinates
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, rest @ ..] => {
                let z = match (has_z, rest.first()) {
                    (true, Some(z)) => *z,
                    _ => 0.0,
                };
                Ok(Point3d::new(*x, *y, z))
            }
            _ => Err(format!("position must have at least 2 ordinates, got {position:?}")),
        })
        .collect()
}

// Outer rings are clockwise, holes are counterclockwise and follow their outer ring.
fn group_rings(rings: Vec<Vec<Point3d>>) -> Vec<Polygon<Point3d>> {
    let mut polygons: Vec<Polygon<Point3d>> = vec![];
    for ring in rings.into_iter().filter(|ring| !ring.is_empty()) {
        let is_hole = Orientation::ring(&ring) == Orientation::Counterclockwise;
        match polygons.last_mut() {
            Some(polygon) if is_hole => polygon.inner_contours.push(ClosedContour::new(ring)),
            _ => polygons.push(Polygon::from(ClosedContour::new(ring))),
        }
    }

    polygons
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn point() {
        let geom = parse_geometry(&json!({"x": 1.5, "y": 2.5, "z": 7.0}), true).expect("parsed");
        assert_matches!(geom, Some(Geom::Point(p)) if p == Point3d::new(1.5, 2.5, 7.0));

        let geom = parse_geometry(&json!({"x": 1.5, "y": 2.5, "z": 7.0}), false).expect("parsed");
        assert_matches!(geom, Some(Geom::Point(p)) if p.z == 0.0);

        let empty = parse_geometry(&json!({"x": null, "y": null}), false).expect("parsed");
        assert!(empty.is_none());
    }

    #[test]
    fn z_only_with_has_z() {
        let path = json!({"paths": [[[0.0, 0.0, 5.0], [1.0, 1.0, 6.0]]]});
        let Some(Geom::LineString(line)) = parse_geometry(&path, true).expect("parsed") else {
            panic!("line string expected");
        };
        assert_abs_diff_eq!(line[1].z, 6.0);

        // Third ordinate is a measure when the layer has no elevation.
        let Some(Geom::LineString(line)) = parse_geometry(&path, false).expect("parsed") else {
            panic!("line string expected");
        };
        assert_abs_diff_eq!(line[1].z, 0.0);
    }

    #[test]
    fn several_paths() {
        let paths = json!({"paths": [[[0.0, 0.0], [1.0, 0.0]], [], [[2.0, 0.0], [3.0, 0.0], [4.0, 1.0]]]});
        assert_matches!(
            parse_geometry(&paths, false),
            Ok(Some(Geom::MultiLineString(lines))) if lines.len() == 2
        );
    }

    #[test]
    fn multipoint() {
        let points = json!({"points": [[0.0, 0.0], [1.0, 1.0]]});
        assert_matches!(
            parse_geometry(&points, false),
            Ok(Some(Geom::MultiPoint(points))) if points.len() == 2
        );
    }

    #[test]
    fn rings_are_grouped_by_orientation() {
        let outer = |x: f64| json!([[x, 0.0], [x, 10.0], [x + 10.0, 10.0], [x + 10.0, 0.0], [x, 0.0]]);
        let hole = json!([[2.0, 2.0], [4.0, 2.0], [4.0, 4.0], [2.0, 4.0], [2.0, 2.0]]);

        let single = json!({"rings": [outer(0.0), hole.clone()]});
        let Ok(Some(Geom::Polygon(polygon))) = parse_geometry(&single, false) else {
            panic!("polygon expected");
        };
        assert_eq!(polygon.outer_contour.points.len(), 5);
        assert_eq!(polygon.inner_contours.len(), 1);

        let multi = json!({"rings": [outer(0.0), hole, outer(20.0)]});
        let Ok(Some(Geom::MultiPolygon(polygons))) = parse_geometry(&multi, false) else {
            panic!("multipolygon expected");
        };
        assert_eq!(polygons.parts().len(), 2);
        assert_eq!(polygons.parts()[0].inner_contours.len(), 1);
        assert!(polygons.parts()[1].inner_contours.is_empty());
    }

    #[test]
    fn malformed_positions() {
        assert!(parse_geometry(&json!({"paths": [[[1.0]]]}), false).is_err());
        assert!(parse_geometry(&json!({"rings": "none"}), false).is_err());
        assert_matches!(parse_geometry(&Value::Null, false), Ok(None));
    }
}
