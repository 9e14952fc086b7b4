//! Reprojection of feature geometries and drawing them into a [`DrawingSurface`].

use std::ops::AddAssign;

use cadgis_types::crs::{CrsRegistry, Transform};
use cadgis_types::error::CrsError;
use cadgis_types::{Geom, Point3d};

use crate::error::CadgisError;
use crate::feature::FeatureRecord;
use crate::surface::{DrawingSurface, Label, LabelSlot, LayerHandle, Transaction};
use crate::symbol::SymbolBinding;

/// Counts of a render run.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Number of primitives added to the surface. A multi geometry adds one primitive per element.
    pub drawn_count: usize,
    /// Number of features that were not drawn because they have no geometry or their geometry
    /// has no points.
    pub skipped_count: usize,
}

impl AddAssign for RenderStats {
    fn add_assign(&mut self, rhs: Self) {
        self.drawn_count += rhs.drawn_count;
        self.skipped_count += rhs.skipped_count;
    }
}

impl std::fmt::Display for RenderStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} primitives drawn, {} features skipped",
            self.drawn_count, self.skipped_count
        )
    }
}

/// Draws the features into `layer` of the surface in a single transaction.
///
/// The transform between the systems and the symbol are checked before the surface is touched.
/// If any feature cannot be transformed, nothing is drawn.
pub fn render<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    registry: &CrsRegistry,
    features: &[FeatureRecord],
    layer: &str,
    source_epsg: i32,
    target_epsg: i32,
    binding: &SymbolBinding,
) -> Result<RenderStats, CadgisError> {
    let transform = registry.transform(source_epsg, target_epsg)?;
    let mut transaction = Transaction::begin(surface)?;
    let stats = render_into(&mut transaction, features, layer, &transform, binding)?;
    transaction.commit()?;

    log::info!("Layer '{layer}': {stats}");
    Ok(stats)
}

/// Draws the features inside an already open transaction.
///
/// The layer is created when the first feature with a geometry is drawn. A `Multi*` geometry
/// without elements draws nothing and is not counted as skipped.
pub fn render_into<S: DrawingSurface + ?Sized>(
    transaction: &mut Transaction<'_, S>,
    features: &[FeatureRecord],
    layer: &str,
    transform: &Transform,
    binding: &SymbolBinding,
) -> Result<RenderStats, CadgisError> {
    let painter = Painter::new(&**transaction, transform, binding)?;
    let mut layer_handle = None;
    let mut stats = RenderStats::default();

    for feature in features {
        let Some(geometry) = feature.geometry.clone().and_then(Geom::non_degenerate) else {
            stats.skipped_count += 1;
            continue;
        };
        if geometry.part_count() == 0 {
            continue;
        }

        let projected = geometry
            .project(transform)
            .ok_or_else(|| CrsError::Projection {
                source_epsg: transform.source_epsg(),
                target_epsg: transform.target_epsg(),
                reason: "feature geometry has coordinates that cannot be transformed".into(),
            })?;

        let handle = match layer_handle {
            Some(handle) => handle,
            None => {
                let handle = transaction.ensure_layer(layer)?;
                layer_handle = Some(handle);
                handle
            }
        };

        stats.drawn_count += painter.draw(&mut **transaction, handle, feature, &projected)?;
    }

    Ok(stats)
}

struct Painter<'a> {
    symbol: Option<(String, Vec<LabelSlot>)>,
    label_attribute: Option<&'a str>,
}

impl<'a> Painter<'a> {
    fn new<S: DrawingSurface + ?Sized>(
        surface: &S,
        transform: &Transform,
        binding: &'a SymbolBinding,
    ) -> Result<Self, CadgisError> {
        log::debug!(
            "Rendering from EPSG:{} to EPSG:{}",
            transform.source_epsg(),
            transform.target_epsg()
        );

        let symbol = match (binding.use_symbol, &binding.symbol_name) {
            (true, Some(name)) => match surface.symbol(name) {
                Some(definition) => Some((definition.name, definition.label_slots)),
                None => return Err(CadgisError::UnknownSymbol(name.clone())),
            },
            (true, None) => {
                return Err(CadgisError::UnknownSymbol(String::new()));
            }
            (false, _) => None,
        };

        Ok(Self {
            symbol,
            label_attribute: binding.label_attribute.as_deref(),
        })
    }

    fn draw<S: DrawingSurface + ?Sized>(
        &self,
        surface: &mut S,
        layer: LayerHandle,
        feature: &FeatureRecord,
        geometry: &Geom,
    ) -> Result<usize, CadgisError> {
        let mut count = 0;
        match geometry {
            Geom::Point(point) => {
                self.draw_point(surface, layer, feature, point)?;
                count += 1;
            }
            Geom::LineString(line) => {
                surface.emit_polyline(layer, line, false)?;
                count += 1;
            }
            Geom::Polygon(polygon) => {
                surface.emit_polyline(layer, &polygon.outer_contour.closing_points(), true)?;
                count += 1;
            }
            Geom::MultiPoint(points) => {
                for point in points.iter_points() {
                    self.draw_point(surface, layer, feature, point)?;
                    count += 1;
                }
            }
            Geom::MultiLineString(lines) => {
                for line in lines.contours() {
                    surface.emit_polyline(layer, line, false)?;
                    count += 1;
                }
            }
            Geom::MultiPolygon(polygons) => {
                for polygon in polygons.polygons() {
                    surface.emit_polyline(layer, &polygon.outer_contour.closing_points(), true)?;
                    count += 1;
                }
            }
        }

        Ok(count)
    }

    fn draw_point<S: DrawingSurface + ?Sized>(
        &self,
        surface: &mut S,
        layer: LayerHandle,
        feature: &FeatureRecord,
        point: &Point3d,
    ) -> Result<(), CadgisError> {
        let Some((name, slots)) = &self.symbol else {
            return surface.emit_point(layer, *point);
        };

        let labels = slots
            .iter()
            .map(|slot| Label {
                tag: slot.tag.clone(),
                text: match self.label_attribute {
                    Some(attribute) => feature
                        .attributes
                        .get_ignore_case(attribute)
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    None => slot.default_text.clone(),
                },
            })
            .collect();

        surface.emit_symbol_instance(layer, name, *point, labels)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use cadgis_types::{ClosedContour, Contour, MultiContour, MultiPoint, MultiPolygon, Polygon};

    use super::*;
    use crate::feature::Attributes;
    use crate::surface::{Drawing, Entity, SymbolDefinition};

    fn p(x: f64, y: f64) -> Point3d {
        Point3d::new(x, y, 0.0)
    }

    fn feature(geometry: impl Into<Geom>) -> FeatureRecord {
        FeatureRecord::new(Attributes::new(), Some(geometry.into()))
    }

    fn render_bng(drawing: &mut Drawing, features: &[FeatureRecord]) -> RenderStats {
        render(
            drawing,
            &CrsRegistry::with_builtin(),
            features,
            "layer",
            27700,
            27700,
            &SymbolBinding::points(),
        )
        .expect("rendered")
    }

    fn define_tree(drawing: &mut Drawing) {
        let mut transaction = Transaction::begin(drawing).expect("begin");
        transaction
            .define_symbol(SymbolDefinition {
                name: "Tree".into(),
                label_slots: vec![
                    LabelSlot {
                        tag: "SPECIES".into(),
                        default_text: "TREE".into(),
                    },
                    LabelSlot {
                        tag: "NOTE".into(),
                        default_text: "-".into(),
                    },
                ],
            })
            .expect("defined");
        transaction.commit().expect("commit");
    }

    #[test]
    fn multi_geometries_draw_each_element() {
        let mut drawing = Drawing::new();
        let line = |x: f64| Contour::open(vec![p(x, 0.0), p(x, 1.0)]);
        let features = [feature(MultiContour::from(vec![line(0.0), line(1.0), line(2.0)]))];

        let stats = render_bng(&mut drawing, &features);
        assert_eq!(stats.drawn_count, 3);
        assert_eq!(drawing.entities().len(), 3);
        assert!(drawing
            .entities()
            .iter()
            .all(|e| matches!(e, Entity::Polyline { closed: false, vertices, .. } if vertices.len() == 2)));

        let mut drawing = Drawing::new();
        let square = |x: f64| Polygon::from(vec![p(x, 0.0), p(x + 1.0, 0.0), p(x + 1.0, 1.0)]);
        let features = [
            feature(MultiPolygon::from(vec![square(0.0), square(5.0)])),
            feature(MultiPoint::from(vec![p(0.0, 0.0), p(1.0, 1.0)])),
        ];
        assert_eq!(render_bng(&mut drawing, &features).drawn_count, 4);
    }

    #[test]
    fn features_without_geometry_are_skipped() {
        let mut drawing = Drawing::new();
        let features = [
            FeatureRecord::default(),
            feature(p(1.0, 2.0)),
            feature(Contour::open(vec![])),
        ];

        let stats = render_bng(&mut drawing, &features);
        assert_eq!(
            stats,
            RenderStats {
                drawn_count: 1,
                skipped_count: 2
            }
        );
    }

    #[test]
    fn empty_multi_geometries_draw_nothing() {
        let mut drawing = Drawing::new();
        let features = [
            feature(MultiPoint::<Point3d>::from(vec![])),
            feature(MultiContour::<Point3d>::from(vec![])),
            feature(MultiPolygon::<Point3d>::from(vec![])),
            feature(MultiContour::<Point3d>::from(vec![Contour::open(vec![])])),
        ];

        let stats = render_bng(&mut drawing, &features);
        assert_eq!(stats, RenderStats::default());
        assert!(drawing.entities().is_empty());
        assert_eq!(drawing.layer_names().count(), 0);
    }

    #[test]
    fn no_layer_without_geometries() {
        let mut drawing = Drawing::new();
        render_bng(&mut drawing, &[FeatureRecord::default()]);
        assert_eq!(drawing.layer_names().count(), 0);
    }

    #[test]
    fn unclosed_ring_is_closed() {
        let mut drawing = Drawing::new();
        let ring = vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)];
        render_bng(&mut drawing, &[feature(Polygon::from(ring))]);

        let [Entity::Polyline {
            vertices, closed, ..
        }] = drawing.entities()
        else {
            panic!("single polyline expected");
        };
        assert!(*closed);
        assert_eq!(vertices.len(), 5);
        assert_eq!(vertices[4], vertices[0]);

        let closed_ring = ClosedContour::new(vec![p(0.0, 0.0), p(1.0, 0.0), p(1.0, 1.0), p(0.0, 0.0)]);
        let mut drawing = Drawing::new();
        render_bng(&mut drawing, &[feature(Polygon::from(closed_ring))]);
        assert_matches!(drawing.entities(), [Entity::Polyline { vertices, .. }] if vertices.len() == 4);
    }

    #[test]
    fn line_order_and_z_are_kept() {
        let mut drawing = Drawing::new();
        let points = vec![
            Point3d::new(-0.1276, 51.5072, 12.0),
            Point3d::new(-0.1, 51.5, 14.5),
            Point3d::new(-0.05, 51.49, 0.0),
        ];
        render(
            &mut drawing,
            &CrsRegistry::with_builtin(),
            &[feature(Contour::open(points.clone()))],
            "roads",
            4326,
            27700,
            &SymbolBinding::points(),
        )
        .expect("rendered");

        let [Entity::Polyline { vertices, .. }] = drawing.entities() else {
            panic!("single polyline expected");
        };
        assert_eq!(vertices.len(), 3);
        assert_abs_diff_eq!(vertices[0].z, 12.0);
        assert_abs_diff_eq!(vertices[1].z, 14.5);
        assert!(vertices[0].x < vertices[1].x && vertices[1].x < vertices[2].x);
        assert_abs_diff_eq!(vertices[0].x, 530034.0, epsilon = 300.0);
    }

    #[test]
    fn symbol_labels() {
        let mut drawing = Drawing::new();
        define_tree(&mut drawing);

        let attributes: Attributes = [("Species", "Oak")].into_iter().collect();
        let features = [
            FeatureRecord::new(attributes, Some(p(1.0, 1.0).into())),
            feature(p(2.0, 2.0)),
        ];
        render(
            &mut drawing,
            &CrsRegistry::with_builtin(),
            &features,
            "trees",
            27700,
            27700,
            &SymbolBinding::symbol("Tree", Some("species".into())),
        )
        .expect("rendered");

        let texts: Vec<Vec<String>> = drawing
            .entities()
            .iter()
            .map(|e| match e {
                Entity::SymbolInstance { labels, .. } => {
                    labels.iter().map(|l| l.text.clone()).collect()
                }
                other => panic!("symbol instance expected, got {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec![vec!["Oak", "Oak"], vec!["", ""]]);
    }

    #[test]
    fn symbol_default_text() {
        let mut drawing = Drawing::new();
        define_tree(&mut drawing);
        render(
            &mut drawing,
            &CrsRegistry::with_builtin(),
            &[feature(p(1.0, 1.0))],
            "trees",
            27700,
            27700,
            &SymbolBinding::symbol("Tree", None),
        )
        .expect("rendered");

        assert_matches!(
            drawing.entities(),
            [Entity::SymbolInstance { labels, .. }] if labels[0].text == "TREE" && labels[1].text == "-"
        );
    }

    #[test]
    fn errors_leave_surface_untouched() {
        let mut drawing = Drawing::new();
        let registry = CrsRegistry::with_builtin();
        let features = [feature(p(1.0, 1.0))];

        let result = render(
            &mut drawing,
            &registry,
            &features,
            "a",
            2154,
            27700,
            &SymbolBinding::points(),
        );
        assert_matches!(result, Err(CadgisError::Crs(CrsError::UnknownCrs(2154))));

        let result = render(
            &mut drawing,
            &registry,
            &features,
            "a",
            27700,
            27700,
            &SymbolBinding::symbol("Missing", None),
        );
        assert_matches!(result, Err(CadgisError::UnknownSymbol(_)));

        let features = [
            feature(p(-0.1, 51.5)),
            feature(p(f64::NAN, 51.5)),
        ];
        let result = render(
            &mut drawing,
            &registry,
            &features,
            "a",
            4326,
            27700,
            &SymbolBinding::points(),
        );
        assert_matches!(result, Err(CadgisError::Crs(CrsError::Projection { .. })));

        assert!(drawing.entities().is_empty());
        assert_eq!(drawing.layer_names().count(), 0);
        assert!(!drawing.in_transaction());
    }
}
