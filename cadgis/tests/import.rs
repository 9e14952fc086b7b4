use std::sync::Mutex;

use assert_matches::assert_matches;
use async_trait::async_trait;
use cadgis::cadgis_types::crs::CrsRegistry;
use cadgis::cadgis_types::error::CrsError;
use cadgis::cadgis_types::Point3d;
use cadgis::feature::{Attributes, FeatureRecord};
use cadgis::import::{import_relational, refresh, ImportOptions};
use cadgis::ledger::{LayerMeta, LedgerStore};
use cadgis::source::postgis::SourceDescriptor;
use cadgis::source::{FeatureBatch, FeatureSource};
use cadgis::surface::{Drawing, DrawingSurface, Entity};
use cadgis::symbol::SymbolLibrary;
use cadgis::CadgisError;

/// Table of three points that answers group queries by looking for the quoted key.
struct KindTable {
    requests: Mutex<Vec<SourceDescriptor>>,
}

impl KindTable {
    fn new() -> Self {
        Self {
            requests: Mutex::new(vec![]),
        }
    }

    fn features() -> Vec<FeatureRecord> {
        [(1.0, "x"), (2.0, "x"), (3.0, "y")]
            .into_iter()
            .map(|(x, kind)| {
                let mut attributes = Attributes::new();
                attributes.insert("id", x as i64);
                attributes.insert("kind", kind);
                FeatureRecord::new(attributes, Some(Point3d::new(x * 10.0, 5.0, 0.0).into()))
            })
            .collect()
    }
}

#[async_trait]
impl FeatureSource for KindTable {
    type Request = SourceDescriptor;

    async fn fetch(&self, request: &SourceDescriptor) -> Result<FeatureBatch, CadgisError> {
        self.requests
            .lock()
            .expect("not poisoned")
            .push(request.clone());

        let sql = request.sql();
        let features = Self::features()
            .into_iter()
            .filter(|feature| {
                let kind = feature
                    .attributes
                    .get("kind")
                    .map(ToString::to_string)
                    .unwrap_or_default();
                !sql.contains("grouped") || sql.ends_with(&format!("= '{kind}'"))
            })
            .collect();

        Ok(FeatureBatch::new(
            request.table.clone(),
            Some(&request.geom_type),
            request.srid,
            features,
        ))
    }
}

fn descriptor() -> SourceDescriptor {
    SourceDescriptor {
        host: "db.local".into(),
        database: "gis".into(),
        username: "editor".into(),
        schema: "public".into(),
        table: "features".into(),
        geom_column: "geom".into(),
        geom_type: "POINT".into(),
        srid: 27700,
        import_sql: None,
    }
}

#[tokio::test]
async fn split_import_is_recorded_and_refreshed() {
    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempfile::tempdir().expect("temp dir");
    let ledger = LedgerStore::in_dir(dir.path());
    let registry = CrsRegistry::with_builtin();
    let source = KindTable::new();

    let mut drawing = Drawing::new();
    drawing.set_path(dir.path().join("site.json"));
    let document = drawing.document_id();

    let options = ImportOptions {
        layer_name: Some("base".into()),
        split_by: Some("kind".into()),
        ..ImportOptions::new(27700)
    };
    let summary = import_relational(
        &mut drawing,
        &registry,
        &mut SymbolLibrary::new(),
        &source,
        &descriptor(),
        &options,
        &ledger,
    )
    .await
    .expect("imported");

    let layers: Vec<_> = summary
        .layers
        .iter()
        .map(|l| (l.layer.as_str(), l.stats.drawn_count))
        .collect();
    assert_eq!(layers, vec![("base-x", 2), ("base-y", 1)]);
    assert!(drawing
        .entities_on("base-x")
        .all(|e| matches!(e, Entity::Point { .. })));
    assert_eq!(drawing.entities_on("base-y").count(), 1);

    let recorded = ledger.load().expect("ledger");
    assert_eq!(recorded.len(), 2);
    let base_y = recorded.get("base-y").expect("base-y recorded");
    assert_eq!(base_y.dwg_file, document);
    assert_eq!(base_y.table.as_deref(), Some("features"));
    assert!(base_y
        .import_sql
        .as_deref()
        .is_some_and(|sql| sql.ends_with("= 'y'")));
    let first_import = base_y.last_imported.expect("import time");

    // Refreshing replaces the entities instead of adding to them.
    let report = refresh(&mut drawing, &registry, &source, &ledger, 27700, &[])
        .await
        .expect("refreshed");
    assert!(report.is_success());
    assert_eq!(report.layers.len(), 2);
    assert_eq!(drawing.entities_on("base-x").count(), 2);
    assert_eq!(drawing.entities_on("base-y").count(), 1);

    let refreshed = ledger.load().expect("ledger");
    assert_eq!(refreshed.len(), 2);
    assert!(refreshed
        .get("base-y")
        .and_then(|meta| meta.last_imported)
        .is_some_and(|time| time >= first_import));
}

#[tokio::test]
async fn failed_layer_does_not_stop_refresh() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ledger = LedgerStore::in_dir(dir.path());
    let registry = CrsRegistry::with_builtin();
    let source = KindTable::new();
    let mut drawing = Drawing::new();

    let now = chrono::Utc::now();
    let broken = SourceDescriptor {
        srid: 2154,
        ..descriptor()
    };
    ledger
        .update(|l| {
            l.upsert(broken.to_layer_meta("broken", None, now));
            l.upsert(descriptor().to_layer_meta("all", None, now));
            l.upsert(LayerMeta {
                dwg_file: Some("other.json".into()),
                ..descriptor().to_layer_meta("elsewhere", None, now)
            });
        })
        .expect("ledger written");

    let report = refresh(&mut drawing, &registry, &source, &ledger, 27700, &[])
        .await
        .expect("refreshed");

    assert_eq!(report.layers.len(), 1);
    assert_eq!(report.layers[0].layer, "all");
    assert_eq!(report.layers[0].stats.drawn_count, 3);
    assert_eq!(report.failed.len(), 1);
    assert_matches!(
        &report.failed[0],
        CadgisError::Layer { layer, source } if layer == "broken"
            && matches!(**source, CadgisError::Crs(CrsError::UnknownCrs(2154)))
    );
    assert_eq!(drawing.entities_on("broken").count(), 0);

    // Only layers of the open drawing and layers without a drawing are read.
    let requested = source.requests.lock().expect("not poisoned").len();
    assert_eq!(requested, 2);
}

#[tokio::test]
async fn refresh_of_unknown_layer_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let ledger = LedgerStore::in_dir(dir.path());
    let mut drawing = Drawing::new();

    let report = refresh(
        &mut drawing,
        &CrsRegistry::with_builtin(),
        &KindTable::new(),
        &ledger,
        27700,
        &["missing".to_string()],
    )
    .await
    .expect("refreshed");

    assert!(report.layers.is_empty());
    assert_matches!(
        report.failed.as_slice(),
        [CadgisError::Layer { layer, .. }] if layer == "missing"
    );
}
