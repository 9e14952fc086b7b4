//! Import and refresh of layers: fetching from a source, drawing, and keeping the ledger.
//!
//! An import draws one batch in a single transaction, so a failure leaves the drawing as it
//! was. A refresh redraws every recorded layer in its own transaction and goes on with the
//! remaining layers when one of them fails.

use cadgis_types::crs::CrsRegistry;
use cadgis_types::GeometryKind;
use chrono::Utc;

use crate::error::CadgisError;
use crate::feature::FeatureRecord;
use crate::ledger::{LayerMeta, LedgerStore};
use crate::render::{render_into, RenderStats};
use crate::source::arcgis::{ArcGisClient, ServiceWalker};
use crate::source::postgis::SourceDescriptor;
use crate::source::{FeatureBatch, FeatureSource};
use crate::split::{layer_name, split};
use crate::surface::{DrawingSurface, Transaction};
use crate::symbol::{resolve, SymbolBinding, SymbolChoice, SymbolLibrary};

/// Options of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Coordinate system of the drawing.
    pub target_epsg: i32,
    /// Name of the drawing layer. The name suggested by the source is used if not set.
    pub layer_name: Option<String>,
    /// Attribute to split the batch by, one layer per distinct value.
    pub split_by: Option<String>,
    /// Symbol for point layers. Ignored for other layers.
    pub symbol: SymbolChoice,
}

impl ImportOptions {
    /// Import of bare points into the layer suggested by the source.
    pub fn new(target_epsg: i32) -> Self {
        Self {
            target_epsg,
            layer_name: None,
            split_by: None,
            symbol: SymbolChoice::Decline,
        }
    }
}

/// Result of drawing one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerImport {
    /// Drawing layer.
    pub layer: String,
    /// Split group the layer was drawn from.
    pub group: Option<String>,
    /// Counts.
    pub stats: RenderStats,
}

/// Result of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Layers in the order they were drawn.
    pub layers: Vec<LayerImport>,
}

impl ImportSummary {
    /// Counts of all the layers together.
    pub fn total(&self) -> RenderStats {
        let mut total = RenderStats::default();
        for layer in &self.layers {
            total += layer.stats;
        }
        total
    }
}

/// Result of a run over several layers that does not stop at the first failure.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Layers drawn successfully.
    pub layers: Vec<LayerImport>,
    /// Failures, each carrying its layer name.
    pub failed: Vec<CadgisError>,
}

impl BatchReport {
    /// Returns true if no layer failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Draws a batch into the surface in a single transaction.
///
/// Symbol resolution and the coordinate transform are checked before anything is drawn. The
/// first time a point layer is imported in a session, the standard symbols are added to the
/// drawing. An empty batch draws nothing.
pub fn import_batch<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    registry: &CrsRegistry,
    library: &mut SymbolLibrary,
    batch: &FeatureBatch,
    options: &ImportOptions,
) -> Result<ImportSummary, CadgisError> {
    let base_layer = options
        .layer_name
        .clone()
        .unwrap_or_else(|| batch.layer_name.clone());

    if batch.is_empty() {
        log::info!("Layer '{base_layer}': source returned no features");
        return Ok(ImportSummary::default());
    }

    let transform = registry
        .transform(batch.source_epsg, options.target_epsg)
        .map_err(|err| CadgisError::from(err).in_layer(&base_layer))?;

    let was_loaded = library.is_loaded();
    let result = draw_batch(surface, library, batch, &base_layer, &transform, options);
    if result.is_err() && !was_loaded {
        library.invalidate();
    }

    let summary = result.map_err(|err| err.in_layer(&base_layer))?;
    for layer in &summary.layers {
        log::info!("Layer '{}': {}", layer.layer, layer.stats);
    }

    Ok(summary)
}

fn draw_batch<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    library: &mut SymbolLibrary,
    batch: &FeatureBatch,
    base_layer: &str,
    transform: &cadgis_types::crs::Transform,
    options: &ImportOptions,
) -> Result<ImportSummary, CadgisError> {
    let mut transaction = Transaction::begin(surface)?;

    let binding = match batch.kind {
        GeometryKind::Point => {
            library.ensure_loaded(&mut *transaction)?;
            resolve(
                &transaction.symbols(),
                &batch.label_candidates(&[]),
                options.symbol.clone(),
            )?
        }
        _ => SymbolBinding::points(),
    };

    let groups: Vec<(String, Option<String>, Vec<FeatureRecord>)> = match &options.split_by {
        Some(key) => split(batch.features.iter().cloned(), key)
            .into_iter()
            .map(|(group, features)| (layer_name(base_layer, &group), Some(group), features))
            .collect(),
        None => vec![(base_layer.to_string(), None, batch.features.clone())],
    };

    let mut summary = ImportSummary::default();
    for (layer, group, features) in groups {
        let stats = render_into(&mut transaction, &features, &layer, transform, &binding)
            .map_err(|err| err.in_layer(&layer))?;
        summary.layers.push(LayerImport {
            layer,
            group,
            stats,
        });
    }

    transaction.commit()?;
    Ok(summary)
}

/// Imports every layer of a feature service, each in its own transaction. Empty layers are
/// skipped. The layer name option, if set, is used as a prefix.
pub async fn import_service<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    registry: &CrsRegistry,
    library: &mut SymbolLibrary,
    client: &ArcGisClient,
    item_id: &str,
    options: &ImportOptions,
) -> Result<BatchReport, CadgisError> {
    let batches = ServiceWalker::new(client).fetch_service(item_id).await?;

    let mut report = BatchReport::default();
    for batch in batches.iter().filter(|batch| !batch.is_empty()) {
        let options = ImportOptions {
            layer_name: options
                .layer_name
                .as_ref()
                .map(|prefix| format!("{prefix}-{}", batch.layer_name)),
            ..options.clone()
        };

        match import_batch(surface, registry, library, batch, &options) {
            Ok(summary) => report.layers.extend(summary.layers),
            Err(err) => {
                log::warn!("Import failed: {err}");
                report.failed.push(err);
            }
        }
    }

    Ok(report)
}

/// Imports a table or query of the relational store and records the drawn layers in the
/// ledger so they can be refreshed.
///
/// The layers of a split import are recorded with a query that reads only their own group.
pub async fn import_relational<S, F>(
    surface: &mut S,
    registry: &CrsRegistry,
    library: &mut SymbolLibrary,
    source: &F,
    descriptor: &SourceDescriptor,
    options: &ImportOptions,
    ledger: &LedgerStore,
) -> Result<ImportSummary, CadgisError>
where
    S: DrawingSurface + ?Sized,
    F: FeatureSource<Request = SourceDescriptor> + ?Sized,
{
    descriptor.validate()?;

    let batch = source
        .fetch(descriptor)
        .await
        .map_err(|err| err.in_layer(&descriptor.table))?;
    let summary = import_batch(surface, registry, library, &batch, options)?;

    let document = surface.document_id();
    let now = Utc::now();
    let records: Vec<LayerMeta> = summary
        .layers
        .iter()
        .map(|layer| {
            let origin = match (&options.split_by, &layer.group) {
                (Some(column), Some(group)) => descriptor.narrowed_to_group(column, group),
                _ => descriptor.clone(),
            };
            origin.to_layer_meta(&layer.layer, document.clone(), now)
        })
        .collect();

    if !records.is_empty() {
        let count = records.len();
        ledger.update(|ledger| {
            for record in records {
                ledger.upsert(record);
            }
        })?;
        log::debug!("Recorded {count} layers in {:?}", ledger.path());
    }

    Ok(summary)
}

/// Redraws recorded layers of the drawing from their sources.
///
/// The records offered are those of the surface's document and those without a document. If
/// `layers` is not empty only the named layers are refreshed. Each layer is cleared and drawn
/// again in its own transaction with bare points; a failed layer is left as it was and the
/// refresh goes on. The import time of refreshed layers is updated in the ledger.
pub async fn refresh<S, F>(
    surface: &mut S,
    registry: &CrsRegistry,
    source: &F,
    ledger: &LedgerStore,
    target_epsg: i32,
    layers: &[String],
) -> Result<BatchReport, CadgisError>
where
    S: DrawingSurface + ?Sized,
    F: FeatureSource<Request = SourceDescriptor> + ?Sized,
{
    let document = surface.document_id();
    let records: Vec<LayerMeta> = ledger
        .load()?
        .for_document(document.as_deref())
        .filter(|meta| {
            layers.is_empty()
                || layers
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&meta.acad_layer))
        })
        .cloned()
        .collect();

    let mut report = BatchReport::default();
    for name in layers {
        if !records
            .iter()
            .any(|meta| meta.acad_layer.eq_ignore_ascii_case(name))
        {
            report.failed.push(
                CadgisError::Settings("layer is not recorded for this drawing".into())
                    .in_layer(name.as_str()),
            );
        }
    }

    let mut refreshed = vec![];
    for meta in records {
        match refresh_layer(surface, registry, source, &meta, target_epsg).await {
            Ok(stats) => {
                log::info!("Layer '{}' refreshed: {stats}", meta.acad_layer);
                report.layers.push(LayerImport {
                    layer: meta.acad_layer.clone(),
                    group: None,
                    stats,
                });
                refreshed.push(LayerMeta {
                    last_imported: Some(Utc::now()),
                    ..meta
                });
            }
            Err(err) => {
                let err = err.in_layer(&meta.acad_layer);
                log::warn!("Refresh failed: {err}");
                report.failed.push(err);
            }
        }
    }

    if !refreshed.is_empty() {
        ledger.update(|ledger| {
            for meta in refreshed {
                ledger.upsert(meta);
            }
        })?;
    }

    Ok(report)
}

async fn refresh_layer<S, F>(
    surface: &mut S,
    registry: &CrsRegistry,
    source: &F,
    meta: &LayerMeta,
    target_epsg: i32,
) -> Result<RenderStats, CadgisError>
where
    S: DrawingSurface + ?Sized,
    F: FeatureSource<Request = SourceDescriptor> + ?Sized,
{
    let descriptor = SourceDescriptor::from_layer_meta(meta)?;
    let batch = source.fetch(&descriptor).await?;
    let transform = registry.transform(batch.source_epsg, target_epsg)?;

    let mut transaction = Transaction::begin(surface)?;
    let layer = transaction.ensure_layer(&meta.acad_layer)?;
    let removed = transaction.clear_layer(layer)?;
    log::debug!("Layer '{}': {removed} entities removed", meta.acad_layer);

    let stats = render_into(
        &mut transaction,
        &batch.features,
        &meta.acad_layer,
        &transform,
        &SymbolBinding::points(),
    )?;
    transaction.commit()?;

    Ok(stats)
}
