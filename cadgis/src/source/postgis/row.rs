//! Conversion of result rows into feature records.
//!
//! The query is wrapped so that the server encodes every row: attributes as one JSON object and
//! the geometry as GeoJSON. This keeps decoding independent of column types.

use cadgis_types::Geom;
use geojson::GeoJson;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::query::quote_ident;
use crate::error::CadgisError;
use crate::feature::{AttributeValue, Attributes, FeatureRecord};

/// Wraps the query so that each row has an `attributes` JSON object and a `geometry` GeoJSON
/// text.
pub(crate) fn wrap_query(sql: &str, geom_column: &str) -> String {
    format!(
        "SELECT to_json(q) AS attributes, ST_AsGeoJSON(q.{}) AS geometry FROM ({sql}) AS q",
        quote_ident(geom_column)
    )
}

pub(crate) fn from_row(row: &PgRow, geom_column: &str) -> Result<FeatureRecord, CadgisError> {
    let attributes: Value = row.try_get("attributes")?;
    let geometry: Option<String> = row.try_get("geometry")?;
    Ok(convert(attributes, geometry.as_deref(), geom_column))
}

/// Builds a record from the encoded row. The geometry column is removed from the attributes.
/// A geometry that cannot be decoded is logged and dropped.
pub(crate) fn convert(
    attributes: Value,
    geometry: Option<&str>,
    geom_column: &str,
) -> FeatureRecord {
    let attributes: Attributes = match attributes {
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !key.eq_ignore_ascii_case(geom_column))
            .map(|(key, value)| (key.clone(), AttributeValue::from_json(value)))
            .collect(),
        _ => Attributes::new(),
    };

    let geometry = geometry.and_then(|text| match parse_geojson(text) {
        Ok(geom) => geom.non_degenerate(),
        Err(err) => {
            log::warn!("Skipping geometry of a row: {err}");
            None
        }
    });

    FeatureRecord::new(attributes, geometry)
}

fn parse_geojson(text: &str) -> Result<Geom, CadgisError> {
    let geometry = match text.parse::<GeoJson>() {
        Ok(GeoJson::Geometry(geometry)) => geometry,
        Ok(_) => return Err(CadgisError::Query("expected a GeoJSON geometry".into())),
        Err(err) => return Err(CadgisError::Query(err.to_string())),
    };

    Ok(Geom::try_from(&geometry)?)
}
