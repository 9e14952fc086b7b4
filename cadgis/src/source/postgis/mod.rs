//! Relational spatial store source.
//!
//! A source is described by a [`SourceDescriptor`]: where the table lives and, optionally, the
//! query to read it with. Rows are read in one go and converted into a [`FeatureBatch`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::PostgisSettings;
use crate::error::CadgisError;
use crate::ledger::LayerMeta;
use crate::source::{FeatureBatch, FeatureSource};

mod catalog;
mod connection;
mod query;
mod row;

pub use catalog::{ColumnInfo, TableInfo, DISTINCT_VALUES_LIMIT};
pub use connection::ConnectionParams;
pub use query::{
    quote_ident, quote_literal, validate_sql, Condition, Extent, Operator, TableQuery,
};

/// Everything needed to read a layer from the database again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Server host name.
    pub host: String,
    /// Database name.
    pub database: String,
    /// User name.
    pub username: String,
    /// Table schema.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Geometry column.
    pub geom_column: String,
    /// Declared geometry type of the column.
    pub geom_type: String,
    /// Coordinate system of the column.
    pub srid: i32,
    /// Query to read the features with, instead of the whole table.
    pub import_sql: Option<String>,
}

impl SourceDescriptor {
    /// Descriptor of a whole table of the database the parameters point to.
    pub fn for_table(params: &ConnectionParams, table: &TableInfo) -> Self {
        Self {
            host: params.host.clone(),
            database: params.database.clone(),
            username: params.username.clone(),
            schema: table.schema.clone(),
            table: table.table.clone(),
            geom_column: table.geom_column.clone(),
            geom_type: table.geom_type.clone(),
            srid: table.srid,
            import_sql: None,
        }
    }

    /// Reads the features with the given query instead of the whole table.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.import_sql = Some(sql.into());
        self
    }

    /// Descriptor of a recorded layer. Fails if the record does not name a table.
    pub fn from_layer_meta(meta: &LayerMeta) -> Result<Self, CadgisError> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    CadgisError::Settings(format!("layer record has no {name}"))
                        .in_layer(&meta.acad_layer)
                })
        };

        Ok(Self {
            host: required(&meta.host, "host")?,
            database: required(&meta.database, "database")?,
            username: required(&meta.username, "username")?,
            schema: required(&meta.schema, "schema")?,
            table: required(&meta.table, "table")?,
            geom_column: required(&meta.geom_column, "geometry column")?,
            geom_type: meta.geom_type.clone().unwrap_or_default(),
            srid: meta.srid.unwrap_or_default(),
            import_sql: meta.import_sql.clone().filter(|sql| !sql.trim().is_empty()),
        })
    }

    /// Record of a layer imported from this source.
    pub fn to_layer_meta(
        &self,
        layer: impl Into<String>,
        document: Option<String>,
        imported_at: DateTime<Utc>,
    ) -> LayerMeta {
        LayerMeta {
            acad_layer: layer.into(),
            host: Some(self.host.clone()),
            database: Some(self.database.clone()),
            username: Some(self.username.clone()),
            schema: Some(self.schema.clone()),
            table: Some(self.table.clone()),
            geom_column: Some(self.geom_column.clone()),
            geom_type: Some(self.geom_type.clone()),
            srid: Some(self.srid),
            import_sql: self.import_sql.clone(),
            dwg_file: document,
            last_imported: Some(imported_at),
        }
    }

    /// Query the features are read with.
    pub fn sql(&self) -> String {
        match &self.import_sql {
            Some(sql) => sql.trim().to_string(),
            None => query::table_query(&self.schema, &self.table),
        }
    }

    /// Checks a query written by the operator. Call before connecting.
    pub fn validate(&self) -> Result<(), CadgisError> {
        match &self.import_sql {
            Some(sql) => validate_sql(sql, &self.geom_column),
            None => Ok(()),
        }
    }

    /// Descriptor reading only the rows whose `column` value has the text form `key`, as
    /// produced by the split. The [`NULL_GROUP`](crate::split::NULL_GROUP) key selects nulls too.
    ///
    /// Numeric columns are compared by value, since the key of `3.50` is `3.5`.
    pub fn narrowed_to_group(&self, column: &str, key: &str) -> Self {
        let json = format!("to_json(grouped.{})", quote_ident(column));
        let value = format!("({json} #>> '{{}}')");
        let literal = quote_literal(key);
        let mut condition = format!("{value} = {literal}");
        if key == crate::split::NULL_GROUP {
            condition = format!("({value} IS NULL OR {condition})");
        } else if key.parse::<f64>().is_ok_and(f64::is_finite) {
            condition = format!(
                "(CASE WHEN json_typeof({json}) = 'number' \
                 THEN {value}::numeric = {literal}::numeric ELSE {condition} END)"
            );
        }

        let sql = format!("SELECT * FROM ({}) AS grouped WHERE {condition}", self.sql());
        self.clone().with_sql(sql)
    }
}

/// Database source.
#[derive(Debug, Clone)]
pub struct PostgisSource {
    pool: PgPool,
}

impl PostgisSource {
    /// Connects to the database.
    pub async fn connect(params: &ConnectionParams) -> Result<Self, CadgisError> {
        Ok(Self {
            pool: params.connect().await?,
        })
    }

    /// Source using an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Tables with a geometry column.
    pub async fn tables(&self) -> Result<Vec<TableInfo>, CadgisError> {
        catalog::list_tables(&self.pool).await
    }

    /// Finds a table by `schema.table` or, if the name is unambiguous, by the table name alone.
    pub async fn find_table(&self, name: &str) -> Result<TableInfo, CadgisError> {
        let tables = self.tables().await?;
        let matches: Vec<_> = tables
            .into_iter()
            .filter(|t| t.display_name() == name || t.table == name)
            .collect();

        match <[TableInfo; 1]>::try_from(matches) {
            Ok([table]) => Ok(table),
            Err(matches) if matches.is_empty() => Err(CadgisError::Query(format!(
                "no table '{name}' with a geometry column"
            ))),
            Err(_) => Err(CadgisError::Query(format!(
                "table name '{name}' is ambiguous, use schema.table"
            ))),
        }
    }

    /// Columns of a table.
    pub async fn columns(&self, table: &TableInfo) -> Result<Vec<ColumnInfo>, CadgisError> {
        catalog::list_columns(&self.pool, &table.schema, &table.table).await
    }

    /// Distinct values of a column.
    pub async fn distinct_values(
        &self,
        table: &TableInfo,
        column: &str,
    ) -> Result<Vec<String>, CadgisError> {
        catalog::distinct_values(&self.pool, &table.schema, &table.table, column).await
    }
}

#[async_trait]
impl FeatureSource for PostgisSource {
    type Request = SourceDescriptor;

    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<FeatureBatch, CadgisError> {
        let sql = row::wrap_query(&descriptor.sql(), &descriptor.geom_column);
        log::debug!("Reading {}.{}: {sql}", descriptor.schema, descriptor.table);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let features = rows
            .iter()
            .map(|r| row::from_row(r, &descriptor.geom_column))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Read {} rows from {}.{}",
            features.len(),
            descriptor.schema,
            descriptor.table
        );

        Ok(FeatureBatch::new(
            descriptor.table.clone(),
            Some(&descriptor.geom_type),
            descriptor.srid,
            features,
        ))
    }
}

/// Source that reads every descriptor from the database it names, keeping one pool per
/// database. Used to refresh layers imported from different databases.
#[derive(Debug)]
pub struct PostgisConnections {
    settings: PostgisSettings,
    pools: Mutex<HashMap<ConnectionParams, PgPool>>,
}

impl PostgisConnections {
    /// Port and password of every connection are taken from the settings.
    pub fn new(settings: PostgisSettings) -> Self {
        Self {
            settings,
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn source(&self, descriptor: &SourceDescriptor) -> Result<PostgisSource, CadgisError> {
        let params = ConnectionParams::for_source(descriptor, &self.settings);
        let cached = self
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&params)
            .cloned();

        let pool = match cached {
            Some(pool) => pool,
            None => {
                let pool = params.connect().await?;
                self.pools
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(params, pool.clone());
                pool
            }
        };

        Ok(PostgisSource::with_pool(pool))
    }
}

#[async_trait]
impl FeatureSource for PostgisConnections {
    type Request = SourceDescriptor;

    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<FeatureBatch, CadgisError> {
        self.source(descriptor).await?.fetch(descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;
    use crate::feature::{AttributeValue, Attributes, FeatureRecord};
    use crate::split::group_key;

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor {
            host: "db.local".into(),
            database: "gis".into(),
            username: "editor".into(),
            schema: "public".into(),
            table: "trees".into(),
            geom_column: "geom".into(),
            geom_type: "POINT".into(),
            srid: 27700,
            import_sql: None,
        }
    }

    #[test]
    fn default_query_reads_the_table() {
        assert_eq!(descriptor().sql(), r#"SELECT * FROM "public"."trees""#);
        let custom = descriptor().with_sql("  SELECT id, geom FROM trees  ");
        assert_eq!(custom.sql(), "SELECT id, geom FROM trees");
    }

    #[test]
    fn invalid_query_is_rejected() {
        let descriptor = descriptor().with_sql("SELECT id FROM trees");
        assert_matches!(descriptor.validate(), Err(CadgisError::Query(_)));
    }

    #[test]
    fn group_queries() {
        let narrowed = descriptor().narrowed_to_group("species", "O'ak");
        assert_eq!(
            narrowed.sql(),
            r#"SELECT * FROM (SELECT * FROM "public"."trees") AS grouped WHERE (to_json(grouped."species") #>> '{}') = 'O''ak'"#
        );

        let nulls = descriptor().narrowed_to_group("species", "NULL");
        assert!(nulls.sql().ends_with(
            r#"WHERE ((to_json(grouped."species") #>> '{}') IS NULL OR (to_json(grouped."species") #>> '{}') = 'NULL')"#
        ));
    }

    #[test]
    fn numeric_groups_compare_by_value() {
        let row: serde_json::Value = serde_json::from_str(r#"{"height": 3.50}"#).expect("json");
        let mut attributes = Attributes::new();
        attributes.insert("height", AttributeValue::from_json(&row["height"]));
        let key = group_key(&FeatureRecord::new(attributes, None), "height");
        assert_eq!(key, "3.5");

        let narrowed = descriptor().narrowed_to_group("height", &key);
        assert!(narrowed.sql().ends_with(
            r#"WHERE (CASE WHEN json_typeof(to_json(grouped."height")) = 'number' THEN (to_json(grouped."height") #>> '{}')::numeric = '3.5'::numeric ELSE (to_json(grouped."height") #>> '{}') = '3.5' END)"#
        ));

        let text = descriptor().narrowed_to_group("species", "NaN");
        assert!(text
            .sql()
            .ends_with(r#"WHERE (to_json(grouped."species") #>> '{}') = 'NaN'"#));
    }

    #[test]
    fn layer_records() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let meta = descriptor()
            .with_sql("SELECT * FROM trees WHERE height > 3 AND geom IS NOT NULL")
            .to_layer_meta("Trees", Some("C:/drawings/site.dwg".into()), now);

        assert_eq!(meta.acad_layer, "Trees");
        assert_eq!(meta.srid, Some(27700));
        assert_eq!(meta.last_imported, Some(now));
        assert_eq!(SourceDescriptor::from_layer_meta(&meta).ok(), Some(
            descriptor().with_sql("SELECT * FROM trees WHERE height > 3 AND geom IS NOT NULL")
        ));

        let incomplete = LayerMeta {
            acad_layer: "Broken".into(),
            ..LayerMeta::default()
        };
        assert_matches!(
            SourceDescriptor::from_layer_meta(&incomplete),
            Err(CadgisError::Layer { layer, .. }) if layer == "Broken"
        );
    }
}
