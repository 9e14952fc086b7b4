//! Discovery of spatial tables and their columns.

use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use super::query::{quote_ident, table_query};
use crate::error::CadgisError;

/// Maximum number of values returned by [`distinct_values`].
pub const DISTINCT_VALUES_LIMIT: i64 = 100;

const TABLES_SQL: &str = "SELECT f_table_schema::text AS schema_name, f_table_name::text AS table_name, \
     f_geometry_column::text AS geom_column, type::text AS geom_type, srid \
     FROM geometry_columns ORDER BY 1, 2";

const COLUMNS_SQL: &str = "SELECT column_name::text AS name, data_type::text AS data_type \
     FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

/// Table with a geometry column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Geometry column.
    pub geom_column: String,
    /// Declared geometry type, e.g. `MULTIPOLYGON` or `GEOMETRY`.
    pub geom_type: String,
    /// Coordinate system of the column. `0` if not declared.
    pub srid: i32,
}

impl TableInfo {
    /// `schema.table`.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Query reading the whole table.
    pub fn sql(&self) -> String {
        table_query(&self.schema, &self.table)
    }
}

/// Column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Type name as reported by the information schema.
    pub data_type: String,
}

impl ColumnInfo {
    /// Returns true if values of the column are compared as numbers.
    pub fn is_numeric(&self) -> bool {
        let data_type = self.data_type.to_lowercase();
        ["int", "double", "numeric", "real"]
            .iter()
            .any(|t| data_type.contains(t))
    }
}

/// Lists the geometry columns registered in the database.
pub async fn list_tables(pool: &PgPool) -> Result<Vec<TableInfo>, CadgisError> {
    let rows = sqlx::query(TABLES_SQL).fetch_all(pool).await?;
    rows.iter()
        .map(|row| {
            Ok(TableInfo {
                schema: row.try_get("schema_name")?,
                table: row.try_get("table_name")?,
                geom_column: row.try_get("geom_column")?,
                geom_type: row.try_get("geom_type")?,
                srid: row.try_get("srid")?,
            })
        })
        .collect()
}

/// Lists the columns of a table in their declared order.
pub async fn list_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<ColumnInfo>, CadgisError> {
    let rows = sqlx::query(COLUMNS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.try_get("name")?,
                data_type: row.try_get("data_type")?,
            })
        })
        .collect()
}

/// Sorted distinct values of a column, as text. Nulls and empty values are skipped and at most
/// [`DISTINCT_VALUES_LIMIT`] values are returned.
pub async fn distinct_values(
    pool: &PgPool,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<Vec<String>, CadgisError> {
    let sql = distinct_values_sql(schema, table, column);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut values = vec![];
    for row in &rows {
        let value: Option<String> = row.try_get(0)?;
        values.extend(value.filter(|v| !v.trim().is_empty()));
    }

    Ok(values)
}

fn distinct_values_sql(schema: &str, table: &str, column: &str) -> String {
    format!(
        "SELECT DISTINCT {column}::text FROM {} ORDER BY 1 LIMIT {DISTINCT_VALUES_LIMIT}",
        quote_from(schema, table),
        column = quote_ident(column),
    )
}

fn quote_from(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns() {
        let column = |data_type: &str| ColumnInfo {
            name: "c".into(),
            data_type: data_type.into(),
        };

        for numeric in ["integer", "bigint", "double precision", "numeric", "real", "smallint"] {
            assert!(column(numeric).is_numeric(), "{numeric}");
        }
        for text in ["text", "character varying", "date", "boolean", "USER-DEFINED"] {
            assert!(!column(text).is_numeric(), "{text}");
        }
    }

    #[test]
    fn distinct_values_query() {
        assert_eq!(
            distinct_values_sql("public", "trees", "spe\"cies"),
            r#"SELECT DISTINCT "spe""cies"::text FROM "public"."trees" ORDER BY 1 LIMIT 100"#
        );
    }

    #[test]
    fn table_names() {
        let table = TableInfo {
            schema: "survey".into(),
            table: "Manholes".into(),
            geom_column: "geom".into(),
            geom_type: "POINT".into(),
            srid: 27700,
        };
        assert_eq!(table.display_name(), "survey.Manholes");
        assert_eq!(table.sql(), r#"SELECT * FROM "survey"."Manholes""#);
    }
}
