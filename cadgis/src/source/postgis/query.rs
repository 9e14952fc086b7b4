//! SQL text construction and validation.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use cadgis_types::crs::Transform;

use super::catalog::{ColumnInfo, TableInfo};
use crate::error::CadgisError;

/// Quotes an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Query that reads a whole table.
pub fn table_query(schema: &str, table: &str) -> String {
    format!("SELECT * FROM {}.{}", quote_ident(schema), quote_ident(table))
}

/// Checks a query written by the operator.
///
/// The query must be a single `SELECT` statement that mentions the geometry column.
pub fn validate_sql(sql: &str, geom_column: &str) -> Result<(), CadgisError> {
    let normalized = sql.trim().to_lowercase();
    if !normalized.starts_with("select") {
        return Err(CadgisError::Query("only SELECT statements are allowed".into()));
    }
    if normalized.contains(';') {
        return Err(CadgisError::Query("multiple statements are not allowed".into()));
    }
    if !normalized.contains(&geom_column.to_lowercase()) {
        return Err(CadgisError::Query(format!(
            "the query must include the geometry column '{geom_column}'"
        )));
    }

    Ok(())
}

/// Comparison operator of a [`Condition`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `LIKE`, matching the value anywhere in the text.
    Like,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Like => "LIKE",
        }
    }
}

impl FromStr for Operator {
    type Err = CadgisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "=" => Self::Eq,
            "<>" | "!=" => Self::NotEq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            like if like.eq_ignore_ascii_case("like") => Self::Like,
            other => {
                return Err(CadgisError::Query(format!("unknown operator '{other}'")));
            }
        })
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Attribute filter of a [`TableQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Operator.
    pub operator: Operator,
    /// Value as the operator typed it.
    pub value: String,
}

impl Condition {
    /// Creates a condition.
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// SQL of the condition. Values of numeric columns are not quoted, except for `LIKE`.
    fn to_sql(&self, numeric: bool) -> Option<String> {
        let value = self.value.trim();
        if value.is_empty() {
            return None;
        }

        let escaped = value.replace('\'', "''");
        let literal = match (self.operator, numeric) {
            (Operator::Like, _) => format!("'%{escaped}%'"),
            (_, true) => escaped,
            (_, false) => format!("'{escaped}'"),
        };

        Some(format!(
            "{} {} {literal}",
            quote_ident(&self.column),
            self.operator
        ))
    }
}

/// Parses `column operator value`, e.g. `status = active` or `name LIKE oak`.
impl FromStr for Condition {
    type Err = CadgisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, char::is_whitespace);
        let (Some(column), Some(operator), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CadgisError::Query(format!(
                "condition '{s}' must have the form 'column operator value'"
            )));
        };

        Ok(Self::new(column, operator.parse()?, value.trim()))
    }
}

/// Rectangle in the coordinates of some system.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Extent {
    /// Minimum x.
    pub xmin: f64,
    /// Minimum y.
    pub ymin: f64,
    /// Maximum x.
    pub xmax: f64,
    /// Maximum y.
    pub ymax: f64,
}

impl Extent {
    /// Creates an extent from two corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            xmin: x1.min(x2),
            ymin: y1.min(y2),
            xmax: x1.max(x2),
            ymax: y1.max(y2),
        }
    }

    /// Transforms the corners of the extent and returns the extent of the transformed corners.
    pub fn transformed(&self, transform: &Transform) -> Result<Self, CadgisError> {
        let (x1, y1) = transform.apply(self.xmin, self.ymin)?;
        let (x2, y2) = transform.apply(self.xmax, self.ymax)?;
        Ok(Self::new(x1, y1, x2, y2))
    }

    fn envelope(&self, srid: i32) -> String {
        format!(
            "ST_MakeEnvelope({}, {}, {}, {}, {srid})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

impl FromStr for Extent {
    type Err = CadgisError;

    /// Parses `xmin,ymin,xmax,ymax`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| CadgisError::Query(format!("invalid extent '{s}': {err}")))?;

        match values.as_slice() {
            [x1, y1, x2, y2] => Ok(Self::new(*x1, *y1, *x2, *y2)),
            _ => Err(CadgisError::Query(format!(
                "extent '{s}' must have 4 values"
            ))),
        }
    }
}

/// Builder of the query of an "import by query": selected fields, conditions and an optional
/// extent filter.
#[derive(Debug, Clone)]
pub struct TableQuery {
    table: TableInfo,
    columns: Vec<ColumnInfo>,
    fields: Option<Vec<String>>,
    conditions: Vec<Condition>,
    extent: Option<Extent>,
}

impl TableQuery {
    /// Query of all the columns of the table.
    pub fn new(table: TableInfo, columns: Vec<ColumnInfo>) -> Self {
        Self {
            table,
            columns,
            fields: None,
            conditions: vec![],
            extent: None,
        }
    }

    /// Selects only the given fields. The geometry column is always selected.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a condition. Conditions are combined with `AND`; conditions with an empty value are
    /// ignored.
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Limits the result to the extent, given in the coordinates of the table. Geometries are
    /// clipped to the extent.
    pub fn extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    /// Table the query reads.
    pub fn table(&self) -> &TableInfo {
        &self.table
    }

    /// Builds the SQL text. Fails if a field or a condition names a column the table does not
    /// have.
    pub fn to_sql(&self) -> Result<String, CadgisError> {
        let geom_column = &self.table.geom_column;
        let envelope = self.extent.map(|extent| extent.envelope(self.table.srid));

        let mut select: Vec<String> = match &self.fields {
            Some(fields) => fields
                .iter()
                .filter(|field| !field.eq_ignore_ascii_case(geom_column))
                .map(|field| self.column(field).map(|c| quote_ident(&c.name)))
                .collect::<Result<_, _>>()?,
            None => self
                .columns
                .iter()
                .filter(|c| !c.name.eq_ignore_ascii_case(geom_column))
                .map(|c| quote_ident(&c.name))
                .collect(),
        };
        let geom = quote_ident(geom_column);
        select.push(match &envelope {
            Some(envelope) => format!("ST_Intersection({geom}, {envelope}) AS {geom}"),
            None => geom.clone(),
        });

        let mut clauses = vec![];
        for condition in &self.conditions {
            let column = self.column(&condition.column)?;
            let condition = Condition {
                column: column.name.clone(),
                ..condition.clone()
            };
            clauses.extend(condition.to_sql(column.is_numeric()));
        }
        if let Some(envelope) = &envelope {
            clauses.push(format!("{geom} && {envelope}"));
        }

        let mut sql = format!(
            "SELECT {} FROM {}.{}",
            select.join(", "),
            quote_ident(&self.table.schema),
            quote_ident(&self.table.table)
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        Ok(sql)
    }

    fn column(&self, name: &str) -> Result<&ColumnInfo, CadgisError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| {
                CadgisError::Query(format!(
                    "table {} has no column '{name}'",
                    self.table.display_name()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use cadgis_types::crs::CrsRegistry;

    use super::*;

    fn table() -> TableInfo {
        TableInfo {
            schema: "public".into(),
            table: "trees".into(),
            geom_column: "geom".into(),
            geom_type: "POINT".into(),
            srid: 27700,
        }
    }

    fn columns() -> Vec<ColumnInfo> {
        [
            ("id", "integer"),
            ("species", "character varying"),
            ("height", "double precision"),
            ("geom", "USER-DEFINED"),
        ]
        .into_iter()
        .map(|(name, data_type)| ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
        })
        .collect()
    }

    #[test]
    fn all_columns() {
        let sql = TableQuery::new(table(), columns()).to_sql().expect("sql");
        assert_eq!(
            sql,
            r#"SELECT "id", "species", "height", "geom" FROM "public"."trees""#
        );
    }

    #[test]
    fn fields_and_conditions() {
        let sql = TableQuery::new(table(), columns())
            .fields(["species", "geom"])
            .condition(Condition::new("height", Operator::Ge, "12.5"))
            .condition(Condition::new("species", Operator::Eq, "Hawthorn's"))
            .condition(Condition::new("species", Operator::Like, "oak"))
            .condition(Condition::new("id", Operator::Eq, "  "))
            .to_sql()
            .expect("sql");

        assert_eq!(
            sql,
            r#"SELECT "species", "geom" FROM "public"."trees" WHERE "height" >= 12.5 AND "species" = 'Hawthorn''s' AND "species" LIKE '%oak%'"#
        );
    }

    #[test]
    fn extent_clips_geometries() {
        let sql = TableQuery::new(table(), columns())
            .fields(["id"])
            .extent(Extent::new(10.0, 20.0, 0.0, 5.0))
            .to_sql()
            .expect("sql");

        let envelope = "ST_MakeEnvelope(0, 5, 10, 20, 27700)";
        assert_eq!(
            sql,
            format!(
                r#"SELECT "id", ST_Intersection("geom", {envelope}) AS "geom" FROM "public"."trees" WHERE "geom" && {envelope}"#
            )
        );
    }

    #[test]
    fn unknown_column() {
        let result = TableQuery::new(table(), columns())
            .condition(Condition::new("age", Operator::Eq, "3"))
            .to_sql();
        assert_matches!(result, Err(CadgisError::Query(msg)) if msg.contains("age"));
    }

    #[test]
    fn sql_validation() {
        assert!(validate_sql("SELECT * FROM roads WHERE geom IS NOT NULL", "geom").is_ok());
        assert!(validate_sql("  select GEOM from roads", "geom").is_ok());
        assert_matches!(
            validate_sql("DELETE FROM roads", "geom"),
            Err(CadgisError::Query(_))
        );
        assert_matches!(
            validate_sql("SELECT geom FROM roads; DROP TABLE roads", "geom"),
            Err(CadgisError::Query(_))
        );
        assert_matches!(
            validate_sql("SELECT id FROM roads", "geom"),
            Err(CadgisError::Query(msg)) if msg.contains("geom")
        );
    }

    #[test]
    fn parse_conditions() {
        assert_eq!(
            "species LIKE red oak".parse::<Condition>().ok(),
            Some(Condition::new("species", Operator::Like, "red oak"))
        );
        assert_eq!(
            "height != 3".parse::<Condition>().ok(),
            Some(Condition::new("height", Operator::NotEq, "3"))
        );
        assert!("height ~ 3".parse::<Condition>().is_err());
        assert!("height".parse::<Condition>().is_err());
    }

    #[test]
    fn extent_is_transformed() {
        let registry = CrsRegistry::with_builtin();
        let transform = registry.transform(27700, 4326).expect("transform");
        let extent = Extent::new(530000.0, 180000.0, 531000.0, 181000.0)
            .transformed(&transform)
            .expect("transformed");

        assert!(extent.xmin < extent.xmax && extent.ymin < extent.ymax);
        assert!((-0.2..0.0).contains(&extent.xmin));
        assert!((51.4..51.6).contains(&extent.ymin));

        assert_eq!("1,2,3,4".parse::<Extent>().ok(), Some(Extent::new(1.0, 2.0, 3.0, 4.0)));
        assert!("1,2,3".parse::<Extent>().is_err());
    }
}
