//! SQL query extractor

use crate::Frame;
use crate::db;
use crate::etl::{EtlContext, Extractor};
use eyre::{Context, Result};
use regex::Regex;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::LazyLock;

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap());

/// Extractor running a query against a database
///
/// The connection URL selects the backend (`postgres://`, `mysql://`,
/// `sqlite://`). The query may also be a bare table name, which reads the
/// whole table.
///
/// Numeric values are kept as the database returns them: integers stay
/// integers and floats stay floats.
///
/// # Example
/// ```no_run
/// use tabular_etl::extractors::SqlExtractor;
/// use tabular_etl::etl::{EtlContext, Extractor};
///
/// # async fn example() -> eyre::Result<()> {
/// let extractor = SqlExtractor::new(
///     "postgres://postgres@localhost:5432/opdm",
///     "select id, name, inhabitants from popolo_area order by inhabitants desc",
/// );
/// let frame = extractor.extract(&EtlContext::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqlExtractor {
    conn_url: String,
    query: String,
}

impl SqlExtractor {
    pub fn new(conn_url: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            conn_url: conn_url.into(),
            query: query.into(),
        }
    }

    /// SQL actually sent to the database
    pub fn statement(&self) -> String {
        let query = self.query.trim();
        if TABLE_NAME.is_match(query) {
            let dialect = db::Dialect::from_url(&self.conn_url);
            format!("SELECT * FROM {}", dialect.quote_path(query))
        } else {
            query.to_string()
        }
    }
}

impl Extractor for SqlExtractor {
    async fn extract(&self, ctx: &EtlContext) -> Result<Frame> {
        let statement = self.statement();
        ctx.debug(format_args!("Running query: {}", statement));

        let pool = db::connect(&self.conn_url).await?;
        let rows = sqlx::query(&statement)
            .fetch_all(&pool)
            .await
            .with_context(|| format!("Query failed: {}", statement))?;
        pool.close().await;

        rows_to_frame(&rows)
    }
}

/// Convert result rows into a frame
///
/// An empty result gives an empty frame without columns.
fn rows_to_frame(rows: &[AnyRow]) -> Result<Frame> {
    let Some(first) = rows.first() else {
        return Ok(Frame::default());
    };

    let columns: Vec<String> = first
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();

    let mut frame = Frame::new(columns);
    for row in rows {
        let cells = (0..row.columns().len())
            .map(|idx| any_value_to_json(row, idx))
            .collect::<Result<Vec<_>>>()?;
        frame.push_row(cells)?;
    }
    Ok(frame)
}

/// Convert one cell to JSON based on its runtime type
fn any_value_to_json(row: &AnyRow, idx: usize) -> Result<Value> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.column(idx).type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "SMALLINT" => Value::from(row.try_get::<i16, _>(idx)?),
        "INTEGER" => Value::from(row.try_get::<i32, _>(idx)?),
        "BIGINT" => Value::from(row.try_get::<i64, _>(idx)?),
        "REAL" => serde_json::json!(row.try_get::<f32, _>(idx)?),
        "DOUBLE" => serde_json::json!(row.try_get::<f64, _>(idx)?),
        "BLOB" => {
            let bytes: Vec<u8> = row.try_get(idx)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::String(
            row.try_get::<String, _>(idx)
                .with_context(|| format!("Unsupported column type {}", type_name))?,
        ),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_table_name_becomes_select() {
        let extractor = SqlExtractor::new("postgres://localhost/db", "popolo_area");
        assert_eq!(extractor.statement(), "SELECT * FROM \"popolo_area\"");

        let extractor = SqlExtractor::new("mysql://localhost/db", "public.area");
        assert_eq!(extractor.statement(), "SELECT * FROM `public`.`area`");

        let extractor = SqlExtractor::new("sqlite://x.db", "select 1");
        assert_eq!(extractor.statement(), "select 1");
    }

    #[tokio::test]
    async fn test_extract_from_sqlite() {
        let dir = TempDir::new().unwrap();
        let url = db::tests::sqlite_url(&dir);
        let pool = db::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE area (id INTEGER, name TEXT, ratio REAL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO area VALUES (1, 'Roma', 0.5), (2, 'Milano', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let frame = SqlExtractor::new(&url, "select id, name, ratio from area order by id")
            .extract(&EtlContext::new())
            .await
            .unwrap();

        assert_eq!(frame.columns(), &["id", "name", "ratio"]);
        assert_eq!(frame.rows()[0], vec![json!(1), json!("Roma"), json!(0.5)]);
        assert_eq!(frame.get(1, "ratio"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_empty_result() {
        let dir = TempDir::new().unwrap();
        let url = db::tests::sqlite_url(&dir);
        let pool = db::connect(&url).await.unwrap();
        sqlx::query("CREATE TABLE empty_table (id INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let frame = SqlExtractor::new(&url, "empty_table")
            .extract(&EtlContext::new())
            .await
            .unwrap();
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn test_bad_query_fails() {
        let dir = TempDir::new().unwrap();
        let url = db::tests::sqlite_url(&dir);
        let err = SqlExtractor::new(&url, "select * from nowhere where")
            .extract(&EtlContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Query failed"));
    }
}
