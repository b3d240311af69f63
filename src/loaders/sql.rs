//! Database table loaders

use crate::db::{self, Dialect};
use crate::etl::{EtlContext, Loader};
use crate::{Dataset, Frame};
use eyre::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::any::AnyArguments;
use sqlx::query::Query;
use sqlx::{Any, AnyPool};

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// What a SQL loader does when a statement fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the error, stop loading and report the rows loaded so far
    #[default]
    Abort,
    /// Return the error to the caller
    Propagate,
}

impl FailurePolicy {
    /// Apply the policy to a failed step
    fn handle(self, ctx: &EtlContext, err: eyre::Report) -> Result<()> {
        match self {
            Self::Abort => {
                ctx.error(format_args!("{:#}", err));
                ctx.error("Loading aborted.");
                Ok(())
            }
            Self::Propagate => Err(err),
        }
    }
}

fn bind_value<'q>(query: AnyQuery<'q>, value: &Value) -> AnyQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => query.bind(i),
            (None, Some(f)) => query.bind(f),
            (None, None) => query.bind(n.to_string()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Cast target per frame column, in column order
async fn casts_for(
    pool: &AnyPool,
    dialect: Dialect,
    table: &str,
    columns: &[String],
) -> Result<Vec<Option<String>>> {
    let mut types = db::column_casts(pool, dialect, table).await?;
    Ok(columns.iter().map(|c| types.remove(c)).collect())
}

fn column_list(dialect: Dialect, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inserts rows in chunks, each chunk in one transaction
///
/// Within a chunk, rows are sent `batch_size` at a time as multi-row
/// `INSERT` statements. The batch size is lowered when the backend could
/// not bind that many parameters.
///
/// On Postgres every parameter is cast to the type of its column, read from
/// `information_schema.columns`, so text cells load into typed columns as
/// long as they are valid input for that type.
///
/// # Example
/// ```no_run
/// use tabular_etl::loaders::{BulkInsertLoader, FailurePolicy};
///
/// let loader = BulkInsertLoader::new("postgres://localhost/opdm", "popolo_area")
///     .chunk_size(5000)
///     .on_failure(FailurePolicy::Propagate);
/// ```
#[derive(Debug, Clone)]
pub struct BulkInsertLoader {
    conn_url: String,
    table: String,
    chunk_size: usize,
    batch_size: usize,
    on_failure: FailurePolicy,
}

impl BulkInsertLoader {
    pub fn new(conn_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            conn_url: conn_url.into(),
            table: table.into(),
            chunk_size: 10_000,
            batch_size: 1_000,
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Rows per statement for a frame of `width` columns
    fn effective_batch(&self, dialect: Dialect, width: usize) -> usize {
        let cap = dialect.max_bind_params() / width.max(1);
        self.batch_size.min(cap).max(1)
    }

    async fn insert_chunk(
        &self,
        pool: &AnyPool,
        dialect: Dialect,
        columns: &[String],
        casts: &[Option<String>],
        rows: &[Vec<Value>],
        batch: usize,
    ) -> Result<usize> {
        let prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            dialect.quote_path(&self.table),
            column_list(dialect, columns)
        );

        let mut tx = pool.begin().await?;
        for rows in rows.chunks(batch) {
            let mut n = 0;
            let tuples: Vec<String> = rows
                .iter()
                .map(|row| {
                    let params: Vec<String> = (0..row.len())
                        .map(|j| {
                            n += 1;
                            dialect.typed_placeholder(n, casts[j].as_deref())
                        })
                        .collect();
                    format!("({})", params.join(", "))
                })
                .collect();
            let sql = format!("{}{}", prefix, tuples.join(", "));

            let mut query = sqlx::query(&sql);
            for value in rows.iter().flatten() {
                query = bind_value(query, value);
            }
            query
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to insert into {}", self.table))?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }
}

impl Loader for BulkInsertLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        let frame = data.single()?;
        ctx.info("Loading data with bulk inserts...");
        if frame.is_empty() || frame.columns().is_empty() {
            ctx.info("Nothing to load");
            return Ok(0);
        }

        let dialect = Dialect::from_url(&self.conn_url);
        let batch = self.effective_batch(dialect, frame.columns().len());
        ctx.debug(format_args!(
            "Importing {} records with chunk size {} and batch size {}",
            frame.len(),
            self.chunk_size,
            batch
        ));

        let pool = db::connect(&self.conn_url).await?;
        let casts = casts_for(&pool, dialect, &self.table, frame.columns()).await?;
        let total = frame.len();
        let mut loaded = 0;
        for chunk in frame.rows().chunks(self.chunk_size) {
            match self
                .insert_chunk(&pool, dialect, frame.columns(), &casts, chunk, batch)
                .await
            {
                Ok(n) => {
                    loaded += n;
                    ctx.info(format_args!("{}/{}", loaded, total));
                }
                Err(e) => {
                    self.on_failure.handle(ctx, e)?;
                    pool.close().await;
                    return Ok(loaded);
                }
            }
        }
        pool.close().await;

        ctx.info(format_args!(
            "Successfully imported {} records into {} table",
            loaded, self.table
        ));
        Ok(loaded)
    }
}

/// Updates matching rows or inserts new ones, row by row
///
/// Columns listed in `update_fields` are the values to write; all other
/// columns identify the row. A row with a null lookup value matches
/// `IS NULL`. When the lookup matches more than one stored row, nothing is
/// written for that row and the failure policy applies. Parameters are cast
/// to the column types on Postgres, as in [`BulkInsertLoader`].
///
/// # Example
/// ```no_run
/// use tabular_etl::loaders::UpsertLoader;
///
/// let loader = UpsertLoader::new("sqlite://data.db", "persone")
///     .update_fields(["email", "phone"]);
/// ```
#[derive(Debug, Clone)]
pub struct UpsertLoader {
    conn_url: String,
    table: String,
    update_fields: Vec<String>,
    on_failure: FailurePolicy,
}

/// Outcome of a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upserted {
    Created,
    Updated,
}

impl UpsertLoader {
    pub fn new(conn_url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            conn_url: conn_url.into(),
            table: table.into(),
            update_fields: Vec::new(),
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn update_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Split column positions into (values to write, lookup)
    fn split_columns(&self, frame: &Frame) -> (Vec<usize>, Vec<usize>) {
        (0..frame.columns().len()).partition(|&i| self.update_fields.contains(&frame.columns()[i]))
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_row(
        &self,
        pool: &AnyPool,
        dialect: Dialect,
        columns: &[String],
        casts: &[Option<String>],
        row: &[Value],
        defaults: &[usize],
        lookup: &[usize],
    ) -> Result<Upserted> {
        let table = dialect.quote_path(&self.table);
        let mut n = 0;
        let mut where_binds = Vec::new();
        let conditions: Vec<String> = lookup
            .iter()
            .map(|&i| {
                let column = dialect.quote_ident(&columns[i]);
                if row[i].is_null() {
                    format!("{} IS NULL", column)
                } else {
                    where_binds.push(&row[i]);
                    n += 1;
                    format!("{} = {}", column, dialect.typed_placeholder(n, casts[i].as_deref()))
                }
            })
            .collect();
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for value in &where_binds {
            count_query = match value {
                Value::Bool(b) => count_query.bind(*b),
                Value::Number(num) => match num.as_i64() {
                    Some(i) => count_query.bind(i),
                    None => count_query.bind(num.as_f64().unwrap_or_default()),
                },
                Value::String(s) => count_query.bind(s.clone()),
                other => count_query.bind(other.to_string()),
            };
        }
        let existing = count_query.fetch_one(pool).await?;
        if existing > 1 {
            bail!(
                "{} rows of {} match the lookup columns, expected at most one",
                existing,
                self.table
            );
        }

        if existing == 1 {
            if !defaults.is_empty() {
                let mut n = 0;
                let assignments: Vec<String> = defaults
                    .iter()
                    .map(|&i| {
                        n += 1;
                        format!(
                            "{} = {}",
                            dialect.quote_ident(&columns[i]),
                            dialect.typed_placeholder(n, casts[i].as_deref())
                        )
                    })
                    .collect();
                // lookup placeholders continue after the assignments
                let mut m = n;
                let conditions: Vec<String> = lookup
                    .iter()
                    .map(|&i| {
                        let column = dialect.quote_ident(&columns[i]);
                        if row[i].is_null() {
                            format!("{} IS NULL", column)
                        } else {
                            m += 1;
                            format!("{} = {}", column, dialect.typed_placeholder(m, casts[i].as_deref()))
                        }
                    })
                    .collect();
                let sql = format!(
                    "UPDATE {} SET {} WHERE {}",
                    table,
                    assignments.join(", "),
                    conditions.join(" AND ")
                );

                let mut query = sqlx::query(&sql);
                for &i in defaults {
                    query = bind_value(query, &row[i]);
                }
                for value in &where_binds {
                    query = bind_value(query, value);
                }
                query.execute(pool).await?;
            }
            Ok(Upserted::Updated)
        } else {
            let placeholders: Vec<String> = (0..columns.len())
                .map(|i| dialect.typed_placeholder(i + 1, casts[i].as_deref()))
                .collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                column_list(dialect, columns),
                placeholders.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for value in row {
                query = bind_value(query, value);
            }
            query.execute(pool).await?;
            Ok(Upserted::Created)
        }
    }
}

impl Loader for UpsertLoader {
    async fn load(&self, ctx: &EtlContext, data: &Dataset) -> Result<usize> {
        let frame = data.single()?;
        ctx.info("Loading data with updates or inserts...");
        if frame.is_empty() {
            return Ok(0);
        }

        let (defaults, lookup) = self.split_columns(&frame);
        if lookup.is_empty() {
            bail!(
                "Every column of the frame is an update field, no column is left to match rows in {}",
                self.table
            );
        }
        ctx.debug(format_args!("Attempting to import {} records", frame.len()));

        let dialect = Dialect::from_url(&self.conn_url);
        let pool = db::connect(&self.conn_url).await?;
        let casts = casts_for(&pool, dialect, &self.table, frame.columns()).await?;
        let (mut created, mut updated) = (0, 0);

        for row in frame.rows() {
            let outcome = self
                .upsert_row(&pool, dialect, frame.columns(), &casts, row, &defaults, &lookup)
                .await
                .with_context(|| format!("Failed to upsert into {}", self.table));
            match outcome {
                Ok(Upserted::Created) => created += 1,
                Ok(Upserted::Updated) => updated += 1,
                Err(e) => {
                    self.on_failure.handle(ctx, e)?;
                    break;
                }
            }
        }
        pool.close().await;

        if created > 0 {
            ctx.info(format_args!("Created {} records into {} table", created, self.table));
        }
        if updated > 0 {
            ctx.info(format_args!("Updated {} records into {} table", updated, self.table));
        }
        Ok(created + updated)
    }
}
