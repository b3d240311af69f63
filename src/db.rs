//! Database connections shared by the SQL extractor and loaders

use eyre::{Context, Result};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::collections::HashMap;
use std::time::Duration;

/// SQL flavour, picked from the connection URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or_default().to_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Self::MySql,
            "sqlite" => Self::Sqlite,
            _ => Self::Postgres,
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Quote a possibly schema-qualified name such as `public.area`
    pub fn quote_path(&self, path: &str) -> String {
        path.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Bind placeholder for the 1-based parameter `n`
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// Bind placeholder cast to `cast` where the dialect needs it
    ///
    /// Only Postgres casts: it rejects text parameters for typed columns,
    /// while the other backends convert on their own.
    pub fn typed_placeholder(&self, n: usize, cast: Option<&str>) -> String {
        match (self, cast) {
            (Self::Postgres, Some(cast)) => format!("${}::{}", n, cast),
            _ => self.placeholder(n),
        }
    }

    /// Most bind parameters a single statement may carry
    pub fn max_bind_params(&self) -> usize {
        match self {
            Self::Sqlite => 32_766,
            Self::Postgres | Self::MySql => 65_535,
        }
    }
}

/// Open a single-connection pool for `url`
pub async fn connect(url: &str) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();

    AnyPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await
        .with_context(|| format!("Failed to connect to {}", redact(url)))
}

/// Type of each column of `table`, as a quoted `schema.type` cast target
///
/// Only filled for Postgres; other dialects get an empty map. A table name
/// without schema is looked up in the current schema.
pub async fn column_casts(
    pool: &AnyPool,
    dialect: Dialect,
    table: &str,
) -> Result<HashMap<String, String>> {
    if dialect != Dialect::Postgres {
        return Ok(HashMap::new());
    }

    let (schema, name) = match table.rsplit_once('.') {
        Some((schema, name)) => (Some(schema.to_string()), name.to_string()),
        None => (None, table.to_string()),
    };
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT column_name::text, udt_schema::text, udt_name::text \
         FROM information_schema.columns \
         WHERE table_name::text = $1 \
         AND table_schema::text = COALESCE($2, current_schema()::text)",
    )
    .bind(name)
    .bind(schema)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to read column types of {}", table))?;

    Ok(rows
        .into_iter()
        .map(|(column, type_schema, type_name)| {
            (column, cast_target(dialect, &type_schema, &type_name))
        })
        .collect())
}

fn cast_target(dialect: Dialect, type_schema: &str, type_name: &str) -> String {
    format!(
        "{}.{}",
        dialect.quote_ident(type_schema),
        dialect.quote_ident(type_name)
    )
}

/// Hide the password of a connection URL
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
