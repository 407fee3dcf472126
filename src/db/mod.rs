pub mod row;

use crate::query::{CompiledQuery, SqlParam};
use crate::utils::errors::{CrtshError, Result};
use futures::{Stream, TryStreamExt};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::Postgres;
use std::ops::ControlFlow;
use std::time::Duration;

/// Public read-only guest account on crt.sh.
pub const DEFAULT_DATABASE_URL: &str = "postgres://guest@crt.sh:5432/certwatch";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 4,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Cloneable handle to a Postgres connection pool. Fetchers receive it
/// explicitly; each query checks out its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        tracing::debug!(
            "Connecting to {} (max {} connections)",
            redact_url(&config.url),
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| {
                tracing::error!("Connection to {} failed: {e}", redact_url(&config.url));
                CrtshError::Connection(e.to_string())
            })?;

        Ok(Self { pool })
    }

    /// Run `query` and hand each scanned row to `emit`, returning the number emitted.
    ///
    /// A failing query aborts; a row that fails to scan is logged and skipped.
    /// Streaming stops early once `emit` returns `ControlFlow::Break`.
    pub async fn stream_rows<T, S, E>(
        &self,
        table: &str,
        query: &CompiledQuery,
        scan: S,
        emit: E,
    ) -> Result<usize>
    where
        S: Fn(&PgRow) -> std::result::Result<T, sqlx::Error>,
        E: FnMut(T) -> ControlFlow<()>,
    {
        tracing::debug!("{table}: {}", query.collapsed_sql());
        tracing::debug!("{table}: parameters {:?}", query.params);

        let rows = bind_params(&query.sql, &query.params).fetch(&self.pool);
        drain_rows(table, rows, scan, emit).await
    }
}

/// Scan and emit every row of `rows` until it ends or `emit` breaks.
async fn drain_rows<R, T, St, S, E>(
    table: &str,
    mut rows: St,
    scan: S,
    mut emit: E,
) -> Result<usize>
where
    St: Stream<Item = std::result::Result<R, sqlx::Error>> + Unpin,
    S: Fn(&R) -> std::result::Result<T, sqlx::Error>,
    E: FnMut(T) -> ControlFlow<()>,
{
    let mut emitted = 0;

    loop {
        let row = match rows.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("{table}: query error: {e}");
                return Err(e.into());
            }
        };

        match scan(&row) {
            Ok(item) => {
                emitted += 1;
                if emit(item).is_break() {
                    tracing::debug!("{table}: caller stopped after {emitted} rows");
                    break;
                }
            }
            Err(e) => tracing::error!("{table}: row error: {e}"),
        }
    }

    tracing::info!("{table}: streamed {emitted} rows");
    Ok(emitted)
}

/// Attach parameters in placeholder order.
pub fn bind_params<'q>(sql: &'q str, params: &'q [SqlParam]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(sql), |query, param| match param {
        SqlParam::Text(s) => query.bind(s.as_str()),
        SqlParam::Int(i) => query.bind(*i),
        SqlParam::Bool(b) => query.bind(*b),
        SqlParam::Timestamp(ts) => query.bind(*ts),
    })
}

/// Drop the password from a connection URL before logging it.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            if credentials.contains(':') {
                format!("{scheme}://{user}:***@{host}")
            } else {
                url.to_string()
            }
        }
        None => url.to_string(),
    }
}
