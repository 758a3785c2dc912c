//! Persistence gateway.
//!
//! A [`Gateway`] owns exactly one database connection for its whole
//! lifetime. Callers build it once at startup and pass it (or a lock around
//! it) to whatever needs the database. All values reach the database as
//! bound parameters; only table and column names chosen in code are spliced
//! into SQL text, and those are checked by [`identifier`] first.
//!
//! Statements use `$1, $2, ..` placeholders, which both supported backends
//! (PostgreSQL and SQLite) accept.
//!
//! Transactions are sqlx [`Transaction`]s. If a future driving the gateway
//! is dropped mid-statement, the driver rolls back whatever it had started
//! before the connection is used again.

use crate::errors::{Error, Result};
use crate::metrics::DB_FAILURES_TOTAL;
use serde_json::{Map, Value};
use sqlx::any::{install_default_drivers, AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Arguments, Column, Row, Transaction};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A row as an ordered column-name to value mapping.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "PostgreSQL" => Ok(Self::Postgres),
            "SQLite" => Ok(Self::Sqlite),
            other => Err(Error::UnsupportedBackend(other.to_string())),
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for Param {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    pub rows_affected: u64,
    /// Set by backends that report it without `RETURNING` (SQLite).
    pub last_insert_id: Option<i64>,
}

/// The connection a statement runs on: the open transaction, or the idle
/// connection checked out of the pool.
enum Handle<'a> {
    Transaction(&'a mut AnyConnection),
    Idle(PoolConnection<Any>),
}

impl Deref for Handle<'_> {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self {
            Handle::Transaction(conn) => &**conn,
            Handle::Idle(conn) => &**conn,
        }
    }
}

impl DerefMut for Handle<'_> {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self {
            Handle::Transaction(conn) => &mut **conn,
            Handle::Idle(conn) => &mut **conn,
        }
    }
}

pub struct Gateway {
    // Capped at one connection that is never recycled: an in-memory SQLite
    // database lives exactly as long as its connection.
    pool: AnyPool,
    backend: Backend,
    tx: Option<Transaction<'static, Any>>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("backend", &self.backend)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl Gateway {
    /// Opens the single connection. Failure here is fatal for every binary.
    pub async fn connect(database_url: &str) -> Result<Self> {
        install_default_drivers();

        info!("Connecting to database...");
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(10))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    // SQLite leaves foreign keys unenforced unless asked, per connection.
                    if conn.backend_name() == "SQLite" {
                        sqlx::Executor::execute(&mut *conn, "PRAGMA foreign_keys = ON").await?;
                    }
                    Ok(())
                })
            })
            .connect(database_url)
            .await
            .map_err(|e| {
                error!("Database connection failed: {}", e);
                Error::Connection(e)
            })?;

        let backend = {
            let conn = pool.acquire().await.map_err(Error::Connection)?;
            Backend::from_name(conn.backend_name())?
        };

        info!("Database connection established ({:?})", backend);
        Ok(Self {
            pool,
            backend,
            tx: None,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    async fn handle(&mut self) -> Result<Handle<'_>> {
        if let Some(tx) = self.tx.as_mut() {
            return Ok(Handle::Transaction(&mut **tx));
        }
        let conn = self.pool.acquire().await.map_err(Error::Connection)?;
        Ok(Handle::Idle(conn))
    }

    /// Executes one parameterized statement.
    pub async fn query(&mut self, sql: &str, params: &[Param]) -> Result<QueryOutcome> {
        let args = bind(params).map_err(|e| fail(sql, params, e))?;
        let mut conn = self.handle().await?;
        let done = sqlx::query_with::<Any, _>(sql, args)
            .execute(&mut *conn)
            .await
            .map_err(|e| fail(sql, params, e))?;

        debug!(
            "SQL ok: {} ({} rows)",
            abbreviate(sql),
            done.rows_affected()
        );
        Ok(QueryOutcome {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
        })
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[Param]) -> Result<Option<Record>> {
        let args = bind(params).map_err(|e| fail(sql, params, e))?;
        let mut conn = self.handle().await?;
        let row = sqlx::query_with::<Any, _>(sql, args)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| fail(sql, params, e))?;

        debug!(
            "fetch_one: {} ({})",
            abbreviate(sql),
            if row.is_some() { "found" } else { "no row" }
        );
        Ok(row.as_ref().map(to_record))
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Record>> {
        let args = bind(params).map_err(|e| fail(sql, params, e))?;
        let mut conn = self.handle().await?;
        let rows = sqlx::query_with::<Any, _>(sql, args)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| fail(sql, params, e))?;

        debug!("fetch_all: {} ({} rows)", abbreviate(sql), rows.len());
        Ok(rows.iter().map(to_record).collect())
    }

    pub async fn fetch_optional_as<T>(&mut self, sql: &str, params: &[Param]) -> Result<Option<T>>
    where
        T: for<'r> sqlx::FromRow<'r, AnyRow> + Send + Unpin,
    {
        let args = bind(params).map_err(|e| fail(sql, params, e))?;
        let mut conn = self.handle().await?;
        sqlx::query_as_with::<Any, T, _>(sql, args)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| fail(sql, params, e))
    }

    pub async fn fetch_all_as<T>(&mut self, sql: &str, params: &[Param]) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, AnyRow> + Send + Unpin,
    {
        let args = bind(params).map_err(|e| fail(sql, params, e))?;
        let mut conn = self.handle().await?;
        let rows = sqlx::query_as_with::<Any, T, _>(sql, args)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| fail(sql, params, e))?;

        debug!("fetch_all: {} ({} rows)", abbreviate(sql), rows.len());
        Ok(rows)
    }

    /// `INSERT INTO table (..) VALUES (..)`, returning the affected row count.
    pub async fn insert(&mut self, table: &str, fields: &[(&str, Param)]) -> Result<u64> {
        let sql = insert_sql(table, fields, None)?;
        let params = values(fields);
        let outcome = self.query(&sql, &params).await?;
        debug!("Inserted into {}", table);
        Ok(outcome.rows_affected)
    }

    /// Like [`Gateway::insert`] but yields the database-assigned `id_column`.
    pub async fn insert_returning_id(
        &mut self,
        table: &str,
        fields: &[(&str, Param)],
        id_column: &str,
    ) -> Result<i64> {
        let sql = insert_sql(table, fields, Some(id_column))?;
        let params = values(fields);
        let args = bind(&params).map_err(|e| fail(&sql, &params, e))?;
        let mut conn = self.handle().await?;
        let id = sqlx::query_scalar_with::<Any, i64, _>(&sql, args)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| fail(&sql, &params, e))?;

        debug!("Inserted into {}, {} {}", table, id_column, id);
        Ok(id)
    }

    /// `UPDATE table SET .. WHERE where_clause`. Placeholders in
    /// `where_clause` are written `?` and bound from `where_params`.
    pub async fn update(
        &mut self,
        table: &str,
        fields: &[(&str, Param)],
        where_clause: &str,
        where_params: &[Param],
    ) -> Result<u64> {
        let sql = update_sql(table, fields, where_clause)?;
        let mut params = values(fields);
        params.extend_from_slice(where_params);
        let outcome = self.query(&sql, &params).await?;
        debug!("Updated {}, {} rows", table, outcome.rows_affected);
        Ok(outcome.rows_affected)
    }

    /// `DELETE FROM table WHERE where_clause`, `?` placeholders as in [`Gateway::update`].
    pub async fn delete(
        &mut self,
        table: &str,
        where_clause: &str,
        where_params: &[Param],
    ) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            identifier(table)?,
            number_placeholders(where_clause, 1)
        );
        let outcome = self.query(&sql, where_params).await?;
        debug!("Deleted from {}, {} rows", table, outcome.rows_affected);
        Ok(outcome.rows_affected)
    }

    /// Runs unparameterized SQL, possibly several statements. Schema setup only.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<u64> {
        let mut conn = self.handle().await?;
        let done = sqlx::raw_sql(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| fail(sql, &[], e))?;
        Ok(done.rows_affected())
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Returns `false` without touching the database if a transaction is
    /// already open.
    pub async fn begin_transaction(&mut self) -> Result<bool> {
        if self.tx.is_some() {
            warn!("begin_transaction called while a transaction is open; ignored");
            return Ok(false);
        }
        let tx = self.pool.begin().await.map_err(|e| fail("BEGIN", &[], e))?;
        self.tx = Some(tx);
        debug!("Transaction started");
        Ok(true)
    }

    /// Returns `false` if no transaction is open. A failed commit still
    /// ends the transaction; the driver rolls it back.
    pub async fn commit(&mut self) -> Result<bool> {
        let Some(tx) = self.tx.take() else {
            warn!("commit called with no open transaction; ignored");
            return Ok(false);
        };
        tx.commit().await.map_err(|e| fail("COMMIT", &[], e))?;
        debug!("Transaction committed");
        Ok(true)
    }

    /// Returns `false` if no transaction is open.
    pub async fn rollback(&mut self) -> Result<bool> {
        let Some(tx) = self.tx.take() else {
            warn!("rollback called with no open transaction; ignored");
            return Ok(false);
        };
        tx.rollback().await.map_err(|e| fail("ROLLBACK", &[], e))?;
        warn!("Transaction rolled back");
        Ok(true)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("Gateway dropped with an open transaction; it will be rolled back");
        }
    }
}

/// Accepts plain SQL identifiers (`[A-Za-z_][A-Za-z0-9_]*`) only.
pub fn identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(Error::InvalidIdentifier(name.to_string()))
    }
}

fn bind<'q>(params: &[Param]) -> std::result::Result<AnyArguments<'q>, sqlx::Error> {
    let mut args = AnyArguments::default();
    for param in params {
        let added = match param {
            Param::Int(v) => args.add(*v),
            Param::Float(v) => args.add(*v),
            Param::Bool(v) => args.add(*v),
            Param::Text(v) => args.add(v.clone()),
        };
        added.map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

fn fail(sql: &str, params: &[Param], source: sqlx::Error) -> Error {
    DB_FAILURES_TOTAL.inc();
    error!(
        "SQL error: {}\nSQL: {}\nParams: {:?}",
        source,
        one_line(sql),
        params
    );
    Error::Query {
        sql: sql.to_string(),
        source,
    }
}

fn values(fields: &[(&str, Param)]) -> Vec<Param> {
    fields.iter().map(|(_, value)| value.clone()).collect()
}

fn insert_sql(table: &str, fields: &[(&str, Param)], returning: Option<&str>) -> Result<String> {
    if fields.is_empty() {
        return Err(Error::EmptyFields(table.to_string()));
    }
    let columns = fields
        .iter()
        .map(|(column, _)| identifier(column))
        .collect::<Result<Vec<_>>>()?;
    let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("${i}")).collect();

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        identifier(table)?,
        columns.join(", "),
        placeholders.join(", ")
    );
    if let Some(column) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(identifier(column)?);
    }
    Ok(sql)
}

fn update_sql(table: &str, fields: &[(&str, Param)], where_clause: &str) -> Result<String> {
    if fields.is_empty() {
        return Err(Error::EmptyFields(table.to_string()));
    }
    let assignments = fields
        .iter()
        .enumerate()
        .map(|(i, (column, _))| Ok(format!("{} = ${}", identifier(column)?, i + 1)))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        identifier(table)?,
        assignments.join(", "),
        number_placeholders(where_clause, fields.len() + 1)
    ))
}

/// Rewrites each `?` as `$n`, counting up from `first`.
fn number_placeholders(clause: &str, first: usize) -> String {
    let mut out = String::with_capacity(clause.len() + 4);
    let mut next = first;
    for ch in clause.chars() {
        if ch == '?' {
            out.push('$');
            out.push_str(&next.to_string());
            next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

fn to_record(row: &AnyRow) -> Record {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column.ordinal())))
        .collect()
}

fn column_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    Value::Null
}

fn one_line(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn abbreviate(sql: &str) -> String {
    const MAX: usize = 100;
    let line = one_line(sql);
    match line.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line,
    }
}
