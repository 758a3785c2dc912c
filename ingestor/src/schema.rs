//! Table definitions for `devices`, `storage_data` and `storage_reports`.
//!
//! Timestamps are `TEXT` in `YYYY-MM-DD HH:MM:SS` form on both backends.

use crate::db::{Backend, Gateway};
use crate::errors::{Error, Result};
use tracing::info;

pub const TABLES: [&str; 3] = ["devices", "storage_data", "storage_reports"];

const POSTGRES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    device_number BIGINT PRIMARY KEY,
    last_update TEXT
);
CREATE TABLE IF NOT EXISTS storage_data (
    id BIGSERIAL PRIMARY KEY,
    device_number BIGINT NOT NULL REFERENCES devices (device_number),
    free_space BIGINT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS storage_reports (
    id BIGSERIAL PRIMARY KEY,
    generated_at TEXT NOT NULL,
    total_devices BIGINT NOT NULL,
    report_data TEXT
);
CREATE INDEX IF NOT EXISTS idx_storage_data_device_number ON storage_data (device_number);
CREATE INDEX IF NOT EXISTS idx_storage_data_created_at ON storage_data (created_at);
"#;

const SQLITE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    device_number INTEGER PRIMARY KEY,
    last_update TEXT
);
CREATE TABLE IF NOT EXISTS storage_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_number INTEGER NOT NULL REFERENCES devices (device_number),
    free_space INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS storage_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_at TEXT NOT NULL,
    total_devices INTEGER NOT NULL,
    report_data TEXT
);
CREATE INDEX IF NOT EXISTS idx_storage_data_device_number ON storage_data (device_number);
CREATE INDEX IF NOT EXISTS idx_storage_data_created_at ON storage_data (created_at);
"#;

// Children first so the foreign key never blocks a drop.
const DROP_ALL: &str = r#"
DROP TABLE IF EXISTS storage_data;
DROP TABLE IF EXISTS storage_reports;
DROP TABLE IF EXISTS devices;
"#;

fn ddl(backend: Backend) -> &'static str {
    match backend {
        Backend::Postgres => POSTGRES_DDL,
        Backend::Sqlite => SQLITE_DDL,
    }
}

/// Creates any missing table or index. Safe to run on every startup.
pub async fn ensure(gateway: &mut Gateway) -> Result<()> {
    info!("Ensuring database schema...");
    let backend = gateway.backend();
    gateway.execute_batch(ddl(backend)).await?;
    info!("Schema ready");
    Ok(())
}

/// Drops every table and recreates them empty, in one transaction.
pub async fn reset(gateway: &mut Gateway) -> Result<()> {
    if !gateway.begin_transaction().await? {
        return Err(Error::Transaction("schema reset needs its own transaction"));
    }

    let result = recreate(gateway).await;

    match result {
        Ok(()) => {
            gateway.commit().await?;
            info!("Database initialized");
            Ok(())
        }
        Err(e) => {
            if gateway.in_transaction() {
                gateway.rollback().await?;
            }
            Err(e)
        }
    }
}

async fn recreate(gateway: &mut Gateway) -> Result<()> {
    let backend = gateway.backend();
    info!("Dropping tables");
    gateway.execute_batch(DROP_ALL).await?;
    info!("Creating tables and indexes");
    gateway.execute_batch(ddl(backend)).await?;
    Ok(())
}

/// Opens the gateway and makes sure the schema exists.
pub async fn connect_ready(database_url: &str) -> Result<Gateway> {
    let mut gateway = Gateway::connect(database_url).await?;
    ensure(&mut gateway).await?;
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_count(gateway: &mut Gateway) -> usize {
        gateway
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('devices', 'storage_data', 'storage_reports')",
                &[],
            )
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let mut gateway = connect_ready("sqlite::memory:").await.unwrap();
        ensure(&mut gateway).await.unwrap();
        assert_eq!(table_count(&mut gateway).await, 3);
    }

    #[tokio::test]
    async fn test_reset_empties_tables() {
        let mut gateway = connect_ready("sqlite::memory:").await.unwrap();
        gateway
            .insert("devices", &[("device_number", 1.into()), ("last_update", "2026-10-16 08:00:00".into())])
            .await
            .unwrap();

        reset(&mut gateway).await.unwrap();

        assert!(!gateway.in_transaction());
        assert_eq!(table_count(&mut gateway).await, 3);
        let rows = gateway.fetch_all("SELECT * FROM devices", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_readings_require_a_device() {
        let mut gateway = connect_ready("sqlite::memory:").await.unwrap();
        let result = gateway
            .insert(
                "storage_data",
                &[
                    ("device_number", 99.into()),
                    ("free_space", 1.into()),
                    ("created_at", "2026-10-16 08:00:00".into()),
                ],
            )
            .await;
        assert!(result.is_err());
    }
}
