//! Schema and sample-row dump for debugging. Output shape is not stable.

use crate::db::{identifier, Backend, Gateway, Param, Record};
use crate::errors::Result;
use crate::schema::TABLES;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: i64,
    pub sample_rows: Vec<Record>,
}

pub async fn dump(gateway: &mut Gateway, sample_rows: i64) -> Result<Vec<TableDump>> {
    let mut tables = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        tables.push(dump_table(gateway, table, sample_rows).await?);
    }
    Ok(tables)
}

async fn dump_table(gateway: &mut Gateway, table: &str, sample_rows: i64) -> Result<TableDump> {
    let table = identifier(table)?;

    let columns_sql = match gateway.backend() {
        Backend::Postgres => {
            "SELECT column_name::text AS name, data_type::text AS data_type \
             FROM information_schema.columns WHERE table_name = $1 ORDER BY ordinal_position"
        }
        Backend::Sqlite => "SELECT name, type AS data_type FROM pragma_table_info($1) ORDER BY cid",
    };
    let columns: Vec<ColumnInfo> = gateway.fetch_all_as(columns_sql, &[table.into()]).await?;

    let row_count = gateway
        .fetch_one(&format!("SELECT COUNT(*) AS row_count FROM {table}"), &[])
        .await?
        .and_then(|row| row.get("row_count").and_then(|v| v.as_i64()))
        .unwrap_or(0);

    let sample_rows = gateway
        .fetch_all(
            &format!("SELECT * FROM {table} ORDER BY 1 DESC LIMIT $1"),
            &[Param::Int(sample_rows)],
        )
        .await?;

    Ok(TableDump {
        table: table.to_string(),
        columns,
        row_count,
        sample_rows,
    })
}
