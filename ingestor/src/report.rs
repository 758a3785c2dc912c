use crate::db::Gateway;
use crate::errors::Result;
use crate::export::latest_readings;
use crate::model::{now_timestamp, Report};
use tracing::info;

/// Writes one `storage_reports` row summarising the current state: the
/// number of known devices and a JSON snapshot of their latest readings.
pub async fn generate(gateway: &mut Gateway) -> Result<Report> {
    info!("Report generation started");

    let total_devices = gateway
        .fetch_one("SELECT COUNT(*) AS total FROM devices", &[])
        .await?
        .and_then(|row| row.get("total").and_then(|v| v.as_i64()))
        .unwrap_or(0);
    info!("Devices: {}", total_devices);

    let latest = latest_readings(gateway).await?;
    let report_data = serde_json::to_string(&latest)?;
    let generated_at = now_timestamp();

    let id = gateway
        .insert_returning_id(
            "storage_reports",
            &[
                ("generated_at", generated_at.as_str().into()),
                ("total_devices", total_devices.into()),
                ("report_data", report_data.as_str().into()),
            ],
            "id",
        )
        .await?;
    info!("Report {} created: {} devices", id, total_devices);

    Ok(Report {
        id,
        generated_at,
        total_devices,
        report_data: Some(report_data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_reading;
    use crate::model::{LatestReading, ReadingPayload};
    use crate::schema;

    #[test]
    fn test_report_on_empty_database() {
        tokio_test::block_on(async {
            let mut gateway = schema::connect_ready("sqlite::memory:").await.unwrap();

            let report = generate(&mut gateway).await.unwrap();
            assert_eq!(report.total_devices, 0);
            assert_eq!(report.report_data.as_deref(), Some("[]"));
        });
    }

    #[test]
    fn test_report_counts_distinct_devices() {
        tokio_test::block_on(async {
            let mut gateway = schema::connect_ready("sqlite::memory:").await.unwrap();
            for (device_number, free_space) in [(1, 10), (1, 20), (5, 30)] {
                ingest_reading(&mut gateway, &ReadingPayload { device_number, free_space })
                    .await
                    .unwrap();
            }

            let first = generate(&mut gateway).await.unwrap();
            let second = generate(&mut gateway).await.unwrap();
            assert_eq!(first.total_devices, 2);
            assert!(second.id > first.id);

            let snapshot: Vec<LatestReading> =
                serde_json::from_str(first.report_data.as_deref().unwrap()).unwrap();
            assert_eq!(
                snapshot.iter().map(|r| (r.device_number, r.free_space)).collect::<Vec<_>>(),
                vec![(1, 20), (5, 30)]
            );

            let stored: Vec<Report> = gateway
                .fetch_all_as(
                    "SELECT id, generated_at, total_devices, report_data FROM storage_reports ORDER BY id",
                    &[],
                )
                .await
                .unwrap();
            assert_eq!(stored, vec![first, second]);
        });
    }
}
