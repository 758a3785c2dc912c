use crate::db::Gateway;
use crate::envelope::bytes_to_gb;
use crate::errors::Result;
use crate::model::LatestReading;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::ops::RangeInclusive;

const LATEST_READINGS_SQL: &str = r#"
    SELECT s.device_number, s.free_space, s.created_at
    FROM storage_data s
    WHERE s.id = (
        SELECT s2.id
        FROM storage_data s2
        WHERE s2.device_number = s.device_number
        ORDER BY s2.created_at DESC, s2.id DESC
        LIMIT 1
    )
    ORDER BY s.device_number
"#;

/// Newest reading per device, ordered by device number. Readings with the
/// same timestamp resolve to the one inserted last.
pub async fn latest_readings(gateway: &mut Gateway) -> Result<Vec<LatestReading>> {
    gateway.fetch_all_as(LATEST_READINGS_SQL, &[]).await
}

/// Renders the flat text export: a title, a separator, a column header and
/// one line per device number in `devices`. Devices without a reading get
/// `-` placeholders.
pub fn render(readings: &[LatestReading], devices: RangeInclusive<i64>, generated_at: &str) -> String {
    let by_device: BTreeMap<i64, &LatestReading> =
        readings.iter().map(|r| (r.device_number, r)).collect();

    let mut out = String::new();
    let _ = writeln!(out, "Storage Monitor data export - {}", generated_at);
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "device_number,free_space_gb,updated_at");

    for device_number in devices {
        match by_device.get(&device_number) {
            Some(reading) => {
                let _ = writeln!(
                    out,
                    "{:02},{},{}",
                    device_number,
                    format_gb(bytes_to_gb(reading.free_space)),
                    reading.created_at
                );
            }
            None => {
                let _ = writeln!(out, "{:02},-,-", device_number);
            }
        }
    }
    out
}

/// Always shows at least one decimal: `5.0`, `5.37`.
pub fn format_gb(gb: f64) -> String {
    if gb.fract() == 0.0 {
        format!("{:.1}", gb)
    } else {
        format!("{}", gb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_reading;
    use crate::model::ReadingPayload;
    use crate::schema;

    fn reading(device_number: i64, free_space: i64, created_at: &str) -> LatestReading {
        LatestReading {
            device_number,
            free_space,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_format_gb() {
        assert_eq!(format_gb(5.0), "5.0");
        assert_eq!(format_gb(5.37), "5.37");
        assert_eq!(format_gb(0.0), "0.0");
        assert_eq!(format_gb(120.5), "120.5");
    }

    #[test]
    fn test_render_fills_gaps_with_placeholders() {
        let readings = vec![
            reading(2, 5_368_709_120, "2026-10-16 09:00:00"),
            reading(4, 1_610_612_736, "2026-10-16 09:05:00"),
        ];
        let text = render(&readings, 1..=4, "2026-10-16 10:00:00");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Storage Monitor data export - 2026-10-16 10:00:00");
        assert_eq!(lines[1], "-".repeat(40));
        assert_eq!(lines[2], "device_number,free_space_gb,updated_at");
        assert_eq!(
            &lines[3..],
            &[
                "01,-,-",
                "02,5.0,2026-10-16 09:00:00",
                "03,-,-",
                "04,1.5,2026-10-16 09:05:00",
            ]
        );
    }

    #[test]
    fn test_render_ignores_devices_outside_range() {
        let readings = vec![reading(41, 1, "2026-10-16 09:00:00")];
        let text = render(&readings, 1..=40, "now");
        assert!(!text.contains("41,"));
        assert_eq!(text.lines().count(), 43);
    }

    #[tokio::test]
    async fn test_latest_reading_wins() {
        let mut gateway = schema::connect_ready("sqlite::memory:").await.unwrap();
        gateway
            .insert("devices", &[("device_number", 7.into())])
            .await
            .unwrap();
        for (free_space, created_at) in [
            (100, "2026-10-16 08:00:00"),
            (300, "2026-10-16 09:00:00"),
            (200, "2026-10-16 07:00:00"),
        ] {
            gateway
                .insert(
                    "storage_data",
                    &[
                        ("device_number", 7.into()),
                        ("free_space", free_space.into()),
                        ("created_at", created_at.into()),
                    ],
                )
                .await
                .unwrap();
        }

        let latest = latest_readings(&mut gateway).await.unwrap();
        assert_eq!(latest, vec![reading(7, 300, "2026-10-16 09:00:00")]);
    }

    #[tokio::test]
    async fn test_same_timestamp_resolves_to_last_insert() {
        let mut gateway = schema::connect_ready("sqlite::memory:").await.unwrap();
        for free_space in [10, 20] {
            ingest_reading(
                &mut gateway,
                &ReadingPayload {
                    device_number: 1,
                    free_space,
                },
            )
            .await
            .unwrap();
        }
        gateway
            .update("storage_data", &[("created_at", "2026-10-16 12:00:00".into())], "1 = 1", &[])
            .await
            .unwrap();

        let latest = latest_readings(&mut gateway).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].free_space, 20);
    }

    #[tokio::test]
    async fn test_ingested_device_appears_in_export() {
        let mut gateway = schema::connect_ready("sqlite::memory:").await.unwrap();
        let receipt = ingest_reading(
            &mut gateway,
            &ReadingPayload {
                device_number: 7,
                free_space: 5_368_709_120,
            },
        )
        .await
        .unwrap();

        let latest = latest_readings(&mut gateway).await.unwrap();
        let text = render(&latest, 1..=40, "now");
        assert!(text.contains(&format!("07,5.0,{}", receipt.recorded_at)));
        assert!(text.contains("06,-,-"));
    }
}
