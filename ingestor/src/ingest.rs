use crate::db::{Gateway, Param};
use crate::envelope::bytes_to_gb;
use crate::errors::{Error, Result};
use crate::metrics::NEW_DEVICES_TOTAL;
use crate::model::{now_timestamp, IngestReceipt, ReadingPayload};
use tracing::{debug, error, info, warn};

/// Stores one reading: upserts the device row and appends a `storage_data`
/// row, both in a single transaction. Either both writes are committed or
/// neither is.
pub async fn ingest_reading(gateway: &mut Gateway, reading: &ReadingPayload) -> Result<IngestReceipt> {
    let recorded_at = now_timestamp();

    if gateway.in_transaction() {
        // Callers hold the gateway exclusively, so an open transaction here
        // was abandoned by a request that never finished.
        warn!("Discarding a transaction left open by an interrupted request");
        if let Err(e) = gateway.rollback().await {
            error!("Rollback of abandoned transaction failed: {}", e);
        }
    }
    if !gateway.begin_transaction().await? {
        return Err(Error::Transaction("could not open a transaction"));
    }
    debug!("Processing reading for device {}", reading.device_number);

    let result = write_reading(gateway, reading, &recorded_at).await;
    let committed = match result {
        Ok(()) => gateway.commit().await.map(|_| ()),
        Err(e) => Err(e),
    };

    if let Err(e) = committed {
        if gateway.in_transaction() {
            if let Err(rollback_err) = gateway.rollback().await {
                error!("Rollback failed: {}", rollback_err);
            }
        }
        return Err(e);
    }

    info!(
        "Stored reading: device {}, free space {}",
        reading.device_number, reading.free_space
    );
    Ok(IngestReceipt {
        device_number: reading.device_number,
        free_space_gb: bytes_to_gb(reading.free_space),
        recorded_at,
    })
}

async fn write_reading(gateway: &mut Gateway, reading: &ReadingPayload, recorded_at: &str) -> Result<()> {
    let device_number = Param::Int(reading.device_number);

    let existing = gateway
        .fetch_one(
            "SELECT device_number FROM devices WHERE device_number = $1",
            &[device_number.clone()],
        )
        .await?;

    if existing.is_some() {
        debug!("Updating device {}", reading.device_number);
        gateway
            .update(
                "devices",
                &[("last_update", recorded_at.into())],
                "device_number = ?",
                &[device_number.clone()],
            )
            .await?;
    } else {
        info!("Registering new device {}", reading.device_number);
        gateway
            .insert(
                "devices",
                &[
                    ("device_number", device_number.clone()),
                    ("last_update", recorded_at.into()),
                ],
            )
            .await?;
        NEW_DEVICES_TOTAL.inc();
    }

    // History is kept: every reading is a new row.
    gateway
        .insert(
            "storage_data",
            &[
                ("device_number", device_number),
                ("free_space", reading.free_space.into()),
                ("created_at", recorded_at.into()),
            ],
        )
        .await?;

    Ok(())
}
