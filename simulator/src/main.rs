mod reading;

use clap::Parser;
use reading::SimulatedDisk;
use std::time::Duration;
use tracing::{error, info, warn};

/// Fleet of fake storage agents posting free-space readings
#[derive(Debug, Parser)]
#[command(name = "storage-simulator")]
struct Args {
    /// Ingestion endpoint
    #[arg(long, env = "INGEST_URL", default_value = "http://localhost:8080/receive_data")]
    url: String,

    /// Readings per second across all devices
    #[arg(long, env = "RATE", default_value_t = 50)]
    rate: u64,

    /// Number of simulated devices, numbered from 1
    #[arg(long, env = "DEVICES", default_value_t = 40)]
    devices: i64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting storage agent simulator");
    info!("Endpoint: {}, Rate: {} readings/s, Devices: {}", args.url, args.rate, args.devices);

    if args.rate == 0 || args.devices <= 0 {
        error!("RATE and DEVICES must be positive");
        std::process::exit(1);
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let mut rng = rand::thread_rng();
    let mut disks: Vec<SimulatedDisk> = (1..=args.devices)
        .map(|n| SimulatedDisk::new(&mut rng, n))
        .collect();

    let burst_size = args.rate.clamp(1, 200) as usize;
    let burst_interval = Duration::from_millis((burst_size as u64 * 1000) / args.rate);
    info!("Posting in bursts of {} readings every {:?}", burst_size, burst_interval);

    let mut sent = 0u64;
    let mut failed = 0u64;
    let mut cursor = 0usize;

    loop {
        let burst_start = std::time::Instant::now();

        for _ in 0..burst_size {
            let disk_count = disks.len();
            let disk = &mut disks[cursor % disk_count];
            cursor += 1;
            let reading = disk.next_reading(&mut rng);

            match client.post(&args.url).json(&reading).send().await {
                Ok(response) if response.status().is_success() => sent += 1,
                Ok(response) => {
                    failed += 1;
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!("Device {} rejected ({}): {}", reading.device_number, status, body);
                }
                Err(e) => {
                    failed += 1;
                    warn!("Failed to post reading for device {}: {}", reading.device_number, e);
                }
            }
        }

        if (sent + failed) % 1000 < burst_size as u64 {
            info!("Posted {} readings ({} failed)", sent, failed);
        }

        let elapsed = burst_start.elapsed();
        if elapsed < burst_interval {
            tokio::time::sleep(burst_interval - elapsed).await;
        } else if elapsed > burst_interval * 2 {
            warn!("Burst took {:?}, target was {:?} - ingestor may be overloaded", elapsed, burst_interval);
        }
    }
}
