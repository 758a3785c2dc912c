use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use storage_ingestor::{export, logging, model::now_timestamp, schema, Config};
use tracing::{error, info};

/// Print the latest free-space reading of every device as flat text
#[derive(Debug, Parser)]
#[command(name = "export")]
struct Args {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// First device number listed (default EXPORT_FIRST_DEVICE or 1)
    #[arg(long)]
    first: Option<i64>,

    /// Last device number listed (default EXPORT_LAST_DEVICE or 40)
    #[arg(long)]
    last: Option<i64>,

    /// Also write the export to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(url) = args.database_url.clone() {
        config.database_url = url;
    }
    if let Some(first) = args.first {
        config.export_first_device = first;
    }
    if let Some(last) = args.last {
        config.export_last_device = last;
    }

    let log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref(), "export");

    if let Err(e) = run(&config, args.output).await {
        error!("Export failed: {:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &Config, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut gateway = schema::connect_ready(&config.database_url).await?;
    let readings = export::latest_readings(&mut gateway).await?;
    info!("Exporting {} devices with readings", readings.len());

    let text = export::render(&readings, config.export_range(), &now_timestamp());
    print!("{}", text);

    if let Some(path) = output {
        tokio::fs::write(&path, &text)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Export written to {}", path.display());
    }
    Ok(())
}
