use clap::Parser;
use storage_ingestor::{logging, report, schema, Config};
use tracing::{error, info};

/// Store a summary row of the current device state in storage_reports
#[derive(Debug, Parser)]
#[command(name = "report")]
struct Args {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,
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
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    let log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref(), "report");

    if let Err(e) = run(&config).await {
        error!("Report generation failed: {:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let mut gateway = schema::connect_ready(&config.database_url).await?;
    let report = report::generate(&mut gateway).await?;
    info!(
        "Report generation complete: id {}, {} devices, at {}",
        report.id, report.total_devices, report.generated_at
    );
    Ok(())
}
