use clap::Parser;
use storage_ingestor::{dump, logging, schema, Config};
use tracing::error;

/// Print table structure, row counts and the newest rows as JSON
#[derive(Debug, Parser)]
#[command(name = "dump-db")]
struct Args {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Sample rows per table (default DUMP_SAMPLE_ROWS or 5)
    #[arg(long)]
    rows: Option<i64>,
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
    if let Some(rows) = args.rows {
        config.dump_sample_rows = rows;
    }

    let log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref(), "dump");

    if let Err(e) = run(&config).await {
        error!("Dump failed: {:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let mut gateway = schema::connect_ready(&config.database_url).await?;
    let tables = dump::dump(&mut gateway, config.dump_sample_rows).await?;
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(())
}
