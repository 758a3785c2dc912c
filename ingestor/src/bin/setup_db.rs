use clap::Parser;
use storage_ingestor::{logging, schema, Config, Gateway};
use tracing::{error, info, warn};

/// Drop and recreate every storage monitor table. All stored data is lost.
#[derive(Debug, Parser)]
#[command(name = "setup-db")]
struct Args {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Required, since the existing tables are dropped
    #[arg(long)]
    yes: bool,
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

    let log_guard = logging::init_logging(&config.log_level, config.log_dir.as_deref(), "setup");

    if !args.yes {
        warn!("Refusing to reset {} without --yes", config.database_host());
        drop(log_guard);
        std::process::exit(2);
    }

    if let Err(e) = run(&config).await {
        error!("Database initialization failed: {:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let mut gateway = Gateway::connect(&config.database_url).await?;
    info!("Resetting schema on {}", config.database_host());
    schema::reset(&mut gateway).await?;
    info!("Database initialization completed");
    Ok(())
}
