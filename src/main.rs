use clap::Parser;
use std::path::PathBuf;

use tablekeeper::config::AppConfig;
use tablekeeper::{logging, server};

#[derive(Parser)]
#[command(name = "tablekeeper")]
#[command(about = "Admin HTTP API for user accounts and runtime-defined tables")]
#[command(version)]
struct Args {
    #[arg(long, default_value = "config.ini", help = "Key=value configuration file")]
    config: PathBuf,

    #[arg(long, help = "Listen port, overrides SERVER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Real environment variables win over the file
    let config_loaded = dotenvy::from_filename(&args.config).is_ok();

    let port = args.port;
    let load_config = move || {
        let mut config = AppConfig::from_env();
        if let Some(port) = port {
            config.server.port = port;
        }
        config
    };

    let config = load_config();
    logging::init(&config.logging)?;

    if config_loaded {
        tracing::info!(path = %args.config.display(), "loaded configuration file");
    } else {
        tracing::debug!(path = %args.config.display(), "no configuration file; using environment only");
    }
    tracing::info!("Starting {} v{}", config.server.name, env!("CARGO_PKG_VERSION"));

    server::run(load_config).await
}
