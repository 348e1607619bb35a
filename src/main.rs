use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use medace::config::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "medace", version, about = "Smart medical report analyzer")]
struct Cli {
    /// Path to a TOML config file (defaults to ./medace.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    medace::run(config).await
}
