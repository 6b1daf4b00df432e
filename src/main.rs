use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use chess_bridge::app;
use chess_bridge::config::AppConfig;
use chess_bridge::domain::PieceColor;

/// Play chess in the terminal with move checking and UCI engine analysis
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Engine binary, overrides config and CHESS_ENGINE_PATH
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Search depth per analysis request
    #[arg(short, long)]
    depth: Option<u32>,

    /// Let the engine play this color (white or black)
    #[arg(long)]
    ai: Option<PieceColor>,

    /// Log filter, e.g. "debug" or "chess_bridge=trace"; RUST_LOG wins if set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print the config file's JSON schema and exit
    #[arg(long)]
    print_config_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if cli.print_config_schema {
        println!("{}", AppConfig::schema_json()?);
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    config.apply_env(|key| std::env::var(key).ok());
    if let Some(engine) = cli.engine {
        config.engine.path = Some(engine);
    }
    if let Some(depth) = cli.depth {
        config.analysis.depth = depth;
    }
    if cli.ai.is_some() {
        config.analysis.ai_color = cli.ai;
    }

    let settings = match config.engine.to_settings(std::env::var_os("PATH").as_deref()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(error = %e, "running without an engine");
            None
        }
    };

    app::run(config, settings).await
}
