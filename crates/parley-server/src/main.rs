//! Parley Relay Server Binary
//!
//! Command-line interface for running the Parley relay.
//!
//! ## Usage
//!
//! ```bash
//! parley-server --port 24242 --history 1048576
//! ```
//!
//! Type `q` and Enter (or press Ctrl+C) to stop the server.

use clap::Parser;
use parley_server::{ConfigError, RelayServer, ServerConfig, ShutdownHandle};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Parley relay server - group chat relay with replay history
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(version)]
#[command(about = "Parley chat relay server", long_about = None)]
struct Args {
    /// Bind address
    #[arg(short = 'a', long, default_value = "0.0.0.0")]
    address: String,

    /// Service port (TCP relay and UDP discovery)
    #[arg(short = 'p', long, default_value_t = parley_protocol::DEFAULT_PORT)]
    port: u16,

    /// Replay history capacity in bytes
    #[arg(short = 'H', long, default_value_t = parley_protocol::DEFAULT_HISTORY_CAPACITY)]
    history: usize,

    /// Do not answer discovery probes
    #[arg(long)]
    no_discovery: bool,

    /// Configuration file path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Generate sample configuration file
    #[arg(long)]
    generate_config: Option<PathBuf>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Configuration from `--config`, or from the command line flags
fn load_config(args: &Args) -> Result<ServerConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load_from_file(path)?,
        None => ServerConfig::builder()
            .bind_address(&args.address)
            .port(args.port)
            .history_capacity(args.history)
            .discovery(!args.no_discovery)
            .build()?,
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Handle generate-config option
    if let Some(path) = &args.generate_config {
        let config = ServerConfig::default();
        config.save_to_file(path)?;
        println!("Generated sample configuration at: {}", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;

    FmtSubscriber::builder()
        .with_max_level(parse_level(&config.log_level))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    if let Some(path) = &args.config {
        info!("Loaded configuration from: {}", path.display());
    }

    info!("Configuration:");
    info!("  Bind: {}:{}", config.bind_address, config.port);
    info!("  Discovery: {}", config.enable_discovery);
    info!("  History: {} bytes", config.history_capacity);

    let server = RelayServer::bind(config).await?;
    let handle = server.shutdown_handle();

    // Handle Ctrl+C
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        ctrl_c.shutdown();
    });

    tokio::spawn(watch_stdin(handle));

    match server.run().await {
        Ok(_) => {
            info!("Server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Server error: {}", e);
            Err(e.into())
        }
    }
}

/// Stop on a `q` line from the operator
async fn watch_stdin(handle: ShutdownHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().eq_ignore_ascii_case("q") {
            info!("Quit requested from console");
            handle.shutdown();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["parley-server", "--port", "8080", "--no-discovery"]);
        assert_eq!(args.port, 8080);
        assert!(args.no_discovery);
        assert_eq!(args.history, 1_048_576);
    }

    #[test]
    fn test_log_level_from_config_file() {
        let path = std::env::temp_dir().join(format!("parley-server-{}.toml", std::process::id()));
        let config = ServerConfig {
            log_level: "debug".into(),
            ..ServerConfig::default()
        };
        config.save_to_file(&path).unwrap();
        let path_arg = path.to_string_lossy().into_owned();

        let args = Args::parse_from(["parley-server", "--config", path_arg.as_str()]);
        assert_eq!(load_config(&args).unwrap().log_level, "debug");

        let args = Args::parse_from(["parley-server", "-c", path_arg.as_str(), "-l", "error"]);
        assert_eq!(load_config(&args).unwrap().log_level, "error");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_log_level_defaults_without_file() {
        let args = Args::parse_from(["parley-server"]);
        assert_eq!(load_config(&args).unwrap().log_level, "info");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }
}
