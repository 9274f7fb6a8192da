//! Parley Chat Client Binary
//!
//! ## Usage
//!
//! ```bash
//! parley -h chat.example.com -n alice -g ops -k "shared secret"
//! ```
//!
//! Ctrl+C or Ctrl+D quits. Ctrl+A sends the image whose path is on the
//! input line.

use clap::Parser;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parley_client::{spawn_terminal_reader, ChatSession, ClientConfig, TerminalRenderer};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Parley chat client
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Parley terminal chat client", long_about = None)]
#[command(disable_help_flag = true)]
struct Args {
    /// Server host (fallback when discovery finds nothing)
    #[arg(short = 'h', long, default_value = parley_protocol::DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value_t = parley_protocol::DEFAULT_PORT)]
    port: u16,

    /// Display name (defaults to the login name)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Conversation group
    #[arg(short = 'g', long, default_value = parley_protocol::DEFAULT_GROUP)]
    group: String,

    /// Do not use groups; show every message with its sender's group
    #[arg(short = 'G', long)]
    no_group: bool,

    /// Look for a server on the local network first
    #[arg(short = 'H', long)]
    discovery: bool,

    /// Wrap long messages anywhere, not only between words
    #[arg(short = 'B', long)]
    ignore_break: bool,

    /// Treat input and output as single bytes instead of UTF-8
    #[arg(short = 'U', long)]
    no_utf8: bool,

    /// Send typing notifications
    #[arg(short = 't', long)]
    typing: bool,

    /// Do not announce entering and leaving
    #[arg(short = 'L', long)]
    no_presence: bool,

    /// Passphrase for end-to-end encryption
    #[arg(short = 'k', long)]
    key: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    /// Generate sample configuration file
    #[arg(long)]
    generate_config: Option<PathBuf>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Raw terminal mode for the lifetime of the value
struct RawMode;

impl RawMode {
    fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn build_config(args: &Args) -> Result<ClientConfig, parley_client::ClientError> {
    let mut builder = ClientConfig::builder()
        .server_host(&args.host)
        .port(args.port)
        .group(&args.group)
        .use_group(!args.no_group)
        .discovery(args.discovery)
        .ignore_break(args.ignore_break)
        .utf8(!args.no_utf8)
        .send_typing(args.typing)
        .send_presence(!args.no_presence);

    if let Some(name) = &args.name {
        builder = builder.name(name);
    }
    if let Some(key) = &args.key {
        builder = builder.passphrase(key);
    }
    builder.build()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so they stay out of the chat view
    FmtSubscriber::builder()
        .with_max_level(parse_level(&args.log_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    if let Some(path) = &args.generate_config {
        let config = ClientConfig::default();
        config.save_to_file(path)?;
        println!("Generated sample configuration at: {}", path.display());
        return Ok(());
    }

    let config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        ClientConfig::load_from_file(config_path)?
    } else {
        build_config(&args)?
    };

    let mut session = ChatSession::connect(config).await?;

    let result = {
        let _raw = RawMode::enable()?;
        let mut input = spawn_terminal_reader(session.config().poll_interval());
        let mut renderer = TerminalRenderer::new(std::io::stdout());
        session.run(&mut input, &mut renderer).await
    };

    session.close().await;
    println!();
    result.map_err(Into::into)
}
