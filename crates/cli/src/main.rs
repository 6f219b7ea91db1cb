mod control_commands;
mod plugins_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    hive_config::HiveConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "hive", about = "hive: gateway daemon for agent plugins and schedules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: ./hive.toml, then the user config directory).
    #[arg(long, global = true, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Control socket path (overrides the config value).
    #[arg(long, global = true, env = "HIVE_SOCKET")]
    socket: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway in the foreground until Ctrl-C or a `stop` command.
    Gateway,
    /// Print the running gateway's status.
    Status,
    /// Ask the running gateway to shut down.
    Stop,
    /// Ask the running gateway to re-read its config file.
    Reload,
    /// Plugin management.
    Plugins {
        #[command(subcommand)]
        action: plugins_commands::PluginAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output, so logs go to stderr.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// The explicit config path, or the first one found in the standard places.
fn config_path(cli_config: Option<&Path>) -> Option<PathBuf> {
    cli_config
        .map(Path::to_path_buf)
        .or_else(hive_config::discover_config)
}

/// Load the config if one can be found, otherwise fall back to defaults.
fn load_config_or_default(cli_config: Option<&Path>) -> anyhow::Result<HiveConfig> {
    match config_path(cli_config) {
        Some(path) => hive_config::load_config(&path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(HiveConfig::default()),
    }
}

/// `--socket`, else the config's socket, else the default location.
fn socket_path(cli_socket: Option<&Path>, config: &HiveConfig) -> PathBuf {
    cli_socket
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.gateway.socket_path())
}

async fn run_gateway(cli: &Cli) -> anyhow::Result<()> {
    let config_path = config_path(cli.config.as_deref()).context(
        "no config file found; pass --config or create hive.toml",
    )?;
    let config = hive_config::load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let socket = socket_path(cli.socket.as_deref(), &config);

    let gateway = hive_gateway::Gateway::new();
    gateway.start(&config_path, &socket).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("interrupt received, shutting down");
            gateway.stop().await;
        },
        () = gateway.wait_stopped() => {},
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "hive starting");

    match &cli.command {
        Commands::Gateway => run_gateway(&cli).await,
        Commands::Status | Commands::Stop | Commands::Reload => {
            let config = load_config_or_default(cli.config.as_deref())?;
            let socket = socket_path(cli.socket.as_deref(), &config);
            control_commands::handle_control(&cli.command, &socket).await
        },
        Commands::Plugins { action } => {
            let config = load_config_or_default(cli.config.as_deref())?;
            plugins_commands::handle_plugins(action, &config).await
        },
    }
}
