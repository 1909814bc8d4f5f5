// knotstats binary: parses the command line, sets up logging and hands off to the relay server.
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use std::io::stderr;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, registry};

use knotstats_server::RelayConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay and dashboard for DNS resolver statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Path to a TOML config file (defaults to /etc/knotstats/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the stats relay and dashboard (default action).
    Serve,
    /// Prints the effective configuration as TOML and exits.
    Config,
}

fn log_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    let default_directives = format!(
        "knotstats={level},knotstats_server={level},tower_http=info,hyper=warn,reqwest=warn",
        level = level
    );
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    registry()
        .with(log_filter(cli.verbose))
        .with(fmt::layer().with_writer(stderr))
        .init();

    let config = RelayConfig::load(cli.config.as_deref()).map_err(|e| eyre!("{:#}", e))?;
    debug!("Effective configuration: {:?}", config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("Starting knotstats {}", env!("CARGO_PKG_VERSION"));
            knotstats_server::run(config)
                .await
                .map_err(|e| eyre!("{:#}", e))
                .wrap_err("Relay server exited with an error")?;
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .wrap_err("Failed to render configuration as TOML")?;
            print!("{}", rendered);
        }
    }

    Ok(())
}
