// crates/server/src/main.rs
//! vanilla-presence binary.
//!
//! Runs the presence feed against a server directory and logs the active
//! player set until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vanilla_presence_server::VanillaServer;

/// How often the active player set is logged.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "vanilla-presence", version, about = "Live player presence from a vanilla server directory")]
struct Cli {
    /// Server directory containing server.properties and usercache.json.
    #[arg(long, env = "VANILLA_PRESENCE_ROOT", default_value = ".")]
    server_root: PathBuf,

    /// Log debug output from this tool.
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,vanilla_presence_server=debug,vanilla_presence_core=debug"
    } else {
        "warn,vanilla_presence_server=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let server = VanillaServer::open(&cli.server_root)
        .with_context(|| format!("cannot open server at {}", cli.server_root.display()))?;
    server.start()?;

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            _ = report.tick() => {
                let players = server.online_players();
                info!(count = players.len(), players = %serde_json::to_string(&players)?, "Active players");
            }
        }
    }

    info!("Shutting down");
    server.close();
    Ok(())
}
