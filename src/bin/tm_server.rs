//! Binary entry point for the Transaction Manager process.

use std::path::PathBuf;

use clap::Parser;
use travel_core::config::{self, TmConfig};
use travel_core::tm::TransactionManager;

#[derive(Parser, Debug)]
#[command(name = "tm-server", version, about = "Transaction Manager server")]
struct Cli {
    /// Path to a TOML config file; falls back to `TmConfig::default()` when
    /// absent.
    #[arg(long, env = "TM_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config's `listen_addr`.
    #[arg(long, env = "TM_LISTEN_ADDR")]
    listen_addr: Option<std::net::SocketAddr>,

    /// `RUST_LOG`-style default filter when `RUST_LOG` is unset.
    #[arg(long, env = "TM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    travel_core::logging::init_logging(&cli.log_level);

    let mut cfg: TmConfig = config::load_or_default(cli.config.as_deref())?;
    if let Some(addr) = cli.listen_addr {
        cfg.listen_addr = addr;
    }

    let listen_addr = cfg.listen_addr;
    let tm = TransactionManager::new(cfg);

    tracing::info!(addr = %listen_addr, "starting tm server");
    travel_core::tm::server::serve(tm, listen_addr).await?;
    Ok(())
}
