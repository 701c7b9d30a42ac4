//! Binary entry point for one Resource Manager process (one table).

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use travel_core::config::{self, RmConfig};
use travel_core::rm::ResourceManager;

#[derive(Parser, Debug)]
#[command(name = "rm-server", version, about = "Resource Manager server for one table")]
struct Cli {
    /// Path to a TOML config file; falls back to `RmConfig::default()` when
    /// absent.
    #[arg(long, env = "RM_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config's `listen_addr`.
    #[arg(long, env = "RM_LISTEN_ADDR")]
    listen_addr: Option<std::net::SocketAddr>,

    /// Overrides the config's `table` name.
    #[arg(long, env = "RM_TABLE")]
    table: Option<String>,

    /// `RUST_LOG`-style default filter when `RUST_LOG` is unset.
    #[arg(long, env = "RM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    travel_core::logging::init_logging(&cli.log_level);

    let mut cfg: RmConfig = config::load_or_default(cli.config.as_deref())?;
    if let Some(addr) = cli.listen_addr {
        cfg.listen_addr = addr;
    }
    if let Some(table) = cli.table {
        cfg.table = table;
    }

    std::fs::create_dir_all(&cfg.data_dir)?;
    let journal_path = cfg.data_dir.join("prepare.journal");

    let mut rm = if cfg.durable_storage {
        let db_path = cfg.data_dir.join("committed.sqlite3");
        ResourceManager::durable(cfg.key_spec.clone(), db_path, cfg.page_size, journal_path)?
    } else {
        ResourceManager::in_memory(cfg.key_spec.clone(), journal_path)?
    };

    if let Some(tm_endpoint) = &cfg.tm_endpoint {
        rm = rm.with_tm_link(tm_endpoint, cfg.self_endpoint.clone(), Duration::from_millis(2_000));
    }

    tracing::info!(table = %cfg.table, addr = %cfg.listen_addr, "starting rm server");
    travel_core::rm::server::serve(rm, cfg.listen_addr).await?;
    Ok(())
}
