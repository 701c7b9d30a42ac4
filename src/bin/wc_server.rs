//! Binary entry point for the Workflow Controller process.

use std::path::PathBuf;

use clap::Parser;
use travel_core::config::{self, WcConfig};
use travel_core::wc::WorkflowController;

#[derive(Parser, Debug)]
#[command(name = "wc-server", version, about = "Workflow Controller server")]
struct Cli {
    /// Path to a TOML config file; falls back to `WcConfig::default()` when
    /// absent.
    #[arg(long, env = "WC_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the config's `listen_addr`.
    #[arg(long, env = "WC_LISTEN_ADDR")]
    listen_addr: Option<std::net::SocketAddr>,

    /// Overrides the config's `tm_endpoint`.
    #[arg(long, env = "WC_TM_ENDPOINT")]
    tm_endpoint: Option<String>,

    /// `RUST_LOG`-style default filter when `RUST_LOG` is unset.
    #[arg(long, env = "WC_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    travel_core::logging::init_logging(&cli.log_level);

    let mut cfg: WcConfig = config::load_or_default(cli.config.as_deref())?;
    if let Some(addr) = cli.listen_addr {
        cfg.listen_addr = addr;
    }
    if let Some(tm_endpoint) = cli.tm_endpoint {
        cfg.tm_endpoint = tm_endpoint;
    }

    let listen_addr = cfg.listen_addr;
    let wc = WorkflowController::new(cfg);

    tracing::info!(addr = %listen_addr, "starting wc server");
    travel_core::wc::server::serve(wc, listen_addr).await?;
    Ok(())
}
