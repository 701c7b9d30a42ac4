//! Per-component configuration, loaded from TOML and overridable by CLI
//! flags (§6, §9). Mirrors the teacher crate's `Config`-struct-plus-presets
//! convention rather than a builder API.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rm::page_index::KeySpec;

/// Failure modes when loading a component config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file's contents were not valid TOML for the target type.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for one Resource Manager process (one table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RmConfig {
    /// Table name, used only for logging/identification.
    pub table: String,
    /// Address this RM's HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Key shape: single-column prefix-sharded, or composite fixed-width.
    pub key_spec: KeySpec,
    /// Maximum number of distinct keys per page (§3.2).
    pub page_size: usize,
    /// Directory holding the durable prepare journal (§4.1.2, §6.4) and, for
    /// the file-backed `PageIO`, the committed page store.
    pub data_dir: PathBuf,
    /// Whether to use the sqlite-backed `PageIO` (durable) or the in-memory
    /// one (tests only).
    pub durable_storage: bool,
    /// Base URL of the Transaction Manager this RM self-enlists with (§4.3).
    /// `None` disables self-enlistment (standalone/unit-test mode).
    pub tm_endpoint: Option<String>,
    /// The address other components should use to reach this RM, announced
    /// on enlistment (may differ from `listen_addr` behind a proxy/container
    /// network).
    pub self_endpoint: String,
}

impl Default for RmConfig {
    fn default() -> Self {
        Self {
            table: "table".into(),
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            key_spec: KeySpec::single_column(4),
            page_size: 64,
            data_dir: PathBuf::from("./data"),
            durable_storage: true,
            tm_endpoint: None,
            self_endpoint: "http://127.0.0.1:8080".into(),
        }
    }
}

/// Configuration for the Transaction Manager process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TmConfig {
    /// Address the TM's HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Per-hop timeout for a single participant `prepare` call (§5, §6).
    pub t_prepare_ms: u64,
    /// Overall wall-clock budget for the commit driver before the TM itself
    /// considers the call `IN_DOUBT`-worthy to a synchronous caller (§4.2.4).
    pub t_commit_ms: u64,
    /// Base delay for the exponential backoff used when retrying commit/abort
    /// broadcasts against a participant (§7).
    pub retry_base_ms: u64,
    /// Maximum number of retry attempts per participant per broadcast.
    pub max_retries: u32,
    /// Bounded size of the idempotent-outcome LRU (§9 DESIGN NOTES).
    pub outcome_cache_size: usize,
}

impl Default for TmConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9000".parse().unwrap(),
            t_prepare_ms: 2_000,
            t_commit_ms: 5_000,
            retry_base_ms: 50,
            max_retries: 5,
            outcome_cache_size: 10_000,
        }
    }
}

/// Configuration for the Workflow Controller process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WcConfig {
    /// Address the WC's HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Endpoint of the Transaction Manager.
    pub tm_endpoint: String,
    /// Table name -> RM base URL, e.g. `"flights" -> "http://127.0.0.1:8080"`.
    pub rm_endpoints: BTreeMap<String, String>,
    /// Whether auto-abort on downstream failure is enabled (§4.3, default on).
    pub auto_abort: bool,
    /// Client-facing timeout for `TM.commit` before surfacing `IN_DOUBT` (§4.3).
    pub t_wc_commit_ms: u64,
    /// Per-hop timeout for WC -> TM / WC -> RM calls (§5).
    pub downstream_timeout_ms: u64,
}

impl Default for WcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7000".parse().unwrap(),
            tm_endpoint: "http://127.0.0.1:9000".into(),
            rm_endpoints: BTreeMap::new(),
            auto_abort: true,
            t_wc_commit_ms: 4_000,
            downstream_timeout_ms: 2_000,
        }
    }
}

/// Loads a `T: Deserialize` config from a TOML file, falling back to
/// `T::default()` when no path is given or the file does not exist.
pub fn load_or_default<T>(path: Option<&std::path::Path>) -> Result<T, ConfigError>
where
    T: Default + serde::de::DeserializeOwned,
{
    match path {
        Some(p) if p.exists() => {
            let raw = std::fs::read_to_string(p)?;
            Ok(toml::from_str(&raw)?)
        }
        _ => Ok(T::default()),
    }
}
