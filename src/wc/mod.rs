//! Workflow Controller core (spec §4.3): stateless orchestrator of
//! multi-participant business operations, holding remote references to the
//! TM and each RM.

pub mod client;
pub mod pipeline;
pub mod reserve;
pub mod server;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::WcConfig;
use crate::error::WcError;
use crate::wc::client::{RmClient, TmClient};
use crate::wc::reserve::ReserveParticipants;
use crate::wire::{ReserveRequest, ReserveResponse};

/// Business tables the core `reserve` contract touches (§4.3, §8 scenarios).
/// A real deployment would parameterize this per resource type
/// (`reserveFlight`, `reserveHotel`, ...); this core implements the one
/// fully specified in §8's seed scenarios.
const CUSTOMERS_TABLE: &str = "customers";
const INVENTORY_TABLE: &str = "flights";
const RESERVATIONS_TABLE: &str = "reservations";

/// Outcome of a client-facing `commit` call (§4.3 commit).
pub struct CommitReport {
    /// TM-reported terminal status, or `"IN_DOUBT"`.
    pub status: String,
    /// Set when the status is `IN_DOUBT`.
    pub in_doubt: bool,
}

struct Clients {
    tm: TmClient,
    rms: BTreeMap<String, RmClient>,
}

/// Orchestrates `reserve` and drives commit/abort against the TM. Stateless
/// beyond its outbound clients and the `die`/`reconnect` administrative
/// flag (§4.3 "Administrative capabilities").
pub struct WorkflowController {
    config: WcConfig,
    clients: RwLock<Clients>,
    unavailable: AtomicBool,
}

impl WorkflowController {
    /// Builds a controller wired to `config`'s TM and RM endpoints.
    pub fn new(config: WcConfig) -> Self {
        let clients = Self::build_clients(&config);
        Self { config, clients: RwLock::new(clients), unavailable: AtomicBool::new(false) }
    }

    fn build_clients(config: &WcConfig) -> Clients {
        let tm = TmClient::new(config.tm_endpoint.clone());
        let rms = config
            .rm_endpoints
            .iter()
            .map(|(table, url)| (table.clone(), RmClient::new(url.clone())))
            .collect();
        Clients { tm, rms }
    }

    fn downstream_timeout(&self) -> Duration {
        Duration::from_millis(self.config.downstream_timeout_ms)
    }

    fn ensure_available(&self) -> Result<(), WcError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(WcError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// §4.3 `reserve`: allocates a fresh xid via the TM, then runs the
    /// four-step contract against the customer/inventory/reservation RMs.
    pub async fn reserve(&self, req: ReserveRequest) -> Result<ReserveResponse, WcError> {
        self.ensure_available()?;
        let timeout = self.downstream_timeout();
        let clients = self.clients.read();
        let customers = clients
            .rms
            .get(CUSTOMERS_TABLE)
            .ok_or_else(|| WcError::Downstream { endpoint: CUSTOMERS_TABLE.into(), reason: "not configured".into() })?;
        let inventory = clients
            .rms
            .get(INVENTORY_TABLE)
            .ok_or_else(|| WcError::Downstream { endpoint: INVENTORY_TABLE.into(), reason: "not configured".into() })?;
        let reservations = clients.rms.get(RESERVATIONS_TABLE).ok_or_else(|| WcError::Downstream {
            endpoint: RESERVATIONS_TABLE.into(),
            reason: "not configured".into(),
        })?;

        let xid = clients.tm.start(timeout).await?;
        let participants = ReserveParticipants { customers, inventory, reservations };
        reserve::reserve(&clients.tm, &xid, participants, req, self.config.auto_abort, timeout).await
    }

    /// §4.3 commit: calls `TM.commit(xid)` bounded by `T_wc_commit`,
    /// surfacing `IN_DOUBT` on timeout with polling guidance (§8 scenario 6).
    pub async fn commit(&self, xid: &str) -> Result<CommitReport, WcError> {
        self.ensure_available()?;
        let deadline = Duration::from_millis(self.config.t_wc_commit_ms);
        let tm = self.clients.read().tm.clone();
        match tokio::time::timeout(deadline, tm.commit(xid, deadline)).await {
            Ok(Ok(status)) => {
                let in_doubt = status == "IN_DOUBT";
                Ok(CommitReport { status, in_doubt })
            }
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Ok(CommitReport { status: "IN_DOUBT".to_string(), in_doubt: true }),
        }
    }

    /// §4.3 `reconnect`: rebuilds outbound clients and probes each endpoint.
    pub async fn reconnect(&self) -> Vec<(String, bool)> {
        let fresh = Self::build_clients(&self.config);
        let probes = self.probe_all(&fresh).await;
        *self.clients.write() = fresh;
        self.unavailable.store(false, Ordering::SeqCst);
        probes
    }

    async fn probe_all(&self, clients: &Clients) -> Vec<(String, bool)> {
        let http = reqwest::Client::new();
        let mut results = Vec::new();
        for (table, rm) in &clients.rms {
            let ok = probe_health(&http, rm.base_url()).await;
            results.push((table.clone(), ok));
        }
        results.push(("tm".to_string(), probe_health(&http, clients.tm.base_url()).await));
        results
    }

    /// §4.3 `die`: marks the controller unavailable (503 to clients).
    pub fn die(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// `false` once `die` has been called and before a `reconnect`.
    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

async fn probe_health(http: &reqwest::Client, base_url: &str) -> bool {
    http.get(format!("{base_url}/health"))
        .timeout(Duration::from_millis(1_000))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}
