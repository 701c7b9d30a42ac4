//! Outbound HTTP client used by the 2PC driver to call participant RMs
//! (spec §4.2, §6.2). `reqwest` is new to this crate relative to the teacher
//! — grounded on the `kvcli` HTTP client in the `rust-us-kv-rs` example pack,
//! since the teacher is an embedded library with no outbound HTTP client of
//! its own.

use std::time::Duration;

use serde::Deserialize;

/// Thin wrapper over a `reqwest::Client` plus a participant's base URL.
#[derive(Clone)]
pub struct ParticipantClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PrepareResponse {
    ok: bool,
    #[serde(default)]
    err: Option<String>,
}

/// Outcome of a single `prepare` call against one participant.
#[derive(Debug)]
pub enum PrepareOutcome {
    /// Participant voted to proceed.
    Ok,
    /// Participant voted to abort, with its reported error code.
    Rejected(String),
    /// The call itself failed (connection refused, timed out, bad status).
    Transport(String),
}

impl ParticipantClient {
    /// Builds a client for `base_url` (e.g. `http://localhost:9001`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// `POST {base}/txn/prepare?xid=X` with a bounded timeout (§4.2 step 2).
    pub async fn prepare(&self, xid: &str, timeout: Duration) -> PrepareOutcome {
        let url = format!("{}/txn/prepare", self.base_url);
        let result = self
            .http
            .post(&url)
            .query(&[("xid", xid)])
            .timeout(timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<PrepareResponse>().await {
                Ok(body) if body.ok => PrepareOutcome::Ok,
                Ok(body) => PrepareOutcome::Rejected(body.err.unwrap_or_else(|| "REJECTED".into())),
                Err(e) => PrepareOutcome::Transport(e.to_string()),
            },
            Ok(resp) => PrepareOutcome::Transport(format!("status {}", resp.status())),
            Err(e) => PrepareOutcome::Transport(e.to_string()),
        }
    }

    /// `POST {base}/txn/commit?xid=X`, retried by the caller on failure
    /// (§4.2 step 3, §7).
    pub async fn commit(&self, xid: &str, timeout: Duration) -> Result<(), String> {
        self.post_terminal("commit", xid, timeout).await
    }

    /// `POST {base}/txn/abort?xid=X`, retried by the caller on failure.
    pub async fn abort(&self, xid: &str, timeout: Duration) -> Result<(), String> {
        self.post_terminal("abort", xid, timeout).await
    }

    async fn post_terminal(&self, verb: &str, xid: &str, timeout: Duration) -> Result<(), String> {
        let url = format!("{}/txn/{verb}", self.base_url);
        let result = self.http.post(&url).query(&[("xid", xid)]).timeout(timeout).send().await;
        match result {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(format!("status {}", resp.status())),
            Err(e) => Err(e.to_string()),
        }
    }

    /// The participant's base URL, used for logging and for the §4.2
    /// stable-order participant set.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }
}
