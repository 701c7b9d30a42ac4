//! Outbound clients the Workflow Controller uses to reach the TM and each
//! RM (spec §4.3). Every call propagates `xid` via the `X-Transaction-Id`
//! header, per §6 preamble ("implementations must... emit the header on
//! outbound").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WcError;
use crate::rm::record::Fields;
use crate::wire::TRANSACTION_ID_HEADER;

/// Client for the Transaction Manager's `/txn/*` endpoints.
#[derive(Clone)]
pub struct TmClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    xid: String,
}

#[derive(Debug, Deserialize)]
struct TerminalResponse {
    status: String,
}

impl TmClient {
    /// Builds a client for the TM at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// `POST /txn/start` → newly allocated xid (§6.1).
    pub async fn start(&self, timeout: Duration) -> Result<String, WcError> {
        let url = format!("{}/txn/start", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        let body: StartResponse = resp.json().await.map_err(|e| downstream(&url, e))?;
        Ok(body.xid)
    }

    /// `POST /txn/enlist?xid=X` body `{endpoint}` (§6.1).
    pub async fn enlist(&self, xid: &str, endpoint: &str, timeout: Duration) -> Result<(), WcError> {
        let url = format!("{}/txn/enlist", self.base_url);
        self.http
            .post(&url)
            .query(&[("xid", xid)])
            .json(&serde_json::json!({ "endpoint": endpoint }))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        Ok(())
    }

    /// `POST /txn/commit?xid=X` → terminal status string (§6.1).
    pub async fn commit(&self, xid: &str, timeout: Duration) -> Result<String, WcError> {
        let url = format!("{}/txn/commit", self.base_url);
        let resp = self
            .http
            .post(&url)
            .query(&[("xid", xid)])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        let body: TerminalResponse = resp.json().await.map_err(|e| downstream(&url, e))?;
        Ok(body.status)
    }

    /// `POST /txn/abort?xid=X` (best-effort, §4.3 auto-abort).
    pub async fn abort(&self, xid: &str, timeout: Duration) {
        let url = format!("{}/txn/abort", self.base_url);
        if let Err(err) = self.http.post(&url).query(&[("xid", xid)]).timeout(timeout).send().await {
            tracing::warn!(%url, %err, "best-effort auto-abort call failed");
        }
    }

    /// `GET /txn/{xid}` → TM-reported status string, used to poll after
    /// `IN_DOUBT` (§4.3 commit, §8 scenario 6).
    pub async fn status(&self, xid: &str, timeout: Duration) -> Result<String, WcError> {
        let url = format!("{}/txn/{xid}", self.base_url);
        let resp = self.http.get(&url).timeout(timeout).send().await.map_err(|e| downstream(&url, e))?;
        let body: crate::wire::StatusResponse =
            resp.json().await.map_err(|e| downstream(&url, e))?;
        Ok(body.state)
    }

    /// This client's configured base URL, used for health probing on
    /// `reconnect` (§4.3).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct AddRecordBody {
    xid: String,
    key: String,
    value: Fields,
}

#[derive(Debug, Serialize)]
struct UpdateRecordBody {
    xid: String,
    updates: Fields,
}

#[derive(Debug, Deserialize)]
struct RecordBody {
    fields: Fields,
}

/// Client for one RM's `/records` endpoints.
#[derive(Clone)]
pub struct RmClient {
    http: reqwest::Client,
    base_url: String,
}

impl RmClient {
    /// Builds a client for the RM at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// `GET /records/{key}` under `xid` (§6.2).
    pub async fn read(&self, xid: &str, key: &str, timeout: Duration) -> Result<Fields, WcError> {
        let url = format!("{}/records/{key}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(TRANSACTION_ID_HEADER.clone(), xid)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        if !resp.status().is_success() {
            return Err(downstream(&url, format!("status {}", resp.status())));
        }
        let body: RecordBody = resp.json().await.map_err(|e| downstream(&url, e))?;
        Ok(body.fields)
    }

    /// `POST /records` (§6.2).
    pub async fn add(&self, xid: &str, key: &str, value: Fields, timeout: Duration) -> Result<(), WcError> {
        let url = format!("{}/records", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&AddRecordBody { xid: xid.to_string(), key: key.to_string(), value })
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        if !resp.status().is_success() {
            return Err(downstream(&url, format!("status {}", resp.status())));
        }
        Ok(())
    }

    /// `PATCH /records/{key}` (§6.2).
    pub async fn update(&self, xid: &str, key: &str, updates: Fields, timeout: Duration) -> Result<(), WcError> {
        let url = format!("{}/records/{key}", self.base_url);
        let resp = self
            .http
            .patch(&url)
            .json(&UpdateRecordBody { xid: xid.to_string(), updates })
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| downstream(&url, e))?;
        if !resp.status().is_success() {
            return Err(downstream(&url, format!("status {}", resp.status())));
        }
        Ok(())
    }

    /// This client's configured base URL, used for health probing on
    /// `reconnect` (§4.3).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn downstream(endpoint: &str, reason: impl ToString) -> WcError {
    WcError::Downstream { endpoint: endpoint.to_string(), reason: reason.to_string() }
}
