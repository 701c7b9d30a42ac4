//! The one call an RM needs to make against the TM: self-enlistment on
//! first write under a transaction (spec §4.3: "each RM, on first mutation
//! under xid, enlists itself with TM"). Kept separate from
//! [`crate::wc::client::TmClient`] (the richer start/commit/abort/status
//! client) so the RM layer does not depend on the WC layer.

use std::time::Duration;

/// Thin client for `POST /txn/enlist?xid=X`.
#[derive(Clone)]
pub struct TmLinkClient {
    http: reqwest::Client,
    base_url: String,
}

impl TmLinkClient {
    /// Builds a client for the TM at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    /// Enlists `self_endpoint` as a participant in `xid`. Best-effort: a
    /// transport failure here is logged and otherwise ignored, since the RM
    /// must still accept the write locally — a missing enlistment only
    /// risks the TM not driving 2PC against this RM, which `prepare` will
    /// surface on the client's next `commit` attempt.
    pub async fn enlist(&self, xid: &str, self_endpoint: &str, timeout: Duration) {
        let url = format!("{}/txn/enlist", self.base_url);
        let result = self
            .http
            .post(&url)
            .query(&[("xid", xid)])
            .json(&serde_json::json!({ "endpoint": self_endpoint }))
            .timeout(timeout)
            .send()
            .await;
        if let Err(err) = result {
            tracing::warn!(%url, %err, xid, "failed to enlist with transaction manager");
        }
    }
}
