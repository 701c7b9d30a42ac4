//! The 2PC driver (spec §4.2, §5, §7): snapshots the participant set and
//! releases the coordinator mutex before making any outbound call, per the
//! §9 DESIGN NOTES ("outbound RPC during 2PC must not hold the coordinator
//! lock"). Fan-out to participants runs concurrently via `tokio::task::JoinSet`.

use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::TmConfig;
use crate::tm::client::{ParticipantClient, PrepareOutcome};

/// Outcome of driving `prepare` across every participant.
pub enum PrepareDecision {
    /// Every participant voted to proceed.
    GoCommit,
    /// At least one participant rejected or was unreachable; carries the
    /// first failure reason for diagnostics.
    GoAbort(String),
}

/// Calls `prepare` on every participant concurrently, each bounded by
/// `T_prepare` (§4.2 step 2).
pub async fn drive_prepare(xid: &str, participants: &[ParticipantClient], config: &TmConfig) -> PrepareDecision {
    let timeout = Duration::from_millis(config.t_prepare_ms);
    let mut set = JoinSet::new();
    for client in participants {
        let client = client.clone();
        let xid = xid.to_string();
        set.spawn(async move {
            let outcome = client.prepare(&xid, timeout).await;
            (client.endpoint().to_string(), outcome)
        });
    }

    let mut decision = PrepareDecision::GoCommit;
    while let Some(joined) = set.join_next().await {
        let (endpoint, outcome) = match joined {
            Ok(pair) => pair,
            Err(join_err) => {
                warn!(%join_err, "prepare task panicked");
                decision = PrepareDecision::GoAbort(join_err.to_string());
                continue;
            }
        };
        match outcome {
            PrepareOutcome::Ok => {}
            PrepareOutcome::Rejected(reason) => {
                warn!(%endpoint, %reason, "participant rejected prepare");
                decision = PrepareDecision::GoAbort(format!("{endpoint}: {reason}"));
            }
            PrepareOutcome::Transport(reason) => {
                warn!(%endpoint, %reason, "prepare call failed");
                decision = PrepareDecision::GoAbort(format!("{endpoint}: {reason}"));
            }
        }
    }
    decision
}

/// Broadcasts `commit` (or `abort`, when `is_commit=false`) to every
/// participant concurrently, retrying each with bounded exponential backoff
/// until it acknowledges (§4.2 step 3, §7: "must be retried until each
/// participant acknowledges"). Returns once every participant has
/// acknowledged or exhausted its retries.
pub async fn drive_terminal(xid: &str, participants: &[ParticipantClient], config: &TmConfig, is_commit: bool) {
    let timeout = Duration::from_millis(config.t_prepare_ms);
    let mut set = JoinSet::new();
    for client in participants {
        let client = client.clone();
        let xid = xid.to_string();
        let config = config.clone();
        set.spawn(async move {
            drive_one_participant(&client, &xid, &config, timeout, is_commit).await;
        });
    }
    while set.join_next().await.is_some() {}
}

async fn drive_one_participant(
    client: &ParticipantClient,
    xid: &str,
    config: &TmConfig,
    timeout: Duration,
    is_commit: bool,
) {
    let verb = if is_commit { "commit" } else { "abort" };
    let mut attempt: u32 = 0;
    loop {
        let result = if is_commit {
            client.commit(xid, timeout).await
        } else {
            client.abort(xid, timeout).await
        };
        match result {
            Ok(()) => {
                info!(endpoint = client.endpoint(), verb, attempt, "participant acknowledged");
                return;
            }
            Err(reason) if attempt >= config.max_retries => {
                warn!(
                    endpoint = client.endpoint(),
                    verb, attempt, %reason, "giving up on participant after max retries"
                );
                return;
            }
            Err(reason) => {
                warn!(endpoint = client.endpoint(), verb, attempt, %reason, "retrying participant");
                let backoff = config.retry_base_ms.saturating_mul(1u64 << attempt.min(10));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
        }
    }
}
