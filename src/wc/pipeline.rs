//! Auto-abort as a cross-cutting concern (spec §4.3, §9 DESIGN NOTES:
//! "centralize it in the WC's request pipeline so every downstream failure
//! under an active xid goes through the same code path"), rather than a
//! per-route `if let Err` scattered through `reserve` and future business
//! verbs.

use std::time::Duration;

use crate::error::WcError;
use crate::wc::client::TmClient;

/// Runs `step`, and on a failure that `triggers_auto_abort`, best-effort
/// aborts `xid` against the TM before propagating the original error.
/// Every downstream call the WC makes under an active `xid` should be
/// wrapped through this one function.
pub async fn guarded<T, F>(
    tm: &TmClient,
    xid: &str,
    auto_abort_enabled: bool,
    downstream_timeout: Duration,
    step: F,
) -> Result<T, WcError>
where
    F: std::future::Future<Output = Result<T, WcError>>,
{
    match step.await {
        Ok(value) => Ok(value),
        Err(err) if auto_abort_enabled && err.triggers_auto_abort() => {
            tracing::warn!(xid, %err, "auto-aborting transaction after downstream failure");
            tm.abort(xid, downstream_timeout).await;
            Err(err)
        }
        Err(err) => Err(err),
    }
}
