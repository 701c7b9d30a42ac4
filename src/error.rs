//! Wire-level error taxonomy (spec §6.3, §7) shared by RM, TM and WC.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Stable wire error codes. Every component-specific error maps onto one of
/// these before it crosses an HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// `add` targeted a key whose effective record already exists.
    KeyExists,
    /// `read`/`update`/`delete` targeted a key with no effective record.
    KeyNotFound,
    /// `prepare` could not acquire a row lock for some key in the shadow set.
    LockConflict,
    /// `prepare`'s OCC check found the committed version had moved.
    VersionConflict,
    /// WC-level: inventory has fewer available units than requested.
    InsufficientAvailability,
    /// An implementation contract was breached.
    InternalInvariant,
    /// A call exceeded its configured deadline.
    Timeout,
    /// The component has been marked unavailable via its `die` admin call.
    Unavailable,
}

impl ErrorCode {
    /// The HTTP status this code maps to (spec §6.3).
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::KeyExists | ErrorCode::VersionConflict | ErrorCode::LockConflict => {
                StatusCode::CONFLICT
            }
            ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InsufficientAvailability | ErrorCode::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::InternalInvariant => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body shape returned by every component for a non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code from [`ErrorCode`].
    pub err: ErrorCode,
    /// Human-readable detail, safe to log and to show an operator.
    pub message: String,
}

/// Errors raised by the Resource Manager core (§4.1).
#[derive(Debug, Error, Clone)]
pub enum RmError {
    /// §4.1.1 `add`: effective record already present.
    #[error("key already exists: {0}")]
    KeyExists(String),
    /// §4.1.1 `read`/`update`/`delete`: effective record absent or deleted.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// §4.1.2 step 1: another xid holds the row lock.
    #[error("lock conflict on key {0}")]
    LockConflict(String),
    /// §4.1.2 step 2: committed version moved since this xid's `start_version`.
    #[error("version conflict on key {0}")]
    VersionConflict(String),
    /// A contract internal to the RM was violated.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
    /// The underlying page store failed in a way the caller should retry.
    #[error("storage error: {0}")]
    Storage(String),
    /// This RM has been marked unavailable via `POST /die` (§6.2 failure
    /// injection).
    #[error("resource manager is unavailable")]
    Unavailable,
}

impl RmError {
    /// Maps this error onto the stable wire taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            RmError::KeyExists(_) => ErrorCode::KeyExists,
            RmError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            RmError::LockConflict(_) => ErrorCode::LockConflict,
            RmError::VersionConflict(_) => ErrorCode::VersionConflict,
            RmError::InternalInvariant(_) => ErrorCode::InternalInvariant,
            RmError::Storage(_) => ErrorCode::InternalInvariant,
            RmError::Unavailable => ErrorCode::Unavailable,
        }
    }
}

impl IntoResponse for RmError {
    fn into_response(self) -> Response {
        let code = self.code();
        if matches!(self, RmError::InternalInvariant(_) | RmError::Storage(_)) {
            error!(err = %self, "rm invariant/storage failure");
        }
        (code.status(), Json(ErrorBody { err: code, message: self.to_string() })).into_response()
    }
}

/// Errors raised by the Transaction Manager core (§4.2).
#[derive(Debug, Error, Clone)]
pub enum TmError {
    /// `enlist`/`commit` called against a transaction that is not `ACTIVE`.
    #[error("transaction {0} is not active")]
    NotActive(String),
    /// `status`/`commit`/`abort` referenced an xid the TM never allocated.
    #[error("unknown transaction {0}")]
    NotFound(String),
    /// A participant `prepare` call exceeded `T_prepare` or failed outright.
    #[error("prepare failed for participant {endpoint}: {reason}")]
    PrepareFailed {
        /// Participant endpoint that rejected prepare.
        endpoint: String,
        /// Failure detail (transport error or structured RM error).
        reason: String,
    },
    /// The whole commit driver exceeded `T_commit`.
    #[error("commit driver timed out")]
    Timeout,
}

impl TmError {
    /// Maps this error onto the stable wire taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            TmError::NotActive(_) => ErrorCode::InternalInvariant,
            TmError::NotFound(_) => ErrorCode::KeyNotFound,
            TmError::PrepareFailed { .. } => ErrorCode::LockConflict,
            TmError::Timeout => ErrorCode::Timeout,
        }
    }
}

impl IntoResponse for TmError {
    fn into_response(self) -> Response {
        let code = self.code();
        (code.status(), Json(ErrorBody { err: code, message: self.to_string() })).into_response()
    }
}

/// Errors raised by the Workflow Controller core (§4.3).
#[derive(Debug, Error)]
pub enum WcError {
    /// A downstream RM/TM call failed or timed out under an active xid.
    #[error("downstream call to {endpoint} failed: {reason}")]
    Downstream {
        /// Endpoint that failed.
        endpoint: String,
        /// Failure detail.
        reason: String,
    },
    /// §4.3 `reserve` step 2: inventory has fewer available units than requested.
    #[error("insufficient availability: requested {requested}, available {available}")]
    InsufficientAvailability {
        /// Units requested by the caller.
        requested: i64,
        /// Units actually available.
        available: i64,
    },
    /// `TM.commit` returned or timed out as `IN_DOUBT`.
    #[error("transaction {0} is in doubt")]
    InDoubt(String),
    /// WC has been marked unavailable via the `die` administrative call.
    #[error("workflow controller is unavailable")]
    Unavailable,
}

impl WcError {
    /// Maps this error onto the stable wire taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            WcError::Downstream { .. } => ErrorCode::InternalInvariant,
            WcError::InsufficientAvailability { .. } => ErrorCode::InsufficientAvailability,
            WcError::InDoubt(_) => ErrorCode::Timeout,
            WcError::Unavailable => ErrorCode::InternalInvariant,
        }
    }

    /// `true` if this failure should trigger WC auto-abort (§4.3, §7).
    pub fn triggers_auto_abort(&self) -> bool {
        !matches!(self, WcError::InDoubt(_) | WcError::Unavailable)
    }
}

impl IntoResponse for WcError {
    fn into_response(self) -> Response {
        let status = match self {
            WcError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => self.code().status(),
        };
        let body = WcErrorBody {
            err: self.code(),
            message: self.to_string(),
            transaction_aborted: self.triggers_auto_abort(),
        };
        (status, Json(body)).into_response()
    }
}

/// WC error body; extends [`ErrorBody`] with the auto-abort flag from §4.3.
#[derive(Debug, Serialize)]
pub struct WcErrorBody {
    /// Stable machine-readable code from [`ErrorCode`].
    pub err: ErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Set when the WC best-effort aborted the enclosing transaction.
    pub transaction_aborted: bool,
}

