//! Shared wire types used by the RM, TM and WC HTTP layers (spec §6
//! preamble): the request/response envelopes common to every component and
//! the dual `X-Transaction-Id` header / `xid` query-param extractor.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};
use serde::{Deserialize, Serialize};

use crate::rm::record::Fields;

/// Header carrying the transaction id, per §6 preamble.
pub static TRANSACTION_ID_HEADER: HeaderName = HeaderName::from_static("x-transaction-id");

/// A transaction id extracted from either the `X-Transaction-Id` header or
/// the legacy `xid` query parameter, header taking precedence (§6 preamble:
/// "both are accepted; the header takes precedence when both are present").
#[derive(Debug, Clone)]
pub struct Xid(pub String);

#[derive(Debug, Deserialize)]
struct XidQuery {
    xid: Option<String>,
}

impl<S> FromRequestParts<S> for Xid
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(&TRANSACTION_ID_HEADER) {
            let value = value
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid X-Transaction-Id header".into()))?;
            return Ok(Xid(value.to_string()));
        }
        let Query(query) = Query::<XidQuery>::from_request_parts(parts, state)
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        query
            .xid
            .map(Xid)
            .ok_or((StatusCode::BAD_REQUEST, "missing transaction id (X-Transaction-Id header or xid query param)".into()))
    }
}

/// Like [`Xid`], but an absent xid is not a rejection — for endpoints that
/// have both a transactional and an anonymous-read form (§4.1.3: "a read
/// without xid always sees committed").
#[derive(Debug, Clone)]
pub struct OptionalXid(pub Option<String>);

impl<S> FromRequestParts<S> for OptionalXid
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(&TRANSACTION_ID_HEADER) {
            if let Ok(value) = value.to_str() {
                return Ok(OptionalXid(Some(value.to_string())));
            }
        }
        let xid = Query::<XidQuery>::from_request_parts(parts, state)
            .await
            .ok()
            .and_then(|Query(q)| q.xid);
        Ok(OptionalXid(xid))
    }
}

/// `POST /records` body (§6.2): `xid` travels in the body on this endpoint
/// since the key itself is also supplied there, unlike the header/query
/// convention used by the read/update/delete endpoints.
#[derive(Debug, Deserialize)]
pub struct AddRecordRequest {
    /// Transaction id this write belongs to.
    pub xid: String,
    /// Primary key (or pre-encoded composite key) to insert.
    pub key: String,
    /// Field map of the new record.
    pub value: Fields,
}

/// `PATCH|PUT /records/{key}` body (§6.2).
#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    /// Transaction id this write belongs to.
    pub xid: String,
    /// Fields to merge into the existing record.
    pub updates: Fields,
}

/// Response body for a successful record read.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    /// The effective field map for the key under the requesting xid (or
    /// committed state for an unqualified read).
    pub fields: Fields,
}

/// Generic empty-body success acknowledgement (`prepare`/`commit`/`abort`).
#[derive(Debug, Serialize)]
pub struct Ack {
    /// Always `true` on a 2xx response.
    pub ok: bool,
}

impl Ack {
    /// The canonical success acknowledgement.
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `GET /health` response shared by all three components (§6 preamble).
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process can answer requests at all.
    pub status: &'static str,
    /// Component kind: `"rm"`, `"tm"` or `"wc"`.
    pub component: &'static str,
}

/// `POST /txn/begin` response (§6.1): allocates a fresh TM-assigned xid.
#[derive(Debug, Serialize)]
pub struct BeginResponse {
    /// Newly allocated transaction id.
    pub xid: String,
}

/// `GET /txn/{xid}/status` response (§6.1).
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Transaction id this status describes.
    pub xid: String,
    /// Current TM-side lifecycle state.
    pub state: String,
}

/// `POST /reserve` request body (§4.3 `reserve` composite operation).
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    /// Customer making the reservation; must already exist on the customer
    /// RM (§4.3 step 1).
    pub customer_name: String,
    /// Inventory key to reserve against (e.g. a flight number).
    pub inventory_key: String,
    /// Number of units requested; must not exceed `numAvail` (§4.3 step 2).
    pub quantity: i64,
}

/// `POST /reserve` response body.
#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    /// The xid the WC committed the reservation under.
    pub xid: String,
    /// Key of the newly created reservation record.
    pub reservation_key: String,
}
