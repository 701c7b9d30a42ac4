//! The `reserve` composite operation (spec §4.3 core contract).

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::WcError;
use crate::rm::record::FieldValue;
use crate::wc::client::{RmClient, TmClient};
use crate::wc::pipeline::guarded;
use crate::wire::{ReserveRequest, ReserveResponse};

/// The RMs a `reserve` call needs: one holding customers, one holding the
/// inventory table being reserved against (flights, hotels, cars, ...), and
/// one holding reservation records (often the same RM as customers).
pub struct ReserveParticipants<'a> {
    /// RM for the customer table.
    pub customers: &'a RmClient,
    /// RM for the inventory table (e.g. flights).
    pub inventory: &'a RmClient,
    /// RM for the reservations table.
    pub reservations: &'a RmClient,
}

/// Runs the four-step `reserve` contract under `xid`, auto-aborting on the
/// first downstream failure when `auto_abort_enabled` (§4.3).
pub async fn reserve(
    tm: &TmClient,
    xid: &str,
    participants: ReserveParticipants<'_>,
    req: ReserveRequest,
    auto_abort_enabled: bool,
    downstream_timeout: Duration,
) -> Result<ReserveResponse, WcError> {
    // Step 1: verify the customer exists.
    guarded(tm, xid, auto_abort_enabled, downstream_timeout, async {
        participants.customers.read(xid, &req.customer_name, downstream_timeout).await
    })
    .await?;

    // Step 2: verify inventory exists and has enough availability.
    let inventory = guarded(tm, xid, auto_abort_enabled, downstream_timeout, async {
        participants.inventory.read(xid, &req.inventory_key, downstream_timeout).await
    })
    .await?;
    let available = inventory
        .get("numAvail")
        .and_then(FieldValue::as_int)
        .ok_or_else(|| WcError::Downstream {
            endpoint: req.inventory_key.clone(),
            reason: "inventory record missing numAvail field".into(),
        })?;
    if available < req.quantity {
        let err = WcError::InsufficientAvailability { requested: req.quantity, available };
        if auto_abort_enabled {
            tracing::warn!(xid, %err, "auto-aborting transaction: insufficient availability");
            tm.abort(xid, downstream_timeout).await;
        }
        return Err(err);
    }

    // Step 3: decrement numAvail on the inventory RM.
    let mut decrement = BTreeMap::new();
    decrement.insert("numAvail".to_string(), FieldValue::Int(available - req.quantity));
    guarded(tm, xid, auto_abort_enabled, downstream_timeout, async {
        participants.inventory.update(xid, &req.inventory_key, decrement, downstream_timeout).await
    })
    .await?;

    // Step 4: insert the reservation record on the reservations RM.
    let reservation_key = format!("{}:{}", req.customer_name, req.inventory_key);
    let mut reservation = BTreeMap::new();
    reservation.insert("custName".to_string(), FieldValue::Str(req.customer_name.clone()));
    reservation.insert("resvType".to_string(), FieldValue::Str("RESERVATION".to_string()));
    reservation.insert("resvKey".to_string(), FieldValue::Str(req.inventory_key.clone()));
    guarded(tm, xid, auto_abort_enabled, downstream_timeout, async {
        participants.reservations.add(xid, &reservation_key, reservation.clone(), downstream_timeout).await
    })
    .await?;

    Ok(ReserveResponse { xid: xid.to_string(), reservation_key })
}
