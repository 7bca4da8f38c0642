//! Lease-timeout policy built on top of [`reject`](crate::reject::reject).

use pubq_core::{MsgId, Timestamp};
use pubq_store::{Store, StoreError};
use tracing::info;

use crate::error::TxResult;
use crate::reject::{reject, RejectKeys};

/// Lists leases recorded strictly before `cutoff`, oldest first.
///
/// In-flight identifiers with no recorded lease time (the lease-time write is
/// best-effort) count as stale and come first.
pub fn stale_leases<S: Store>(
    store: &S,
    in_flight_ids: &str,
    in_flight_data: &str,
    cutoff: &Timestamp,
) -> TxResult<Vec<MsgId>> {
    let (members, entries) = store.atomically(|ops| -> Result<_, StoreError> {
        Ok((ops.smembers(in_flight_ids)?, ops.hgetall(in_flight_data)?))
    })?;
    let mut stale: Vec<(Option<Timestamp>, MsgId)> = entries
        .iter()
        .filter_map(|(field, raw)| {
            let leased_at = Timestamp::new(String::from_utf8_lossy(raw));
            let id = MsgId::parse(field.as_str()).ok()?;
            (leased_at < *cutoff).then_some((Some(leased_at), id))
        })
        .collect();
    stale.extend(
        members
            .into_iter()
            .filter(|member| !entries.iter().any(|(field, _)| field == member))
            .filter_map(|member| MsgId::parse(member).ok())
            .map(|id| (None, id)),
    );
    stale.sort();
    Ok(stale.into_iter().map(|(_, id)| id).collect())
}

/// Rejects every lease older than `cutoff` back onto the consumer queue.
///
/// Leases settled between the scan and the reject are skipped by `reject`
/// because they are no longer in flight. Returns the identifiers scanned as
/// stale.
pub fn reclaim_stale<S: Store>(
    store: &S,
    keys: &RejectKeys,
    cutoff: &Timestamp,
) -> TxResult<Vec<MsgId>> {
    let stale = stale_leases(store, &keys.in_flight_ids, &keys.in_flight_data, cutoff)?;
    if stale.is_empty() {
        return Ok(stale);
    }
    let requeued = reject(store, keys, &stale)?;
    info!(queue = %keys.queue, stale = stale.len(), requeued, "reclaimed stale leases");
    Ok(stale)
}
