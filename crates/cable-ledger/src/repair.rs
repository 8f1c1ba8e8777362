//! Re-deriving the `last_payment` cache from the ledger.
//!
//! Ledger operations keep the cache in step on their own. These are for
//! data that arrived another way, such as a snapshot import or a bulk edit.

use tracing::{debug, info};

use cable_ledger_core::{ConnectionId, Result};
use cable_ledger_store::{Store, Transactional};

use crate::{commit, connection_not_found};

/// Set a connection's `last_payment` to the date of its newest ledger entry.
///
/// Returns whether the stored value changed.
///
/// # Errors
///
/// - `LedgerError::ConnectionNotFound` if the connection doesn't exist.
/// - Storage errors; nothing is written in that case.
pub fn repair_last_payment<S>(store: &S, connection_id: &ConnectionId) -> Result<bool>
where
    S: Transactional + ?Sized,
{
    let mut tx = store.begin()?;
    let mut connection = tx
        .get_connection(connection_id)?
        .ok_or_else(|| connection_not_found(connection_id))?;
    let derived = tx.latest_payment(connection_id)?.map(|entry| entry.date);

    if connection.last_payment == derived {
        debug!(connection_id = %connection_id, "last_payment already consistent");
        return Ok(false);
    }

    let stale = connection.last_payment;
    connection.last_payment = derived;
    tx.put_connection(&connection)?;
    commit(tx, "repair_last_payment")?;

    info!(
        connection_id = %connection_id,
        stale = ?stale,
        repaired = ?derived,
        "last_payment repaired"
    );
    Ok(true)
}

/// Repair every connection. Returns the ones whose value changed.
///
/// # Errors
///
/// Returns an error if the store cannot be read or a repair cannot be written.
/// Repairs committed before the failure stay in place.
pub fn repair_all<S>(store: &S) -> Result<Vec<ConnectionId>>
where
    S: Store + ?Sized,
{
    let mut repaired = Vec::new();
    for connection in store.list_connections()? {
        if repair_last_payment(store, &connection.id)? {
            repaired.push(connection.id);
        }
    }

    info!(repaired = repaired.len(), "Ledger cache repair finished");
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cable_ledger_core::{Area, BasePack, Connection, LedgerError, Payment, Prices};
    use cable_ledger_store::{MemoryStore, Snapshot};
    use chrono::{TimeZone, Utc};

    #[test]
    fn repairs_connections_after_snapshot_import() {
        let store = MemoryStore::new();
        let area = Area::new("Lake View");
        let pack = BasePack::new("Basic", 90, 200);
        let date = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        let paid = Connection::new("ASHA", "SC-1", area.id, pack.id, date);
        let mut stale = Connection::new("BINDU", "SC-2", area.id, pack.id, date);
        stale.last_payment = Some(date);

        let snapshot = Snapshot {
            areas: vec![area],
            packs: vec![pack.clone()],
            payments: vec![Payment::payment(paid.id, pack.id, Prices::new(90, 200), date)],
            connections: vec![paid.clone(), stale.clone()],
            ..Snapshot::empty(date)
        };
        store.import_snapshot(&snapshot).unwrap();

        let mut repaired = repair_all(&store).unwrap();
        repaired.sort();
        let mut expected = vec![paid.id, stale.id];
        expected.sort();
        assert_eq!(repaired, expected);

        assert_eq!(store.get_connection(&paid.id).unwrap().unwrap().last_payment, Some(date));
        assert_eq!(store.get_connection(&stale.id).unwrap().unwrap().last_payment, None);
        assert!(repair_all(&store).unwrap().is_empty());
    }

    #[test]
    fn unknown_connection_is_an_error() {
        let store = MemoryStore::new();
        let err = repair_last_payment(&store, &ConnectionId::generate()).unwrap_err();
        assert!(matches!(err, LedgerError::ConnectionNotFound { .. }));
    }
}
