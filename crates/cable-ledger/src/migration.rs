//! Base pack migration.

use tracing::info;

use cable_ledger_core::{
    BillingPeriod, Clock, ConnectionId, LedgerError, PackId, Payment, Result,
};
use cable_ledger_store::Transactional;

use crate::{commit, connection_not_found};

/// Move a connection from `current_pack_id` to `to_pack_id`.
///
/// A connection pays once per period, so a migration supersedes this period's
/// entry if there is one: that entry is rewritten in place as a migration
/// dated now, priced at the target pack's current prices. Without one, a new
/// migration entry is inserted. Either way `last_payment` becomes now and the
/// connection's base pack becomes `to_pack_id`, all in one transaction.
///
/// # Errors
///
/// All validation happens before anything is written:
///
/// - `LedgerError::InvalidPack` if `to_pack_id` doesn't resolve.
/// - `LedgerError::SamePackMigration` if both packs are the same.
/// - `LedgerError::ConnectionNotFound` if the connection doesn't exist.
///
/// Storage errors roll back every staged write.
pub fn migrate_pack<S, C>(
    store: &S,
    clock: &C,
    connection_id: &ConnectionId,
    current_pack_id: &PackId,
    to_pack_id: &PackId,
) -> Result<Payment>
where
    S: Transactional + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let period = BillingPeriod::new(clock.start_of_month(now), now);

    let mut tx = store.begin()?;

    let target = tx
        .get_pack(to_pack_id)?
        .ok_or_else(|| LedgerError::InvalidPack {
            pack_id: to_pack_id.to_string(),
        })?;
    if current_pack_id == to_pack_id {
        return Err(LedgerError::SamePackMigration {
            pack_id: to_pack_id.to_string(),
        });
    }
    let mut connection = tx
        .get_connection(connection_id)?
        .ok_or_else(|| connection_not_found(connection_id))?;

    let (entry, collapsed) = match tx.find_payment_in_period(connection_id, &period)? {
        Some(mut existing) => {
            existing.supersede_with_migration(*current_pack_id, target.id, target.prices(), now);
            (existing, true)
        }
        None => {
            let entry = Payment::migration(
                *connection_id,
                *current_pack_id,
                target.id,
                target.prices(),
                now,
            );
            (entry, false)
        }
    };

    tx.put_payment(&entry)?;
    connection.last_payment = Some(now);
    connection.base_pack = target.id;
    connection.updated_at = now;
    tx.put_connection(&connection)?;
    commit(tx, "migrate_pack")?;

    info!(
        connection_id = %connection_id,
        payment_id = %entry.id,
        from_pack = %current_pack_id,
        to_pack = %to_pack_id,
        collapsed,
        "Pack migrated"
    );

    Ok(entry)
}
