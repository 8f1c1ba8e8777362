//! Recording and deleting monthly payments.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use cable_ledger_core::{
    BasePack, BillingPeriod, Clock, ConnectionId, LedgerError, Payment, PaymentId, Prices, Result,
};
use cable_ledger_store::Transactional;

use crate::{commit, connection_not_found};

/// What [`mark_connection_as_paid`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// A new payment entry was written.
    Recorded(Payment),
    /// The connection already had an entry this period; nothing was written.
    AlreadyPaid(Payment),
}

impl PaymentOutcome {
    /// The entry that was written, or the one that was already there.
    #[must_use]
    pub const fn payment(&self) -> &Payment {
        match self {
            Self::Recorded(payment) | Self::AlreadyPaid(payment) => payment,
        }
    }

    /// Whether a new entry was written.
    #[must_use]
    pub const fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

/// Record this period's payment for a connection on `current_pack`.
///
/// If the connection already has a ledger entry dated between the start of
/// the current month and now, that entry is returned and nothing changes.
/// Otherwise a payment entry is written with prices composed from
/// `current_pack` and the connection's add-ons, and `last_payment` is set to
/// now. Both writes land together or not at all.
///
/// # Errors
///
/// - `LedgerError::ConnectionNotFound` if the connection doesn't exist.
/// - Storage errors; nothing is written in that case.
pub fn mark_connection_as_paid<S, C>(
    store: &S,
    clock: &C,
    connection_id: &ConnectionId,
    current_pack: &BasePack,
) -> Result<PaymentOutcome>
where
    S: Transactional + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let period = BillingPeriod::new(clock.start_of_month(now), now);

    let mut tx = store.begin()?;
    let mut connection = tx
        .get_connection(connection_id)?
        .ok_or_else(|| connection_not_found(connection_id))?;

    if let Some(existing) = tx.find_payment_in_period(connection_id, &period)? {
        debug!(
            connection_id = %connection_id,
            payment_id = %existing.id,
            "Connection already paid this period"
        );
        return Ok(PaymentOutcome::AlreadyPaid(existing));
    }

    let prices = Prices::compose(current_pack, &tx.list_addon_channels(connection_id)?);
    let entry = Payment::payment(*connection_id, current_pack.id, prices, now);

    tx.put_payment(&entry)?;
    connection.last_payment = Some(now);
    connection.updated_at = now;
    tx.put_connection(&connection)?;
    commit(tx, "mark_connection_as_paid")?;

    info!(
        connection_id = %connection_id,
        payment_id = %entry.id,
        pack_id = %current_pack.id,
        lco_price = entry.lco_price,
        customer_price = entry.customer_price,
        "Payment recorded"
    );

    Ok(PaymentOutcome::Recorded(entry))
}

/// Delete a ledger entry and repair the connection's `last_payment`.
///
/// After the row is gone, `last_payment` becomes the date of the newest
/// remaining entry, or `None` if there is none. Deleting an entry that is
/// already gone still repairs the cache. Returns the repaired value.
///
/// If the connection itself no longer exists the entry is still deleted and
/// there is nothing to repair.
///
/// # Errors
///
/// - `LedgerError::InvalidInput` if the entry belongs to another connection.
/// - Storage errors; nothing is written in that case.
pub fn delete_payment<S>(
    store: &S,
    payment_id: &PaymentId,
    connection_id: &ConnectionId,
) -> Result<Option<DateTime<Utc>>>
where
    S: Transactional + ?Sized,
{
    let mut tx = store.begin()?;

    if let Some(entry) = tx.get_payment(payment_id)? {
        if entry.connection != *connection_id {
            return Err(LedgerError::InvalidInput(format!(
                "payment {payment_id} belongs to connection {}",
                entry.connection
            )));
        }
    }

    let removed = tx.delete_payment(payment_id)?;
    let last_payment = tx.latest_payment(connection_id)?.map(|entry| entry.date);

    match tx.get_connection(connection_id)? {
        Some(mut connection) if connection.last_payment != last_payment => {
            connection.last_payment = last_payment;
            tx.put_connection(&connection)?;
        }
        Some(_) => {}
        None => warn!(
            connection_id = %connection_id,
            "Connection not found; ledger entry deleted without repair"
        ),
    }
    commit(tx, "delete_payment")?;

    info!(
        connection_id = %connection_id,
        payment_id = %payment_id,
        removed,
        last_payment = ?last_payment,
        "Ledger entry deleted"
    );

    Ok(last_payment)
}
