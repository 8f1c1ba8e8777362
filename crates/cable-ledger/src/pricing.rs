//! Store-backed price composition.

use cable_ledger_core::{BasePack, ConnectionId, Prices, Result};
use cable_ledger_store::Store;

/// Total prices for `connection_id` on `base_pack`: the pack's prices plus
/// those of every add-on channel the connection carries.
///
/// A connection with no add-on rows, or one that doesn't exist, pays the
/// pack's prices only.
///
/// # Errors
///
/// Returns an error if the add-on rows cannot be read.
pub fn compose_price<S>(
    store: &S,
    connection_id: &ConnectionId,
    base_pack: &BasePack,
) -> Result<Prices>
where
    S: Store + ?Sized,
{
    let channels = store.list_addon_channels(connection_id)?;
    Ok(Prices::compose(base_pack, &channels))
}
