//! Areas, packs, channels, add-ons and connections.
//!
//! Thin validation over the store. Deletions of records that are still
//! referenced are refused by the store itself.

use tracing::info;

use cable_ledger_core::{
    Addon, AddonId, Area, AreaId, BasePack, Channel, ChannelId, Clock, Connection, ConnectionId,
    ConnectionStatus, LedgerError, PackId, Prices, Result,
};
use cable_ledger_store::Store;

use crate::connection_not_found;

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(LedgerError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn check_prices(prices: Prices) -> Result<()> {
    if prices.lco < 0 || prices.customer < 0 {
        return Err(LedgerError::InvalidInput(format!(
            "prices must not be negative (lco {}, customer {})",
            prices.lco, prices.customer
        )));
    }
    Ok(())
}

fn not_found(entity: &'static str, id: &impl ToString) -> LedgerError {
    LedgerError::NotFound {
        entity,
        id: id.to_string(),
    }
}

// =============================================================================
// Areas
// =============================================================================

/// Create an area.
///
/// # Errors
///
/// Returns `LedgerError::InvalidInput` for a blank name, or a storage error.
pub fn add_area<S: Store + ?Sized>(store: &S, name: &str) -> Result<Area> {
    let area = Area::new(required("area name", name)?);
    store.put_area(&area)?;
    info!(area_id = %area.id, name = %area.name, "Area added");
    Ok(area)
}

/// Rename an area.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` if the area doesn't exist.
pub fn rename_area<S: Store + ?Sized>(store: &S, id: &AreaId, name: &str) -> Result<Area> {
    let mut area = store.get_area(id)?.ok_or_else(|| not_found("area", id))?;
    area.name = required("area name", name)?;
    store.put_area(&area)?;
    Ok(area)
}

/// Delete an area no connection belongs to.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` or `LedgerError::InUse`.
pub fn delete_area<S: Store + ?Sized>(store: &S, id: &AreaId) -> Result<()> {
    store.delete_area(id)?;
    info!(area_id = %id, "Area deleted");
    Ok(())
}

// =============================================================================
// Packs
// =============================================================================

/// Create a base pack.
///
/// # Errors
///
/// Returns `LedgerError::InvalidInput` for a blank name or negative prices.
pub fn add_pack<S: Store + ?Sized>(store: &S, name: &str, prices: Prices) -> Result<BasePack> {
    check_prices(prices)?;
    let pack = BasePack::new(required("pack name", name)?, prices.lco, prices.customer);
    store.put_pack(&pack)?;
    info!(pack_id = %pack.id, name = %pack.name, "Pack added");
    Ok(pack)
}

/// Rename or reprice a base pack.
///
/// Ledger entries already written keep their prices.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` if the pack doesn't exist, or
/// `LedgerError::InvalidInput` for a blank name or negative prices.
pub fn update_pack<S: Store + ?Sized>(store: &S, pack: &BasePack) -> Result<()> {
    check_prices(pack.prices())?;
    let name = required("pack name", &pack.name)?;
    if store.get_pack(&pack.id)?.is_none() {
        return Err(not_found("pack", &pack.id));
    }
    store.put_pack(&BasePack {
        name,
        ..pack.clone()
    })?;
    info!(
        pack_id = %pack.id,
        lco_price = pack.lco_price,
        customer_price = pack.customer_price,
        "Pack updated"
    );
    Ok(())
}

/// Delete a base pack no connection is on.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` or `LedgerError::InUse`.
pub fn delete_pack<S: Store + ?Sized>(store: &S, id: &PackId) -> Result<()> {
    store.delete_pack(id)?;
    info!(pack_id = %id, "Pack deleted");
    Ok(())
}

// =============================================================================
// Channels
// =============================================================================

/// Create an add-on channel.
///
/// # Errors
///
/// Returns `LedgerError::InvalidInput` for a blank name or negative prices.
pub fn add_channel<S: Store + ?Sized>(store: &S, name: &str, prices: Prices) -> Result<Channel> {
    check_prices(prices)?;
    let channel = Channel::new(required("channel name", name)?, prices.lco, prices.customer);
    store.put_channel(&channel)?;
    info!(channel_id = %channel.id, name = %channel.name, "Channel added");
    Ok(channel)
}

/// Rename or reprice a channel.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` if the channel doesn't exist, or
/// `LedgerError::InvalidInput` for a blank name or negative prices.
pub fn update_channel<S: Store + ?Sized>(store: &S, channel: &Channel) -> Result<()> {
    check_prices(channel.prices())?;
    let name = required("channel name", &channel.name)?;
    if store.get_channel(&channel.id)?.is_none() {
        return Err(not_found("channel", &channel.id));
    }
    store.put_channel(&Channel {
        name,
        ..channel.clone()
    })?;
    info!(
        channel_id = %channel.id,
        lco_price = channel.lco_price,
        customer_price = channel.customer_price,
        "Channel updated"
    );
    Ok(())
}

/// Delete a channel no add-on row references.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` or `LedgerError::InUse`.
pub fn delete_channel<S: Store + ?Sized>(store: &S, id: &ChannelId) -> Result<()> {
    store.delete_channel(id)?;
    info!(channel_id = %id, "Channel deleted");
    Ok(())
}

// =============================================================================
// Add-ons
// =============================================================================

/// Attach a channel to a connection.
///
/// # Errors
///
/// Returns `LedgerError::ConnectionNotFound` or `LedgerError::NotFound` if
/// either side doesn't exist.
pub fn add_addon<S: Store + ?Sized>(
    store: &S,
    connection_id: &ConnectionId,
    channel_id: &ChannelId,
) -> Result<Addon> {
    if store.get_connection(connection_id)?.is_none() {
        return Err(connection_not_found(connection_id));
    }
    if store.get_channel(channel_id)?.is_none() {
        return Err(not_found("channel", channel_id));
    }

    let addon = Addon::new(*connection_id, *channel_id);
    store.put_addon(&addon)?;
    info!(connection_id = %connection_id, channel_id = %channel_id, "Add-on attached");
    Ok(addon)
}

/// Detach an add-on row.
///
/// # Errors
///
/// Returns `LedgerError::NotFound` if the row doesn't exist.
pub fn remove_addon<S: Store + ?Sized>(store: &S, id: &AddonId) -> Result<()> {
    store.delete_addon(id)?;
    info!(addon_id = %id, "Add-on removed");
    Ok(())
}

// =============================================================================
// Connections
// =============================================================================

/// Fields of a connection supplied by whoever registers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnection {
    /// Subscriber name.
    pub name: String,
    /// Set-top box number; unique across connections.
    pub box_number: String,
    /// Area the connection belongs to.
    pub area: AreaId,
    /// Base pack the connection starts on.
    pub base_pack: PackId,
    /// Contact number, if known.
    pub phone_number: Option<String>,
}

fn check_references<S: Store + ?Sized>(store: &S, area: &AreaId, pack: &PackId) -> Result<()> {
    if store.get_area(area)?.is_none() {
        return Err(not_found("area", area));
    }
    if store.get_pack(pack)?.is_none() {
        return Err(not_found("pack", pack));
    }
    Ok(())
}

/// Register a connection. It starts active and unpaid.
///
/// # Errors
///
/// - `LedgerError::InvalidInput` for a blank name or box number.
/// - `LedgerError::NotFound` if the area or pack doesn't exist.
/// - `LedgerError::DuplicateBoxNumber` if the box number is taken.
pub fn add_connection<S, C>(store: &S, clock: &C, new: NewConnection) -> Result<Connection>
where
    S: Store + ?Sized,
    C: Clock + ?Sized,
{
    let name = required("connection name", &new.name)?;
    let box_number = required("box number", &new.box_number)?;
    check_references(store, &new.area, &new.base_pack)?;

    let mut connection = Connection::new(name, box_number, new.area, new.base_pack, clock.now());
    connection.phone_number = new.phone_number.filter(|phone| !phone.trim().is_empty());
    store.put_connection(&connection)?;

    info!(
        connection_id = %connection.id,
        box_number = %connection.box_number,
        "Connection added"
    );
    Ok(connection)
}

/// Edit a connection's details.
///
/// `last_payment` and `created_at` are kept from the stored record; the
/// ledger owns the former.
///
/// # Errors
///
/// - `LedgerError::ConnectionNotFound` if the connection doesn't exist.
/// - `LedgerError::InvalidInput`, `LedgerError::NotFound` or
///   `LedgerError::DuplicateBoxNumber` as for [`add_connection`].
pub fn update_connection<S, C>(store: &S, clock: &C, connection: &Connection) -> Result<Connection>
where
    S: Store + ?Sized,
    C: Clock + ?Sized,
{
    let stored = store
        .get_connection(&connection.id)?
        .ok_or_else(|| connection_not_found(&connection.id))?;
    check_references(store, &connection.area, &connection.base_pack)?;

    let updated = Connection {
        name: required("connection name", &connection.name)?,
        box_number: required("box number", &connection.box_number)?,
        last_payment: stored.last_payment,
        created_at: stored.created_at,
        updated_at: clock.now(),
        ..connection.clone()
    };
    store.put_connection(&updated)?;

    info!(connection_id = %updated.id, "Connection updated");
    Ok(updated)
}

/// Switch a connection on or off.
///
/// # Errors
///
/// Returns `LedgerError::ConnectionNotFound` if the connection doesn't exist.
pub fn set_connection_status<S, C>(
    store: &S,
    clock: &C,
    id: &ConnectionId,
    status: ConnectionStatus,
) -> Result<Connection>
where
    S: Store + ?Sized,
    C: Clock + ?Sized,
{
    let mut connection = store
        .get_connection(id)?
        .ok_or_else(|| connection_not_found(id))?;
    connection.status = status;
    connection.updated_at = clock.now();
    store.put_connection(&connection)?;

    info!(connection_id = %id, status = ?status, "Connection status changed");
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cable_ledger_core::ManualClock;
    use cable_ledger_store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap())
    }

    fn new_connection(area: &Area, pack: &BasePack, box_number: &str) -> NewConnection {
        NewConnection {
            name: "  KAVYA ".into(),
            box_number: box_number.into(),
            area: area.id,
            base_pack: pack.id,
            phone_number: Some(String::new()),
        }
    }

    #[test]
    fn new_connections_start_unpaid() {
        let store = MemoryStore::new();
        let clock = clock();
        let area = add_area(&store, "Canal Road").unwrap();
        let pack = add_pack(&store, "Basic", Prices::new(90, 200)).unwrap();

        let connection =
            add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap();
        assert_eq!(connection.name, "KAVYA");
        assert_eq!(connection.last_payment, None);
        assert_eq!(connection.phone_number, None);
        assert_eq!(connection.status, ConnectionStatus::Active);
    }

    #[test]
    fn duplicate_box_numbers_are_rejected() {
        let store = MemoryStore::new();
        let clock = clock();
        let area = add_area(&store, "Canal Road").unwrap();
        let pack = add_pack(&store, "Basic", Prices::new(90, 200)).unwrap();
        add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap();

        let err = add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateBoxNumber { .. }));
    }

    #[test]
    fn update_keeps_ledger_owned_fields() {
        let store = MemoryStore::new();
        let clock = clock();
        let area = add_area(&store, "Canal Road").unwrap();
        let pack = add_pack(&store, "Basic", Prices::new(90, 200)).unwrap();
        let mut stored =
            add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap();
        stored.last_payment = Some(clock.now());
        store.put_connection(&stored).unwrap();

        clock.advance(Duration::hours(1));
        let mut edited = stored.clone();
        edited.name = "KAVYA R".into();
        edited.last_payment = None;
        let updated = update_connection(&store, &clock, &edited).unwrap();

        assert_eq!(updated.name, "KAVYA R");
        assert_eq!(updated.last_payment, stored.last_payment);
        assert_eq!(updated.updated_at, clock.now());
    }

    #[test]
    fn addons_need_both_sides() {
        let store = MemoryStore::new();
        let clock = clock();
        let area = add_area(&store, "Canal Road").unwrap();
        let pack = add_pack(&store, "Basic", Prices::new(90, 200)).unwrap();
        let connection =
            add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap();

        let err = add_addon(&store, &connection.id, &ChannelId::generate()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { entity: "channel", .. }));

        let channel = add_channel(&store, "Sports", Prices::new(20, 50)).unwrap();
        let addon = add_addon(&store, &connection.id, &channel.id).unwrap();
        assert!(matches!(
            delete_channel(&store, &channel.id),
            Err(LedgerError::InUse { entity: "channel", .. })
        ));

        remove_addon(&store, &addon.id).unwrap();
        delete_channel(&store, &channel.id).unwrap();
    }

    #[test]
    fn referenced_area_and_pack_cannot_be_deleted() {
        let store = MemoryStore::new();
        let clock = clock();
        let area = add_area(&store, "Canal Road").unwrap();
        let pack = add_pack(&store, "Basic", Prices::new(90, 200)).unwrap();
        add_connection(&store, &clock, new_connection(&area, &pack, "SC-1")).unwrap();

        assert!(matches!(delete_area(&store, &area.id), Err(LedgerError::InUse { .. })));
        assert!(matches!(delete_pack(&store, &pack.id), Err(LedgerError::InUse { .. })));
    }

    #[test]
    fn rejects_blank_names_and_negative_prices() {
        let store = MemoryStore::new();
        assert!(matches!(add_area(&store, "   "), Err(LedgerError::InvalidInput(_))));
        assert!(matches!(
            add_pack(&store, "Basic", Prices::new(-1, 200)),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(store.list_packs().unwrap().is_empty());
    }
    #[test]
    fn update_channel_reprices_in_place() {
        let store = MemoryStore::new();
        let channel = add_channel(&store, "Sports", Prices::new(20, 50)).unwrap();

        let repriced = Channel {
            name: " Sports HD ".into(),
            lco_price: 25,
            customer_price: 60,
            ..channel.clone()
        };
        update_channel(&store, &repriced).unwrap();

        let stored = store.get_channel(&channel.id).unwrap().unwrap();
        assert_eq!(stored.name, "Sports HD");
        assert_eq!(stored.prices(), Prices::new(25, 60));

        let stray = Channel::new("Movies", 15, 40);
        assert!(matches!(
            update_channel(&store, &stray),
            Err(LedgerError::NotFound { entity: "channel", .. })
        ));
    }
}
