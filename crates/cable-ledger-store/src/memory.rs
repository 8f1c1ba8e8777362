//! In-memory storage implementation.
//!
//! All tables live in one [`Mutex`]. A transaction holds the guard for its
//! whole lifetime and writes straight into the tables, recording an undo log;
//! dropping it uncommitted replays the log backwards.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use cable_ledger_core::{
    Addon, AddonId, Area, AreaId, BasePack, BillingPeriod, Channel, ChannelId, Connection,
    ConnectionId, PackId, Payment, PaymentId,
};

use crate::error::{Result, StoreError};
use crate::snapshot::Snapshot;
use crate::{sort_newest_first, Store, Transaction, Transactional};

#[derive(Debug, Default)]
struct Tables {
    areas: HashMap<AreaId, Area>,
    packs: HashMap<PackId, BasePack>,
    channels: HashMap<ChannelId, Channel>,
    addons: HashMap<AddonId, Addon>,
    connections: HashMap<ConnectionId, Connection>,
    payments: HashMap<PaymentId, Payment>,
}

impl Tables {
    fn addon_channels(&self, connection_id: &ConnectionId) -> Vec<Channel> {
        self.addons
            .values()
            .filter(|addon| addon.connection == *connection_id)
            .filter_map(|addon| self.channels.get(&addon.channel).cloned())
            .collect()
    }

    fn payments_of<'a>(
        &'a self,
        connection_id: &'a ConnectionId,
    ) -> impl Iterator<Item = &'a Payment> + 'a {
        self.payments
            .values()
            .filter(move |payment| payment.connection == *connection_id)
    }

    fn upsert_connection(&mut self, connection: &Connection) -> Result<Option<Connection>> {
        let taken = self.connections.values().any(|other| {
            other.id != connection.id && other.box_number == connection.box_number
        });
        if taken {
            return Err(StoreError::DuplicateBoxNumber {
                box_number: connection.box_number.clone(),
            });
        }
        Ok(self.connections.insert(connection.id, connection.clone()))
    }
}

fn sorted_by_name<T: Clone>(records: impl Iterator<Item = T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut records: Vec<T> = records.collect();
    records.sort_by(|a, b| name(a).cmp(name(b)));
    records
}

/// In-memory storage implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

impl Transactional for MemoryStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            tables: self.lock()?,
            undo: Vec::new(),
            committed: false,
        }))
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Area Operations
    // =========================================================================

    fn put_area(&self, area: &Area) -> Result<()> {
        self.lock()?.areas.insert(area.id, area.clone());
        Ok(())
    }

    fn get_area(&self, id: &AreaId) -> Result<Option<Area>> {
        Ok(self.lock()?.areas.get(id).cloned())
    }

    fn list_areas(&self) -> Result<Vec<Area>> {
        let tables = self.lock()?;
        Ok(sorted_by_name(tables.areas.values().cloned(), |a| a.name.as_str()))
    }

    fn delete_area(&self, id: &AreaId) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.areas.contains_key(id) {
            return Err(StoreError::not_found("area", id));
        }
        if tables.connections.values().any(|c| c.area == *id) {
            return Err(StoreError::in_use("area", id));
        }
        tables.areas.remove(id);
        Ok(())
    }

    // =========================================================================
    // Pack Operations
    // =========================================================================

    fn put_pack(&self, pack: &BasePack) -> Result<()> {
        self.lock()?.packs.insert(pack.id, pack.clone());
        Ok(())
    }

    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>> {
        Ok(self.lock()?.packs.get(id).cloned())
    }

    fn list_packs(&self) -> Result<Vec<BasePack>> {
        let tables = self.lock()?;
        Ok(sorted_by_name(tables.packs.values().cloned(), |p| p.name.as_str()))
    }

    fn delete_pack(&self, id: &PackId) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.packs.contains_key(id) {
            return Err(StoreError::not_found("pack", id));
        }
        if tables.connections.values().any(|c| c.base_pack == *id) {
            return Err(StoreError::in_use("pack", id));
        }
        tables.packs.remove(id);
        Ok(())
    }

    // =========================================================================
    // Channel Operations
    // =========================================================================

    fn put_channel(&self, channel: &Channel) -> Result<()> {
        self.lock()?.channels.insert(channel.id, channel.clone());
        Ok(())
    }

    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>> {
        Ok(self.lock()?.channels.get(id).cloned())
    }

    fn list_channels(&self) -> Result<Vec<Channel>> {
        let tables = self.lock()?;
        Ok(sorted_by_name(tables.channels.values().cloned(), |c| c.name.as_str()))
    }

    fn delete_channel(&self, id: &ChannelId) -> Result<()> {
        let mut tables = self.lock()?;
        if !tables.channels.contains_key(id) {
            return Err(StoreError::not_found("channel", id));
        }
        if tables.addons.values().any(|a| a.channel == *id) {
            return Err(StoreError::in_use("channel", id));
        }
        tables.channels.remove(id);
        Ok(())
    }

    // =========================================================================
    // Add-on Operations
    // =========================================================================

    fn put_addon(&self, addon: &Addon) -> Result<()> {
        self.lock()?.addons.insert(addon.id, addon.clone());
        Ok(())
    }

    fn delete_addon(&self, id: &AddonId) -> Result<()> {
        self.lock()?
            .addons
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("addon", id))
    }

    fn list_addons_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Addon>> {
        let tables = self.lock()?;
        Ok(tables
            .addons
            .values()
            .filter(|addon| addon.connection == *connection_id)
            .cloned()
            .collect())
    }

    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>> {
        Ok(self.lock()?.addon_channels(connection_id))
    }

    // =========================================================================
    // Connection Operations
    // =========================================================================

    fn put_connection(&self, connection: &Connection) -> Result<()> {
        self.lock()?.upsert_connection(connection).map(|_| ())
    }

    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        Ok(self.lock()?.connections.get(id).cloned())
    }

    fn find_connection_by_box_number(&self, box_number: &str) -> Result<Option<Connection>> {
        Ok(self
            .lock()?
            .connections
            .values()
            .find(|c| c.box_number == box_number)
            .cloned())
    }

    fn list_connections(&self) -> Result<Vec<Connection>> {
        let tables = self.lock()?;
        Ok(sorted_by_name(tables.connections.values().cloned(), |c| c.name.as_str()))
    }

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.lock()?.payments.get(id).cloned())
    }

    fn list_payments_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Payment>> {
        let tables = self.lock()?;
        let mut payments: Vec<Payment> = tables.payments_of(connection_id).cloned().collect();
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    fn list_payments_between(&self, period: &BillingPeriod) -> Result<Vec<Payment>> {
        let tables = self.lock()?;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|payment| period.contains(payment.date))
            .cloned()
            .collect();
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    fn export_snapshot(&self) -> Result<Snapshot> {
        let tables = self.lock()?;
        Ok(Snapshot {
            areas: tables.areas.values().cloned().collect(),
            packs: tables.packs.values().cloned().collect(),
            channels: tables.channels.values().cloned().collect(),
            connections: tables.connections.values().cloned().collect(),
            addons: tables.addons.values().cloned().collect(),
            payments: tables.payments.values().cloned().collect(),
            ..Snapshot::empty(Utc::now())
        })
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.validate()?;

        let mut tables = self.lock()?;
        *tables = Tables {
            areas: snapshot.areas.iter().map(|a| (a.id, a.clone())).collect(),
            packs: snapshot.packs.iter().map(|p| (p.id, p.clone())).collect(),
            channels: snapshot.channels.iter().map(|c| (c.id, c.clone())).collect(),
            addons: snapshot.addons.iter().map(|a| (a.id, a.clone())).collect(),
            connections: snapshot.connections.iter().map(|c| (c.id, c.clone())).collect(),
            payments: snapshot.payments.iter().map(|p| (p.id, p.clone())).collect(),
        };
        Ok(())
    }
}

/// A previous row value, restored on rollback.
enum Undo {
    Payment(PaymentId, Option<Payment>),
    Connection(ConnectionId, Option<Connection>),
}

struct MemoryTransaction<'a> {
    tables: MutexGuard<'a, Tables>,
    undo: Vec<Undo>,
    committed: bool,
}

impl Transaction for MemoryTransaction<'_> {
    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        Ok(self.tables.connections.get(id).cloned())
    }

    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>> {
        Ok(self.tables.packs.get(id).cloned())
    }

    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>> {
        Ok(self.tables.addon_channels(connection_id))
    }

    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.tables.payments.get(id).cloned())
    }

    fn find_payment_in_period(
        &self,
        connection_id: &ConnectionId,
        period: &BillingPeriod,
    ) -> Result<Option<Payment>> {
        Ok(self
            .tables
            .payments_of(connection_id)
            .filter(|payment| period.contains(payment.date))
            .max_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    fn latest_payment(&self, connection_id: &ConnectionId) -> Result<Option<Payment>> {
        Ok(self
            .tables
            .payments_of(connection_id)
            .max_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    fn put_payment(&mut self, payment: &Payment) -> Result<()> {
        let previous = self.tables.payments.insert(payment.id, payment.clone());
        self.undo.push(Undo::Payment(payment.id, previous));
        Ok(())
    }

    fn delete_payment(&mut self, id: &PaymentId) -> Result<bool> {
        let previous = self.tables.payments.remove(id);
        let existed = previous.is_some();
        self.undo.push(Undo::Payment(*id, previous));
        Ok(existed)
    }

    fn put_connection(&mut self, connection: &Connection) -> Result<()> {
        let previous = self.tables.upsert_connection(connection)?;
        self.undo.push(Undo::Connection(connection.id, previous));
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Payment(id, Some(payment)) => {
                    self.tables.payments.insert(id, payment);
                }
                Undo::Payment(id, None) => {
                    self.tables.payments.remove(&id);
                }
                Undo::Connection(id, Some(connection)) => {
                    self.tables.connections.insert(id, connection);
                }
                Undo::Connection(id, None) => {
                    self.tables.connections.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use cable_ledger_core::Prices;

    fn seeded() -> (MemoryStore, Connection, BasePack) {
        let store = MemoryStore::new();
        let area = Area::new("North Street");
        let pack = BasePack::new("Basic", 90, 200);
        store.put_area(&area).unwrap();
        store.put_pack(&pack).unwrap();
        let connection = Connection::new("RAVI", "SC-1", area.id, pack.id, Utc::now());
        store.put_connection(&connection).unwrap();
        (store, connection, pack)
    }

    #[test]
    fn committed_writes_are_visible() {
        let (store, mut connection, pack) = seeded();
        let date = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let payment = Payment::payment(connection.id, pack.id, Prices::new(90, 200), date);

        let mut tx = store.begin().unwrap();
        tx.put_payment(&payment).unwrap();
        connection.last_payment = Some(date);
        tx.put_connection(&connection).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.get_payment(&payment.id).unwrap(), Some(payment));
        assert_eq!(
            store.get_connection(&connection.id).unwrap().unwrap().last_payment,
            Some(date)
        );
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (store, mut connection, pack) = seeded();
        let date = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let payment = Payment::payment(connection.id, pack.id, Prices::new(90, 200), date);

        {
            let mut tx = store.begin().unwrap();
            tx.put_payment(&payment).unwrap();
            connection.last_payment = Some(date);
            tx.put_connection(&connection).unwrap();
            assert!(tx.latest_payment(&connection.id).unwrap().is_some());
        }

        assert!(store.get_payment(&payment.id).unwrap().is_none());
        assert!(store
            .get_connection(&connection.id)
            .unwrap()
            .unwrap()
            .last_payment
            .is_none());
    }

    #[test]
    fn transaction_reads_its_own_deletes() {
        let (store, connection, pack) = seeded();
        let jan = Utc.with_ymd_and_hms(2025, 1, 5, 10, 0, 0).unwrap();
        let feb = jan + Duration::days(36);
        let older = Payment::payment(connection.id, pack.id, Prices::new(90, 200), jan);
        let newer = Payment::payment(connection.id, pack.id, Prices::new(90, 200), feb);

        let mut tx = store.begin().unwrap();
        tx.put_payment(&older).unwrap();
        tx.put_payment(&newer).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert!(tx.delete_payment(&newer.id).unwrap());
        assert_eq!(tx.latest_payment(&connection.id).unwrap(), Some(older));
        assert!(!tx.delete_payment(&newer.id).unwrap());
    }

    #[test]
    fn box_numbers_are_unique() {
        let (store, connection, _) = seeded();
        let mut twin =
            Connection::new("OTHER", "SC-1", connection.area, connection.base_pack, Utc::now());
        assert!(matches!(
            store.put_connection(&twin),
            Err(StoreError::DuplicateBoxNumber { .. })
        ));

        twin.box_number = "SC-2".into();
        store.put_connection(&twin).unwrap();
        assert_eq!(
            store.find_connection_by_box_number("SC-2").unwrap().map(|c| c.id),
            Some(twin.id)
        );
    }

    #[test]
    fn referenced_records_cannot_be_deleted() {
        let (store, connection, pack) = seeded();
        let channel = Channel::new("Sports", 20, 50);
        store.put_channel(&channel).unwrap();
        let addon = Addon::new(connection.id, channel.id);
        store.put_addon(&addon).unwrap();

        assert!(matches!(store.delete_pack(&pack.id), Err(StoreError::InUse { .. })));
        assert!(matches!(
            store.delete_area(&connection.area),
            Err(StoreError::InUse { .. })
        ));
        assert!(matches!(
            store.delete_channel(&channel.id),
            Err(StoreError::InUse { .. })
        ));

        store.delete_addon(&addon.id).unwrap();
        store.delete_channel(&channel.id).unwrap();
        assert!(matches!(
            store.delete_channel(&channel.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn payments_between_are_newest_first() {
        let (store, connection, pack) = seeded();
        let march = BillingPeriod::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap(),
        );
        let mut tx = store.begin().unwrap();
        for day in [2, 20, 9] {
            let date = Utc.with_ymd_and_hms(2025, 3, day, 8, 0, 0).unwrap();
            tx.put_payment(&Payment::payment(connection.id, pack.id, Prices::default(), date))
                .unwrap();
        }
        let april = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        tx.put_payment(&Payment::payment(connection.id, pack.id, Prices::default(), april))
            .unwrap();
        tx.commit().unwrap();

        let days: Vec<u32> = store
            .list_payments_between(&march)
            .unwrap()
            .iter()
            .map(|p| chrono::Datelike::day(&p.date))
            .collect();
        assert_eq!(days, vec![20, 9, 2]);
    }

    #[test]
    fn snapshot_import_replaces_everything() {
        let (store, connection, pack) = seeded();
        let snapshot = store.export_snapshot().unwrap();

        let other = MemoryStore::new();
        other.put_area(&Area::new("Stale")).unwrap();
        other.import_snapshot(&snapshot).unwrap();

        assert_eq!(other.list_areas().unwrap().len(), 1);
        assert_eq!(other.get_pack(&pack.id).unwrap(), Some(pack));
        assert_eq!(other.get_connection(&connection.id).unwrap(), Some(connection));
    }
}
