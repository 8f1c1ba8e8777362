//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Every write goes through a `WriteBatch` while holding the store's write
//! lock, so index entries and records never diverge and a transaction's
//! check-then-write sequence cannot interleave with another writer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use cable_ledger_core::{
    Addon, AddonId, Area, AreaId, BasePack, BillingPeriod, Channel, ChannelId, Connection,
    ConnectionId, PackId, Payment, PaymentId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::snapshot::Snapshot;
use crate::{sort_newest_first, Store, Transaction, Transactional};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        self.db
            .get_cf(&cf, key)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_record<T: serde::Serialize>(&self, name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(name)?;
        let value = Self::serialize(value)?;
        let _guard = self.lock()?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Every value of a column family, in key order.
    fn scan_values<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Keys from `from` onwards, for as long as `keep_going` accepts them.
    fn scan_keys(
        &self,
        name: &str,
        from: &[u8],
        mut keep_going: impl FnMut(&[u8]) -> bool,
    ) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(name)?;
        let mut found = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::From(from, Direction::Forward)) {
            let (key, _) = item?;
            if !keep_going(&key[..]) {
                break;
            }
            found.push(key);
        }
        Ok(found)
    }

    /// Resolve payment index keys to records, skipping entries whose record is gone.
    fn load_payments(&self, index_keys: &[Box<[u8]>]) -> Result<Vec<Payment>> {
        let mut payments = Vec::with_capacity(index_keys.len());
        for key in index_keys {
            let payment_id = keys::extract_payment_id(key)?;
            match self.get_payment(&payment_id)? {
                Some(payment) => payments.push(payment),
                None => tracing::warn!(payment_id = %payment_id, "Dangling ledger index entry"),
            }
        }
        Ok(payments)
    }

    /// A connection's ledger entries in date order, optionally limited to `period`.
    fn connection_payments(
        &self,
        connection_id: &ConnectionId,
        period: Option<&BillingPeriod>,
    ) -> Result<Vec<Payment>> {
        let prefix = connection_id.as_bytes();
        let seek = match period {
            Some(period) => keys::connection_payments_from(connection_id, period.start),
            None => prefix.to_vec(),
        };
        let end = period.map(|period| keys::encode_timestamp(period.end));

        let index_keys = self.scan_keys(cf::PAYMENTS_BY_CONNECTION, &seek, |key| {
            key.starts_with(prefix)
                && end.map_or(true, |end| {
                    keys::connection_payment_timestamp(key).is_some_and(|ts| ts <= &end[..])
                })
        })?;
        // Index keys carry whole milliseconds; dates keep full precision.
        let mut payments = self.load_payments(&index_keys)?;
        if let Some(period) = period {
            payments.retain(|payment| period.contains(payment.date));
        }
        Ok(payments)
    }

    fn any_connection(&self, matches: impl Fn(&Connection) -> bool) -> Result<bool> {
        Ok(self
            .scan_values::<Connection>(cf::CONNECTIONS)?
            .iter()
            .any(matches))
    }

    fn delete_record(&self, name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(name)?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch)?;
        Ok(())
    }

    // =========================================================================
    // Batch staging
    // =========================================================================

    fn stage_payment_rows(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        let cf_payments = self.cf(cf::PAYMENTS)?;
        let cf_by_connection = self.cf(cf::PAYMENTS_BY_CONNECTION)?;
        let cf_by_date = self.cf(cf::PAYMENTS_BY_DATE)?;

        batch.put_cf(&cf_payments, keys::payment_key(&payment.id), Self::serialize(payment)?);
        batch.put_cf(
            &cf_by_connection,
            keys::connection_payment_key(&payment.connection, payment.date, &payment.id),
            b"",
        );
        batch.put_cf(&cf_by_date, keys::payment_date_key(payment.date, &payment.id), b"");
        Ok(())
    }

    /// Stage an upsert (`Some`) or delete (`None`) of a ledger entry and its
    /// index entries. Index keys of the stored version are removed first,
    /// since they embed the entry's date.
    fn stage_payment(
        &self,
        batch: &mut WriteBatch,
        payment_id: &PaymentId,
        payment: Option<&Payment>,
    ) -> Result<()> {
        if let Some(previous) = self.get_payment(payment_id)? {
            let cf_by_connection = self.cf(cf::PAYMENTS_BY_CONNECTION)?;
            let cf_by_date = self.cf(cf::PAYMENTS_BY_DATE)?;
            batch.delete_cf(
                &cf_by_connection,
                keys::connection_payment_key(&previous.connection, previous.date, payment_id),
            );
            batch.delete_cf(&cf_by_date, keys::payment_date_key(previous.date, payment_id));
        }

        match payment {
            Some(payment) => self.stage_payment_rows(batch, payment),
            None => {
                let cf_payments = self.cf(cf::PAYMENTS)?;
                batch.delete_cf(&cf_payments, keys::payment_key(payment_id));
                Ok(())
            }
        }
    }

    fn stage_connection_rows(&self, batch: &mut WriteBatch, connection: &Connection) -> Result<()> {
        let cf_connections = self.cf(cf::CONNECTIONS)?;
        let cf_by_box = self.cf(cf::CONNECTIONS_BY_BOX)?;

        batch.put_cf(
            &cf_connections,
            keys::id_key(&connection.id),
            Self::serialize(connection)?,
        );
        batch.put_cf(
            &cf_by_box,
            keys::box_number_key(&connection.box_number),
            connection.id.as_bytes(),
        );
        Ok(())
    }

    /// Stage a connection upsert, keeping the box number index unique.
    fn stage_connection(&self, batch: &mut WriteBatch, connection: &Connection) -> Result<()> {
        let cf_by_box = self.cf(cf::CONNECTIONS_BY_BOX)?;
        let box_key = keys::box_number_key(&connection.box_number);

        if let Some(owner) = self.db.get_cf(&cf_by_box, &box_key)? {
            if owner.as_slice() != connection.id.as_bytes() {
                return Err(StoreError::DuplicateBoxNumber {
                    box_number: connection.box_number.clone(),
                });
            }
        }

        if let Some(previous) = self.get_connection(&connection.id)? {
            if previous.box_number != connection.box_number {
                batch.delete_cf(&cf_by_box, keys::box_number_key(&previous.box_number));
            }
        }

        self.stage_connection_rows(batch, connection)
    }

    fn stage_addon_rows(&self, batch: &mut WriteBatch, addon: &Addon) -> Result<()> {
        let cf_addons = self.cf(cf::ADDONS)?;
        let cf_by_connection = self.cf(cf::ADDONS_BY_CONNECTION)?;

        batch.put_cf(&cf_addons, keys::id_key(&addon.id), Self::serialize(addon)?);
        batch.put_cf(
            &cf_by_connection,
            keys::connection_addon_key(&addon.connection, &addon.id),
            b"",
        );
        Ok(())
    }

    fn stage_clear(&self, batch: &mut WriteBatch, name: &str) -> Result<()> {
        let cf = self.cf(name)?;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(&cf, key);
        }
        Ok(())
    }
}

impl Transactional for RocksStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(RocksTransaction {
            store: self,
            _guard: self.lock()?,
            payments: HashMap::new(),
            connections: HashMap::new(),
        }))
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Area Operations
    // =========================================================================

    fn put_area(&self, area: &Area) -> Result<()> {
        self.put_record(cf::AREAS, &keys::id_key(&area.id), area)
    }

    fn get_area(&self, id: &AreaId) -> Result<Option<Area>> {
        self.get_record(cf::AREAS, &keys::id_key(id))
    }

    fn list_areas(&self) -> Result<Vec<Area>> {
        let mut areas: Vec<Area> = self.scan_values(cf::AREAS)?;
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(areas)
    }

    fn delete_area(&self, id: &AreaId) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_area(id)?.is_none() {
            return Err(StoreError::not_found("area", id));
        }
        if self.any_connection(|c| c.area == *id)? {
            return Err(StoreError::in_use("area", id));
        }

        self.delete_record(cf::AREAS, &keys::id_key(id))
    }

    // =========================================================================
    // Pack Operations
    // =========================================================================

    fn put_pack(&self, pack: &BasePack) -> Result<()> {
        self.put_record(cf::PACKS, &keys::id_key(&pack.id), pack)
    }

    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>> {
        self.get_record(cf::PACKS, &keys::id_key(id))
    }

    fn list_packs(&self) -> Result<Vec<BasePack>> {
        let mut packs: Vec<BasePack> = self.scan_values(cf::PACKS)?;
        packs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packs)
    }

    fn delete_pack(&self, id: &PackId) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_pack(id)?.is_none() {
            return Err(StoreError::not_found("pack", id));
        }
        if self.any_connection(|c| c.base_pack == *id)? {
            return Err(StoreError::in_use("pack", id));
        }

        self.delete_record(cf::PACKS, &keys::id_key(id))
    }

    // =========================================================================
    // Channel Operations
    // =========================================================================

    fn put_channel(&self, channel: &Channel) -> Result<()> {
        self.put_record(cf::CHANNELS, &keys::id_key(&channel.id), channel)
    }

    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>> {
        self.get_record(cf::CHANNELS, &keys::id_key(id))
    }

    fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut channels: Vec<Channel> = self.scan_values(cf::CHANNELS)?;
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(channels)
    }

    fn delete_channel(&self, id: &ChannelId) -> Result<()> {
        let _guard = self.lock()?;

        if self.get_channel(id)?.is_none() {
            return Err(StoreError::not_found("channel", id));
        }
        let in_use = self
            .scan_values::<Addon>(cf::ADDONS)?
            .iter()
            .any(|addon| addon.channel == *id);
        if in_use {
            return Err(StoreError::in_use("channel", id));
        }

        self.delete_record(cf::CHANNELS, &keys::id_key(id))
    }

    // =========================================================================
    // Add-on Operations
    // =========================================================================

    fn put_addon(&self, addon: &Addon) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_addon_rows(&mut batch, addon)?;

        let _guard = self.lock()?;
        self.write(batch)
    }

    fn delete_addon(&self, id: &AddonId) -> Result<()> {
        let _guard = self.lock()?;

        let addon: Addon = self
            .get_record(cf::ADDONS, &keys::id_key(id))?
            .ok_or_else(|| StoreError::not_found("addon", id))?;

        let cf_addons = self.cf(cf::ADDONS)?;
        let cf_by_connection = self.cf(cf::ADDONS_BY_CONNECTION)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_addons, keys::id_key(id));
        batch.delete_cf(
            &cf_by_connection,
            keys::connection_addon_key(&addon.connection, id),
        );
        self.write(batch)
    }

    fn list_addons_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Addon>> {
        let prefix = connection_id.as_bytes();
        let index_keys =
            self.scan_keys(cf::ADDONS_BY_CONNECTION, prefix, |key| key.starts_with(prefix))?;

        let mut addons = Vec::with_capacity(index_keys.len());
        for key in &index_keys {
            let addon_id = keys::extract_addon_id(key)?;
            if let Some(addon) = self.get_record(cf::ADDONS, &keys::id_key(&addon_id))? {
                addons.push(addon);
            }
        }
        Ok(addons)
    }

    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>> {
        let mut channels = Vec::new();
        for addon in self.list_addons_by_connection(connection_id)? {
            if let Some(channel) = self.get_channel(&addon.channel)? {
                channels.push(channel);
            }
        }
        Ok(channels)
    }

    // =========================================================================
    // Connection Operations
    // =========================================================================

    fn put_connection(&self, connection: &Connection) -> Result<()> {
        let _guard = self.lock()?;

        let mut batch = WriteBatch::default();
        self.stage_connection(&mut batch, connection)?;
        self.write(batch)
    }

    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        self.get_record(cf::CONNECTIONS, &keys::id_key(id))
    }

    fn find_connection_by_box_number(&self, box_number: &str) -> Result<Option<Connection>> {
        let cf_by_box = self.cf(cf::CONNECTIONS_BY_BOX)?;
        let Some(owner) = self.db.get_cf(&cf_by_box, keys::box_number_key(box_number))? else {
            return Ok(None);
        };

        let bytes: [u8; keys::ID_LEN] = owner
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Database("malformed box number index value".into()))?;
        self.get_connection(&ConnectionId::from_bytes(bytes))
    }

    fn list_connections(&self) -> Result<Vec<Connection>> {
        let mut connections: Vec<Connection> = self.scan_values(cf::CONNECTIONS)?;
        connections.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(connections)
    }

    // =========================================================================
    // Ledger Reads
    // =========================================================================

    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        self.get_record(cf::PAYMENTS, &keys::payment_key(id))
    }

    fn list_payments_by_connection(&self, connection_id: &ConnectionId) -> Result<Vec<Payment>> {
        let mut payments = self.connection_payments(connection_id, None)?;
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    fn list_payments_between(&self, period: &BillingPeriod) -> Result<Vec<Payment>> {
        let start = keys::encode_timestamp(period.start);
        let end = keys::encode_timestamp(period.end);

        let index_keys = self.scan_keys(cf::PAYMENTS_BY_DATE, &start, |key| {
            keys::payment_date_timestamp(key).is_some_and(|ts| ts <= &end[..])
        })?;

        let mut payments = self.load_payments(&index_keys)?;
        payments.retain(|payment| period.contains(payment.date));
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    fn export_snapshot(&self) -> Result<Snapshot> {
        let _guard = self.lock()?;

        Ok(Snapshot {
            areas: self.scan_values(cf::AREAS)?,
            packs: self.scan_values(cf::PACKS)?,
            channels: self.scan_values(cf::CHANNELS)?,
            connections: self.scan_values(cf::CONNECTIONS)?,
            addons: self.scan_values(cf::ADDONS)?,
            payments: self.scan_values(cf::PAYMENTS)?,
            ..Snapshot::empty(Utc::now())
        })
    }

    fn import_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        snapshot.validate()?;

        let _guard = self.lock()?;
        let mut batch = WriteBatch::default();

        for name in all_column_families() {
            self.stage_clear(&mut batch, name)?;
        }

        let cf_areas = self.cf(cf::AREAS)?;
        for area in &snapshot.areas {
            batch.put_cf(&cf_areas, keys::id_key(&area.id), Self::serialize(area)?);
        }
        let cf_packs = self.cf(cf::PACKS)?;
        for pack in &snapshot.packs {
            batch.put_cf(&cf_packs, keys::id_key(&pack.id), Self::serialize(pack)?);
        }
        let cf_channels = self.cf(cf::CHANNELS)?;
        for channel in &snapshot.channels {
            batch.put_cf(&cf_channels, keys::id_key(&channel.id), Self::serialize(channel)?);
        }
        for connection in &snapshot.connections {
            self.stage_connection_rows(&mut batch, connection)?;
        }
        for addon in &snapshot.addons {
            self.stage_addon_rows(&mut batch, addon)?;
        }
        for payment in &snapshot.payments {
            self.stage_payment_rows(&mut batch, payment)?;
        }

        self.write(batch)?;
        tracing::info!(
            connections = snapshot.connections.len(),
            payments = snapshot.payments.len(),
            "Snapshot imported"
        );
        Ok(())
    }
}

/// A `RocksDB` transaction: staged rows plus the store's write lock.
///
/// Staged rows shadow the committed ones for reads. On commit they are turned
/// into one `WriteBatch`.
struct RocksTransaction<'a> {
    store: &'a RocksStore,
    _guard: MutexGuard<'a, ()>,
    payments: HashMap<PaymentId, Option<Payment>>,
    connections: HashMap<ConnectionId, Connection>,
}

impl RocksTransaction<'_> {
    /// Replace committed entries with their staged versions.
    fn overlay(
        &self,
        connection_id: &ConnectionId,
        committed: Vec<Payment>,
        keep: impl Fn(&Payment) -> bool,
    ) -> Vec<Payment> {
        let mut merged: Vec<Payment> = committed
            .into_iter()
            .filter(|payment| !self.payments.contains_key(&payment.id))
            .collect();
        merged.extend(
            self.payments
                .values()
                .flatten()
                .filter(|payment| payment.connection == *connection_id && keep(payment))
                .cloned(),
        );
        merged
    }
}

fn newest(payments: Vec<Payment>) -> Option<Payment> {
    payments
        .into_iter()
        .max_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)))
}

impl Transaction for RocksTransaction<'_> {
    fn get_connection(&self, id: &ConnectionId) -> Result<Option<Connection>> {
        match self.connections.get(id) {
            Some(staged) => Ok(Some(staged.clone())),
            None => self.store.get_connection(id),
        }
    }

    fn get_pack(&self, id: &PackId) -> Result<Option<BasePack>> {
        self.store.get_pack(id)
    }

    fn list_addon_channels(&self, connection_id: &ConnectionId) -> Result<Vec<Channel>> {
        self.store.list_addon_channels(connection_id)
    }

    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        match self.payments.get(id) {
            Some(staged) => Ok(staged.clone()),
            None => self.store.get_payment(id),
        }
    }

    fn find_payment_in_period(
        &self,
        connection_id: &ConnectionId,
        period: &BillingPeriod,
    ) -> Result<Option<Payment>> {
        let committed = self.store.connection_payments(connection_id, Some(period))?;
        Ok(newest(self.overlay(connection_id, committed, |p| {
            period.contains(p.date)
        })))
    }

    fn latest_payment(&self, connection_id: &ConnectionId) -> Result<Option<Payment>> {
        let committed = self.store.connection_payments(connection_id, None)?;
        Ok(newest(self.overlay(connection_id, committed, |_| true)))
    }

    fn put_payment(&mut self, payment: &Payment) -> Result<()> {
        self.payments.insert(payment.id, Some(payment.clone()));
        Ok(())
    }

    fn delete_payment(&mut self, id: &PaymentId) -> Result<bool> {
        let existed = match self.payments.get(id) {
            Some(staged) => staged.is_some(),
            None => self.store.get_payment(id)?.is_some(),
        };
        if existed {
            self.payments.insert(*id, None);
        }
        Ok(existed)
    }

    fn put_connection(&mut self, connection: &Connection) -> Result<()> {
        self.connections.insert(connection.id, connection.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (payment_id, payment) in &self.payments {
            self.store.stage_payment(&mut batch, payment_id, payment.as_ref())?;
        }
        for connection in self.connections.values() {
            self.store.stage_connection(&mut batch, connection)?;
        }
        self.store.write(batch)
    }
}
