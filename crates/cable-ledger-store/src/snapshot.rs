//! Whole-database snapshots.
//!
//! A [`Snapshot`] holds every record of every table. It is the unit of the raw
//! database export/import: [`Snapshot::to_bytes`] encodes it as CBOR and
//! [`Store::import_snapshot`](crate::Store::import_snapshot) replaces the
//! store's contents with it in one atomic write.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cable_ledger_core::{Addon, Area, BasePack, Channel, Connection, Payment};

use crate::error::{Result, StoreError};

/// Every record in the store at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Encoding version, checked on decode.
    pub format_version: u32,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// All areas.
    pub areas: Vec<Area>,
    /// All base packs.
    pub packs: Vec<BasePack>,
    /// All add-on channels.
    pub channels: Vec<Channel>,
    /// All connections.
    pub connections: Vec<Connection>,
    /// All add-on rows.
    pub addons: Vec<Addon>,
    /// All ledger entries.
    pub payments: Vec<Payment>,
}

impl Snapshot {
    /// Current encoding version.
    pub const FORMAT_VERSION: u32 = 1;

    /// An empty snapshot taken at `taken_at`.
    #[must_use]
    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            taken_at,
            areas: Vec::new(),
            packs: Vec::new(),
            channels: Vec::new(),
            connections: Vec::new(),
            addons: Vec::new(),
            payments: Vec::new(),
        }
    }

    /// Encode the snapshot as CBOR.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a CBOR snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the bytes are not a snapshot or
    /// were written by an unsupported version.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let snapshot: Self =
            ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if snapshot.format_version != Self::FORMAT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.format_version
            )));
        }
        Ok(snapshot)
    }

    /// Check that every reference resolves and box numbers are unique.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` for a dangling reference.
    /// - `StoreError::DuplicateBoxNumber` if two connections share a box number.
    pub fn validate(&self) -> Result<()> {
        let areas: HashSet<_> = self.areas.iter().map(|a| a.id).collect();
        let packs: HashSet<_> = self.packs.iter().map(|p| p.id).collect();
        let channels: HashSet<_> = self.channels.iter().map(|c| c.id).collect();
        let connections: HashSet<_> = self.connections.iter().map(|c| c.id).collect();

        let mut box_numbers = HashSet::new();
        for connection in &self.connections {
            if !areas.contains(&connection.area) {
                return Err(StoreError::not_found("area", connection.area));
            }
            if !packs.contains(&connection.base_pack) {
                return Err(StoreError::not_found("pack", connection.base_pack));
            }
            if !box_numbers.insert(connection.box_number.as_str()) {
                return Err(StoreError::DuplicateBoxNumber {
                    box_number: connection.box_number.clone(),
                });
            }
        }

        for addon in &self.addons {
            if !connections.contains(&addon.connection) {
                return Err(StoreError::not_found("connection", addon.connection));
            }
            if !channels.contains(&addon.channel) {
                return Err(StoreError::not_found("channel", addon.channel));
            }
        }

        for payment in &self.payments {
            if !connections.contains(&payment.connection) {
                return Err(StoreError::not_found("connection", payment.connection));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cable_ledger_core::Prices;

    fn sample() -> Snapshot {
        let now = Utc::now();
        let area = Area::new("North Street");
        let pack = BasePack::new("Basic", 90, 200);
        let channel = Channel::new("Sports", 20, 50);
        let connection = Connection::new("RAVI", "SC-1", area.id, pack.id, now);
        let addon = Addon::new(connection.id, channel.id);
        let payment = Payment::payment(connection.id, pack.id, Prices::new(110, 250), now);

        Snapshot {
            areas: vec![area],
            packs: vec![pack],
            channels: vec![channel],
            connections: vec![connection],
            addons: vec![addon],
            payments: vec![payment],
            ..Snapshot::empty(now)
        }
    }

    #[test]
    fn cbor_encoding_preserves_every_table() {
        let snapshot = sample();
        let decoded = Snapshot::from_bytes(&snapshot.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.format_version = 99;
        let bytes = snapshot.to_bytes().unwrap();
        assert!(matches!(
            Snapshot::from_bytes(&bytes),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Snapshot::from_bytes(&[0xff, 0x00, 0x13]).is_err());
    }

    #[test]
    fn validate_catches_dangling_references() {
        assert!(sample().validate().is_ok());

        let mut orphan = sample();
        orphan.connections.clear();
        assert!(matches!(
            orphan.validate(),
            Err(StoreError::NotFound { entity: "connection", .. })
        ));
    }

    #[test]
    fn validate_catches_duplicate_box_numbers() {
        let mut snapshot = sample();
        let mut twin = snapshot.connections[0].clone();
        twin.id = cable_ledger_core::ConnectionId::generate();
        snapshot.connections.push(twin);
        assert!(matches!(
            snapshot.validate(),
            Err(StoreError::DuplicateBoxNumber { .. })
        ));
    }
}
