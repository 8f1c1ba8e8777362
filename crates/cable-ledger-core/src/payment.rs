//! Ledger entries.
//!
//! Every payment or pack migration is recorded as one [`Payment`] row with the
//! prices that applied at the time it was written. Later pack or channel price
//! edits never touch existing rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConnectionId, PackId, PaymentId, Prices};

/// One ledger entry for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Entry identifier (ULID for time-ordering).
    pub id: PaymentId,

    /// The connection this entry belongs to.
    pub connection: ConnectionId,

    /// When the payment or migration happened.
    pub date: DateTime<Utc>,

    /// Kind of entry.
    pub payment_type: PaymentType,

    /// The pack paid for, or migrated away from.
    pub current_pack: PackId,

    /// The pack migrated to. Set only for migrations.
    pub to: Option<PackId>,

    /// Snapshotted operator price.
    pub lco_price: i64,

    /// Snapshotted subscriber price.
    pub customer_price: i64,
}

impl Payment {
    /// Create a payment entry for `pack` at `date`.
    #[must_use]
    pub fn payment(
        connection: ConnectionId,
        pack: PackId,
        prices: Prices,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::generate(),
            connection,
            date,
            payment_type: PaymentType::Payment,
            current_pack: pack,
            to: None,
            lco_price: prices.lco,
            customer_price: prices.customer,
        }
    }

    /// Create a migration entry from `from` to `to` at `date`.
    #[must_use]
    pub fn migration(
        connection: ConnectionId,
        from: PackId,
        to: PackId,
        prices: Prices,
        date: DateTime<Utc>,
    ) -> Self {
        let mut entry = Self::payment(connection, from, prices, date);
        entry.supersede_with_migration(from, to, prices, date);
        entry
    }

    /// Turn this entry into a migration, replacing its pack, prices and date.
    ///
    /// The identifier and owning connection are kept.
    pub fn supersede_with_migration(
        &mut self,
        from: PackId,
        to: PackId,
        prices: Prices,
        date: DateTime<Utc>,
    ) {
        self.payment_type = PaymentType::Migration;
        self.current_pack = from;
        self.to = Some(to);
        self.lco_price = prices.lco;
        self.customer_price = prices.customer;
        self.date = date;
    }

    /// The snapshotted prices.
    #[must_use]
    pub const fn prices(&self) -> Prices {
        Prices::new(self.lco_price, self.customer_price)
    }

    /// Whether this entry records a pack migration.
    #[must_use]
    pub fn is_migration(&self) -> bool {
        self.payment_type == PaymentType::Migration
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// A monthly payment for the current pack.
    #[default]
    Payment,

    /// A switch from one base pack to another.
    Migration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 9, 30, 0).unwrap()
    }

    #[test]
    fn payment_entry_has_no_target_pack() {
        let entry = Payment::payment(
            ConnectionId::generate(),
            PackId::generate(),
            Prices::new(110, 250),
            at(3),
        );
        assert_eq!(entry.payment_type, PaymentType::Payment);
        assert!(entry.to.is_none());
        assert_eq!(entry.prices(), Prices::new(110, 250));
    }

    #[test]
    fn superseding_keeps_identity_and_owner() {
        let connection = ConnectionId::generate();
        let old_pack = PackId::generate();
        let new_pack = PackId::generate();
        let mut entry = Payment::payment(connection, old_pack, Prices::new(90, 200), at(3));
        let id = entry.id;

        entry.supersede_with_migration(old_pack, new_pack, Prices::new(150, 320), at(12));

        assert_eq!(entry.id, id);
        assert_eq!(entry.connection, connection);
        assert!(entry.is_migration());
        assert_eq!(entry.current_pack, old_pack);
        assert_eq!(entry.to, Some(new_pack));
        assert_eq!(entry.prices(), Prices::new(150, 320));
        assert_eq!(entry.date, at(12));
    }

    #[test]
    fn payment_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&PaymentType::Migration).unwrap(),
            "\"migration\""
        );
    }
}
