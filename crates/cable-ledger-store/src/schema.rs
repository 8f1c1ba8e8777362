//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Areas, keyed by `area_id`.
    pub const AREAS: &str = "areas";

    /// Base packs, keyed by `pack_id`.
    pub const PACKS: &str = "packs";

    /// Add-on channels, keyed by `channel_id`.
    pub const CHANNELS: &str = "channels";

    /// Add-on rows, keyed by `addon_id`.
    pub const ADDONS: &str = "addons";

    /// Index: add-ons by connection, keyed by `connection_id || addon_id`.
    /// Value is empty (index only).
    pub const ADDONS_BY_CONNECTION: &str = "addons_by_connection";

    /// Connections, keyed by `connection_id`.
    pub const CONNECTIONS: &str = "connections";

    /// Unique index: box number to `connection_id`.
    pub const CONNECTIONS_BY_BOX: &str = "connections_by_box";

    /// Ledger entries, keyed by `payment_id` (ULID).
    pub const PAYMENTS: &str = "payments";

    /// Index: ledger entries by connection, keyed by
    /// `connection_id || date || payment_id`. Value is empty (index only).
    pub const PAYMENTS_BY_CONNECTION: &str = "payments_by_connection";

    /// Index: ledger entries by date, keyed by `date || payment_id`.
    /// Value is empty (index only).
    pub const PAYMENTS_BY_DATE: &str = "payments_by_date";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::AREAS,
        cf::PACKS,
        cf::CHANNELS,
        cf::ADDONS,
        cf::ADDONS_BY_CONNECTION,
        cf::CONNECTIONS,
        cf::CONNECTIONS_BY_BOX,
        cf::PAYMENTS,
        cf::PAYMENTS_BY_CONNECTION,
        cf::PAYMENTS_BY_DATE,
    ]
}
