//! Catalog records: areas, base packs, add-on channels and add-on rows.

use serde::{Deserialize, Serialize};

use crate::{AddonId, AreaId, ChannelId, ConnectionId, PackId, Prices};

/// A grouping label for connections (a street, village, or zone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    /// Area identifier.
    pub id: AreaId,
    /// Display name.
    pub name: String,
}

impl Area {
    /// Create a new area with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AreaId::generate(),
            name: name.into(),
        }
    }
}

/// The primary subscription tier a connection is billed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasePack {
    /// Pack identifier.
    pub id: PackId,
    /// Display name.
    pub name: String,
    /// Price the operator pays upstream.
    pub lco_price: i64,
    /// Price charged to the subscriber.
    pub customer_price: i64,
}

impl BasePack {
    /// Create a new pack with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, lco_price: i64, customer_price: i64) -> Self {
        Self {
            id: PackId::generate(),
            name: name.into(),
            lco_price,
            customer_price,
        }
    }

    /// The pack's own prices, without any add-ons.
    #[must_use]
    pub const fn prices(&self) -> Prices {
        Prices::new(self.lco_price, self.customer_price)
    }
}

/// An optional channel billed on top of the base pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel identifier.
    pub id: ChannelId,
    /// Display name.
    pub name: String,
    /// Price the operator pays upstream.
    pub lco_price: i64,
    /// Price charged to the subscriber.
    pub customer_price: i64,
}

impl Channel {
    /// Create a new channel with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>, lco_price: i64, customer_price: i64) -> Self {
        Self {
            id: ChannelId::generate(),
            name: name.into(),
            lco_price,
            customer_price,
        }
    }

    /// The channel's prices.
    #[must_use]
    pub const fn prices(&self) -> Prices {
        Prices::new(self.lco_price, self.customer_price)
    }
}

/// An active add-on subscription linking a connection to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    /// Add-on row identifier.
    pub id: AddonId,
    /// The subscribing connection.
    pub connection: ConnectionId,
    /// The subscribed channel.
    pub channel: ChannelId,
}

impl Addon {
    /// Create a new add-on row.
    #[must_use]
    pub fn new(connection: ConnectionId, channel: ChannelId) -> Self {
        Self {
            id: AddonId::generate(),
            connection,
            channel,
        }
    }
}
