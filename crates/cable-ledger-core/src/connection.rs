//! Subscriber connections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AreaId, BillingPeriod, ConnectionId, PackId};

/// A subscriber connection (one set-top box / smart card).
///
/// `last_payment` is a cached projection of the ledger: it always equals the
/// date of the connection's newest ledger entry, or `None` when the ledger
/// holds no entry for it. Only the ledger operations write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection identifier.
    pub id: ConnectionId,

    /// Subscriber display name.
    pub name: String,

    /// Box / smart card number. Unique across connections.
    pub box_number: String,

    /// The area this connection belongs to.
    pub area: AreaId,

    /// The base pack currently assigned.
    pub base_pack: PackId,

    /// Subscriber phone number, if known.
    pub phone_number: Option<String>,

    /// Whether the connection is switched on.
    pub status: ConnectionStatus,

    /// Date of the newest ledger entry.
    pub last_payment: Option<DateTime<Utc>>,

    /// When the connection was created.
    pub created_at: DateTime<Utc>,

    /// When the connection was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Create a new active connection with no ledger history.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        box_number: impl Into<String>,
        area: AreaId,
        base_pack: PackId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            name: name.into(),
            box_number: box_number.into(),
            area,
            base_pack,
            phone_number: None,
            status: ConnectionStatus::Active,
            last_payment: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the newest ledger entry falls inside `period`.
    #[must_use]
    pub fn is_paid_in(&self, period: &BillingPeriod) -> bool {
        self.last_payment.is_some_and(|date| period.contains(date))
    }
}

/// Whether a connection is switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Service is on.
    #[default]
    Active,

    /// Service is off.
    Inactive,
}
