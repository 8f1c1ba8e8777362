//! Key encoding utilities for `RocksDB`.
//!
//! Identifiers are stored as their 16 raw bytes. Timestamps are stored as
//! big-endian epoch milliseconds with the sign bit flipped, so byte order
//! matches chronological order (including dates before 1970).

use chrono::{DateTime, Utc};

use cable_ledger_core::{AddonId, ConnectionId, PaymentId};

use crate::error::{Result, StoreError};

/// Length of an encoded identifier.
pub const ID_LEN: usize = 16;

/// Length of an encoded timestamp.
pub const TIMESTAMP_LEN: usize = 8;

/// Create a record key from any 16-byte identifier.
#[must_use]
pub fn id_key(id: &impl AsRef<[u8]>) -> Vec<u8> {
    id.as_ref().to_vec()
}

/// Create a ledger entry key from a payment ID.
#[must_use]
pub fn payment_key(payment_id: &PaymentId) -> Vec<u8> {
    payment_id.to_bytes().to_vec()
}

/// Encode a timestamp so that byte order is chronological.
#[must_use]
pub fn encode_timestamp(date: DateTime<Utc>) -> [u8; TIMESTAMP_LEN] {
    let millis = date.timestamp_millis();
    (u64::from_be_bytes(millis.to_be_bytes()) ^ (1 << 63)).to_be_bytes()
}

/// Create a connection-payment index key.
///
/// Format: `connection_id (16 bytes) || date (8 bytes) || payment_id (16 bytes)`
#[must_use]
pub fn connection_payment_key(
    connection_id: &ConnectionId,
    date: DateTime<Utc>,
    payment_id: &PaymentId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + TIMESTAMP_LEN + ID_LEN);
    key.extend_from_slice(connection_id.as_bytes());
    key.extend_from_slice(&encode_timestamp(date));
    key.extend_from_slice(&payment_id.to_bytes());
    key
}

/// Create the seek key for a connection's ledger entries dated at or after `from`.
#[must_use]
pub fn connection_payments_from(connection_id: &ConnectionId, from: DateTime<Utc>) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + TIMESTAMP_LEN);
    key.extend_from_slice(connection_id.as_bytes());
    key.extend_from_slice(&encode_timestamp(from));
    key
}

/// Create a date-payment index key.
///
/// Format: `date (8 bytes) || payment_id (16 bytes)`
#[must_use]
pub fn payment_date_key(date: DateTime<Utc>, payment_id: &PaymentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TIMESTAMP_LEN + ID_LEN);
    key.extend_from_slice(&encode_timestamp(date));
    key.extend_from_slice(&payment_id.to_bytes());
    key
}

/// Create a connection-addon index key.
///
/// Format: `connection_id (16 bytes) || addon_id (16 bytes)`
#[must_use]
pub fn connection_addon_key(connection_id: &ConnectionId, addon_id: &AddonId) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * ID_LEN);
    key.extend_from_slice(connection_id.as_bytes());
    key.extend_from_slice(addon_id.as_bytes());
    key
}

/// Create a box number index key.
#[must_use]
pub fn box_number_key(box_number: &str) -> Vec<u8> {
    box_number.as_bytes().to_vec()
}

/// Extract the trailing 16-byte identifier of an index key.
fn trailing_id(key: &[u8]) -> Result<[u8; ID_LEN]> {
    key.len()
        .checked_sub(ID_LEN)
        .and_then(|start| key[start..].try_into().ok())
        .ok_or_else(|| StoreError::Database(format!("malformed index key ({} bytes)", key.len())))
}

/// Extract the payment ID from a connection-payment or date-payment key.
///
/// # Errors
///
/// Returns an error if the key is shorter than an identifier.
pub fn extract_payment_id(key: &[u8]) -> Result<PaymentId> {
    trailing_id(key).map(PaymentId::from_bytes)
}

/// Extract the add-on ID from a connection-addon key.
///
/// # Errors
///
/// Returns an error if the key is shorter than an identifier.
pub fn extract_addon_id(key: &[u8]) -> Result<AddonId> {
    trailing_id(key).map(AddonId::from_bytes)
}

/// Extract the timestamp bytes of a connection-payment key.
#[must_use]
pub fn connection_payment_timestamp(key: &[u8]) -> Option<&[u8]> {
    key.get(ID_LEN..ID_LEN + TIMESTAMP_LEN)
}

/// Extract the timestamp bytes of a date-payment key.
#[must_use]
pub fn payment_date_timestamp(key: &[u8]) -> Option<&[u8]> {
    key.get(..TIMESTAMP_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_chronologically() {
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        let jan = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();

        assert!(encode_timestamp(before_epoch) < encode_timestamp(jan));
        assert!(encode_timestamp(jan) < encode_timestamp(feb));
    }

    #[test]
    fn connection_payment_key_format() {
        let connection_id = ConnectionId::generate();
        let payment_id = PaymentId::generate();
        let date = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let key = connection_payment_key(&connection_id, date, &payment_id);

        assert_eq!(key.len(), 40);
        assert_eq!(&key[..16], connection_id.as_bytes());
        assert_eq!(connection_payment_timestamp(&key), Some(&encode_timestamp(date)[..]));
        assert_eq!(extract_payment_id(&key).unwrap(), payment_id);
        assert!(key.starts_with(&connection_payments_from(&connection_id, date)));
    }

    #[test]
    fn addon_key_yields_addon_id() {
        let connection_id = ConnectionId::generate();
        let addon_id = AddonId::generate();
        let key = connection_addon_key(&connection_id, &addon_id);
        assert_eq!(key.len(), 32);
        assert_eq!(extract_addon_id(&key).unwrap(), addon_id);
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(extract_payment_id(&[1, 2, 3]).is_err());
    }
}
