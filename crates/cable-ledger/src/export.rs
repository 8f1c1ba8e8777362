//! Bulk export: the connection sheet and the monthly box number lists.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use cable_ledger_core::{
    BillingPeriod, ConnectionId, LedgerError, Payment, PaymentType, Result,
};
use cable_ledger_store::Store;

/// Header of a box number list.
pub const BOX_NUMBER_HEADER: &str = "VC Number";

/// One line of the connection sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionExportRow {
    /// Subscriber name.
    #[serde(rename = "NAME")]
    pub name: String,
    /// Set-top box number.
    #[serde(rename = "SMARTCARD")]
    pub box_number: String,
    /// Area name.
    #[serde(rename = "ADDRESS")]
    pub area: String,
    /// Base pack name.
    #[serde(rename = "PACKAGE")]
    pub pack: String,
}

impl ConnectionExportRow {
    /// Column titles, in [`ConnectionExportRow::cells`] order.
    pub const HEADER: [&'static str; 4] = ["NAME", "SMARTCARD", "ADDRESS", "PACKAGE"];

    /// The row as sheet cells.
    #[must_use]
    pub fn cells(&self) -> [&str; 4] {
        [
            self.name.as_str(),
            self.box_number.as_str(),
            self.area.as_str(),
            self.pack.as_str(),
        ]
    }
}

/// Every connection with its area and pack names, sorted by name.
///
/// A connection whose area or pack record is gone gets an empty cell.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn export_connections<S: Store + ?Sized>(store: &S) -> Result<Vec<ConnectionExportRow>> {
    let areas: HashMap<_, _> = store
        .list_areas()?
        .into_iter()
        .map(|area| (area.id, area.name))
        .collect();
    let packs: HashMap<_, _> = store
        .list_packs()?
        .into_iter()
        .map(|pack| (pack.id, pack.name))
        .collect();

    let mut rows: Vec<ConnectionExportRow> = store
        .list_connections()?
        .into_iter()
        .map(|connection| ConnectionExportRow {
            area: areas.get(&connection.area).cloned().unwrap_or_default(),
            pack: packs.get(&connection.base_pack).cloned().unwrap_or_default(),
            name: connection.name,
            box_number: connection.box_number,
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    tracing::debug!(rows = rows.len(), "Connection sheet exported");
    Ok(rows)
}

/// The connection sheet as a JSON array.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the rows cannot be encoded.
pub fn export_connections_json<S: Store + ?Sized>(store: &S) -> Result<String> {
    let rows = export_connections(store)?;
    serde_json::to_string_pretty(&rows).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn entries_between<S: Store + ?Sized>(
    store: &S,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Payment>> {
    if from > to {
        return Err(LedgerError::InvalidInput(format!(
            "export range starts after it ends ({from} > {to})"
        )));
    }
    Ok(store.list_payments_between(&BillingPeriod::new(from, to))?)
}

/// Box numbers by connection, looked up once each.
struct BoxNumbers<'a, S: ?Sized> {
    store: &'a S,
    known: HashMap<ConnectionId, Option<String>>,
}

impl<'a, S: Store + ?Sized> BoxNumbers<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            known: HashMap::new(),
        }
    }

    fn of(&mut self, connection_id: &ConnectionId) -> Result<Option<String>> {
        if let Some(known) = self.known.get(connection_id) {
            return Ok(known.clone());
        }
        let box_number = self
            .store
            .get_connection(connection_id)?
            .map(|connection| connection.box_number);
        self.known.insert(*connection_id, box_number.clone());
        Ok(box_number)
    }
}

/// Box numbers of the payment entries dated in `[from, to]`, newest first.
///
/// Migration entries are left out; see [`export_migrated_box_numbers`].
///
/// # Errors
///
/// Returns `LedgerError::InvalidInput` if `from` is after `to`, or a storage
/// error.
pub fn export_paid_box_numbers<S: Store + ?Sized>(
    store: &S,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<String>> {
    let mut box_numbers = BoxNumbers::new(store);
    let mut paid = Vec::new();
    for entry in entries_between(store, from, to)? {
        if entry.payment_type != PaymentType::Payment {
            continue;
        }
        if let Some(box_number) = box_numbers.of(&entry.connection)? {
            paid.push(box_number);
        }
    }
    Ok(paid)
}

/// Box numbers of the migration entries dated in `[from, to]`, grouped by
/// the name of the pack migrated to.
///
/// # Errors
///
/// Returns `LedgerError::InvalidInput` if `from` is after `to`, or a storage
/// error.
pub fn export_migrated_box_numbers<S: Store + ?Sized>(
    store: &S,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut box_numbers = BoxNumbers::new(store);
    let mut pack_names = HashMap::new();
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in entries_between(store, from, to)? {
        let Some(target) = entry.to.filter(|_| entry.is_migration()) else {
            continue;
        };
        let Some(box_number) = box_numbers.of(&entry.connection)? else {
            continue;
        };
        if !pack_names.contains_key(&target) {
            let name = store
                .get_pack(&target)?
                .map_or_else(|| target.to_string(), |pack| pack.name);
            pack_names.insert(target, name);
        }
        let pack_name = pack_names.get(&target).cloned().unwrap_or_default();
        grouped.entry(pack_name).or_default().push(box_number);
    }
    Ok(grouped)
}

/// Render a box number list as CSV with a [`BOX_NUMBER_HEADER`] header.
#[must_use]
pub fn box_numbers_csv(box_numbers: &[String]) -> String {
    let mut csv = String::from(BOX_NUMBER_HEADER);
    csv.push('\n');
    for box_number in box_numbers {
        if box_number.contains(&[',', '"', '\n'][..]) {
            csv.push('"');
            csv.push_str(&box_number.replace('"', "\"\""));
            csv.push('"');
        } else {
            csv.push_str(box_number);
        }
        csv.push('\n');
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_awkward_values() {
        let csv = box_numbers_csv(&["SC-1".into(), "SC,2".into(), "SC\"3".into()]);
        assert_eq!(csv, "VC Number\nSC-1\n\"SC,2\"\n\"SC\"\"3\"\n");
    }

    #[test]
    fn empty_list_is_just_the_header() {
        assert_eq!(box_numbers_csv(&[]), "VC Number\n");
    }

    #[test]
    fn sheet_cells_follow_the_header() {
        let row = ConnectionExportRow {
            name: "RAVI".into(),
            box_number: "SC-1".into(),
            area: "North Street".into(),
            pack: "Basic".into(),
        };
        assert_eq!(row.cells(), ["RAVI", "SC-1", "North Street", "Basic"]);
        let json = serde_json::to_value(&row).unwrap();
        for (title, cell) in ConnectionExportRow::HEADER.iter().zip(row.cells()) {
            assert_eq!(json[*title], cell);
        }
    }
}
