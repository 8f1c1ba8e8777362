//! Bulk import of connections from a subscriber sheet.
//!
//! Areas and packs are matched by name and created on first sight. Imported
//! connections carry no ledger history, so they start unpaid.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cable_ledger_core::{
    Area, AreaId, BasePack, Clock, Connection, ConnectionStatus, PackId, Prices, Result,
};
use cable_ledger_store::Store;

/// Name of the area used for rows that don't name one, when no area exists yet.
pub const FALLBACK_AREA_NAME: &str = "Unknown";

/// One subscriber row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRow {
    /// Subscriber name.
    pub name: String,
    /// Set-top box number.
    pub box_number: String,
    /// Area name. Rows without one go to the first area on file.
    #[serde(default)]
    pub area: Option<String>,
    /// Base pack name.
    pub pack_name: String,
    /// Whether the connection is switched on.
    pub active: bool,
}

impl ImportRow {
    /// Build a row from the cells of the operator portal's subscriber export.
    ///
    /// That sheet has the name in column 1, the box number in column 4, the
    /// pack in column 5 and the status (`Active` or anything else) in column
    /// 8. It has no area column. Returns `None` for rows with every cell
    /// empty.
    #[must_use]
    pub fn from_cells<T: AsRef<str>>(cells: &[T]) -> Option<Self> {
        if cells.iter().all(|cell| cell.as_ref().trim().is_empty()) {
            return None;
        }
        let cell = |index: usize| {
            cells
                .get(index)
                .map(|value| value.as_ref().trim().to_string())
                .unwrap_or_default()
        };
        Some(Self {
            name: cell(1),
            box_number: cell(4),
            area: None,
            pack_name: cell(5),
            active: cell(8) == "Active",
        })
    }

    /// Parse a whole sheet: the first non-empty row is the header and is skipped.
    #[must_use]
    pub fn from_sheet<R, T>(rows: &[R]) -> Vec<Self>
    where
        R: AsRef<[T]>,
        T: AsRef<str>,
    {
        rows.iter()
            .filter_map(|row| Self::from_cells(row.as_ref()))
            .skip(1)
            .collect()
    }
}

/// Import settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Prices given to packs the import has to create.
    pub default_pack_prices: Prices,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            default_pack_prices: Prices::new(90, 200),
        }
    }
}

/// What an import did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Connections created.
    pub imported: usize,
    /// Box numbers skipped because a connection already had them.
    pub duplicate_box_numbers: Vec<String>,
    /// Rows skipped for a missing name, box number or pack.
    pub incomplete_rows: usize,
    /// Areas created along the way.
    pub created_areas: Vec<String>,
    /// Packs created along the way, at the default prices.
    pub created_packs: Vec<String>,
}

/// Name lookups, filled from the store and extended as the import creates records.
struct Resolver<'a, S: ?Sized> {
    store: &'a S,
    areas: HashMap<String, AreaId>,
    packs: HashMap<String, PackId>,
    fallback_area: Option<AreaId>,
    pack_prices: Prices,
}

impl<'a, S: Store + ?Sized> Resolver<'a, S> {
    fn load(store: &'a S, options: ImportOptions) -> Result<Self> {
        let areas = store.list_areas()?;
        let fallback_area = areas.first().map(|area| area.id);
        Ok(Self {
            store,
            areas: areas.into_iter().map(|area| (area.name, area.id)).collect(),
            packs: store
                .list_packs()?
                .into_iter()
                .map(|pack| (pack.name, pack.id))
                .collect(),
            fallback_area,
            pack_prices: options.default_pack_prices,
        })
    }

    fn area(&mut self, name: Option<&str>, summary: &mut ImportSummary) -> Result<AreaId> {
        match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => self.named_area(name, summary),
            None => match self.fallback_area {
                Some(id) => Ok(id),
                None => {
                    let id = self.named_area(FALLBACK_AREA_NAME, summary)?;
                    self.fallback_area = Some(id);
                    Ok(id)
                }
            },
        }
    }

    fn named_area(&mut self, name: &str, summary: &mut ImportSummary) -> Result<AreaId> {
        if let Some(id) = self.areas.get(name) {
            return Ok(*id);
        }
        let area = Area::new(name);
        self.store.put_area(&area)?;
        summary.created_areas.push(area.name.clone());
        self.areas.insert(area.name, area.id);
        Ok(area.id)
    }

    fn pack(&mut self, name: &str, summary: &mut ImportSummary) -> Result<PackId> {
        if let Some(id) = self.packs.get(name) {
            return Ok(*id);
        }
        let pack = BasePack::new(name, self.pack_prices.lco, self.pack_prices.customer);
        self.store.put_pack(&pack)?;
        summary.created_packs.push(pack.name.clone());
        self.packs.insert(pack.name, pack.id);
        Ok(pack.id)
    }
}

/// Import connections from `rows`.
///
/// Rows missing a name, box number or pack are skipped, as are rows whose
/// box number is already on file or appeared earlier in `rows`. Every
/// imported connection has `last_payment = None`.
///
/// # Errors
///
/// Returns a storage error. Rows imported before the failure stay imported.
pub fn import_connections<S, C>(
    store: &S,
    clock: &C,
    rows: &[ImportRow],
    options: ImportOptions,
) -> Result<ImportSummary>
where
    S: Store + ?Sized,
    C: Clock + ?Sized,
{
    let now = clock.now();
    let mut summary = ImportSummary::default();
    let mut resolver = Resolver::load(store, options)?;
    let mut seen = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let name = row.name.trim();
        let box_number = row.box_number.trim();
        let pack_name = row.pack_name.trim();

        if name.is_empty() || box_number.is_empty() || pack_name.is_empty() {
            warn!(row = index, "Skipping incomplete import row");
            summary.incomplete_rows += 1;
            continue;
        }
        if !seen.insert(box_number.to_string())
            || store.find_connection_by_box_number(box_number)?.is_some()
        {
            warn!(row = index, box_number = %box_number, "Skipping duplicate box number");
            summary.duplicate_box_numbers.push(box_number.to_string());
            continue;
        }

        let area = resolver.area(row.area.as_deref(), &mut summary)?;
        let pack = resolver.pack(pack_name, &mut summary)?;

        let mut connection = Connection::new(name, box_number, area, pack, now);
        if !row.active {
            connection.status = ConnectionStatus::Inactive;
        }
        store.put_connection(&connection)?;
        summary.imported += 1;
    }

    info!(
        imported = summary.imported,
        duplicates = summary.duplicate_box_numbers.len(),
        incomplete = summary.incomplete_rows,
        created_areas = summary.created_areas.len(),
        created_packs = summary.created_packs.len(),
        "Connections imported"
    );
    Ok(summary)
}
