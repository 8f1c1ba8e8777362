//! Monthly collection statistics.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use cable_ledger_core::{BillingPeriod, Clock, Prices, Result};
use cable_ledger_store::Store;

/// Collection figures for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyStats {
    /// The month the figures cover.
    pub period: BillingPeriod,
    /// Connections on file.
    pub total_connections: usize,
    /// Connections with a ledger entry dated in the month.
    pub paid_connections: usize,
    /// `total_connections - paid_connections`.
    pub unpaid_connections: usize,
    /// Ledger entries per pack name, by the pack each entry was billed on.
    pub pack_usage: BTreeMap<String, usize>,
    /// Sum of the snapshotted prices of the month's entries.
    pub collected: Prices,
}

/// Statistics for the calendar month containing `month`.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn monthly_stats<S, C>(store: &S, clock: &C, month: DateTime<Utc>) -> Result<MonthlyStats>
where
    S: Store + ?Sized,
    C: Clock + ?Sized,
{
    let period = clock.month_of(month);
    let total_connections = store.list_connections()?.len();
    let entries = store.list_payments_between(&period)?;

    let pack_names: HashMap<_, _> = store
        .list_packs()?
        .into_iter()
        .map(|pack| (pack.id, pack.name))
        .collect();

    let mut paid = HashSet::new();
    let mut pack_usage = BTreeMap::new();
    for entry in &entries {
        paid.insert(entry.connection);
        let name = pack_names
            .get(&entry.current_pack)
            .cloned()
            .unwrap_or_else(|| entry.current_pack.to_string());
        *pack_usage.entry(name).or_insert(0) += 1;
    }

    let stats = MonthlyStats {
        period,
        total_connections,
        paid_connections: paid.len(),
        unpaid_connections: total_connections.saturating_sub(paid.len()),
        pack_usage,
        collected: entries.iter().map(|entry| entry.prices()).sum(),
    };

    tracing::debug!(
        start = %period.start,
        paid = stats.paid_connections,
        unpaid = stats.unpaid_connections,
        "Monthly stats computed"
    );
    Ok(stats)
}
