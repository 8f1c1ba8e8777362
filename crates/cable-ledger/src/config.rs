//! Ledger configuration.

use std::str::FromStr;

use chrono::FixedOffset;

use cable_ledger_core::{Prices, SystemClock};

use crate::import::ImportOptions;

const DEFAULT_DATA_DIR: &str = "./data/cable-ledger";

/// Ledger configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Path to the `RocksDB` data directory (default: "./data/cable-ledger").
    pub data_dir: String,

    /// Fixed UTC offset for month boundaries. `None` uses the host's local time.
    pub utc_offset: Option<FixedOffset>,

    /// Prices for packs created by an import (default: 90 / 200).
    pub import_pack_prices: Prices,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values are logged and replaced by their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let utc_offset = parse_var::<i32>("BILLING_UTC_OFFSET_MINUTES").and_then(|minutes| {
            let offset = minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt);
            if offset.is_none() {
                tracing::warn!(
                    minutes,
                    "BILLING_UTC_OFFSET_MINUTES out of range, using local time"
                );
            }
            offset
        });

        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            utc_offset,
            import_pack_prices: Prices::new(
                parse_var("IMPORT_DEFAULT_LCO_PRICE").unwrap_or(defaults.import_pack_prices.lco),
                parse_var("IMPORT_DEFAULT_CUSTOMER_PRICE")
                    .unwrap_or(defaults.import_pack_prices.customer),
            ),
        }
    }

    /// The clock that decides billing periods.
    #[must_use]
    pub fn clock(&self) -> SystemClock {
        self.utc_offset
            .map_or_else(SystemClock::local, SystemClock::with_offset)
    }

    /// Import settings derived from this configuration.
    #[must_use]
    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            default_pack_prices: self.import_pack_prices,
        }
    }
}

/// Read and parse an environment variable, warning when it is set but invalid.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.into(),
            utc_offset: None,
            import_pack_prices: ImportOptions::default().default_pack_prices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cable_ledger_core::Clock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.data_dir, "./data/cable-ledger");
        assert_eq!(config.utc_offset, None);
        assert_eq!(config.import_options().default_pack_prices, Prices::new(90, 200));
    }

    #[test]
    fn fixed_offset_clock_uses_local_month_start() {
        let config = LedgerConfig {
            utc_offset: FixedOffset::east_opt(330 * 60),
            ..LedgerConfig::default()
        };
        let clock = config.clock();

        // 20:00 UTC on Jan 31 is already Feb 1 at +05:30.
        let instant = Utc.with_ymd_and_hms(2025, 1, 31, 20, 0, 0).unwrap();
        assert_eq!(
            clock.start_of_month(instant),
            Utc.with_ymd_and_hms(2025, 1, 31, 18, 30, 0).unwrap()
        );
    }
}
