//! Core types for the cable operator billing ledger.
//!
//! This crate provides the types shared by the store and the ledger
//! operations:
//!
//! - **Identifiers**: `ConnectionId`, `PackId`, `ChannelId`, `AddonId`, `AreaId`, `PaymentId`
//! - **Catalog**: `Area`, `BasePack`, `Channel`, `Addon`
//! - **Connections**: `Connection`, `ConnectionStatus`
//! - **Ledger**: `Payment`, `PaymentType`
//! - **Pricing**: `Prices`
//! - **Time**: `BillingPeriod`, `Clock`, `SystemClock`, `ManualClock`
//!
//! # Money
//!
//! Prices are whole currency units stored as `i64`. Every ledger entry keeps
//! the operator (`lco`) and subscriber (`customer`) totals that applied when
//! it was written.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod connection;
pub mod error;
pub mod ids;
pub mod payment;
pub mod period;
pub mod pricing;

pub use catalog::{Addon, Area, BasePack, Channel};
pub use connection::{Connection, ConnectionStatus};
pub use error::{LedgerError, Result};
pub use ids::{AddonId, AreaId, ChannelId, ConnectionId, IdError, PackId, PaymentId};
pub use payment::{Payment, PaymentType};
pub use period::{start_of_month_in, BillingPeriod, Clock, ManualClock, SystemClock};
pub use pricing::Prices;
