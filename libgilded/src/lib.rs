//! Gilded - A daily archive of in-game currency and crafting activity
//! ---
//!
//! Gilded reads the saved-variables files World of Warcraft addons leave
//! behind, reconstructs per-day gold holdings, sorts the income and expense
//! logs into days, and keeps a crafting-order ledger per requester. Addons
//! prune their history, so everything lands in a dated JSON archive that
//! only grows.
//!

extern crate pest;
#[macro_use]
extern crate pest_derive;

/// Identities of characters and the account-wide warbank.
pub mod actor;

/// Copper counts and four-digit gold values.
pub mod amount;

/// The on-disk archive: dated day files, requester ledgers and the chart.
pub mod archive;

pub mod calendar;

/// Stacked area chart of gold and transaction history.
pub mod chart;

pub mod config;

/// Crafting orders, from daily correction to requester ledgers.
///
/// Daily files are corrected first ([`correct_days`][crafting::correct_days]),
/// then every ledger is rebuilt from those files alone
/// ([`rebuild_ledgers`][crafting::rebuild_ledgers]).
pub mod crafting;

pub mod error;

/// Carry-forward reconstruction of currency holdings.
pub mod history;

/// Our main parser entrypoints.
pub mod parser;

/// One full archive update.
pub mod pipeline;

/// Generic Lua table values.
pub mod table;

pub mod transaction;

/// Layout of the TradeSkillMaster saved-variables database.
pub mod tsm;

pub use error::{Anomaly, Error};
pub use parser::parse;
