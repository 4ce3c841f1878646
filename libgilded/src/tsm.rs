//! Layout of the TradeSkillMaster save file.
//!
//! Everything lives in flat string keys of the `TradeSkillMasterDB` global,
//! shaped `<scope>@<owner>@<namespace>@<field>`:
//!
//! - `s@Name - Faction - Realm@internalData@goldLog`
//! - `g@ @internalData@warbankGoldLog`
//! - `r@Realm@internalData@csvIncome` / `csvExpense`

use crate::actor::{ActorId, Holder};
use crate::calendar::Calendar;
use crate::error::Anomaly;
use crate::history::{HistoryDecoder, HolderHistory};
use crate::table::TableValue;
use crate::transaction::{self, LogEntry, Markers, AMOUNT_FIELD, TIME_FIELD};

pub const DB_GLOBAL: &str = "TradeSkillMasterDB";
pub const GOLD_LOG: &str = "goldLog";
pub const WARBANK_GOLD_LOG: &str = "warbankGoldLog";
pub const CSV_HEADER: &str = "type,amount,otherPlayer,player,time";

/// A decomposed scoped key.
#[derive(Debug, PartialEq, Eq)]
pub struct ScopedKey<'k> {
    pub scope: &'k str,
    pub owner: &'k str,
    pub namespace: &'k str,
    pub field: &'k str,
}

impl<'k> ScopedKey<'k> {
    pub fn parse(key: &'k str) -> Option<ScopedKey<'k>> {
        let mut parts = key.splitn(4, '@');
        Some(ScopedKey {
            scope: parts.next()?,
            owner: parts.next()?,
            namespace: parts.next()?,
            field: parts.next()?,
        })
    }
}

/// The addon database: the `TradeSkillMasterDB` global, or the top level
/// itself when handed an already unwrapped table.
pub fn database(globals: &TableValue) -> &TableValue {
    globals.get(DB_GLOBAL).unwrap_or(globals)
}

fn scoped_strings(db: &TableValue) -> impl Iterator<Item = (ScopedKey<'_>, &str)> {
    db.string_fields()
        .filter_map(|(key, value)| Some((ScopedKey::parse(key)?, value)))
}

/// Balance histories of every character and of the warbank.
pub fn gold_histories(
    db: &TableValue,
    decoder: &dyn HistoryDecoder,
    calendar: Calendar,
) -> (Vec<HolderHistory>, Vec<Anomaly>) {
    let mut histories = Vec::new();
    let mut anomalies = Vec::new();

    for (key, value) in scoped_strings(db) {
        let holder = match (key.scope, key.field) {
            ("s", GOLD_LOG) => Holder::Character(ActorId::from_owner_label(key.owner)),
            ("g", WARBANK_GOLD_LOG) => Holder::Warbank,
            _ => continue,
        };

        let observations = decoder.decode(value);
        if observations.is_empty() {
            tracing::debug!(holder = %holder, "gold log without readings");
            continue;
        }

        let (history, anomaly) = HolderHistory::from_observations(holder, &observations, calendar);
        anomalies.extend(anomaly);
        histories.push(history);
    }

    (histories, anomalies)
}

/// Parse one realm's CSV transaction log. Every row gets the marker field,
/// valued with the realm, ahead of its own columns. Rows whose amount or
/// time is not an integer are skipped.
pub fn decode_csv_log(raw: &str, marker: &str, realm: &str) -> Vec<LogEntry> {
    let mut lines = raw.trim().lines();
    if lines.next().map(str::trim) != Some(CSV_HEADER) {
        return Vec::new();
    }
    let columns: Vec<&str> = CSV_HEADER.split(',').collect();

    lines
        .filter_map(|line| {
            let values: Vec<&str> = line.trim().split(',').collect();
            if values.len() != columns.len() {
                return None;
            }

            let mut entry = LogEntry::default();
            entry.fields.insert(marker.to_string(), realm.to_string());
            for (column, value) in columns.iter().zip(values) {
                entry.fields.insert(column.to_string(), value.to_string());
            }

            let amount_ok = entry
                .field(AMOUNT_FIELD)
                .is_some_and(|a| a.parse::<i64>().is_ok());
            let time_ok = entry
                .field(TIME_FIELD)
                .is_some_and(|t| t.parse::<i64>().is_ok());
            (amount_ok && time_ok).then_some(entry)
        })
        .collect()
}

/// All income and expense rows of every realm, rows present in both logs
/// merged into one entry.
pub fn transaction_entries(db: &TableValue, markers: &Markers) -> Vec<LogEntry> {
    let mut entries = Vec::new();

    for (key, value) in scoped_strings(db) {
        if key.scope != "r" {
            continue;
        }
        if key.field == markers.income || key.field == markers.expense {
            entries.extend(decode_csv_log(value, key.field, key.owner.trim()));
        }
    }

    transaction::dedup(entries)
}
