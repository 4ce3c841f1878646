use crate::amount::{Copper, Gold};
use crate::calendar::Calendar;
use crate::error::Anomaly;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TIME_FIELD: &str = "time";
pub const TYPE_FIELD: &str = "type";
pub const AMOUNT_FIELD: &str = "amount";

/// Fields that identify one log row across runs and across logs.
pub const IDENTITY_FIELDS: [&str; 4] = [TYPE_FIELD, "otherPlayer", "player", TIME_FIELD];

/// One row of a transaction log, kept as its raw field map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntry {
    pub fields: IndexMap<String, String>,
}

impl LogEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn time(&self) -> Option<i64> {
        self.field(TIME_FIELD)?.trim().parse().ok()
    }

    pub fn amount(&self) -> Copper {
        Copper(
            self.field(AMOUNT_FIELD)
                .and_then(|a| a.trim().parse().ok())
                .unwrap_or_default(),
        )
    }

    pub fn kind(&self) -> &str {
        self.field(TYPE_FIELD).unwrap_or_default()
    }

    pub fn identity(&self) -> Vec<&str> {
        IDENTITY_FIELDS
            .iter()
            .map(|f| self.field(f).unwrap_or_default())
            .collect()
    }

    /// Absorb fields of a row with the same identity; existing values win.
    pub fn absorb(&mut self, other: LogEntry) {
        for (key, value) in other.fields {
            self.fields.entry(key).or_insert(value);
        }
    }
}

/// Field names whose presence marks a row as income or expense.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    pub income: String,
    pub expense: String,
}

impl Default for Markers {
    fn default() -> Self {
        Markers {
            income: "csvIncome".to_string(),
            expense: "csvExpense".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Income,
    Expense,
    Unclassified,
}

impl Markers {
    pub fn categorize(&self, entry: &LogEntry) -> Category {
        let income = entry.fields.contains_key(&self.income);
        let expense = entry.fields.contains_key(&self.expense);
        match (income, expense) {
            (true, false) => Category::Income,
            (false, true) => Category::Expense,
            _ => Category::Unclassified,
        }
    }

    fn present(&self, entry: &LogEntry) -> Vec<String> {
        [&self.income, &self.expense]
            .into_iter()
            .filter(|m| entry.fields.contains_key(m.as_str()))
            .cloned()
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTotals {
    pub income_gold: Gold,
    pub expense_gold: Gold,
    pub count: usize,
}

/// All classified rows of one day plus their totals. This is also the
/// on-disk shape of a daily transactions file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDay {
    pub date: NaiveDate,
    pub income_gold: Gold,
    pub expense_gold: Gold,
    pub net_gold: Gold,
    pub by_type: BTreeMap<String, TypeTotals>,
    pub income: Vec<LogEntry>,
    pub expense: Vec<LogEntry>,
    pub unclassified: Vec<LogEntry>,
}

impl TransactionDay {
    pub fn new(date: NaiveDate) -> TransactionDay {
        TransactionDay {
            date,
            ..Default::default()
        }
    }

    fn push(&mut self, category: Category, entry: LogEntry) {
        let gold = entry.amount().abs().gold();
        match category {
            Category::Income => {
                let totals = self.by_type.entry(entry.kind().to_string()).or_default();
                totals.income_gold = totals.income_gold + gold;
                totals.count += 1;
                self.income_gold = self.income_gold + gold;
                self.income.push(entry);
            }
            Category::Expense => {
                let totals = self.by_type.entry(entry.kind().to_string()).or_default();
                totals.expense_gold = totals.expense_gold + gold;
                totals.count += 1;
                self.expense_gold = self.expense_gold + gold;
                self.expense.push(entry);
            }
            Category::Unclassified => self.unclassified.push(entry),
        }
        self.net_gold = self.income_gold - self.expense_gold;
    }

    /// Every row of the day, regardless of bucket.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.income
            .iter()
            .chain(self.expense.iter())
            .chain(self.unclassified.iter())
    }
}

/// Merge rows that share an identity, keeping first-seen order.
pub fn dedup(entries: impl IntoIterator<Item = LogEntry>) -> Vec<LogEntry> {
    let mut merged: IndexMap<Vec<String>, LogEntry> = IndexMap::new();
    for entry in entries {
        let key: Vec<String> = entry.identity().into_iter().map(String::from).collect();
        match merged.get_mut(&key) {
            Some(existing) => existing.absorb(entry),
            None => {
                merged.insert(key, entry);
            }
        }
    }
    merged.into_values().collect()
}

/// Sort rows into per-day income, expense and unclassified buckets.
///
/// Rows within a day are ordered by timestamp; rows with equal timestamps
/// keep their source order. Rows matching both markers or neither go to
/// the unclassified bucket and produce an [`Anomaly::AmbiguousTransaction`].
pub fn classify(
    entries: Vec<LogEntry>,
    markers: &Markers,
    calendar: Calendar,
) -> (BTreeMap<NaiveDate, TransactionDay>, Vec<Anomaly>) {
    let mut dated: Vec<(i64, LogEntry)> = entries
        .into_iter()
        .filter_map(|entry| match entry.time() {
            Some(time) => Some((time, entry)),
            None => {
                tracing::debug!(fields = ?entry.fields, "dropping transaction without timestamp");
                None
            }
        })
        .collect();
    dated.sort_by_key(|(time, _)| *time);

    let mut days: BTreeMap<NaiveDate, TransactionDay> = BTreeMap::new();
    let mut anomalies = Vec::new();

    for (time, entry) in dated {
        let Some(day) = calendar.day_of(time) else {
            continue;
        };
        let category = markers.categorize(&entry);
        if category == Category::Unclassified {
            anomalies.push(Anomaly::AmbiguousTransaction {
                day,
                markers: markers.present(&entry),
            });
        }
        days.entry(day)
            .or_insert_with(|| TransactionDay::new(day))
            .push(category, entry);
    }

    (days, anomalies)
}
