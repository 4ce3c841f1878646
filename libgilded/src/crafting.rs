use crate::actor::ActorId;
use crate::amount::{Copper, Gold};
use crate::archive::{Archive, Section, WriteStats};
use crate::calendar::Calendar;
use crate::error::{Anomaly, Result};
use crate::table::TableValue;
use crate::transaction::{LogEntry, Markers};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const CRAFTING_ORDER_TYPE: &str = "Crafting Order";

/// A fulfilled crafting order, normalized from either source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CraftingOrderRecord {
    /// day the order was fulfilled
    pub day: NaiveDate,
    /// source timestamp in unix seconds; stable across source pruning
    pub time: i64,
    pub requester: ActorId,
    pub crafter: ActorId,
    pub item: Option<String>,
    pub fee: Gold,
}

type RecordKey = (NaiveDate, ActorId, ActorId, Option<String>, Gold, i64);

impl CraftingOrderRecord {
    pub fn key(&self) -> RecordKey {
        (
            self.day,
            self.requester.clone(),
            self.crafter.clone(),
            self.item.clone(),
            self.fee,
            self.time,
        )
    }

    fn from_line(day: NaiveDate, line: &OrderLine) -> CraftingOrderRecord {
        CraftingOrderRecord {
            day,
            time: line.time,
            requester: ActorId::new(&line.requester, &line.requester_server),
            crafter: ActorId::new(&line.crafter, &line.crafter_server),
            item: line.item.clone(),
            fee: line.fee_gold,
        }
    }

    fn to_line(&self) -> OrderLine {
        OrderLine {
            time: self.time,
            requester: self.requester.name.clone(),
            requester_server: self.requester.server.clone(),
            crafter: self.crafter.name.clone(),
            crafter_server: self.crafter.server.clone(),
            item: self.item.clone(),
            fee_gold: self.fee,
        }
    }
}

/// One order inside a daily crafting file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub time: i64,
    pub requester: String,
    pub requester_server: String,
    pub crafter: String,
    pub crafter_server: String,
    pub item: Option<String>,
    pub fee_gold: Gold,
}

/// On-disk shape of `crafting/YYYY/MM/DD.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CraftingDay {
    pub date: NaiveDate,
    pub total_orders: usize,
    pub total_gold: Gold,
    pub orders: Vec<OrderLine>,
}

impl CraftingDay {
    fn from_records(date: NaiveDate, records: &[CraftingOrderRecord]) -> CraftingDay {
        CraftingDay {
            date,
            total_orders: records.len(),
            total_gold: records.iter().map(|r| r.fee).sum(),
            orders: records.iter().map(CraftingOrderRecord::to_line).collect(),
        }
    }

    pub fn records(&self, date: NaiveDate) -> Vec<CraftingOrderRecord> {
        self.orders
            .iter()
            .map(|line| CraftingOrderRecord::from_line(date, line))
            .collect()
    }
}

/// One order inside a requester ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub date: NaiveDate,
    pub time: i64,
    pub item: Option<String>,
    pub fee_gold: Gold,
    pub crafter: String,
    pub crafter_server: String,
}

/// On-disk shape of `crafting/<server>/<character>.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequesterLedger {
    pub requester: String,
    pub server: String,
    pub character: String,
    pub total_orders: usize,
    pub total_gold: Gold,
    pub orders: Vec<LedgerLine>,
}

/// Crafting orders found in the income log of the currency addon.
///
/// The crafter's server is the realm the log belongs to (the value of the
/// income marker field). A requester without a server inherits it.
pub fn orders_from_log(
    entries: &[LogEntry],
    markers: &Markers,
    calendar: Calendar,
) -> (Vec<CraftingOrderRecord>, Vec<Anomaly>) {
    let mut records = Vec::new();
    let mut anomalies = Vec::new();

    for entry in entries {
        if entry.kind() != CRAFTING_ORDER_TYPE {
            continue;
        }
        let Some(realm) = entry.field(&markers.income) else {
            continue;
        };
        let (Some(time), Some(requester), Some(crafter)) =
            (entry.time(), entry.field("otherPlayer"), entry.field("player"))
        else {
            continue;
        };
        let Some(day) = calendar.day_of(time) else {
            continue;
        };

        let (crafter, _) = ActorId::with_default_server(crafter, realm);
        let (requester, substituted) = ActorId::with_default_server(requester, &crafter.server);
        if substituted {
            anomalies.push(Anomaly::MissingServer {
                requester: requester.name.clone(),
                server: requester.server.clone(),
            });
        }

        records.push(CraftingOrderRecord {
            day,
            time,
            requester,
            crafter,
            item: None,
            fee: entry.amount().abs().gold(),
        });
    }

    (records, anomalies)
}

/// Crafting orders from the crafting addon's save file: the `orders`
/// sequence of the first top-level global that has one.
pub fn orders_from_addon(
    globals: &TableValue,
    calendar: Calendar,
) -> (Vec<CraftingOrderRecord>, Vec<Anomaly>) {
    let mut records = Vec::new();
    let mut anomalies = Vec::new();

    let Some(orders) = globals.values().find_map(|global| global.get("orders")) else {
        tracing::warn!("crafting save file has no orders table");
        return (records, anomalies);
    };

    for (index, order) in orders.values().enumerate() {
        match addon_order(order, calendar, &mut anomalies) {
            Ok(record) => records.push(record),
            Err(reason) => anomalies.push(Anomaly::MalformedOrder { index, reason }),
        }
    }

    (records, anomalies)
}

fn addon_order(
    order: &TableValue,
    calendar: Calendar,
    anomalies: &mut Vec<Anomaly>,
) -> std::result::Result<CraftingOrderRecord, String> {
    let text = |key: &str| order.get(key).and_then(TableValue::as_str);

    let time = order
        .get("fulfilledAt")
        .and_then(TableValue::as_i64)
        .ok_or("missing fulfilledAt")?;
    let day = calendar.day_of(time).ok_or("fulfilledAt out of range")?;

    let crafter_name = text("crafter").ok_or("missing crafter")?;
    let crafter = match text("crafterRealm") {
        Some(realm) => ActorId::new(crafter_name, realm),
        None => ActorId::try_from(crafter_name).map_err(|_| "crafter has no realm")?,
    };

    let customer = text("customer").ok_or("missing customer")?;
    let requester = match text("customerRealm") {
        Some(realm) => ActorId::new(customer, realm),
        None => {
            let (requester, substituted) = ActorId::with_default_server(customer, &crafter.server);
            if substituted {
                anomalies.push(Anomaly::MissingServer {
                    requester: requester.name.clone(),
                    server: requester.server.clone(),
                });
            }
            requester
        }
    };

    let item = text("item")
        .map(str::to_string)
        .or_else(|| order.get("itemID").and_then(TableValue::as_i64).map(|id| id.to_string()));

    let fee = match (order.get("tipCopper"), order.get("tipGold")) {
        (Some(copper), _) => copper.as_i64().map(|c| Copper(c).gold()),
        (None, Some(gold)) => gold.as_f64().and_then(Gold::from_f64),
        (None, None) => None,
    }
    .ok_or("missing or invalid fee")?;

    Ok(CraftingOrderRecord {
        day,
        time,
        requester,
        crafter,
        item,
        fee,
    })
}

/// Fold new records into a day's existing orders. Records already present
/// are not added again; orders end up sorted by time, ties in arrival order.
pub fn merge_day(
    date: NaiveDate,
    existing: Option<&CraftingDay>,
    incoming: &[CraftingOrderRecord],
) -> CraftingDay {
    let mut records = existing.map(|day| day.records(date)).unwrap_or_default();
    let mut seen: HashSet<RecordKey> = records.iter().map(CraftingOrderRecord::key).collect();

    for record in incoming {
        if seen.insert(record.key()) {
            records.push(record.clone());
        }
    }
    records.sort_by_key(|r| r.time);

    CraftingDay::from_records(date, &records)
}

/// Phase 1: write every record into the daily file of its fulfillment day,
/// correcting past days as needed.
pub fn correct_days(archive: &Archive, records: &[CraftingOrderRecord]) -> Result<WriteStats> {
    let mut by_day: BTreeMap<NaiveDate, Vec<CraftingOrderRecord>> = BTreeMap::new();
    for record in records {
        by_day.entry(record.day).or_default().push(record.clone());
    }

    let mut stats = WriteStats::default();
    for (date, incoming) in by_day {
        let path = archive.day_path(Section::Crafting, date);
        let existing: Option<CraftingDay> = archive.read(&path)?;
        let merged = merge_day(date, existing.as_ref(), &incoming);
        stats.record(archive.write(&path, &merged)?);
    }

    tracing::info!(
        written = stats.written,
        unchanged = stats.unchanged,
        "crafting days corrected"
    );
    Ok(stats)
}

/// Group records of all days by requester. Input days are expected in
/// ascending order; the result keeps that order and drops repeated keys.
pub fn build_ledgers(
    days: &BTreeMap<NaiveDate, CraftingDay>,
) -> BTreeMap<ActorId, RequesterLedger> {
    let mut grouped: BTreeMap<ActorId, Vec<CraftingOrderRecord>> = BTreeMap::new();
    let mut seen: HashSet<RecordKey> = HashSet::new();

    for (&date, day) in days {
        for record in day.records(date) {
            if seen.insert(record.key()) {
                grouped.entry(record.requester.clone()).or_default().push(record);
            }
        }
    }

    grouped
        .into_iter()
        .map(|(requester, mut records)| {
            records.sort_by_key(|r| r.day);
            let ledger = RequesterLedger {
                requester: requester.to_string(),
                server: requester.server.clone(),
                character: requester.name.clone(),
                total_orders: records.len(),
                total_gold: records.iter().map(|r| r.fee).sum(),
                orders: records
                    .iter()
                    .map(|r| LedgerLine {
                        date: r.day,
                        time: r.time,
                        item: r.item.clone(),
                        fee_gold: r.fee,
                        crafter: r.crafter.name.clone(),
                        crafter_server: r.crafter.server.clone(),
                    })
                    .collect(),
            };
            (requester, ledger)
        })
        .collect()
}

/// Phase 2: rebuild every requester ledger from the daily crafting files
/// already in the archive. The live sources are not consulted; they may
/// have been pruned.
pub fn rebuild_ledgers(archive: &Archive) -> Result<(WriteStats, Vec<RequesterLedger>)> {
    let days: BTreeMap<NaiveDate, CraftingDay> = archive.read_days(Section::Crafting)?;
    let ledgers = build_ledgers(&days);

    let mut stats = WriteStats::default();
    for (requester, ledger) in &ledgers {
        stats.record(archive.write(&archive.ledger_path(requester), ledger)?);
    }

    tracing::info!(
        days = days.len(),
        requesters = ledgers.len(),
        written = stats.written,
        "crafting ledgers rebuilt"
    );
    Ok((stats, ledgers.into_values().collect()))
}

#[cfg(test)]
mod tests {
    use crate::actor::ActorId;
    use crate::amount::Copper;
    use crate::archive::{Archive, Section};
    use crate::calendar::Calendar;
    use crate::crafting::{
        build_ledgers, correct_days, merge_day, orders_from_addon, orders_from_log,
        rebuild_ledgers, CraftingDay, CraftingOrderRecord,
    };
    use crate::error::Anomaly;
    use crate::parser::parse;
    use crate::transaction::{LogEntry, Markers};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::fs;

    use anyhow::{anyhow, Result};

    // 2024-06-01T00:00:00Z
    const JUNE_1: i64 = 1_717_200_000;

    fn date(d: u32) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 6, d).ok_or(anyhow!("invalid date"))
    }

    fn record(day: u32, requester: &str, copper: i64) -> Result<CraftingOrderRecord> {
        Ok(CraftingOrderRecord {
            day: date(day)?,
            time: JUNE_1 + (day as i64 - 1) * 86_400 + copper % 1_000,
            requester: ActorId::new(requester, "Stormrage"),
            crafter: ActorId::new("Smith", "Stormrage"),
            item: None,
            fee: Copper(copper).gold(),
        })
    }

    fn income_row(other: &str, time: i64, amount: i64) -> LogEntry {
        LogEntry {
            fields: [
                ("csvIncome", "Stormrage"),
                ("type", "Crafting Order"),
                ("amount", &amount.to_string()),
                ("otherPlayer", other),
                ("player", "Smith"),
                ("time", &time.to_string()),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        }
    }

    #[test]
    fn log_orders_default_server() -> Result<()> {
        let entries = vec![
            income_row("RequesterName", JUNE_1 + 10, 123_456),
            income_row("Other-Area52", JUNE_1 + 20, 123_450),
        ];
        let (records, anomalies) = orders_from_log(&entries, &Markers::default(), Calendar::Utc);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].requester.to_string(), "RequesterName-Stormrage");
        assert_eq!(records[0].fee.to_string(), "12.3456");
        assert_eq!(records[1].requester.to_string(), "Other-Area52");
        assert_eq!(records[1].fee.to_string(), "12.3450");
        assert_eq!(records[1].crafter, ActorId::new("Smith", "Stormrage"));
        assert_eq!(
            anomalies,
            vec![Anomaly::MissingServer {
                requester: "RequesterName".to_string(),
                server: "Stormrage".to_string(),
            }]
        );
        Ok(())
    }

    #[test]
    fn addon_orders() -> Result<()> {
        let globals = parse(
            r#"
            CraftingOrderHistoryDB = {
                ["orders"] = {
                    {
                        ["fulfilledAt"] = 1717200100,
                        ["crafter"] = "Smith-Stormrage",
                        ["customer"] = "Buyer",
                        ["item"] = "Draconic Vial",
                        ["tipCopper"] = 50000,
                    },
                    {
                        ["fulfilledAt"] = 1717286500,
                        ["crafter"] = "Smith",
                        ["crafterRealm"] = "Stormrage",
                        ["customer"] = "Buyer",
                        ["customerRealm"] = "Area52",
                        ["itemID"] = 191500,
                        ["tipGold"] = 1.23456,
                    },
                    {
                        ["crafter"] = "Smith-Stormrage",
                    },
                },
            }
            "#,
        )?;
        let (records, anomalies) = orders_from_addon(&globals, Calendar::Utc);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].day, date(1)?);
        assert_eq!(records[0].requester, ActorId::new("Buyer", "Stormrage"));
        assert_eq!(records[0].item.as_deref(), Some("Draconic Vial"));
        assert_eq!(records[0].fee.to_string(), "5.0000");
        assert_eq!(records[1].day, date(2)?);
        assert_eq!(records[1].requester, ActorId::new("Buyer", "Area52"));
        assert_eq!(records[1].item.as_deref(), Some("191500"));
        assert_eq!(records[1].fee.to_string(), "1.2346");

        assert_eq!(anomalies.len(), 2);
        assert!(matches!(anomalies[0], Anomaly::MissingServer { .. }));
        assert!(matches!(anomalies[1], Anomaly::MalformedOrder { index: 2, .. }));
        Ok(())
    }

    #[test]
    fn merge_day_does_not_duplicate() -> Result<()> {
        let a = record(1, "Foo", 10_000)?;
        let b = record(1, "Bar", 20_001)?;
        let first = merge_day(date(1)?, None, &[a.clone()]);
        let second = merge_day(date(1)?, Some(&first), &[a.clone(), b.clone()]);

        assert_eq!(first.total_orders, 1);
        assert_eq!(second.total_orders, 2);
        assert_eq!(second.total_gold.to_string(), "3.0001");
        assert_eq!(merge_day(date(1)?, Some(&second), &[b]), second);
        Ok(())
    }

    #[test]
    fn ledgers_group_by_requester_in_day_order() -> Result<()> {
        let mut days = BTreeMap::new();
        days.insert(
            date(3)?,
            merge_day(date(3)?, None, &[record(3, "Foo", 30_000)?]),
        );
        days.insert(
            date(1)?,
            merge_day(
                date(1)?,
                None,
                &[record(1, "Foo", 10_000)?, record(1, "Bar", 5_000)?],
            ),
        );
        let ledgers = build_ledgers(&days);

        assert_eq!(ledgers.len(), 2);
        let foo = &ledgers[&ActorId::new("Foo", "Stormrage")];
        assert_eq!(foo.requester, "Foo-Stormrage");
        assert_eq!(foo.total_orders, 2);
        assert_eq!(foo.orders[0].date, date(1)?);
        assert_eq!(foo.orders[1].date, date(3)?);
        assert_eq!(foo.total_gold.to_string(), "4.0000");
        Ok(())
    }

    #[test]
    fn ledgers_survive_source_pruning() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = Archive::new(tmp.path());
        let early = record(1, "Foo", 10_000)?;
        let late = record(2, "Foo", 20_000)?;

        correct_days(&archive, &[early.clone(), late.clone()])?;
        rebuild_ledgers(&archive)?;
        let ledger_path = archive.ledger_path(&early.requester);
        let first = fs::read(&ledger_path)?;

        // the source dropped its oldest order; the archive still has it
        correct_days(&archive, &[late])?;
        let (stats, ledgers) = rebuild_ledgers(&archive)?;

        assert_eq!(stats.written, 0);
        assert_eq!(ledgers[0].total_orders, 2);
        assert_eq!(fs::read(&ledger_path)?, first);

        let day: Option<CraftingDay> = archive.read(&archive.day_path(Section::Crafting, date(1)?))?;
        assert_eq!(day.map(|d| d.total_orders), Some(1));
        Ok(())
    }

    #[test]
    fn fee_stays_four_digits_on_disk() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = Archive::new(tmp.path());
        correct_days(&archive, &[record(1, "Foo", 123_450)?])?;
        let text = fs::read_to_string(archive.day_path(Section::Crafting, date(1)?))?;
        assert!(text.contains("\"fee_gold\": 12.3450"));
        Ok(())
    }
}
