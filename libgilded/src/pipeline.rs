use crate::archive::{Archive, Section, WriteOutcome, WriteStats};
use crate::config::Config;
use crate::crafting::{self, RequesterLedger};
use crate::error::Anomaly;
use crate::history::{merge_holders, reconstruct, GoldDay, MinuteCopperLog};
use crate::parser::parse_file;
use crate::transaction::{classify, dedup, Markers, TransactionDay};
use crate::{chart, tsm};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// What one run did to the archive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    pub gold: WriteStats,
    pub transactions: WriteStats,
    pub crafting_days: WriteStats,
    pub ledgers: WriteStats,
    pub chart: Option<WriteOutcome>,
    pub anomalies: Vec<Anomaly>,
    /// The latest archived gold days, oldest first.
    pub recent_gold: Vec<GoldDay>,
    pub requesters: Vec<RequesterLedger>,
    /// Optional inputs that could not be read; the run went on without them.
    pub skipped_inputs: Vec<String>,
}

/// Update the archive from the configured save files.
pub fn run(config: &Config) -> Result<RunReport> {
    let archive = Archive::new(&config.output);
    let markers = Markers::default();
    let calendar = config.calendar;
    let mut report = RunReport::default();

    let globals = parse_file(&config.save_file)
        .with_context(|| format!("reading {}", config.save_file.display()))?;
    let crafting_globals = match &config.crafting_file {
        Some(path) => match parse_file(path) {
            Ok(globals) => Some(globals),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "skipping crafting save file");
                report
                    .skipped_inputs
                    .push(format!("{}: {}", path.display(), e));
                None
            }
        },
        None => None,
    };
    let db = tsm::database(&globals);

    let (histories, anomalies) = tsm::gold_histories(db, &MinuteCopperLog, calendar);
    report.anomalies.extend(anomalies);
    let histories = merge_holders(histories);
    let through = config.through_today.then(|| calendar.today());
    for snapshot in reconstruct(&histories, through).values() {
        let day = snapshot.externalize();
        let path = archive.day_path(Section::Gold, day.date);
        report.gold.record(archive.write(&path, &day)?);
    }
    tracing::info!(
        holders = histories.len(),
        written = report.gold.written,
        unchanged = report.gold.unchanged,
        "gold days archived"
    );

    let entries = tsm::transaction_entries(db, &markers);
    let (mut records, anomalies) = crafting::orders_from_log(&entries, &markers, calendar);
    report.anomalies.extend(anomalies);

    let (fresh, anomalies) = classify(entries, &markers, calendar);
    report.anomalies.extend(anomalies);
    report.transactions = archive_transactions(&archive, fresh, &markers, config)?;

    if let Some(crafting_globals) = &crafting_globals {
        let (addon_records, anomalies) = crafting::orders_from_addon(crafting_globals, calendar);
        records.extend(addon_records);
        report.anomalies.extend(anomalies);
    }
    report.crafting_days = crafting::correct_days(&archive, &records)
        .context("correcting crafting days")?;
    let (ledgers, requesters) =
        crafting::rebuild_ledgers(&archive).context("rebuilding crafting ledgers")?;
    report.ledgers = ledgers;
    report.requesters = requesters;

    if config.chart {
        report.chart = chart::render(&archive).context("rendering chart")?;
    }

    let gold: BTreeMap<NaiveDate, GoldDay> = archive.read_days(Section::Gold)?;
    let skip = gold.len().saturating_sub(config.recent);
    report.recent_gold = gold.into_values().skip(skip).collect();

    for anomaly in &report.anomalies {
        anomaly.log();
    }
    Ok(report)
}

/// Merge freshly classified days into the archived ones. Rows already on
/// disk are kept even when the addon has since pruned them.
fn archive_transactions(
    archive: &Archive,
    fresh: BTreeMap<NaiveDate, TransactionDay>,
    markers: &Markers,
    config: &Config,
) -> Result<WriteStats> {
    let mut stats = WriteStats::default();

    for (date, day) in fresh {
        let path = archive.day_path(Section::Transactions, date);
        let existing: Option<TransactionDay> = archive.read(&path)?;
        let rows = dedup(
            existing
                .iter()
                .flat_map(|d| d.entries().cloned())
                .chain(day.entries().cloned()),
        );

        // Anomalies were already reported for the fresh rows.
        let (mut merged, _) = classify(rows, markers, config.calendar);
        let merged = merged.remove(&date).unwrap_or(day);
        stats.record(archive.write(&path, &merged)?);
    }

    tracing::info!(
        written = stats.written,
        unchanged = stats.unchanged,
        "transaction days archived"
    );
    Ok(stats)
}
