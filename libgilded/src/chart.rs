use crate::archive::{Archive, WriteOutcome};
use crate::error::{Error, Result};
use crate::history::GoldDay;
use crate::transaction::TransactionDay;
use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

const WIDTH: u32 = 1400;
const HEIGHT: u32 = 1200;
const BACKGROUND: RGBColor = RGBColor(0x1a, 0x1a, 0x2e);
const PANEL: RGBColor = RGBColor(0x16, 0x21, 0x3e);
const GOLD: RGBColor = RGBColor(0xff, 0xd7, 0x00);

/// Day-aligned series for the chart. Every vector has one value per day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChartSeries {
    pub days: Vec<NaiveDate>,
    pub total_gold: Vec<f64>,
    pub income: BTreeMap<String, Vec<f64>>,
    pub expense: BTreeMap<String, Vec<f64>>,
}

impl ChartSeries {
    pub fn new(
        gold: &BTreeMap<NaiveDate, GoldDay>,
        transactions: &BTreeMap<NaiveDate, TransactionDay>,
    ) -> ChartSeries {
        let days: Vec<NaiveDate> = gold
            .keys()
            .chain(transactions.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let total_gold = days
            .iter()
            .map(|day| gold.get(day).map(|g| g.total as f64).unwrap_or_default())
            .collect();

        let mut income: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut expense: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (idx, day) in days.iter().enumerate() {
            let Some(tx) = transactions.get(day) else {
                continue;
            };
            for (kind, totals) in &tx.by_type {
                if totals.income_gold.to_f64() > 0.0 {
                    income.entry(kind.clone()).or_insert_with(|| vec![0.0; days.len()])[idx] =
                        totals.income_gold.to_f64();
                }
                if totals.expense_gold.to_f64() > 0.0 {
                    expense.entry(kind.clone()).or_insert_with(|| vec![0.0; days.len()])[idx] =
                        totals.expense_gold.to_f64();
                }
            }
        }

        ChartSeries {
            days,
            total_gold,
            income,
            expense,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Running sums across layers: layer `k` is the sum of the first `k + 1`
/// series, so drawing them top-down yields a stacked area chart.
pub fn stack(layers: &BTreeMap<String, Vec<f64>>) -> Vec<Vec<f64>> {
    let mut stacked: Vec<Vec<f64>> = Vec::with_capacity(layers.len());
    for values in layers.values() {
        let next = match stacked.last() {
            Some(below) => below.iter().zip(values).map(|(b, v)| b + v).collect(),
            None => values.clone(),
        };
        stacked.push(next);
    }
    stacked
}

fn chart_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Chart(e.to_string())
}

fn y_max<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.copied().fold(1.0, f64::max) * 1.05
}

fn draw_total(area: &DrawingArea<BitMapBackend, Shift>, series: &ChartSeries) -> Result<()> {
    area.fill(&PANEL).map_err(chart_err)?;
    let x_max = series.days.len().max(2) as i32 - 1;
    let mut chart = ChartBuilder::on(area)
        .margin(12)
        .build_cartesian_2d(0..x_max, 0f64..y_max(series.total_gold.iter()))
        .map_err(chart_err)?;

    let points = || {
        series
            .total_gold
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx as i32, *v))
    };
    chart
        .draw_series(AreaSeries::new(points(), 0.0, GOLD.mix(0.35).filled()))
        .map_err(chart_err)?;
    chart
        .draw_series(LineSeries::new(points(), GOLD.stroke_width(2)))
        .map_err(chart_err)?;
    Ok(())
}

fn draw_stacked(
    area: &DrawingArea<BitMapBackend, Shift>,
    days: usize,
    layers: &BTreeMap<String, Vec<f64>>,
    palette_offset: usize,
) -> Result<()> {
    area.fill(&PANEL).map_err(chart_err)?;
    let stacked = stack(layers);
    let x_max = days.max(2) as i32 - 1;
    let top = stacked.last().map(|l| y_max(l.iter())).unwrap_or(1.0);
    let mut chart = ChartBuilder::on(area)
        .margin(12)
        .build_cartesian_2d(0..x_max, 0f64..top)
        .map_err(chart_err)?;

    for (idx, layer) in stacked.iter().enumerate().rev() {
        let color = Palette99::pick(idx + palette_offset).mix(0.75);
        chart
            .draw_series(AreaSeries::new(
                layer.iter().enumerate().map(|(i, v)| (i as i32, *v)),
                0.0,
                color.filled(),
            ))
            .map_err(chart_err)?;
    }
    Ok(())
}

fn render_png(path: &Path, series: &ChartSeries) -> Result<()> {
    let root = BitMapBackend::new(path, (WIDTH, HEIGHT)).into_drawing_area();
    root.fill(&BACKGROUND).map_err(chart_err)?;

    let panels = root.margin(10, 10, 10, 10).split_evenly((3, 1));
    draw_total(&panels[0], series)?;
    draw_stacked(&panels[1], series.days.len(), &series.income, 0)?;
    draw_stacked(&panels[2], series.days.len(), &series.expense, 50)?;

    root.present().map_err(chart_err)?;
    Ok(())
}

/// Render the chart for everything the archive holds. Returns `None` when
/// there is nothing to draw.
pub fn render(archive: &Archive) -> Result<Option<WriteOutcome>> {
    use crate::archive::Section;

    let gold: BTreeMap<NaiveDate, GoldDay> = archive.read_days(Section::Gold)?;
    let transactions: BTreeMap<NaiveDate, TransactionDay> =
        archive.read_days(Section::Transactions)?;
    let series = ChartSeries::new(&gold, &transactions);
    if series.is_empty() {
        tracing::info!("no data to chart");
        return Ok(None);
    }

    let path = archive.chart_path();
    fs::create_dir_all(archive.root()).map_err(Error::io(archive.root()))?;
    let tmp_path = path.with_extension("tmp.png");
    render_png(&tmp_path, &series)?;
    let bytes = fs::read(&tmp_path).map_err(Error::io(&tmp_path))?;
    fs::remove_file(&tmp_path).map_err(Error::io(&tmp_path))?;

    let outcome = archive.write_bytes(&path, &bytes)?;
    tracing::info!(path = %path.display(), days = series.days.len(), "chart rendered");
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use crate::amount::Copper;
    use crate::chart::{stack, ChartSeries};
    use crate::history::GoldDay;
    use crate::transaction::{TransactionDay, TypeTotals};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    use anyhow::{anyhow, Result};

    #[test]
    fn stacking_accumulates_layers() {
        let mut layers = BTreeMap::new();
        layers.insert("a".to_string(), vec![1.0, 2.0]);
        layers.insert("b".to_string(), vec![3.0, 0.0]);
        assert_eq!(stack(&layers), vec![vec![1.0, 2.0], vec![4.0, 2.0]]);
    }

    #[test]
    fn series_align_days() -> Result<()> {
        let d1 = NaiveDate::from_ymd_opt(2024, 6, 1).ok_or(anyhow!("invalid date"))?;
        let d2 = NaiveDate::from_ymd_opt(2024, 6, 2).ok_or(anyhow!("invalid date"))?;

        let mut gold = BTreeMap::new();
        gold.insert(
            d1,
            GoldDay {
                date: d1,
                characters: BTreeMap::new(),
                bank: 0,
                total: 500,
            },
        );

        let mut tx_day = TransactionDay::new(d2);
        tx_day.by_type.insert(
            "Auction".to_string(),
            TypeTotals {
                income_gold: Copper(1_000_000).gold(),
                ..Default::default()
            },
        );
        let mut transactions = BTreeMap::new();
        transactions.insert(d2, tx_day);

        let series = ChartSeries::new(&gold, &transactions);
        assert_eq!(series.days, vec![d1, d2]);
        assert_eq!(series.total_gold, vec![500.0, 0.0]);
        assert_eq!(series.income["Auction"], vec![0.0, 100.0]);
        assert!(series.expense.is_empty());
        Ok(())
    }
}
