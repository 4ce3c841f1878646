use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use libgilded::calendar::Calendar;
use libgilded::config::Config;
use libgilded::pipeline::{self, RunReport};

#[derive(Parser)]
#[command(
    name = "gilded",
    version,
    about = "Archive WoW addon gold, transaction and crafting-order history"
)]
struct Cli {
    /// TradeSkillMaster saved-variables file
    #[arg(long, env = "LUA_PATH", value_name = "PATH")]
    lua_path: PathBuf,

    /// Crafting addon saved-variables file
    #[arg(long, env = "CRAFTING_LUA_PATH", value_name = "PATH")]
    crafting_path: Option<PathBuf>,

    /// Archive directory
    #[arg(long, env = "OUTPUT_PATH", value_name = "PATH", default_value = "./output")]
    output_path: PathBuf,

    /// Bucket timestamps into UTC days instead of local ones
    #[arg(long)]
    utc: bool,

    /// Carry gold balances forward up to today
    #[arg(long)]
    through_today: bool,

    /// Do not render transactions.png
    #[arg(long)]
    no_chart: bool,

    /// Rows shown in each summary table
    #[arg(long, value_name = "N", default_value_t = 10)]
    recent: usize,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            crafting_file: self.crafting_path.clone(),
            calendar: if self.utc {
                Calendar::Utc
            } else {
                Calendar::Local
            },
            through_today: self.through_today,
            chart: !self.no_chart,
            recent: self.recent,
            ..Config::new(&self.lua_path, &self.output_path)
        }
    }
}

fn print_gold(report: &RunReport) {
    println!("\n[gold, last {} days]", report.recent_gold.len());
    let mut previous: Option<i64> = None;
    for day in &report.recent_gold {
        print!("  {}  {:>14} G  bank {:>12} G", day.date, day.total, day.bank);
        if let Some(previous) = previous {
            print!("  ({:+})", day.total - previous);
        }
        println!();
        previous = Some(day.total);
    }
}

fn print_requesters(report: &RunReport, n: usize) {
    if report.requesters.is_empty() {
        println!("\n[crafting orders] none");
        return;
    }

    let orders: usize = report.requesters.iter().map(|l| l.total_orders).sum();
    println!("\n[crafting orders] {} from {} requesters", orders, report.requesters.len());

    let mut top: Vec<_> = report.requesters.iter().collect();
    top.sort_by(|a, b| b.total_gold.cmp(&a.total_gold));
    for ledger in top.into_iter().take(n) {
        println!(
            "  {:<30} {:>6} {:>16} G",
            ledger.requester,
            ledger.total_orders,
            ledger.total_gold.to_string()
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let report = pipeline::run(&cli.config())?;

    println!(
        "gold days: {} written, {} unchanged",
        report.gold.written, report.gold.unchanged
    );
    println!(
        "transaction days: {} written, {} unchanged",
        report.transactions.written, report.transactions.unchanged
    );
    println!(
        "crafting days: {} written, {} unchanged; ledgers: {} written, {} unchanged",
        report.crafting_days.written,
        report.crafting_days.unchanged,
        report.ledgers.written,
        report.ledgers.unchanged
    );
    if !report.anomalies.is_empty() {
        println!("anomalies: {}", report.anomalies.len());
    }
    for skipped in &report.skipped_inputs {
        println!("skipped: {}", skipped);
    }

    print_gold(&report);
    print_requesters(&report, cli.recent);
    Ok(())
}
