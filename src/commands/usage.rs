use crate::commands::{connect, require_name};
use crate::config::load_config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchSpec, Fetcher};
use chrono::{Days, NaiveDate, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

/// Longest span one direct-data request may cover.
pub const MAX_RANGE_DAYS: u64 = 14;
/// Oldest day the direct-data export still serves.
pub const RETENTION_DAYS: u64 = 365;

#[derive(Args, Debug, Clone)]
pub struct UsageArgs {
    /// Enterprise whose Copilot usage exports to list
    #[arg(long)]
    pub enterprise: String,
    /// First day, YYYY-MM-DD (default: 14 days before --until)
    #[arg(long)]
    pub since: Option<NaiveDate>,
    /// Last day, YYYY-MM-DD (default: yesterday)
    #[arg(long)]
    pub until: Option<NaiveDate>,
    /// Output results as JSON, including the blob URIs
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateRange {
    /// Fill in defaults and check the range against what the export accepts.
    pub fn resolve(
        since: Option<NaiveDate>,
        until: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        let until = match until {
            Some(until) => until,
            None => days_before(today, 1)?,
        };
        let since = match since {
            Some(since) => since,
            None => days_before(until, MAX_RANGE_DAYS)?,
        };

        if until > today {
            return Err(GhReportError::Usage(format!(
                "--until {until} is in the future"
            )));
        }
        if since > until {
            return Err(GhReportError::Usage(format!(
                "--since {since} is after --until {until}"
            )));
        }
        let span = (until - since).num_days();
        if span > MAX_RANGE_DAYS as i64 {
            return Err(GhReportError::Usage(format!(
                "date range covers {span} days; at most {MAX_RANGE_DAYS} are allowed"
            )));
        }
        if since < days_before(today, RETENTION_DAYS)? {
            return Err(GhReportError::Usage(format!(
                "--since {since} is more than {RETENTION_DAYS} days ago"
            )));
        }

        Ok(Self { since, until })
    }

    fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.since.iter_days().take_while(|day| *day <= self.until)
    }
}

fn days_before(date: NaiveDate, days: u64) -> Result<NaiveDate> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| GhReportError::Usage(format!("{days} days before {date} is out of range")))
}

#[derive(Debug, Deserialize)]
struct DirectDataEntry {
    date: NaiveDate,
    #[serde(default)]
    blob_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DayExport {
    pub date: NaiveDate,
    pub blob_count: usize,
    pub blob_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub enterprise: String,
    pub range: DateRange,
    pub total_blobs: usize,
    pub days: Vec<DayExport>,
    /// Days in the range the export has nothing for.
    pub missing_dates: Vec<NaiveDate>,
    pub data_complete: bool,
}

pub async fn run(args: &UsageArgs, verbose: bool) -> Result<()> {
    let enterprise = require_name("--enterprise", &args.enterprise)?;
    let range = DateRange::resolve(args.since, args.until, Utc::now().date_naive())?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let spec = FetchSpec::new(
        "copilot usage exports",
        format!("/enterprises/{enterprise}/copilot/direct-data"),
    )
    .query("since", range.since.to_string())
    .query("until", range.until.to_string());

    let fetcher = Fetcher::new(
        &client,
        config.per_page(None)?,
        Duration::from_millis(config.sleep_ms(None)),
    );
    let outcome = fetcher.fetch_all(&spec).await?;
    if outcome.partial {
        display::warn("Usage export listing stopped early; results are incomplete");
    }

    let report = build_report(enterprise, range, outcome.items, !outcome.partial)?;
    display::output(args.json, &report, render_report);

    client.check_rate_limit_if_verbose().await;

    Ok(())
}

pub fn build_report(
    enterprise: String,
    range: DateRange,
    items: Vec<Value>,
    data_complete: bool,
) -> Result<UsageReport> {
    let mut days: Vec<DayExport> = items
        .into_iter()
        .map(serde_json::from_value::<DirectDataEntry>)
        .map(|entry| {
            entry.map(|e| DayExport {
                date: e.date,
                blob_count: e.blob_uris.len(),
                blob_uris: e.blob_uris,
            })
        })
        .collect::<std::result::Result<_, _>>()?;
    days.sort_by_key(|d| d.date);

    let covered: BTreeSet<NaiveDate> = days
        .iter()
        .filter(|d| d.blob_count > 0)
        .map(|d| d.date)
        .collect();
    let missing_dates = range.days().filter(|day| !covered.contains(day)).collect();

    Ok(UsageReport {
        enterprise,
        range,
        total_blobs: days.iter().map(|d| d.blob_count).sum(),
        days,
        missing_dates,
        data_complete,
    })
}

fn render_report(report: &UsageReport) {
    display::section_header(&format!(
        "Copilot usage exports: {} ({} to {})",
        report.enterprise, report.range.since, report.range.until
    ));

    if report.days.is_empty() {
        display::warn("No usage exports in this range.");
        return;
    }

    let mut table = display::new_table(&["Date", "Blobs"]);
    for day in &report.days {
        table.add_row(vec![day.date.to_string(), day.blob_count.to_string()]);
    }
    println!("{table}");
    println!(
        "\n{} blob(s) across {} day(s). Use --json to list the download URIs.",
        report.total_blobs,
        report.days.len()
    );

    if !report.missing_dates.is_empty() {
        let missing: Vec<String> = report.missing_dates.iter().map(|d| d.to_string()).collect();
        display::warn(&format!("No exports for: {}", missing.join(", ")));
    }
}
