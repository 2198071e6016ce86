use crate::commands::{connect, report_dropped, SeatTarget};
use crate::config::load_config;
use crate::display;
use crate::error::Result;
use crate::github::Fetcher;
use crate::recon::{normalize, FieldMap, Origin, Record};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::cmp::Reverse;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct InactiveArgs {
    #[command(flatten)]
    pub target: SeatTarget,
    /// Days without Copilot activity before a seat counts as inactive
    #[arg(long, default_value = "90")]
    pub days: i64,
    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
    /// Delay between page requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Active,
    Inactive,
    NeverUsed,
}

impl SeatStatus {
    fn label(self) -> &'static str {
        match self {
            SeatStatus::Active => "active",
            SeatStatus::Inactive => "inactive",
            SeatStatus::NeverUsed => "never used",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeatActivity {
    pub login: String,
    pub name: String,
    pub assigned: String,
    pub last_activity: String,
    pub days_inactive: Option<i64>,
    pub status: SeatStatus,
}

#[derive(Debug, Serialize)]
pub struct InactiveReport {
    pub scope: String,
    pub threshold_days: i64,
    pub total_seats: usize,
    pub active: usize,
    pub inactive: usize,
    pub never_used: usize,
    pub data_complete: bool,
    pub seats: Vec<SeatActivity>,
}

pub async fn run(args: &InactiveArgs, verbose: bool) -> Result<()> {
    let scope = args.target.scope()?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let delay = Duration::from_millis(config.sleep_ms(args.sleep_ms));
    let fetcher = Fetcher::new(&client, config.per_page(None)?, delay);
    let outcome = fetcher.fetch_all(&scope.copilot_seats()).await?;
    if outcome.partial {
        display::warn(&format!(
            "Seat listing for {} stopped after {} page(s); results are incomplete",
            scope.name(),
            outcome.pages
        ));
    }

    let seats = normalize(&outcome.items, Origin::Copilot, &FieldMap::COPILOT_SEATS)?;
    report_dropped("copilot seats", &seats.dropped);

    let report = build_report(
        scope.name(),
        &seats.records,
        Utc::now(),
        args.days,
        !outcome.partial,
    );

    display::output(args.json, &report, render_report);

    client.check_rate_limit_if_verbose().await;

    Ok(())
}

pub fn categorize(seat: &Record, now: DateTime<Utc>, threshold_days: i64) -> SeatActivity {
    let days_inactive = seat.last_activity_at.map(|dt| (now - dt).num_days());
    let status = match days_inactive {
        None => SeatStatus::NeverUsed,
        Some(days) if days >= threshold_days => SeatStatus::Inactive,
        Some(_) => SeatStatus::Active,
    };

    SeatActivity {
        login: seat.key.clone(),
        name: seat.display_name.clone().unwrap_or_default(),
        assigned: seat
            .source_created_at
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string()),
        last_activity: seat
            .last_activity_at
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string()),
        days_inactive,
        status,
    }
}

pub fn build_report(
    scope: &str,
    seats: &[Record],
    now: DateTime<Utc>,
    threshold_days: i64,
    data_complete: bool,
) -> InactiveReport {
    let mut activity: Vec<SeatActivity> = seats
        .iter()
        .map(|seat| categorize(seat, now, threshold_days))
        .collect();

    // Never-used seats first, then the longest idle.
    activity.sort_by_key(|s| (s.days_inactive.is_some(), Reverse(s.days_inactive)));

    let count = |status: SeatStatus| activity.iter().filter(|s| s.status == status).count();
    InactiveReport {
        scope: scope.to_string(),
        threshold_days,
        total_seats: activity.len(),
        active: count(SeatStatus::Active),
        inactive: count(SeatStatus::Inactive),
        never_used: count(SeatStatus::NeverUsed),
        data_complete,
        seats: activity,
    }
}

fn render_report(report: &InactiveReport) {
    if report.total_seats == 0 {
        display::warn(&format!("No Copilot seats found for {}.", report.scope));
        return;
    }

    display::section_header(&format!(
        "Copilot Seats: {} (inactive after {} days)",
        report.scope, report.threshold_days
    ));

    let mut table = display::new_table(&[
        "Login",
        "Name",
        "Assigned",
        "Last Activity",
        "Days Inactive",
        "Status",
    ]);
    for s in report.seats.iter().filter(|s| s.status != SeatStatus::Active) {
        table.add_row(vec![
            s.login.clone(),
            s.name.clone(),
            s.assigned.clone(),
            s.last_activity.clone(),
            s.days_inactive.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
            s.status.label().to_string(),
        ]);
    }
    println!("{table}");
    println!(
        "\n{} seat(s): {} active, {} inactive, {} never used.",
        report.total_seats, report.active, report.inactive, report.never_used
    );
}
