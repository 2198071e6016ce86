use crate::commands::{connect, report_dropped, require_name, SeatScope};
use crate::config::load_config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchOutcome, FetchSpec, Fetcher};
use crate::recon::report::summary_rows;
use crate::recon::{
    emit, normalize, reconcile, write_artifacts, FieldMap, Format, Metrics, Origin, RunContext,
};
use chrono::Utc;
use clap::Args;
use owo_colors::OwoColorize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    /// Enterprise slug to analyze
    #[arg(long)]
    pub enterprise: String,
    /// Directory for report files (default: license-reports)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Write summary.json and the per-bucket record files
    #[arg(long)]
    pub json: bool,
    /// Write summary.csv
    #[arg(long)]
    pub csv: bool,
    /// Write summary.md
    #[arg(long)]
    pub markdown: bool,
    /// Exit with status 1 when enterprise-only users exceed the threshold
    #[arg(long)]
    pub fail_on_gaps: bool,
    /// Enterprise-only users tolerated before --fail-on-gaps trips
    #[arg(long, default_value = "0")]
    pub min_gap_threshold: usize,
    /// Delay between page requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,
    /// Page size for API requests (1-100)
    #[arg(long)]
    pub per_page: Option<u32>,
}

impl CompareArgs {
    /// Selected formats; all of them when none is requested.
    pub fn formats(&self) -> BTreeSet<Format> {
        let mut formats = BTreeSet::new();
        if self.json {
            formats.insert(Format::Json);
        }
        if self.csv {
            formats.insert(Format::Csv);
        }
        if self.markdown {
            formats.insert(Format::Markdown);
        }
        if formats.is_empty() {
            return Format::all();
        }
        formats
    }
}

fn enterprise_licenses(enterprise: &str) -> FetchSpec {
    FetchSpec::new(
        "enterprise licenses",
        format!("/enterprises/{enterprise}/consumed-licenses"),
    )
    .items_field("users")
}

pub async fn run(args: &CompareArgs, verbose: bool) -> Result<()> {
    let enterprise = require_name("--enterprise", &args.enterprise)?;
    let config = load_config()?;
    let per_page = config.per_page(args.per_page)?;
    let delay = Duration::from_millis(config.sleep_ms(args.sleep_ms));
    let out_dir = config.out_dir(args.out.clone());
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let fetcher = Fetcher::new(&client, per_page, delay);
    let licenses_spec = enterprise_licenses(&enterprise);
    let seats_spec = SeatScope::Enterprise(enterprise.clone()).copilot_seats();
    let licenses = fetcher.fetch_all(&licenses_spec).await?;
    let seats = fetcher.fetch_all(&seats_spec).await?;

    let licensed = normalize(
        &licenses.items,
        Origin::Enterprise,
        &FieldMap::ENTERPRISE_LICENSES,
    )?;
    let seated = normalize(&seats.items, Origin::Copilot, &FieldMap::COPILOT_SEATS)?;

    let partial_sources = partial_sources(&[(&licenses_spec, &licenses), (&seats_spec, &seats)]);
    let dropped_records = report_dropped(&licenses_spec.resource, &licensed.dropped)
        + report_dropped(&seats_spec.resource, &seated.dropped);

    let result = reconcile(&licensed.records, &seated.records);
    let metrics = Metrics::from_result(&result);
    let ctx = RunContext {
        enterprise,
        generated_at: Utc::now(),
        partial_sources,
        dropped_records,
    };

    let artifacts = emit(&result, &metrics, &args.formats(), &ctx)?;
    let written = write_artifacts(&out_dir, &artifacts)?;

    render_summary(&metrics, &ctx);
    for path in &written {
        display::success(&format!("Wrote {}", path.display()));
    }

    client.check_rate_limit_if_verbose().await;

    check_gap_policy(args, &metrics)
}

fn partial_sources(fetches: &[(&FetchSpec, &FetchOutcome)]) -> Vec<String> {
    fetches
        .iter()
        .filter(|(_, outcome)| outcome.partial)
        .map(|(spec, outcome)| {
            let reason = outcome
                .failure
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_default();
            display::warn(&format!(
                "{} incomplete after {} page(s): {reason}",
                spec.resource, outcome.pages
            ));
            spec.resource.clone()
        })
        .collect()
}

fn check_gap_policy(args: &CompareArgs, metrics: &Metrics) -> Result<()> {
    if args.fail_on_gaps && metrics.enterprise_only_count > args.min_gap_threshold {
        return Err(GhReportError::GapThresholdExceeded {
            count: metrics.enterprise_only_count,
            threshold: args.min_gap_threshold,
        });
    }
    Ok(())
}

fn render_summary(metrics: &Metrics, ctx: &RunContext) {
    display::section_header(&format!("License Gap Analysis: {}", ctx.enterprise));

    let mut table = display::new_table(&["Metric", "Value"]);
    for (label, value) in summary_rows(metrics) {
        table.add_row(vec![label.to_string(), value]);
    }
    println!("{table}");

    if !ctx.data_complete() {
        println!(
            "\n{} based on incomplete data from: {}",
            "Note:".yellow().bold(),
            ctx.partial_sources.join(", ")
        );
    }
}
