use crate::error::{GhReportError, Result};
use crate::recon::model::{Origin, ReconciliationResult, Record};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: [&str; 7] = [
    "category",
    "login",
    "name",
    "enterprise_created_at",
    "copilot_created_at",
    "last_activity_at",
    "recommendation",
];

const ASSIGN_SEAT: &str = "Consider assigning a Copilot seat";
const REVIEW_SEAT: &str = "Review seat: no enterprise license found";
const FULLY_LICENSED: &str = "Fully licensed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    Json,
    Csv,
    Markdown,
}

impl Format {
    pub fn all() -> BTreeSet<Format> {
        [Format::Json, Format::Csv, Format::Markdown].into_iter().collect()
    }
}

/// Counts and percentages derived once per run. Every artifact renders these
/// exact values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub total_enterprise_users: usize,
    pub total_copilot_users: usize,
    pub enterprise_only_count: usize,
    pub copilot_only_count: usize,
    pub both_licenses_count: usize,
    pub license_coverage_percentage: f64,
    pub license_gap_percentage: f64,
}

impl Metrics {
    pub fn from_result(result: &ReconciliationResult) -> Self {
        Self {
            total_enterprise_users: result.total_left,
            total_copilot_users: result.total_right,
            enterprise_only_count: result.left_only.len(),
            copilot_only_count: result.right_only.len(),
            both_licenses_count: result.both.len(),
            license_coverage_percentage: percentage(result.both.len(), result.total_left),
            license_gap_percentage: percentage(result.left_only.len(), result.total_left),
        }
    }
}

/// `part / total * 100` rounded to two decimals; zero when `total` is zero.
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    pub priority: &'static str,
    pub enterprise_only_action: String,
    pub copilot_only_action: String,
}

impl Recommendations {
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let priority = if metrics.license_gap_percentage >= 50.0 {
            "high"
        } else if metrics.license_gap_percentage >= 20.0 {
            "medium"
        } else {
            "low"
        };

        let enterprise_only_action = match metrics.enterprise_only_count {
            0 => "All enterprise users hold a Copilot seat".to_string(),
            n => format!("Consider assigning Copilot seats to {n} enterprise user(s)"),
        };
        let copilot_only_action = match metrics.copilot_only_count {
            0 => "Every Copilot seat belongs to a licensed enterprise user".to_string(),
            n => format!("Review {n} Copilot seat(s) held by users without an enterprise license"),
        };

        Self {
            priority,
            enterprise_only_action,
            copilot_only_action,
        }
    }
}

/// Facts about the run that every artifact reports alongside the result.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub enterprise: String,
    pub generated_at: DateTime<Utc>,
    /// Resources whose pagination stopped early.
    pub partial_sources: Vec<String>,
    pub dropped_records: usize,
}

impl RunContext {
    pub fn data_complete(&self) -> bool {
        self.partial_sources.is_empty()
    }

    fn generated_at(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    generated_at: String,
    enterprise: &'a str,
    data_complete: bool,
    partial_sources: &'a [String],
    dropped_records: usize,
    analysis: &'a Metrics,
    recommendations: &'a Recommendations,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    category: &'static str,
    login: &'a str,
    name: Option<&'a str>,
    enterprise_created_at: Option<String>,
    copilot_created_at: Option<String>,
    last_activity_at: Option<String>,
    recommendation: &'static str,
}

/// One rendered output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

pub fn emit(
    result: &ReconciliationResult,
    metrics: &Metrics,
    formats: &BTreeSet<Format>,
    ctx: &RunContext,
) -> Result<Vec<Artifact>> {
    let recommendations = Recommendations::from_metrics(metrics);
    let mut artifacts = Vec::new();

    for format in formats {
        match format {
            Format::Json => {
                artifacts.push(Artifact {
                    file_name: "summary.json".into(),
                    contents: render_json(metrics, &recommendations, ctx)?,
                });
                for (file_name, records) in [
                    ("license_gaps_enterprise_only.json", &result.left_only),
                    ("license_gaps_copilot_only.json", &result.right_only),
                    ("license_overlaps_both.json", &result.both),
                ] {
                    artifacts.push(Artifact {
                        file_name: file_name.into(),
                        contents: serde_json::to_string_pretty(records)?,
                    });
                }
            }
            Format::Csv => artifacts.push(Artifact {
                file_name: "summary.csv".into(),
                contents: render_csv(result)?,
            }),
            Format::Markdown => artifacts.push(Artifact {
                file_name: "summary.md".into(),
                contents: render_markdown(result, metrics, &recommendations, ctx),
            }),
        }
    }

    Ok(artifacts)
}

pub fn write_artifacts(dir: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let path = dir.join(&artifact.file_name);
        fs::write(&path, &artifact.contents)?;
        written.push(path);
    }
    Ok(written)
}

fn render_json(metrics: &Metrics, recommendations: &Recommendations, ctx: &RunContext) -> Result<String> {
    let summary = Summary {
        generated_at: ctx.generated_at(),
        enterprise: &ctx.enterprise,
        data_complete: ctx.data_complete(),
        partial_sources: &ctx.partial_sources,
        dropped_records: ctx.dropped_records,
        analysis: metrics,
        recommendations,
    };
    Ok(serde_json::to_string_pretty(&summary)?)
}

fn render_csv(result: &ReconciliationResult) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    let buckets: [(&'static str, &[Record], &'static str); 3] = [
        ("left_only", &result.left_only, ASSIGN_SEAT),
        ("both", &result.both, FULLY_LICENSED),
        ("right_only", &result.right_only, REVIEW_SEAT),
    ];
    for (category, records, recommendation) in buckets {
        for record in records {
            writer.serialize(csv_row(category, record, recommendation))?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| GhReportError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| GhReportError::Csv(e.to_string()))
}

fn csv_row<'a>(category: &'static str, record: &'a Record, recommendation: &'static str) -> CsvRow<'a> {
    let created = record.source_created_at.map(|dt| date(&dt));
    let (enterprise_created_at, copilot_created_at) = match record.origin {
        Origin::Enterprise => (created, None),
        Origin::Copilot => (None, created),
    };
    CsvRow {
        category,
        login: &record.key,
        name: record.display_name.as_deref(),
        enterprise_created_at,
        copilot_created_at,
        last_activity_at: record.last_activity_at.map(|dt| date(&dt)),
        recommendation,
    }
}

fn date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

fn render_markdown(
    result: &ReconciliationResult,
    metrics: &Metrics,
    recommendations: &Recommendations,
    ctx: &RunContext,
) -> String {
    let mut md = format!(
        "# License Gap Report: {}\n\nGenerated at {}\n\n",
        ctx.enterprise,
        ctx.generated_at()
    );

    if !ctx.data_complete() {
        md.push_str(&format!(
            "> **Warning:** based on incomplete data. Pagination stopped early for: {}\n\n",
            ctx.partial_sources.join(", ")
        ));
    }
    if ctx.dropped_records > 0 {
        md.push_str(&format!(
            "> {} record(s) without a login were skipped.\n\n",
            ctx.dropped_records
        ));
    }

    md.push_str("## Summary\n\n| Metric | Value |\n|---|---|\n");
    for (label, value) in summary_rows(metrics) {
        md.push_str(&format!("| {label} | {value} |\n"));
    }

    md.push_str("\n## Recommendations\n\n");
    md.push_str(&format!("- Priority: **{}**\n", recommendations.priority));
    md.push_str(&format!("- {}\n", recommendations.enterprise_only_action));
    md.push_str(&format!("- {}\n", recommendations.copilot_only_action));

    for (title, records) in [
        ("Enterprise users without Copilot", &result.left_only),
        ("Copilot seats without an enterprise license", &result.right_only),
    ] {
        if records.is_empty() {
            continue;
        }
        md.push_str(&format!("\n## {title} ({})\n\n", records.len()));
        md.push_str("| Login | Name |\n|---|---|\n");
        for record in records.iter() {
            md.push_str(&format!(
                "| {} | {} |\n",
                escape_cell(&record.key),
                escape_cell(record.display_name.as_deref().unwrap_or(""))
            ));
        }
    }

    md
}

/// Table cells cannot contain a bare `|` or a line break.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

/// Label/value pairs shared by the Markdown report and the terminal summary.
pub fn summary_rows(metrics: &Metrics) -> Vec<(&'static str, String)> {
    vec![
        ("Total enterprise users", metrics.total_enterprise_users.to_string()),
        ("Total Copilot users", metrics.total_copilot_users.to_string()),
        ("Enterprise only", metrics.enterprise_only_count.to_string()),
        ("Copilot only", metrics.copilot_only_count.to_string()),
        ("Both licenses", metrics.both_licenses_count.to_string()),
        (
            "License coverage",
            format!("{:.2}%", metrics.license_coverage_percentage),
        ),
        ("License gap", format!("{:.2}%", metrics.license_gap_percentage)),
    ]
}
