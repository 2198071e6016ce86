use crate::commands::{connect, require_name};
use crate::config::load_config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchSpec, Fetcher};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct RepoCommits {
    pub repo: String,
    pub commits: usize,
    /// False when the listing failed or stopped early; `commits` is then a lower bound.
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct CommitReport {
    pub org: String,
    pub since: String,
    pub total_commits: usize,
    pub repos: Vec<RepoCommits>,
}

pub async fn run(
    org: &str,
    days: i64,
    json: bool,
    sleep_ms: Option<u64>,
    verbose: bool,
) -> Result<()> {
    let org = require_name("--org", org)?;
    let since = since_timestamp(Utc::now(), days)?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let delay = Duration::from_millis(config.sleep_ms(sleep_ms));
    let fetcher = Fetcher::new(&client, config.per_page(None)?, delay);

    let repos = client.list_org_repos(&org).await?;
    let mut counts = Vec::new();
    for repo in repos.iter().filter(|r| !r.archived.unwrap_or(false)) {
        let spec = FetchSpec::new(
            format!("commits of {org}/{}", repo.name),
            format!("/repos/{org}/{}/commits", repo.name),
        )
        .query("since", since.clone())
        .optional();

        let outcome = fetcher.fetch_all(&spec).await?;
        if let Some(failure) = &outcome.failure {
            display::warn(&format!("{}: {failure}", spec.resource));
        }
        counts.push(RepoCommits {
            repo: repo.name.clone(),
            commits: outcome.items.len(),
            complete: !outcome.partial,
        });
    }

    sort_counts(&mut counts);
    let report = CommitReport {
        total_commits: counts.iter().map(|c| c.commits).sum(),
        org,
        since,
        repos: counts,
    };

    display::output(json, &report, render_report);

    client.check_rate_limit_if_verbose().await;

    Ok(())
}

fn since_timestamp(now: DateTime<Utc>, days: i64) -> Result<String> {
    if days < 0 {
        return Err(GhReportError::Usage(format!("--days must not be negative, got {days}")));
    }
    chrono::Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .map(|since| since.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| {
            GhReportError::Usage(format!("--days {days} reaches past the earliest supported date"))
        })
}

fn sort_counts(counts: &mut [RepoCommits]) {
    counts.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.repo.cmp(&b.repo)));
}

fn render_report(report: &CommitReport) {
    if report.repos.is_empty() {
        display::warn(&format!("No active repositories found in {}.", report.org));
        return;
    }

    display::section_header(&format!("Commits in {} since {}", report.org, report.since));

    let mut table = display::new_table(&["Repository", "Commits"]);
    for r in &report.repos {
        let commits = if r.complete {
            r.commits.to_string()
        } else {
            format!("≥{}", r.commits)
        };
        table.add_row(vec![r.repo.clone(), commits]);
    }
    println!("{table}");
    println!(
        "\n{} commit(s) across {} repository(ies).",
        report.total_commits,
        report.repos.len()
    );
}
