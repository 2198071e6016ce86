use crate::commands::{connect, require_name};
use crate::config::load_config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchSpec, Fetcher};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct TeamsArgs {
    /// Organization whose teams to list
    #[arg(long)]
    pub org: String,
    /// Only this team (by slug)
    #[arg(long)]
    pub team: Option<String>,
    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
    /// Delay between page requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Team {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Member {
    login: String,
}

#[derive(Debug, Serialize)]
pub struct TeamMembers {
    pub slug: String,
    pub name: String,
    pub members: Vec<String>,
    /// False when the member listing failed or stopped early.
    pub complete: bool,
}

#[derive(Debug, Serialize)]
pub struct TeamsReport {
    pub org: String,
    pub team_count: usize,
    pub unique_members: usize,
    pub data_complete: bool,
    pub teams: Vec<TeamMembers>,
}

pub async fn run(args: &TeamsArgs, verbose: bool) -> Result<()> {
    let org = require_name("--org", &args.org)?;
    let only = args
        .team
        .as_deref()
        .map(|slug| require_name("--team", slug))
        .transpose()?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let fetcher = Fetcher::new(
        &client,
        config.per_page(None)?,
        Duration::from_millis(config.sleep_ms(args.sleep_ms)),
    );
    let listing = fetcher
        .fetch_all(&FetchSpec::new("teams", format!("/orgs/{org}/teams")))
        .await?;
    if listing.partial {
        display::warn("Team listing stopped early; some teams are missing");
    }
    let teams = select_teams(parse_items(listing.items)?, only.as_deref(), &org)?;

    let mut memberships = Vec::with_capacity(teams.len());
    for team in teams {
        let spec = FetchSpec::new(
            format!("members of {org}/{}", team.slug),
            format!("/orgs/{org}/teams/{}/members", team.slug),
        )
        .optional();
        let outcome = fetcher.fetch_all(&spec).await?;
        if let Some(failure) = &outcome.failure {
            display::warn(&format!("{}: {failure}", spec.resource));
        }
        let members: Vec<Member> = parse_items(outcome.items)?;
        memberships.push(TeamMembers {
            slug: team.slug,
            name: team.name,
            members: members.into_iter().map(|m| m.login).collect(),
            complete: !outcome.partial,
        });
    }

    let report = build_report(org, memberships, !listing.partial);
    display::output(args.json, &report, render_report);

    client.check_rate_limit_if_verbose().await;

    Ok(())
}

fn parse_items<T: serde::de::DeserializeOwned>(items: Vec<Value>) -> Result<Vec<T>> {
    Ok(items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<T>, _>>()?)
}

/// All teams, or just the one named by `--team`.
pub fn select_teams(teams: Vec<Team>, slug: Option<&str>, org: &str) -> Result<Vec<Team>> {
    let Some(slug) = slug else {
        return Ok(teams);
    };
    let selected: Vec<Team> = teams
        .into_iter()
        .filter(|t| t.slug.eq_ignore_ascii_case(slug))
        .collect();
    if selected.is_empty() {
        return Err(GhReportError::Usage(format!(
            "team `{slug}` not found in {org}"
        )));
    }
    Ok(selected)
}

pub fn build_report(
    org: String,
    mut teams: Vec<TeamMembers>,
    listing_complete: bool,
) -> TeamsReport {
    teams.sort_by(|a, b| a.slug.cmp(&b.slug));
    for team in &mut teams {
        team.members.sort_by_key(|login| login.to_lowercase());
    }

    let unique: BTreeSet<String> = teams
        .iter()
        .flat_map(|t| t.members.iter().map(|login| login.to_lowercase()))
        .collect();

    TeamsReport {
        org,
        team_count: teams.len(),
        unique_members: unique.len(),
        data_complete: listing_complete && teams.iter().all(|t| t.complete),
        teams,
    }
}

fn render_report(report: &TeamsReport) {
    if report.teams.is_empty() {
        display::warn(&format!("No teams found in {}.", report.org));
        return;
    }

    display::section_header(&format!("Teams in {}", report.org));
    let mut table = display::new_table(&["Team", "Slug", "Members", "Logins"]);
    for team in &report.teams {
        let count = if team.complete {
            team.members.len().to_string()
        } else {
            format!("≥{}", team.members.len())
        };
        table.add_row(vec![
            team.name.clone(),
            team.slug.clone(),
            count,
            team.members.join(", "),
        ]);
    }
    println!("{table}");
    println!(
        "\n{} team(s), {} unique member(s).",
        report.team_count, report.unique_members
    );
}
