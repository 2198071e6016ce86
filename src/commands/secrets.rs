use crate::commands::{connect, require_name};
use crate::config::load_config;
use crate::display;
use crate::error::Result;
use crate::github::{FetchSpec, Fetcher};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct SecretsArgs {
    /// Organization whose secret scanning alerts to triage
    #[arg(long)]
    pub org: String,
    /// Alert state to fetch
    #[arg(long, value_enum, default_value_t = AlertState::Open)]
    pub state: AlertState,
    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
    /// Delay between page requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlertState {
    Open,
    Resolved,
}

impl AlertState {
    fn as_str(self) -> &'static str {
        match self {
            AlertState::Open => "open",
            AlertState::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AgeBucket {
    #[serde(rename = "<7d")]
    UnderWeek,
    #[serde(rename = "7-30d")]
    UnderMonth,
    #[serde(rename = "30-90d")]
    UnderQuarter,
    #[serde(rename = ">90d")]
    Older,
}

impl AgeBucket {
    fn for_days(days: i64) -> Self {
        match days {
            d if d < 7 => AgeBucket::UnderWeek,
            d if d < 30 => AgeBucket::UnderMonth,
            d if d < 90 => AgeBucket::UnderQuarter,
            _ => AgeBucket::Older,
        }
    }

    fn label(self) -> &'static str {
        match self {
            AgeBucket::UnderWeek => "<7d",
            AgeBucket::UnderMonth => "7-30d",
            AgeBucket::UnderQuarter => "30-90d",
            AgeBucket::Older => ">90d",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    number: u64,
    created_at: DateTime<Utc>,
    secret_type: String,
    #[serde(default)]
    secret_type_display_name: Option<String>,
    #[serde(default)]
    validity: Option<String>,
    #[serde(default)]
    push_protection_bypassed: Option<bool>,
    #[serde(default)]
    html_url: Option<String>,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    full_name: String,
}

#[derive(Debug, Serialize)]
pub struct TriagedAlert {
    pub number: u64,
    pub repository: String,
    pub secret_type: String,
    /// `active`, `inactive` or `unknown` as reported by the validity check.
    pub validity: String,
    pub push_protection_bypassed: bool,
    pub age_days: i64,
    pub age: AgeBucket,
    pub priority: Priority,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Count {
    pub name: String,
    pub alerts: usize,
}

#[derive(Debug, Serialize)]
pub struct SecretTriage {
    pub org: String,
    pub state: &'static str,
    pub total_alerts: usize,
    pub active_secrets: usize,
    pub push_protection_bypassed: usize,
    pub by_age: BTreeMap<AgeBucket, usize>,
    pub by_secret_type: Vec<Count>,
    pub by_repository: Vec<Count>,
    pub data_complete: bool,
    pub alerts: Vec<TriagedAlert>,
}

pub async fn run(args: &SecretsArgs, verbose: bool) -> Result<()> {
    let org = require_name("--org", &args.org)?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    client.warn_if_rate_limited().await;

    let spec = FetchSpec::new(
        "secret scanning alerts",
        format!("/orgs/{org}/secret-scanning/alerts"),
    )
    .query("state", args.state.as_str());
    let fetcher = Fetcher::new(
        &client,
        config.per_page(None)?,
        Duration::from_millis(config.sleep_ms(args.sleep_ms)),
    );
    let outcome = fetcher.fetch_all(&spec).await?;
    if outcome.partial {
        display::warn(&format!(
            "Alert listing for {org} stopped after {} page(s); results are incomplete",
            outcome.pages
        ));
    }

    let report = triage(org, args.state, outcome.items, Utc::now(), !outcome.partial)?;
    display::output(args.json, &report, render_report);

    client.check_rate_limit_if_verbose().await;

    Ok(())
}

/// Rank alerts: a secret the validity check still reports as live comes first,
/// then secrets pushed past push protection, then everything else. Within a
/// priority the oldest alert comes first.
pub fn triage(
    org: String,
    state: AlertState,
    items: Vec<Value>,
    now: DateTime<Utc>,
    data_complete: bool,
) -> Result<SecretTriage> {
    let raw = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<RawAlert>, _>>()?;

    let mut alerts: Vec<TriagedAlert> = raw
        .into_iter()
        .map(|alert| {
            let validity = alert.validity.unwrap_or_else(|| "unknown".into());
            let bypassed = alert.push_protection_bypassed.unwrap_or(false);
            let age_days = (now - alert.created_at).num_days().max(0);
            let priority = if validity == "active" {
                Priority::High
            } else if bypassed {
                Priority::Medium
            } else {
                Priority::Low
            };
            TriagedAlert {
                number: alert.number,
                repository: alert.repository.full_name,
                secret_type: alert.secret_type_display_name.unwrap_or(alert.secret_type),
                validity,
                push_protection_bypassed: bypassed,
                age_days,
                age: AgeBucket::for_days(age_days),
                priority,
                url: alert.html_url,
            }
        })
        .collect();
    alerts.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.age_days.cmp(&a.age_days))
            .then_with(|| a.number.cmp(&b.number))
    });

    let mut by_age = BTreeMap::new();
    for alert in &alerts {
        *by_age.entry(alert.age).or_insert(0) += 1;
    }

    Ok(SecretTriage {
        org,
        state: state.as_str(),
        total_alerts: alerts.len(),
        active_secrets: alerts.iter().filter(|a| a.priority == Priority::High).count(),
        push_protection_bypassed: alerts.iter().filter(|a| a.push_protection_bypassed).count(),
        by_age,
        by_secret_type: tally(alerts.iter().map(|a| a.secret_type.as_str())),
        by_repository: tally(alerts.iter().map(|a| a.repository.as_str())),
        data_complete,
        alerts,
    })
}

/// Occurrences per name, most frequent first.
fn tally<'a>(names: impl Iterator<Item = &'a str>) -> Vec<Count> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
    let mut counts: Vec<Count> = counts
        .into_iter()
        .map(|(name, alerts)| Count {
            name: name.to_string(),
            alerts,
        })
        .collect();
    counts.sort_by(|a, b| b.alerts.cmp(&a.alerts));
    counts
}

fn render_report(report: &SecretTriage) {
    if report.total_alerts == 0 {
        display::success(&format!(
            "No {} secret scanning alerts in {}.",
            report.state, report.org
        ));
        return;
    }

    display::section_header(&format!("Secret scanning alerts: {}", report.org));
    let mut table = display::new_table(&[
        "#",
        "Priority",
        "Repository",
        "Secret Type",
        "Validity",
        "Bypassed",
        "Age",
    ]);
    for a in &report.alerts {
        table.add_row(vec![
            a.number.to_string(),
            format!("{:?}", a.priority).to_lowercase(),
            a.repository.clone(),
            a.secret_type.clone(),
            a.validity.clone(),
            (if a.push_protection_bypassed { "yes" } else { "" }).to_string(),
            format!("{}d", a.age_days),
        ]);
    }
    println!("{table}");

    let ages: Vec<String> = report
        .by_age
        .iter()
        .map(|(bucket, n)| format!("{} {n}", bucket.label()))
        .collect();
    println!(
        "\n{} alert(s): {} with a live secret, {} bypassed push protection. Age: {}.",
        report.total_alerts,
        report.active_secrets,
        report.push_protection_bypassed,
        ages.join(", ")
    );

    let mut repos = display::new_table(&["Repository", "Alerts"]);
    for count in report.by_repository.iter().take(10) {
        repos.add_row(vec![count.name.clone(), count.alerts.to_string()]);
    }
    println!("{repos}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap()
    }

    fn alert(number: u64, repo: &str, days_old: i64, validity: &str, bypassed: bool) -> Value {
        json!({
            "number": number,
            "created_at": (now() - chrono::Duration::days(days_old)).to_rfc3339(),
            "state": "open",
            "secret_type": "github_personal_access_token",
            "secret_type_display_name": "GitHub Personal Access Token",
            "validity": validity,
            "push_protection_bypassed": bypassed,
            "html_url": format!("https://github.com/{repo}/security/secret-scanning/{number}"),
            "repository": { "full_name": repo }
        })
    }

    #[test]
    fn live_secrets_then_bypasses_then_oldest() {
        let items = vec![
            alert(1, "acme/api", 3, "inactive", false),
            alert(2, "acme/web", 40, "unknown", true),
            alert(3, "acme/api", 10, "active", false),
            alert(4, "acme/api", 200, "inactive", false),
        ];
        let report = triage("acme".into(), AlertState::Open, items, now(), true).unwrap();

        let order: Vec<u64> = report.alerts.iter().map(|a| a.number).collect();
        assert_eq!(order, vec![3, 2, 4, 1]);
        assert_eq!(report.active_secrets, 1);
        assert_eq!(report.push_protection_bypassed, 1);
        assert_eq!(
            report.by_repository,
            vec![
                Count { name: "acme/api".into(), alerts: 3 },
                Count { name: "acme/web".into(), alerts: 1 },
            ]
        );
    }

    #[test]
    fn ages_fall_into_buckets() {
        let items = vec![
            alert(1, "acme/api", 0, "unknown", false),
            alert(2, "acme/api", 6, "unknown", false),
            alert(3, "acme/api", 7, "unknown", false),
            alert(4, "acme/api", 30, "unknown", false),
            alert(5, "acme/api", 89, "unknown", false),
            alert(6, "acme/api", 90, "unknown", false),
        ];
        let report = triage("acme".into(), AlertState::Open, items, now(), true).unwrap();

        assert_eq!(report.by_age.get(&AgeBucket::UnderWeek), Some(&2));
        assert_eq!(report.by_age.get(&AgeBucket::UnderMonth), Some(&1));
        assert_eq!(report.by_age.get(&AgeBucket::UnderQuarter), Some(&2));
        assert_eq!(report.by_age.get(&AgeBucket::Older), Some(&1));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["by_age"][">90d"], 1);
        assert_eq!(json["alerts"][0]["priority"], "low");
    }

    #[test]
    fn missing_validity_counts_as_unknown() {
        let mut item = alert(7, "acme/api", 1, "active", false);
        item.as_object_mut().unwrap().remove("validity");
        item["push_protection_bypassed"] = Value::Null;

        let report = triage("acme".into(), AlertState::Open, vec![item], now(), false).unwrap();
        assert_eq!(report.alerts[0].validity, "unknown");
        assert_eq!(report.alerts[0].priority, Priority::Low);
        assert!(!report.data_complete);
    }

    #[test]
    fn alert_without_repository_is_an_error() {
        let mut item = alert(8, "acme/api", 1, "active", false);
        item.as_object_mut().unwrap().remove("repository");
        assert!(triage("acme".into(), AlertState::Open, vec![item], now(), true).is_err());
    }
}
