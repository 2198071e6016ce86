use crate::commands::{connect, require_name};
use crate::config::load_config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchSpec, Fetcher, GithubClient};
use chrono::{SecondsFormat, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct OwnersArgs {
    /// Organization to back up or restore into
    #[arg(long)]
    pub org: String,
    /// Backup file (default: <org>_owners_backup.json)
    #[arg(long, conflicts_with = "restore")]
    pub out: Option<PathBuf>,
    /// Grant the owner role to everyone listed in this backup file
    #[arg(long, value_name = "FILE")]
    pub restore: Option<PathBuf>,
    /// Show which owners a restore would re-grant without changing anything
    #[arg(long, requires = "restore")]
    pub dry_run: bool,
    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnersBackup {
    pub org: String,
    pub generated_at: String,
    pub owners: Vec<Owner>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreFailure {
    pub login: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreReport {
    pub org: String,
    pub dry_run: bool,
    /// Listed in the backup and already an owner.
    pub already_owners: Vec<String>,
    /// Listed in the backup but not currently an owner.
    pub pending: Vec<String>,
    pub restored: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

pub async fn run(args: &OwnersArgs, verbose: bool) -> Result<()> {
    let org = require_name("--org", &args.org)?;
    let config = load_config()?;
    let client = connect(&config, verbose)?;

    let fetcher = Fetcher::new(
        &client,
        config.per_page(None)?,
        Duration::from_millis(config.sleep_ms(None)),
    );
    let outcome = fetcher.fetch_all(&owners_spec(&org)).await?;
    let current = parse_owners(outcome.items)?;

    let result = match &args.restore {
        Some(file) => {
            if outcome.partial {
                return Err(GhReportError::Fetch {
                    resource: format!("owners of {org}"),
                    reason: "listing stopped early, refusing to restore from partial data".into(),
                });
            }
            restore(&client, org, file, &current, args).await
        }
        None => {
            if outcome.partial {
                display::warn("Owner listing stopped early; the backup is incomplete");
            }
            backup(org, current, args)
        }
    };

    client.check_rate_limit_if_verbose().await;

    result
}

fn owners_spec(org: &str) -> FetchSpec {
    FetchSpec::new("organization owners", format!("/orgs/{org}/members")).query("role", "admin")
}

fn backup(org: String, owners: Vec<Owner>, args: &OwnersArgs) -> Result<()> {
    let backup = OwnersBackup {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        owners,
        org,
    };

    let path = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}_owners_backup.json", backup.org)));
    fs::write(&path, serde_json::to_string_pretty(&backup)?)?;

    display::output(args.json, &backup, |data| {
        render_backup(data);
        display::success(&format!("Backup written to {}", path.display()));
    });
    Ok(())
}

async fn restore(
    client: &GithubClient,
    org: String,
    file: &Path,
    current: &[Owner],
    args: &OwnersArgs,
) -> Result<()> {
    let saved = read_backup(file)?;
    if saved.org != org {
        display::warn(&format!(
            "{} was taken from {}, restoring into {org}",
            file.display(),
            saved.org
        ));
    }

    let mut report = plan_restore(org, &saved.owners, current, args.dry_run);
    if !args.dry_run {
        apply_restore(client, &mut report).await;
    }

    display::output(args.json, &report, render_restore);

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(GhReportError::RestoreIncomplete {
            failed: report.failed.len(),
            total: report.pending.len(),
        })
    }
}

fn read_backup(file: &Path) -> Result<OwnersBackup> {
    let content = fs::read_to_string(file).map_err(|e| {
        GhReportError::Usage(format!("Cannot read backup {}: {e}", file.display()))
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Split the backed-up owners into those who still hold the role and those who lost it.
pub fn plan_restore(
    org: String,
    saved: &[Owner],
    current: &[Owner],
    dry_run: bool,
) -> RestoreReport {
    let is_owner = |login: &str| current.iter().any(|o| o.login.eq_ignore_ascii_case(login));

    let mut logins: Vec<String> = saved.iter().map(|o| o.login.clone()).collect();
    logins.sort_by_key(|login| login.to_lowercase());
    logins.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

    let (already_owners, pending): (Vec<String>, Vec<String>) =
        logins.into_iter().partition(|login| is_owner(login));
    RestoreReport {
        org,
        dry_run,
        already_owners,
        pending,
        restored: Vec::new(),
        failed: Vec::new(),
    }
}

/// Re-grant the owner role to every pending login, one request at a time.
/// A failure is recorded and the remaining logins are still attempted.
async fn apply_restore(client: &GithubClient, report: &mut RestoreReport) {
    for login in &report.pending {
        match client.set_org_membership(&report.org, login, "admin").await {
            Ok(_) => report.restored.push(login.clone()),
            Err(err) => {
                tracing::warn!(
                    org = %report.org,
                    login = %login,
                    status = ?err.status,
                    "owner restore failed: {}",
                    err.message
                );
                report.failed.push(RestoreFailure {
                    login: login.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

fn parse_owners(items: Vec<Value>) -> Result<Vec<Owner>> {
    let mut owners = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<Owner>, _>>()?;
    owners.sort_by(|a, b| a.login.cmp(&b.login));
    Ok(owners)
}

fn render_backup(backup: &OwnersBackup) {
    if backup.owners.is_empty() {
        display::warn(&format!("No owners found for {}.", backup.org));
        return;
    }

    display::section_header(&format!("Owners of {}", backup.org));
    let mut table = display::new_table(&["Login", "ID"]);
    for owner in &backup.owners {
        table.add_row(vec![owner.login.clone(), owner.id.to_string()]);
    }
    println!("{table}");
    println!("\n{} owner(s) found.", backup.owners.len());
}

fn render_restore(report: &RestoreReport) {
    let title = if report.dry_run {
        format!("Owner restore plan for {} (dry run)", report.org)
    } else {
        format!("Owner restore for {}", report.org)
    };
    display::section_header(&title);

    if report.pending.is_empty() {
        display::success(&format!(
            "All {} owner(s) in the backup already hold the role.",
            report.already_owners.len()
        ));
        return;
    }

    let mut table = display::new_table(&["Login", "Result"]);
    for login in &report.pending {
        let result = if report.dry_run {
            "would restore".to_string()
        } else if report.restored.contains(login) {
            "restored".to_string()
        } else {
            report
                .failed
                .iter()
                .find(|f| &f.login == login)
                .map(|f| format!("failed: {}", f.reason))
                .unwrap_or_default()
        };
        table.add_row(vec![login.clone(), result]);
    }
    println!("{table}");
    println!(
        "\n{} already owner(s), {} to restore, {} restored, {} failed.",
        report.already_owners.len(),
        report.pending.len(),
        report.restored.len(),
        report.failed.len()
    );
}
