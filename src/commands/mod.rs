pub mod auth;
pub mod commits;
pub mod compare;
pub mod inactive;
pub mod owners;
pub mod secrets;
pub mod teams;
pub mod usage;

use crate::config::Config;
use crate::display;
use crate::error::{GhReportError, Result};
use crate::github::{FetchSpec, GithubClient};
use crate::recon::DroppedRecord;
use clap::Args;

pub fn connect(config: &Config, verbose: bool) -> Result<GithubClient> {
    let token = config.resolve_token()?;
    GithubClient::new(&token, config.api_url().as_deref(), verbose)
}

/// Where Copilot seats are billed.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatScope {
    Org(String),
    Enterprise(String),
}

impl SeatScope {
    pub fn name(&self) -> &str {
        match self {
            SeatScope::Org(name) | SeatScope::Enterprise(name) => name,
        }
    }

    pub fn copilot_seats(&self) -> FetchSpec {
        let route = match self {
            SeatScope::Org(org) => format!("/orgs/{org}/copilot/billing/seats"),
            SeatScope::Enterprise(ent) => format!("/enterprises/{ent}/copilot/billing/seats"),
        };
        FetchSpec::new("copilot seats", route).items_field("seats")
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SeatTarget {
    /// Organization whose Copilot seats to read
    #[arg(long)]
    pub org: Option<String>,
    /// Enterprise whose Copilot seats to read
    #[arg(long)]
    pub enterprise: Option<String>,
}

impl SeatTarget {
    pub fn scope(&self) -> Result<SeatScope> {
        match (&self.org, &self.enterprise) {
            (Some(org), None) => Ok(SeatScope::Org(require_name("--org", org)?)),
            (None, Some(ent)) => Ok(SeatScope::Enterprise(require_name("--enterprise", ent)?)),
            _ => Err(GhReportError::Usage(
                "exactly one of --org or --enterprise is required".into(),
            )),
        }
    }
}

/// Trimmed, non-empty identifier from a command-line flag.
pub fn require_name(flag: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GhReportError::Usage(format!("{flag} must not be empty")));
    }
    Ok(value.to_string())
}

/// Log every record normalization skipped and return how many there were.
pub fn report_dropped(resource: &str, dropped: &[DroppedRecord]) -> usize {
    for record in dropped {
        tracing::warn!(resource, index = record.index, "skipped record: {}", record.reason);
    }
    if !dropped.is_empty() {
        display::warn(&format!(
            "Skipped {} {resource} record(s) without a login",
            dropped.len()
        ));
    }
    dropped.len()
}
