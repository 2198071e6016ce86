mod commands;
mod config;
mod display;
mod error;
mod github;
mod recon;

use clap::{Parser, Subcommand};
use commands::compare::CompareArgs;
use commands::inactive::InactiveArgs;
use commands::owners::OwnersArgs;
use commands::secrets::SecretsArgs;
use commands::teams::TeamsArgs;
use commands::usage::UsageArgs;

#[derive(Parser)]
#[command(
    name = "ghreport",
    version,
    about = "Reports on GitHub enterprise licensing, Copilot seats and organization activity"
)]
pub struct Cli {
    /// Show verbose output (request logs, rate limits)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with a GitHub personal access token
    Auth {
        /// Token to use (if omitted, prompts interactively)
        #[arg(long)]
        token: Option<String>,
    },
    /// Compare enterprise license holders with Copilot seat holders
    Compare(CompareArgs),
    /// List Copilot seats with no recent activity
    Inactive(InactiveArgs),
    /// Count recent commits per repository in an organization
    Commits {
        /// Organization to scan
        #[arg(long)]
        org: String,
        /// Count commits from the last N days
        #[arg(long, default_value = "90")]
        days: i64,
        /// Output results as JSON
        #[arg(long)]
        json: bool,
        /// Delay between page requests in milliseconds
        #[arg(long)]
        sleep_ms: Option<u64>,
    },
    /// Back up organization owners to a JSON file, or restore them from one
    Owners(OwnersArgs),
    /// List the daily Copilot usage exports of an enterprise
    Usage(UsageArgs),
    /// Triage open secret scanning alerts in an organization
    Secrets(SecretsArgs),
    /// List the teams of an organization and their members
    Teams(TeamsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    display::init_logging(cli.verbose);

    let result = match &cli.command {
        Commands::Auth { token } => commands::auth::run(token).await,
        Commands::Compare(args) => commands::compare::run(args, cli.verbose).await,
        Commands::Inactive(args) => commands::inactive::run(args, cli.verbose).await,
        Commands::Commits {
            org,
            days,
            json,
            sleep_ms,
        } => commands::commits::run(org, *days, *json, *sleep_ms, cli.verbose).await,
        Commands::Owners(args) => commands::owners::run(args, cli.verbose).await,
        Commands::Usage(args) => commands::usage::run(args, cli.verbose).await,
        Commands::Secrets(args) => commands::secrets::run(args, cli.verbose).await,
        Commands::Teams(args) => commands::teams::run(args, cli.verbose).await,
    };

    if let Err(e) = result {
        display::error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}
