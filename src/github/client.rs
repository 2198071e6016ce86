use crate::error::{GhReportError, Result};
use crate::github::fetch::{PageError, PageSource};
use octocrab::models::Repository;
use octocrab::Octocrab;
use serde::Deserialize;
use serde_json::Value;

pub struct GithubClient {
    octocrab: Octocrab,
    verbose: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitResource,
}

#[derive(Debug, Deserialize)]
pub struct RateLimitResource {
    pub limit: u64,
    pub remaining: u64,
    pub reset: i64,
}

impl GithubClient {
    pub fn new(token: &str, api_url: Option<&str>, verbose: bool) -> Result<Self> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(url) = api_url {
            builder = builder
                .base_uri(url)
                .map_err(|e| GhReportError::Config(format!("Invalid API URL {url}: {e}")))?;
        }
        let octocrab = builder
            .build()
            .map_err(|e| GhReportError::GitHub(e.to_string()))?;
        Ok(Self { octocrab, verbose })
    }

    pub async fn validate_token(&self) -> Result<AuthenticatedUser> {
        let user: AuthenticatedUser = self
            .octocrab
            .get("/user", None::<&()>)
            .await
            .map_err(|e| GhReportError::Auth {
                resource: "/user".into(),
                reason: page_error(e).to_string(),
            })?;
        Ok(user)
    }

    pub async fn get_rate_limit(&self) -> Result<RateLimit> {
        let rate_limit: RateLimit = self.octocrab.get("/rate_limit", None::<&()>).await?;
        Ok(rate_limit)
    }

    pub async fn check_rate_limit_if_verbose(&self) {
        if !self.verbose {
            return;
        }
        match self.get_rate_limit().await {
            Ok(rl) => {
                let core = &rl.resources.core;
                eprintln!(
                    "Rate limit: {}/{} remaining (resets at {})",
                    core.remaining,
                    core.limit,
                    format_reset(core.reset)
                );
            }
            Err(e) => eprintln!("Could not check rate limit: {e}"),
        }
    }

    pub async fn warn_if_rate_limited(&self) {
        let rl = match self.get_rate_limit().await {
            Ok(rl) => rl,
            Err(e) => {
                tracing::debug!(error = %e, "rate limit check failed");
                return;
            }
        };
        if rl.resources.core.remaining < 100 {
            crate::display::warn(&format!(
                "Only {} API calls remaining (resets at {})",
                rl.resources.core.remaining,
                format_reset(rl.resources.core.reset)
            ));
        }
    }

    /// `PUT /orgs/{org}/memberships/{login}` with the given role.
    pub async fn set_org_membership(
        &self,
        org: &str,
        login: &str,
        role: &str,
    ) -> std::result::Result<Value, PageError> {
        let route = format!("/orgs/{org}/memberships/{login}");
        tracing::debug!(%route, role, "updating membership");
        self.octocrab
            .put(route, Some(&serde_json::json!({ "role": role })))
            .await
            .map_err(page_error)
    }

    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<Repository>> {
        let mut all_repos = Vec::new();
        let mut page = 1u32;
        loop {
            let page_result = self
                .octocrab
                .orgs(org)
                .list_repos()
                .repo_type(octocrab::params::repos::Type::All)
                .per_page(100)
                .page(page)
                .send()
                .await
                .map_err(|e| GhReportError::Fetch {
                    resource: format!("repositories of {org}"),
                    reason: page_error(e).to_string(),
                })?;

            let items = page_result.items;
            if items.is_empty() {
                break;
            }
            all_repos.extend(items);
            if page_result.next.is_none() {
                break;
            }
            page += 1;
        }
        Ok(all_repos)
    }
}

impl PageSource for GithubClient {
    async fn fetch_page(
        &self,
        route: &str,
        query: &[(String, String)],
        page: u32,
        per_page: u32,
    ) -> std::result::Result<Value, PageError> {
        let mut params: Vec<(String, String)> = query.to_vec();
        params.push(("per_page".into(), per_page.to_string()));
        params.push(("page".into(), page.to_string()));

        self.octocrab
            .get(route, Some(&params))
            .await
            .map_err(page_error)
    }
}

fn page_error(err: octocrab::Error) -> PageError {
    match err {
        octocrab::Error::GitHub { source, .. } => PageError {
            status: Some(source.status_code.as_u16()),
            message: source.message.clone(),
        },
        other => PageError {
            status: None,
            message: other.to_string(),
        },
    }
}

fn format_reset(reset: i64) -> String {
    chrono::DateTime::from_timestamp(reset, 0)
        .map(|dt| dt.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| reset.to_string())
}
