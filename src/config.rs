use crate::error::{GhReportError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::process::Command;

pub const DEFAULT_OUT_DIR: &str = "license-reports";
pub const DEFAULT_SLEEP_MS: u64 = 100;
pub const DEFAULT_PER_PAGE: u32 = 100;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct DefaultsConfig {
    pub out_dir: Option<PathBuf>,
    pub sleep_ms: Option<u64>,
    pub per_page: Option<u32>,
    /// REST root for GitHub Enterprise Server, e.g. `https://ghe.example.com/api/v3`.
    pub api_url: Option<String>,
}

impl Config {
    pub fn token(&self) -> Result<&str> {
        self.auth
            .token
            .as_deref()
            .ok_or(GhReportError::NotAuthenticated)
    }

    /// Token from the config file, then the environment, then the `gh` credential helper.
    pub fn resolve_token(&self) -> Result<String> {
        if let Ok(token) = self.token() {
            return Ok(token.to_string());
        }
        for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    return Ok(value.trim().to_string());
                }
            }
        }
        gh_cli_token().ok_or(GhReportError::NotAuthenticated)
    }

    pub fn out_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.defaults.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR))
    }

    pub fn sleep_ms(&self, flag: Option<u64>) -> u64 {
        flag.or(self.defaults.sleep_ms).unwrap_or(DEFAULT_SLEEP_MS)
    }

    pub fn api_url(&self) -> Option<String> {
        std::env::var("GITHUB_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.defaults.api_url.clone())
    }

    pub fn per_page(&self, flag: Option<u32>) -> Result<u32> {
        let per_page = flag.or(self.defaults.per_page).unwrap_or(DEFAULT_PER_PAGE);
        if !(1..=100).contains(&per_page) {
            return Err(GhReportError::Usage(format!(
                "per_page must be between 1 and 100, got {per_page}"
            )));
        }
        Ok(per_page)
    }
}

fn gh_cli_token() -> Option<String> {
    let output = Command::new("gh").args(["auth", "token"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8(output.stdout).ok()?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        tracing::debug!("using token from `gh auth token`");
        Some(token.to_string())
    }
}

pub fn config_path() -> Result<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg).join("ghreport").join("config.toml");
        return Ok(path);
    }

    let home = dirs::home_dir()
        .ok_or_else(|| GhReportError::Config("Cannot find home directory".into()))?;
    Ok(home.join(".config").join("ghreport").join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    fs::write(&path, &contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&path, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let config = Config {
            auth: AuthConfig {
                token: Some("ghp_test123".to_string()),
            },
            defaults: DefaultsConfig {
                out_dir: Some(PathBuf::from("reports")),
                sleep_ms: Some(250),
                per_page: Some(50),
                api_url: None,
            },
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.auth.token.as_deref(), Some("ghp_test123"));
        assert_eq!(deserialized.defaults.out_dir, Some(PathBuf::from("reports")));
        assert_eq!(deserialized.defaults.sleep_ms, Some(250));
        assert_eq!(deserialized.defaults.per_page, Some(50));
    }

    #[test]
    fn config_default_has_no_token() {
        let config = Config::default();
        assert!(config.token().is_err());
    }

    #[test]
    fn config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.auth.token.is_none());
        assert!(config.defaults.out_dir.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [defaults]
            out_dir = "from-config"
            sleep_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.out_dir(None), PathBuf::from("from-config"));
        assert_eq!(config.out_dir(Some("cli".into())), PathBuf::from("cli"));
        assert_eq!(config.sleep_ms(None), 500);
        assert_eq!(config.sleep_ms(Some(0)), 0);
        assert_eq!(Config::default().sleep_ms(None), DEFAULT_SLEEP_MS);
        assert_eq!(Config::default().out_dir(None), PathBuf::from(DEFAULT_OUT_DIR));
    }

    #[test]
    fn per_page_is_bounded() {
        let config = Config::default();
        assert_eq!(config.per_page(None).unwrap(), 100);
        assert_eq!(config.per_page(Some(30)).unwrap(), 30);
        assert!(config.per_page(Some(0)).is_err());
        assert!(config.per_page(Some(101)).is_err());
    }

    #[test]
    fn config_path_uses_xdg() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test_xdg");
        let path = config_path().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/test_xdg/ghreport/config.toml"));
        std::env::remove_var("XDG_CONFIG_HOME");
    }
}
