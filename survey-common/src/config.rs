//! Configuration loading
//!
//! Every setting resolves with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The resolved [`SurveyConfig`] is built once at startup and handed to the
//! components that need it.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_GITHUB_TOKEN: &str = "SURVEY_GITHUB_TOKEN";
pub const ENV_REPO_NAME: &str = "SURVEY_REPO_NAME";
pub const ENV_APP_URL: &str = "SURVEY_APP_URL";
pub const ENV_SQLITE_FILENAME: &str = "SQLITE_FILENAME";
pub const ENV_GITHUB_API_URL: &str = "SURVEY_GITHUB_API_URL";
pub const ENV_BIND_ADDR: &str = "SURVEY_BIND_ADDR";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "SURVEY_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "SURVEY_RETRY_BASE_DELAY_MS";
pub const ENV_COMMIT_MESSAGE: &str = "SURVEY_COMMIT_MESSAGE";

pub const DEFAULT_SQLITE_FILENAME: &str = "responses.db";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8501";
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_COMMIT_MESSAGE: &str = "Nuova risposta survey";

/// Settings as they appear in the TOML file (all optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub github_token: Option<String>,
    pub repo_name: Option<String>,
    pub app_url: Option<String>,
    pub sqlite_filename: Option<String>,
    pub github_api_url: Option<String>,
    pub bind_addr: Option<String>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub commit_message: Option<String>,
}

impl TomlConfig {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub github_token: Option<String>,
    pub repo_name: Option<String>,
    pub app_url: Option<String>,
    pub sqlite_filename: Option<String>,
    pub github_api_url: Option<String>,
    pub bind_addr: Option<String>,
}

/// Fully resolved configuration
#[derive(Clone)]
pub struct SurveyConfig {
    /// Access token for the document store service
    pub github_token: String,
    /// Target repository, `owner/name`
    pub repo_name: String,
    /// Public base URL of the app, used to build the survey link
    pub app_url: String,
    pub sqlite_filename: String,
    pub github_api_url: String,
    pub bind_addr: String,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub commit_message: String,
}

impl std::fmt::Debug for SurveyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurveyConfig")
            .field("github_token", &"<redacted>")
            .field("repo_name", &self.repo_name)
            .field("app_url", &self.app_url)
            .field("sqlite_filename", &self.sqlite_filename)
            .field("github_api_url", &self.github_api_url)
            .field("bind_addr", &self.bind_addr)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("commit_message", &self.commit_message)
            .finish()
    }
}

impl SurveyConfig {
    /// Resolve configuration from CLI overrides, environment and TOML.
    ///
    /// An explicitly named config file must exist; the default location is
    /// optional. All missing required keys are reported together.
    pub fn resolve(overrides: &ConfigOverrides, config_file: Option<&Path>) -> Result<Self> {
        let toml_config = match config_file {
            Some(path) => {
                let config = TomlConfig::load(path).map_err(|e| {
                    Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
                })?;
                info!("Loaded config file: {}", path.display());
                config
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    let config = TomlConfig::load(&path)?;
                    info!("Loaded config file: {}", path.display());
                    config
                }
                None => {
                    warn!("No config file found, using environment and defaults");
                    TomlConfig::default()
                }
            },
        };

        Self::from_sources(overrides, &toml_config)
    }

    /// Merge already-loaded sources (environment read here)
    pub fn from_sources(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let github_token = pick(&overrides.github_token, ENV_GITHUB_TOKEN, &toml_config.github_token);
        let repo_name = pick(&overrides.repo_name, ENV_REPO_NAME, &toml_config.repo_name);
        let app_url = pick(&overrides.app_url, ENV_APP_URL, &toml_config.app_url);

        let (github_token, repo_name, app_url) = match (github_token, repo_name, app_url) {
            (Some(token), Some(repo), Some(url)) => (token, repo, url),
            (token, repo, url) => {
                let missing: Vec<&str> = [
                    ("github_token", token.is_none()),
                    ("repo_name", repo.is_none()),
                    ("app_url", url.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(key, _)| *key)
                .collect();

                return Err(Error::Config(format!(
                    "Missing required settings: {} (set via environment {}, {}, {} or the TOML config file)",
                    missing.join(", "),
                    ENV_GITHUB_TOKEN,
                    ENV_REPO_NAME,
                    ENV_APP_URL
                )));
            }
        };

        if repo_name.split('/').filter(|part| !part.is_empty()).count() != 2 {
            return Err(Error::Config(format!(
                "repo_name must look like 'owner/repository', got '{}'",
                repo_name
            )));
        }

        Ok(Self {
            github_token,
            repo_name,
            app_url: app_url.trim_end_matches('/').to_string(),
            sqlite_filename: pick(&overrides.sqlite_filename, ENV_SQLITE_FILENAME, &toml_config.sqlite_filename)
                .unwrap_or_else(|| DEFAULT_SQLITE_FILENAME.to_string()),
            github_api_url: pick(&overrides.github_api_url, ENV_GITHUB_API_URL, &toml_config.github_api_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            bind_addr: pick(&overrides.bind_addr, ENV_BIND_ADDR, &toml_config.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            retry_max_attempts: pick_parsed(ENV_RETRY_MAX_ATTEMPTS, toml_config.retry_max_attempts)?
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS)
                .max(1),
            retry_base_delay_ms: pick_parsed(ENV_RETRY_BASE_DELAY_MS, toml_config.retry_base_delay_ms)?
                .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            commit_message: pick(&None, ENV_COMMIT_MESSAGE, &toml_config.commit_message)
                .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
        })
    }

    /// SQLite file location; relative names live in the working directory
    pub fn database_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.sqlite_filename);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    }
}

/// `<config_dir>/survey/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("survey").join("config.toml"))
}

fn pick(cli: &Option<String>, env_name: &str, toml_value: &Option<String>) -> Option<String> {
    cli.clone()
        .or_else(|| std::env::var(env_name).ok())
        .or_else(|| toml_value.clone())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pick_parsed<T: std::str::FromStr>(env_name: &str, toml_value: Option<T>) -> Result<Option<T>> {
    match std::env::var(env_name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", env_name, raw))),
        Err(_) => Ok(toml_value),
    }
}
