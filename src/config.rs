//! Configuration loader and validator for the timesheet importer.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::ActivityOption;
use crate::reconcile::ReconcileOptions;
use crate::redmine::MAX_PAGE_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub redmine: Redmine,
    pub page: Page,
    #[serde(default)]
    pub reconcile: Reconcile,
    #[serde(default)]
    pub submit: Submit,
}

/// Redmine server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redmine {
    pub base_url: String,
    /// Browser session cookie, needed to read `/my/api_key`.
    #[serde(default)]
    pub session_cookie: Option<String>,
    /// Known API key; when set `/my/api_key` is never requested.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// The time entry page the import runs against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub path: String,
    #[serde(default)]
    pub user_id: Option<u64>,
    /// Saved HTML of the page; takes precedence over `user_id` and `activities`.
    #[serde(default)]
    pub html_file: Option<PathBuf>,
    #[serde(default)]
    pub activities: Vec<ActivityOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reconcile {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Submit {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_pages() -> u32 {
    10
}

fn default_concurrency() -> usize {
    1
}

impl Default for Reconcile {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for Submit {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Reconcile {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.redmine.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("redmine.base_url must be non-empty"));
    }
    if Url::parse(cfg.redmine.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("redmine.base_url must be a valid URL"));
    }
    if let Some(key) = &cfg.redmine.api_key {
        if key.trim().is_empty() {
            return Err(ConfigError::Invalid("redmine.api_key must be non-empty when set"));
        }
    }
    if cfg.redmine.api_key.is_none() && cfg.redmine.session_cookie.is_none() {
        return Err(ConfigError::Invalid(
            "one of redmine.api_key or redmine.session_cookie is required",
        ));
    }

    if !cfg.page.path.contains("projects/") {
        return Err(ConfigError::Invalid("page.path must contain projects/<identifier>"));
    }
    if cfg.page.html_file.is_none() {
        if cfg.page.user_id.is_none() {
            return Err(ConfigError::Invalid("page.user_id is required without page.html_file"));
        }
        if cfg.page.activities.is_empty() {
            return Err(ConfigError::Invalid(
                "page.activities must be non-empty without page.html_file",
            ));
        }
    }
    if cfg.page.activities.iter().any(|a| a.name.trim().is_empty()) {
        return Err(ConfigError::Invalid("page.activities names must be non-empty"));
    }

    if cfg.reconcile.page_size == 0 || cfg.reconcile.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Invalid("reconcile.page_size must be within 1..=100"));
    }
    if cfg.reconcile.max_pages == 0 {
        return Err(ConfigError::Invalid("reconcile.max_pages must be > 0"));
    }
    if cfg.submit.concurrency == 0 {
        return Err(ConfigError::Invalid("submit.concurrency must be > 0"));
    }

    Ok(())
}

/// Returns an example YAML configuration.
pub fn example() -> &'static str {
    r#"redmine:
  base_url: "https://redmine.example.com/"
  session_cookie: "_redmine_session=YOUR_SESSION_COOKIE"

page:
  path: "/projects/acme/time_entries/new"
  user_id: 17
  activities:
    - { name: "Development", id: 9 }
    - { name: "Meeting", id: 10 }

reconcile:
  page_size: 100
  max_pages: 10

submit:
  concurrency: 1
"#
}
