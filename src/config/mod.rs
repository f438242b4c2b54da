//! Configuration loading for the Ship It admin client.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `SHIPIT_`, producing a typed [`AppConfig`].

pub mod products;

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::telemetry::LogFormat;

pub use products::{
    AlternativeBranch, BranchConfig, ProductCatalog, ProductConfig, ProductTarget, RcBranch,
    RepositoryConfig, XpiManifestConfig,
};

/// Application configuration derived from `SHIPIT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_api_url")]
    pub public_api_url: String,
    #[serde(default = "default_taskcluster_root_url")]
    pub taskcluster_root_url: String,
    #[serde(default = "default_hg_base_url")]
    pub hg_base_url: String,
    #[serde(default = "default_github_base_url")]
    pub github_base_url: String,
    #[serde(default = "default_github_raw_base_url")]
    pub github_raw_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_file: Option<PathBuf>,
    #[serde(default = "default_token_lead_time_seconds")]
    pub token_lead_time_seconds: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            api_url: default_api_url(),
            public_api_url: default_api_url(),
            taskcluster_root_url: default_taskcluster_root_url(),
            hg_base_url: default_hg_base_url(),
            github_base_url: default_github_base_url(),
            github_raw_base_url: default_github_raw_base_url(),
            access_token: None,
            access_token_file: None,
            token_lead_time_seconds: default_token_lead_time_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
            products_file: None,
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.access_token.is_some() {
            config.access_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Whether the profile is a developer profile with relaxed validation.
    pub fn is_local_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Loads the product catalog, preferring `products_file` over the built-in one.
    pub fn product_catalog(&self) -> Result<ProductCatalog, ConfigError> {
        let catalog = match &self.products_file {
            Some(path) => ProductCatalog::from_path(path)?,
            None => ProductCatalog::builtin()?,
        };
        catalog.validate(&self.vcs_prefixes())?;
        Ok(catalog)
    }

    /// URL prefixes identifying Mercurial and GitHub repositories.
    pub fn vcs_prefixes(&self) -> (String, String) {
        (
            format!("{}/", self.hg_base_url.trim_end_matches('/')),
            format!("{}/", self.github_base_url.trim_end_matches('/')),
        )
    }

    /// Validates the configuration, returning an error for unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let urls = [
            ("API_URL", &self.api_url),
            ("PUBLIC_API_URL", &self.public_api_url),
            ("TASKCLUSTER_ROOT_URL", &self.taskcluster_root_url),
            ("HG_BASE_URL", &self.hg_base_url),
            ("GITHUB_BASE_URL", &self.github_base_url),
            ("GITHUB_RAW_BASE_URL", &self.github_raw_base_url),
        ];

        for (field, value) in urls {
            let parsed = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                field: field.to_string(),
                value: value.clone(),
                source,
            })?;

            if !self.is_local_profile()
                && matches!(field, "API_URL" | "PUBLIC_API_URL")
                && parsed.scheme() != "https"
            {
                return Err(ConfigError::InsecureApiUrl {
                    field: field.to_string(),
                    profile: self.profile.clone(),
                });
            }
        }

        if self.poll_interval_seconds < 5 || self.poll_interval_seconds > 3600 {
            return Err(ConfigError::InvalidPollInterval {
                value: self.poll_interval_seconds,
            });
        }

        if self.token_lead_time_seconds > 3600 {
            return Err(ConfigError::InvalidTokenLeadTime {
                value: self.token_lead_time_seconds,
            });
        }

        if LogFormat::parse(&self.log_format).is_none() {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_api_url() -> String {
    "http://localhost:8015".to_string()
}

fn default_taskcluster_root_url() -> String {
    "https://firefox-ci-tc.services.mozilla.com".to_string()
}

fn default_hg_base_url() -> String {
    "https://hg.mozilla.org".to_string()
}

fn default_github_base_url() -> String {
    "https://github.com".to_string()
}

fn default_github_raw_base_url() -> String {
    "https://raw.githubusercontent.com".to_string()
}

fn default_token_lead_time_seconds() -> u64 {
    60
}

fn default_poll_interval_seconds() -> u64 {
    30
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid {field} '{value}': {source}")]
    InvalidUrl {
        field: String,
        value: String,
        source: url::ParseError,
    },
    #[error("{field} must use https for profile '{profile}'")]
    InsecureApiUrl { field: String, profile: String },
    #[error("poll interval must be between 5 and 3600 seconds, got {value}")]
    InvalidPollInterval { value: u64 },
    #[error("token lead time must not exceed 3600 seconds, got {value}")]
    InvalidTokenLeadTime { value: u64 },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("failed to read product catalog {path}: {source}")]
    CatalogRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse product catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),
    #[error("duplicate product '{product}' in catalog")]
    DuplicateProduct { product: String },
    #[error("product '{product}' has no branches or repositories")]
    EmptyProductTarget { product: String },
    #[error("product '{product}' references unsupported repository '{repo}'")]
    UnsupportedCatalogRepo { product: String, repo: String },
}

/// Loads configuration using layered `.env` files and `SHIPIT_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("SHIPIT_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let api_url = take("API_URL").unwrap_or_else(default_api_url);
        // The public API shares the admin host unless configured separately.
        let public_api_url = take("PUBLIC_API_URL").unwrap_or_else(|| api_url.clone());
        let taskcluster_root_url =
            take("TASKCLUSTER_ROOT_URL").unwrap_or_else(default_taskcluster_root_url);
        let hg_base_url = take("HG_BASE_URL").unwrap_or_else(default_hg_base_url);
        let github_base_url = take("GITHUB_BASE_URL").unwrap_or_else(default_github_base_url);
        let github_raw_base_url =
            take("GITHUB_RAW_BASE_URL").unwrap_or_else(default_github_raw_base_url);
        let access_token = take("ACCESS_TOKEN").map(|t| t.trim().to_string());
        let access_token_file = take("ACCESS_TOKEN_FILE").map(PathBuf::from);
        let token_lead_time_seconds = take("TOKEN_LEAD_TIME_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_token_lead_time_seconds);
        let poll_interval_seconds = take("POLL_INTERVAL_SECONDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_poll_interval_seconds);
        let products_file = take("PRODUCTS_FILE").map(|p| {
            let path = PathBuf::from(p);
            if path.is_relative() {
                self.base_dir.join(path)
            } else {
                path
            }
        });

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            api_url: api_url.trim_end_matches('/').to_string(),
            public_api_url: public_api_url.trim_end_matches('/').to_string(),
            taskcluster_root_url: taskcluster_root_url.trim_end_matches('/').to_string(),
            hg_base_url: hg_base_url.trim_end_matches('/').to_string(),
            github_base_url: github_base_url.trim_end_matches('/').to_string(),
            github_raw_base_url: github_raw_base_url.trim_end_matches('/').to_string(),
            access_token,
            access_token_file,
            token_lead_time_seconds,
            poll_interval_seconds,
            products_file,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("SHIPIT_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("SHIPIT_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
