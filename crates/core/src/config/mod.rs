//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ROUTECACHE_*)
//! 2. TOML config file (if ROUTECACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The controller itself only ever sees a [`CacheConfig`], derived once from
//! the loaded [`AppConfig`] and immutable afterwards.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Prefix shared by every generation this controller owns.
pub const GENERATION_PREFIX: &str = "app-cache-";

/// Immutable controller configuration: the version tag and the Route Set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    version_tag: String,
    routes: BTreeSet<String>,
}

impl CacheConfig {
    pub fn new<I, S>(version_tag: impl Into<String>, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { version_tag: version_tag.into(), routes: routes.into_iter().map(Into::into).collect() }
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    pub fn routes(&self) -> &BTreeSet<String> {
        &self.routes
    }

    /// Name of the current generation, `app-cache-<version>`.
    pub fn generation_name(&self) -> String {
        format!("{GENERATION_PREFIX}{}", self.version_tag)
    }

    /// Exact path membership; no prefix or trailing-slash matching.
    pub fn is_routed(&self, path: &str) -> bool {
        self.routes.contains(path)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ROUTECACHE_*)
/// 2. TOML config file (if ROUTECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version tag; bumping it invalidates every older generation on activation.
    ///
    /// Set via ROUTECACHE_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Exact paths eligible for caching.
    ///
    /// Set via ROUTECACHE_ROUTES environment variable (comma-separated).
    #[serde(default = "default_routes", deserialize_with = "deserialize_routes")]
    pub routes: Vec<String>,

    /// Origin the routes are resolved against when populating on install.
    ///
    /// Set via ROUTECACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path to the SQLite cache database.
    ///
    /// Set via ROUTECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network fetches.
    ///
    /// Set via ROUTECACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network fetch timeout in milliseconds.
    ///
    /// Set via ROUTECACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_version() -> String {
    "v1".into()
}

fn default_routes() -> Vec<String> {
    vec!["/".into(), "/users".into(), "/events".into()]
}

fn default_origin() -> String {
    "http://localhost:3000".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./routecache.sqlite")
}

fn default_user_agent() -> String {
    "routecache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

/// Accept either a list or a comma-separated string (the env form).
fn deserialize_routes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Routes {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match Routes::deserialize(deserializer)? {
        Routes::List(routes) => routes,
        Routes::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            routes: default_routes(),
            origin: default_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be parsed, or
    /// validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ROUTECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ROUTECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// The immutable controller configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.version.clone(), self.routes.iter().cloned())
    }
}
