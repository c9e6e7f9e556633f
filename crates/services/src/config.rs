use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use study_core::model::{DeckId, LearnerId};

use crate::error::ConfigError;
use crate::progress::DEFAULT_DEBOUNCE;

pub const DEFAULT_DB_URL: &str = "sqlite://study.sqlite3";
pub const DEFAULT_CACHE_PATH: &str = "study-progress.json";
pub const DEFAULT_LEARNER: &str = "local";

/// Where progress is sent when an HTTP remote is configured.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub token: Option<String>,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Runtime settings for a study session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudyConfig {
    pub db_url: String,
    pub cache_path: PathBuf,
    pub learner: LearnerId,
    pub deck_id: Option<DeckId>,
    pub debounce: Duration,
    /// Set: progress goes over HTTP. Unset: progress lives in the `SQLite` database.
    pub remote: Option<RemoteConfig>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            db_url: DEFAULT_DB_URL.into(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            learner: LearnerId::new(DEFAULT_LEARNER),
            deck_id: None,
            debounce: DEFAULT_DEBOUNCE,
            remote: None,
        }
    }
}

impl StudyConfig {
    /// Reads `STUDY_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set to something unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading through `lookup`. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set to something unusable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = get("STUDY_DB_URL") {
            config.db_url = url;
        }
        if let Some(path) = get("STUDY_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(learner) = get("STUDY_LEARNER_ID") {
            config.learner = learner.parse()?;
        }
        config.deck_id = get("STUDY_DECK_ID").map(|id| id.parse()).transpose()?;
        if let Some(ms) = get("STUDY_DEBOUNCE_MS") {
            let millis = ms.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                key: "STUDY_DEBOUNCE_MS",
                value: ms.clone(),
            })?;
            config.debounce = Duration::from_millis(millis);
        }
        if let Some(url) = get("STUDY_REMOTE_URL") {
            config.remote = Some(RemoteConfig {
                base_url: parse_base_url("STUDY_REMOTE_URL", &url)?,
                token: get("STUDY_REMOTE_TOKEN"),
            });
        }

        Ok(config)
    }
}

/// Parses an http(s) url that path segments can be appended to.
///
/// # Errors
///
/// Returns `ConfigError::InvalidUrl` for anything else.
pub fn parse_base_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        key,
        value: value.to_owned(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    Ok(url)
}
