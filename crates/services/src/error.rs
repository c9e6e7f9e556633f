//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::ParseIdError;

/// Errors raised while reading `StudyConfig`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{key} must be a whole number of milliseconds, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} is not a usable base url: {value:?}")]
    InvalidUrl { key: &'static str, value: String },
    #[error(transparent)]
    Id(#[from] ParseIdError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] study_core::Error),
}
