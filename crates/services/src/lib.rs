#![forbid(unsafe_code)]

pub mod app_services;
pub mod config;
pub mod error;
pub mod http_progress;
pub mod progress;
pub mod sessions;

pub use study_core::Clock;

pub use app_services::{DEMO_DECK_ID, StudyServices};
pub use config::{RemoteConfig, StudyConfig};
pub use error::{AppServicesError, ConfigError};
pub use http_progress::HttpProgressClient;
pub use progress::{LoadedProgress, ProgressSource, ProgressStore};
pub use sessions::{CardOutcome, ExitedSession, NoopObserver, SessionHost, SessionObserver};
