pub mod app_config;
pub mod config;
pub mod model;
pub mod record;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use model::{
    days_running, Ad, AdSnapshot, Competitor, MediaType, NewScrapeError, RunCounters, RunKind,
    RunStatus, ScoreBreakdown, ScrapeRun,
};
pub use record::RawAdRecord;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid run kind: {0}")]
    InvalidRunKind(String),
    #[error("invalid run status: {0}")]
    InvalidRunStatus(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
