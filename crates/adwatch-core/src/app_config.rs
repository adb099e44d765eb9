use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub scraper_base_url: String,
    pub scraper_request_timeout_secs: u64,
    pub user_agent: String,
    pub min_competitor_delay_secs: u64,
    pub max_competitor_delay_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub media_base_path: PathBuf,
    pub media_concurrency: usize,
    pub media_timeout_secs: u64,
    pub screenshot_dir: PathBuf,
    pub stale_run_hours: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("scraper_base_url", &self.scraper_base_url)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("user_agent", &self.user_agent)
            .field("min_competitor_delay_secs", &self.min_competitor_delay_secs)
            .field("max_competitor_delay_secs", &self.max_competitor_delay_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("media_base_path", &self.media_base_path)
            .field("media_concurrency", &self.media_concurrency)
            .field("media_timeout_secs", &self.media_timeout_secs)
            .field("screenshot_dir", &self.screenshot_dir)
            .field("stale_run_hours", &self.stale_run_hours)
            .finish()
    }
}
