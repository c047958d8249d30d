use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

use crate::queue::RetryPolicy;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_HANDLER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: i32 = 8;
const DEFAULT_BASE_BACKOFF_SECS: u64 = 2;

/// Worker pool and queue redelivery tuning.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of concurrent consumers.
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,

    /// Idle sleep between empty claims.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// A handler that neither completes nor fails within this window is
    /// treated as failed and its job redelivered.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Claims past this count route the job to the dead-letter state.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Exponential backoff base for redelivery scheduling.
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_worker_concurrency() -> usize {
    DEFAULT_WORKER_CONCURRENCY
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_handler_timeout_secs() -> u64 {
    DEFAULT_HANDLER_TIMEOUT_SECS
}
fn default_max_attempts() -> i32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_backoff_secs() -> u64 {
    DEFAULT_BASE_BACKOFF_SECS
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

impl AppConfig {
    /// Programmatic constructor for tests and embedding.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            worker: WorkerConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.worker.max_attempts,
            base_backoff_secs: self.worker.base_backoff_secs,
        }
    }
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// file, and `STOCKPILE_`-prefixed environment variables (later sources
/// override earlier ones).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("STOCKPILE_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();
    let default_path = Path::new(CONFIG_DIR).join("default");
    builder = builder.add_source(File::with_name(default_path.to_str().unwrap()).required(false));

    let env_path = Path::new(CONFIG_DIR).join(&environment);
    builder = builder.add_source(File::with_name(env_path.to_str().unwrap()).required(false));

    builder = builder.add_source(
        Environment::with_prefix("STOCKPILE")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    info!(environment = %config.environment, "Configuration loaded");
    Ok(config)
}

/// Initializes the tracing subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}
