use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::services::workflow::PendingFilter;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_LEDGER_ENDPOINT: &str = "http://127.0.0.1:7545";
const DEFAULT_ABI_PATH: &str = "contracts/build/abi.json";
const DEFAULT_GAS_LIMIT: u64 = 100_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_MAX_BLOCK_SPAN: u64 = 5_000;

/// External ledger connection settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the chain node
    #[serde(default = "default_ledger_endpoint")]
    #[validate(length(min = 1))]
    pub endpoint_url: String,

    /// Deployed contract address; ledger writes and polling are disabled when unset
    #[serde(default)]
    #[validate(custom = "validate_contract_address")]
    pub contract_address: Option<String>,

    /// Path to the contract ABI JSON
    #[serde(default = "default_abi_path")]
    pub abi_path: String,

    /// Upper bound for read calls (block height, log queries)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Upper bound for a fire-and-forget transaction submission
    #[serde(default = "default_submit_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_ledger_endpoint(),
            contract_address: None,
            abi_path: default_abi_path(),
            request_timeout_secs: default_request_timeout_secs(),
            submit_timeout_secs: default_submit_timeout_secs(),
            gas_limit: default_gas_limit(),
        }
    }
}

impl LedgerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

/// Reconciliation loop settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    #[serde(default = "default_poll_interval_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub poll_interval_secs: u64,

    /// Largest block range requested from the node in one poll
    #[serde(default = "default_max_block_span")]
    #[validate(range(min = 1))]
    pub max_block_span: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_block_span: default_max_block_span(),
        }
    }
}

/// Approval workflow settings
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Which stages count as pending for an approver
    #[serde(default)]
    pub pending_filter: PendingFilter,

    /// When set, each stage gets a due date this many days after creation
    #[serde(default)]
    #[validate(range(min = 1, max = 365))]
    pub stage_due_days: Option<u32>,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
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
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub ledger: LedgerConfig,

    #[serde(default)]
    #[validate]
    pub listener: ListenerConfig,

    #[serde(default)]
    #[validate]
    pub workflow: WorkflowConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the essentials.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            ledger: LedgerConfig::default(),
            listener: ListenerConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.listener.poll_interval_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
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
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_ledger_endpoint() -> String {
    DEFAULT_LEDGER_ENDPOINT.to_string()
}

fn default_abi_path() -> String {
    DEFAULT_ABI_PATH.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_submit_timeout_secs() -> u64 {
    5
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_block_span() -> u64 {
    DEFAULT_MAX_BLOCK_SPAN
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_contract_address(address: &str) -> Result<(), ValidationError> {
    if crate::ledger::is_address(address) {
        Ok(())
    } else {
        let mut err = ValidationError::new("contract_address");
        err.message = Some("contract_address must be 0x followed by 40 hex characters".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("central_stores={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same as [`load_config`] but reads files from an explicit directory.
pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let default_file = dir.join("default");
    let env_file = dir.join(run_env);

    let config = Config::builder()
        .set_default("database_url", "sqlite://central_stores.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
