use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::{JobEngineConfig, WorkerSettings};
use crate::lifecycle::LifecycleSettings;

const ENV_PREFIX: &str = "TENDERBRIDGE_";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub lifecycle: LifecycleConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub mode: LedgerMode,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    /// Signs entries of the in-process ledger.
    pub signing_key: SecretString,
    pub request_timeout_secs: u64,
    pub minor_unit_scale: u32,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_secs: i64,
    pub retry_backoff_multiplier: u32,
    pub claim_timeout_secs: i64,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub enqueue_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerMode {
    /// Gateway reached over HTTP.
    Http,
    /// Hash-chained ledger inside the process; for local runs and tests.
    InMemory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub ledger_mode: Option<LedgerMode>,
    pub ledger_base_url: Option<String>,
    pub ledger_api_key: Option<String>,
    pub worker_id: Option<String>,
    pub scheduler_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tenderbridge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            ledger: LedgerConfig {
                mode: LedgerMode::InMemory,
                base_url: None,
                api_key: None,
                signing_key: secret_value("tenderbridge-local-ledger".to_string()),
                request_timeout_secs: 10,
                minor_unit_scale: crate::ledger::DEFAULT_MINOR_UNIT_SCALE,
            },
            worker: WorkerConfig {
                worker_id: "tenderbridge-worker".to_string(),
                poll_interval_ms: 1_000,
                max_retries: 5,
                retry_base_delay_secs: 5,
                retry_backoff_multiplier: 2,
                claim_timeout_secs: 300,
            },
            scheduler: SchedulerConfig { enabled: true, sweep_interval_secs: 60 },
            lifecycle: LifecycleConfig { enqueue_attempts: 3 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LedgerMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "in_memory" | "memory" => Ok(Self::InMemory),
            other => Err(ConfigError::Validation(format!(
                "unsupported ledger mode `{other}` (expected http|in_memory)"
            ))),
        }
    }
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::InMemory => "in_memory",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("tenderbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn job_engine_config(&self) -> JobEngineConfig {
        JobEngineConfig {
            claim_timeout_seconds: self.worker.claim_timeout_secs,
            default_max_retries: self.worker.max_retries,
            retry_backoff_multiplier: self.worker.retry_backoff_multiplier,
            retry_base_delay_seconds: self.worker.retry_base_delay_secs,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            worker_id: self.worker.worker_id.clone(),
            minor_unit_scale: self.ledger.minor_unit_scale,
        }
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings { enqueue_attempts: self.lifecycle.enqueue_attempts }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(ledger) = patch.ledger {
            if let Some(mode) = ledger.mode {
                self.ledger.mode = mode;
            }
            if let Some(base_url) = ledger.base_url {
                self.ledger.base_url = Some(base_url);
            }
            if let Some(api_key) = ledger.api_key {
                self.ledger.api_key = Some(secret_value(api_key));
            }
            if let Some(signing_key) = ledger.signing_key {
                self.ledger.signing_key = secret_value(signing_key);
            }
            if let Some(request_timeout_secs) = ledger.request_timeout_secs {
                self.ledger.request_timeout_secs = request_timeout_secs;
            }
            if let Some(minor_unit_scale) = ledger.minor_unit_scale {
                self.ledger.minor_unit_scale = minor_unit_scale;
            }
        }

        if let Some(worker) = patch.worker {
            if let Some(worker_id) = worker.worker_id {
                self.worker.worker_id = worker_id;
            }
            if let Some(poll_interval_ms) = worker.poll_interval_ms {
                self.worker.poll_interval_ms = poll_interval_ms;
            }
            if let Some(max_retries) = worker.max_retries {
                self.worker.max_retries = max_retries;
            }
            if let Some(retry_base_delay_secs) = worker.retry_base_delay_secs {
                self.worker.retry_base_delay_secs = retry_base_delay_secs;
            }
            if let Some(retry_backoff_multiplier) = worker.retry_backoff_multiplier {
                self.worker.retry_backoff_multiplier = retry_backoff_multiplier;
            }
            if let Some(claim_timeout_secs) = worker.claim_timeout_secs {
                self.worker.claim_timeout_secs = claim_timeout_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(sweep_interval_secs) = scheduler.sweep_interval_secs {
                self.scheduler.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(lifecycle) = patch.lifecycle {
            if let Some(enqueue_attempts) = lifecycle.enqueue_attempts {
                self.lifecycle.enqueue_attempts = enqueue_attempts;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEDGER_MODE") {
            self.ledger.mode = value.parse()?;
        }
        if let Some(value) = read_env("LEDGER_BASE_URL") {
            self.ledger.base_url = Some(value);
        }
        if let Some(value) = read_env("LEDGER_API_KEY") {
            self.ledger.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEDGER_SIGNING_KEY") {
            self.ledger.signing_key = secret_value(value);
        }
        if let Some(value) = read_env("LEDGER_REQUEST_TIMEOUT_SECS") {
            self.ledger.request_timeout_secs = parse_env("LEDGER_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEDGER_MINOR_UNIT_SCALE") {
            self.ledger.minor_unit_scale = parse_env("LEDGER_MINOR_UNIT_SCALE", &value)?;
        }

        if let Some(value) = read_env("WORKER_ID") {
            self.worker.worker_id = value;
        }
        if let Some(value) = read_env("WORKER_POLL_INTERVAL_MS") {
            self.worker.poll_interval_ms = parse_env("WORKER_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("WORKER_MAX_RETRIES") {
            self.worker.max_retries = parse_env("WORKER_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("WORKER_RETRY_BASE_DELAY_SECS") {
            self.worker.retry_base_delay_secs = parse_env("WORKER_RETRY_BASE_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("WORKER_RETRY_BACKOFF_MULTIPLIER") {
            self.worker.retry_backoff_multiplier =
                parse_env("WORKER_RETRY_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("WORKER_CLAIM_TIMEOUT_SECS") {
            self.worker.claim_timeout_secs = parse_env("WORKER_CLAIM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_env("SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("SCHEDULER_SWEEP_INTERVAL_SECS") {
            self.scheduler.sweep_interval_secs =
                parse_env("SCHEDULER_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("LIFECYCLE_ENQUEUE_ATTEMPTS") {
            self.lifecycle.enqueue_attempts = parse_env("LIFECYCLE_ENQUEUE_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_env("SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("LOGGING_LEVEL").or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("LOGGING_FORMAT").or_else(|| read_env("LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(mode) = overrides.ledger_mode {
            self.ledger.mode = mode;
        }
        if let Some(base_url) = overrides.ledger_base_url {
            self.ledger.base_url = Some(base_url);
        }
        if let Some(api_key) = overrides.ledger_api_key {
            self.ledger.api_key = Some(secret_value(api_key));
        }
        if let Some(worker_id) = overrides.worker_id {
            self.worker.worker_id = worker_id;
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_ledger(&self.ledger)?;
        validate_worker(&self.worker)?;
        validate_scheduler(&self.scheduler)?;
        validate_lifecycle(&self.lifecycle)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tenderbridge.toml"), PathBuf::from("config/tenderbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_ledger(ledger: &LedgerConfig) -> Result<(), ConfigError> {
    if ledger.request_timeout_secs == 0 || ledger.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "ledger.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if ledger.minor_unit_scale > 18 {
        return Err(ConfigError::Validation(
            "ledger.minor_unit_scale must be at most 18".to_string(),
        ));
    }

    match ledger.mode {
        LedgerMode::Http => {
            let base_url = ledger.base_url.as_deref().map(str::trim).unwrap_or_default();
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "ledger.base_url must start with http:// or https:// when ledger.mode = http"
                        .to_string(),
                ));
            }
            let missing_key = ledger
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing_key {
                return Err(ConfigError::Validation(
                    "ledger.api_key is required when ledger.mode = http".to_string(),
                ));
            }
        }
        LedgerMode::InMemory => {
            if ledger.signing_key.expose_secret().is_empty() {
                return Err(ConfigError::Validation(
                    "ledger.signing_key must not be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}

const MAX_RETRY_BASE_DELAY_SECS: i64 = 86_400;
const MAX_RETRY_BACKOFF_MULTIPLIER: u32 = 10;

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.worker_id.trim().is_empty() {
        return Err(ConfigError::Validation("worker.worker_id must not be empty".to_string()));
    }
    if worker.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "worker.poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    if !(0..=MAX_RETRY_BASE_DELAY_SECS).contains(&worker.retry_base_delay_secs) {
        return Err(ConfigError::Validation(format!(
            "worker.retry_base_delay_secs must be between 0 and {MAX_RETRY_BASE_DELAY_SECS}"
        )));
    }
    if !(1..=MAX_RETRY_BACKOFF_MULTIPLIER).contains(&worker.retry_backoff_multiplier) {
        return Err(ConfigError::Validation(format!(
            "worker.retry_backoff_multiplier must be between 1 and {MAX_RETRY_BACKOFF_MULTIPLIER}"
        )));
    }
    if worker.claim_timeout_secs <= 0 {
        return Err(ConfigError::Validation(
            "worker.claim_timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.enabled && scheduler.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_lifecycle(lifecycle: &LifecycleConfig) -> Result<(), ConfigError> {
    if lifecycle.enqueue_attempts == 0 {
        return Err(ConfigError::Validation(
            "lifecycle.enqueue_attempts must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}")).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(suffix: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: format!("{ENV_PREFIX}{suffix}"),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    ledger: Option<LedgerPatch>,
    worker: Option<WorkerPatch>,
    scheduler: Option<SchedulerPatch>,
    lifecycle: Option<LifecyclePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LedgerPatch {
    mode: Option<LedgerMode>,
    base_url: Option<String>,
    api_key: Option<String>,
    signing_key: Option<String>,
    request_timeout_secs: Option<u64>,
    minor_unit_scale: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerPatch {
    worker_id: Option<String>,
    poll_interval_ms: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_secs: Option<i64>,
    retry_backoff_multiplier: Option<u32>,
    claim_timeout_secs: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecyclePatch {
    enqueue_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
