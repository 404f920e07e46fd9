use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde::Serialize;
use tenderbridge_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    precedence: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, value, env_names)| ConfigEntry {
            key,
            value,
            source: field_source(
                key,
                env_names,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        })
        .collect::<Vec<_>>();

    let report = ConfigReport {
        precedence: "overrides > env > file > default",
        config_file: config_file_path.map(|path| path.display().to_string()),
        entries,
    };
    let message = format!("{} effective config values", report.entries.len());
    CommandResult::success_with("config", message, report)
}

type Row = (&'static str, String, &'static [&'static str]);

fn effective_values(config: &AppConfig) -> Vec<Row> {
    let api_key = match &config.ledger.api_key {
        Some(key) => redact_secret(key.expose_secret()),
        None => "<unset>".to_string(),
    };

    vec![
        row("database.url", config.database.url.clone(), &[]),
        row("database.max_connections", config.database.max_connections.to_string(), &[]),
        row("database.timeout_secs", config.database.timeout_secs.to_string(), &[]),
        row("ledger.mode", config.ledger.mode.as_str().to_string(), &[]),
        row(
            "ledger.base_url",
            config.ledger.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &[],
        ),
        row("ledger.api_key", api_key, &[]),
        row("ledger.signing_key", redact_secret(config.ledger.signing_key.expose_secret()), &[]),
        row("ledger.request_timeout_secs", config.ledger.request_timeout_secs.to_string(), &[]),
        row("ledger.minor_unit_scale", config.ledger.minor_unit_scale.to_string(), &[]),
        row("worker.worker_id", config.worker.worker_id.clone(), &["TENDERBRIDGE_WORKER_ID"]),
        row("worker.poll_interval_ms", config.worker.poll_interval_ms.to_string(), &[]),
        row("worker.max_retries", config.worker.max_retries.to_string(), &[]),
        row("worker.retry_base_delay_secs", config.worker.retry_base_delay_secs.to_string(), &[]),
        row(
            "worker.retry_backoff_multiplier",
            config.worker.retry_backoff_multiplier.to_string(),
            &[],
        ),
        row("worker.claim_timeout_secs", config.worker.claim_timeout_secs.to_string(), &[]),
        row("scheduler.enabled", config.scheduler.enabled.to_string(), &[]),
        row("scheduler.sweep_interval_secs", config.scheduler.sweep_interval_secs.to_string(), &[]),
        row("lifecycle.enqueue_attempts", config.lifecycle.enqueue_attempts.to_string(), &[]),
        row("server.bind_address", config.server.bind_address.clone(), &[]),
        row("server.health_check_port", config.server.health_check_port.to_string(), &[]),
        row("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string(), &[]),
        row(
            "logging.level",
            config.logging.level.clone(),
            &["TENDERBRIDGE_LOGGING_LEVEL", "TENDERBRIDGE_LOG_LEVEL"],
        ),
        row(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["TENDERBRIDGE_LOGGING_FORMAT", "TENDERBRIDGE_LOG_FORMAT"],
        ),
    ]
}

fn row(key: &'static str, value: String, env_names: &'static [&'static str]) -> Row {
    (key, value, env_names)
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tenderbridge.toml"), PathBuf::from("config/tenderbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

/// Variable read for a key path unless the row names its variables explicitly.
fn env_key(key_path: &str) -> String {
    format!("TENDERBRIDGE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn field_source(
    key_path: &str,
    env_names: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    let candidates = if env_names.is_empty() {
        vec![env_key(key_path)]
    } else {
        env_names.iter().map(|name| name.to_string()).collect()
    };
    let env_hit = candidates.into_iter().find(|key| {
        env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false)
    });
    if let Some(env_key) = env_hit {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
