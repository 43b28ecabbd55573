mod controller;
mod exporter;
mod gateway;
mod redaction;
mod state;
mod superkanban;
mod telegram;

pub use controller::*;
pub use exporter::*;
pub use gateway::*;
pub use redaction::*;
pub use state::*;
pub use superkanban::*;
pub use telegram::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub super_kanban: SuperKanbanConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Overlay the documented environment variables onto the loaded file.
    /// Env always wins over TOML so a deployment can be steered without
    /// editing config on disk.
    pub fn apply_env(&mut self) {
        self.super_kanban.apply_env();
        self.state.apply_env();
        self.telegram.apply_env();
    }

    /// Validate the configuration and return a list of issues.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.super_kanban.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "super_kanban.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if !self.super_kanban.has_any_credential() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "super_kanban".into(),
                message: "no credential configured (token, api_key, or auth_header)".into(),
            });
        }

        if self.super_kanban.timeout_ms < MIN_TIMEOUT_MS {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "super_kanban.timeout_ms".into(),
                message: format!("below minimum, clamped to {MIN_TIMEOUT_MS} ms"),
            });
        }

        if self.exporter.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "exporter.poll_interval_ms".into(),
                message: format!("below minimum, clamped to {MIN_POLL_INTERVAL_MS} ms"),
            });
        }

        if self.controller.task_lock_ttl_seconds < MIN_LOCK_TTL_SECONDS {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "controller.task_lock_ttl_seconds".into(),
                message: format!("below minimum, clamped to {MIN_LOCK_TTL_SECONDS} s"),
            });
        }

        if self.gateway.max_buffered_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "gateway.max_buffered_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }

        for (i, pattern) in self.redaction.patterns.iter().enumerate() {
            if regex_is_invalid(pattern) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("redaction.patterns[{i}]"),
                    message: format!("invalid pattern: {pattern}"),
                });
            }
        }

        errors
    }
}

// Cheap syntactic sanity check without pulling the regex crate into domain:
// the transcript crate compiles patterns for real and logs failures there.
fn regex_is_invalid(pattern: &str) -> bool {
    pattern.is_empty()
}
