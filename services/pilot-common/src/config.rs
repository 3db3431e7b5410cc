//! Configuration management for Pilot services.
//!
//! Configuration lives in a single JSON file at `~/.pilot/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (PILOT_* prefix)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PILOT_CONFIG` → alternate config file path
//! - `PILOT_BIND_ADDRESS` → service.host
//! - `PILOT_PORT` → service.port
//! - `PILOT_LOG_LEVEL` → observability.log_level
//! - `PILOT_AGENTS_ENDPOINT` → agents.endpoint
//! - `PILOT_POLICY_PATH` → policy.path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pilot"),
        |dirs| dirs.home_dir().join(".pilot"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PILOT_CONFIG") {
        return PathBuf::from(path);
    }
    config_dir().join("config.json")
}

// ============================================================================
// Service Configuration
// ============================================================================

/// HTTP service binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Bind address. Default: "127.0.0.1" (local only)
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Application name reported by the health and trigger endpoints
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            app_name: default_app_name(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4440
}

fn default_app_name() -> String {
    "pilot-advisor".into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Agents Configuration
// ============================================================================

/// External agent service connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Agent API endpoint
    #[serde(default = "default_agents_endpoint")]
    pub endpoint: String,
    /// Per-stage request timeout in seconds
    #[serde(default = "default_agents_timeout")]
    pub timeout_secs: u64,
    /// Maximum retries for a failed stage request
    #[serde(default = "default_agents_retries")]
    pub max_retries: u32,
    /// Backoff between retries in seconds
    #[serde(default = "default_agents_backoff")]
    pub retry_backoff_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agents_endpoint(),
            timeout_secs: default_agents_timeout(),
            max_retries: default_agents_retries(),
            retry_backoff_secs: default_agents_backoff(),
        }
    }
}

fn default_agents_endpoint() -> String {
    "http://127.0.0.1:4400".into()
}

fn default_agents_timeout() -> u64 {
    300
}

fn default_agents_retries() -> u32 {
    2
}

fn default_agents_backoff() -> u64 {
    1
}

// ============================================================================
// Schedule Configuration
// ============================================================================

/// Daily trigger schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Enable the built-in cron trigger
    #[serde(default = "default_schedule_enabled")]
    pub enabled: bool,
    /// Cron expression for the daily run (sec min hour dom month dow)
    #[serde(default = "default_daily_trigger")]
    pub daily_trigger: String,
    /// Connect/read timeout for the trigger HTTP call, in seconds
    #[serde(default = "default_trigger_timeout")]
    pub trigger_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_schedule_enabled(),
            daily_trigger: default_daily_trigger(),
            trigger_timeout_secs: default_trigger_timeout(),
        }
    }
}

fn default_schedule_enabled() -> bool {
    true
}

fn default_daily_trigger() -> String {
    // 10:00 local time, every day
    "0 0 10 * * *".into()
}

fn default_trigger_timeout() -> u64 {
    10
}

// ============================================================================
// Policy Configuration
// ============================================================================

/// Investment policy source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Path to the policy YAML file
    #[serde(default = "default_policy_path")]
    pub path: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
        }
    }
}

fn default_policy_path() -> String {
    "investment_policy/default_policy.yaml".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for Pilot services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP service binding
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// External agent service
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Daily trigger schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Investment policy source
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable fallbacks.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("PILOT_BIND_ADDRESS") {
            self.service.host = bind;
        }
        if let Ok(port) = std::env::var("PILOT_PORT") {
            if let Ok(p) = port.parse() {
                self.service.port = p;
            }
        }
        if let Ok(level) = std::env::var("PILOT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(endpoint) = std::env::var("PILOT_AGENTS_ENDPOINT") {
            self.agents.endpoint = endpoint;
        }
        if let Ok(path) = std::env::var("PILOT_POLICY_PATH") {
            self.policy.path = path;
        }
    }

    /// The address the HTTP server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }

    /// The URL the scheduler uses for the daily trigger call.
    pub fn trigger_url(&self) -> String {
        format!("http://{}/run/daily", self.bind_address())
    }
}
