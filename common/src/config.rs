// Configuration management with layered configuration (file, env)

use crate::definition::StoredTrigger;
use crate::errors::{DefinitionError, ScheduleError};
use crate::models::FilesFoundTrigger;
use crate::queue::NatsConfig;
use crate::telemetry::LogFormat;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Global variables available to placeholder expansion
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub triggers: Vec<StoredTrigger>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA timezone crontabs are evaluated in
    pub timezone: String,
    /// Whether the process environment is part of the expansion environment
    pub include_process_env: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            include_process_env: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Node name this agent answers for
    pub name: String,
    pub queue_group: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            queue_group: "filesfound-agents".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("FILESFOUND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate settings shared by both binaries
    pub fn validate(&self) -> Result<(), String> {
        if self.nats.url.is_empty() {
            return Err("NATS URL cannot be empty".to_string());
        }
        if self.nats.subject_prefix.is_empty() {
            return Err("NATS subject_prefix cannot be empty".to_string());
        }
        if self.nats.request_timeout_seconds == 0 {
            return Err("NATS request_timeout_seconds must be greater than 0".to_string());
        }
        self.timezone().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Additional checks for the agent binary
    pub fn validate_agent(&self) -> Result<(), String> {
        self.validate()?;
        if self.agent.name.trim().is_empty() {
            return Err("Agent name cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ScheduleError> {
        Tz::from_str(&self.scheduler.timezone)
            .map_err(|_| ScheduleError::InvalidTimezone(self.scheduler.timezone.clone()))
    }

    /// Migrate every stored trigger and build it. The first invalid
    /// definition aborts loading.
    pub fn build_triggers(&self) -> Result<Vec<FilesFoundTrigger>, DefinitionError> {
        let timezone = self.timezone().map_err(|source| DefinitionError::InvalidSchedule {
            job: String::new(),
            source,
        })?;
        self.triggers
            .iter()
            .cloned()
            .map(|stored| stored.migrate()?.build(timezone))
            .collect()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nats: NatsConfig::default(),
            scheduler: SchedulerConfig::default(),
            agent: AgentConfig::default(),
            observability: ObservabilityConfig::default(),
            variables: HashMap::new(),
            triggers: Vec::new(),
        }
    }
}
