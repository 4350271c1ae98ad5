// Persisted trigger definitions and their migration to the current layout

use crate::errors::DefinitionError;
use crate::models::{default_threshold, FilesFoundTrigger, SearchConfig};
use crate::schedule::CronSpec;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const CURRENT_VERSION: u32 = 2;

/// A trigger definition as found in storage, any version.
///
/// Version 1 stored the first rule flattened at the top level and the other
/// rules under `additional_configs`. Version 2 stores one ordered `configs`
/// list. A missing `version` means 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredTrigger {
    pub job: String,
    #[serde(default)]
    pub version: Option<u32>,
    pub spec: String,

    #[serde(default)]
    pub configs: Vec<SearchConfig>,

    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub files: Option<String>,
    #[serde(default)]
    pub ignored_files: Option<String>,
    #[serde(default)]
    pub trigger_number: Option<String>,
    #[serde(default)]
    pub additional_configs: Vec<SearchConfig>,
}

/// The current on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub job: String,
    pub version: u32,
    pub spec: String,
    pub configs: Vec<SearchConfig>,
}

impl StoredTrigger {
    /// Bring any supported version to the current layout, filling defaults.
    pub fn migrate(self) -> Result<TriggerDefinition, DefinitionError> {
        if self.job.trim().is_empty() {
            return Err(DefinitionError::MissingField("job".to_string()));
        }

        let version = self.version.unwrap_or(1);
        let configs = match version {
            1 => {
                let has_first = self.node.is_some()
                    || self.directory.is_some()
                    || self.files.is_some()
                    || self.ignored_files.is_some()
                    || self.trigger_number.is_some();
                let mut configs = Vec::with_capacity(1 + self.additional_configs.len());
                if has_first || !self.additional_configs.is_empty() {
                    configs.push(SearchConfig::new(
                        self.node,
                        self.directory.unwrap_or_default(),
                        self.files.unwrap_or_default(),
                        self.ignored_files.unwrap_or_default(),
                        self.trigger_number.unwrap_or_else(default_threshold),
                    ));
                }
                configs.extend(self.additional_configs);
                configs
            }
            CURRENT_VERSION => self.configs,
            other => return Err(DefinitionError::UnsupportedVersion(other)),
        };

        let configs = if configs.is_empty() {
            vec![SearchConfig::default()]
        } else {
            configs
        };

        Ok(TriggerDefinition {
            job: self.job,
            version: CURRENT_VERSION,
            spec: self.spec,
            configs,
        })
    }
}

impl TriggerDefinition {
    /// Validate the crontab and build the runtime trigger.
    pub fn build(&self, timezone: Tz) -> Result<FilesFoundTrigger, DefinitionError> {
        let spec = CronSpec::parse_in(&self.spec, timezone).map_err(|source| {
            DefinitionError::InvalidSchedule {
                job: self.job.clone(),
                source,
            }
        })?;
        Ok(FilesFoundTrigger::new(
            self.job.clone(),
            spec,
            self.configs.clone(),
        ))
    }
}
