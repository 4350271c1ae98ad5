// Environment export for runs started by a files-found trigger

use crate::models::{JobRun, TriggerCause};
use std::collections::HashMap;

pub const NODE_VAR: &str = "filesfound_setting_node";
pub const DIRECTORY_VAR: &str = "filesfound_setting_directory";
pub const FILES_VAR: &str = "filesfound_setting_files";
pub const IGNORED_FILES_VAR: &str = "filesfound_setting_ignoredfiles";
pub const TRIGGER_NUMBER_VAR: &str = "filesfound_setting_triggernumber";

/// Variables describing the rule that started a run. Local searches export an
/// empty node.
pub fn cause_variables(cause: &TriggerCause) -> HashMap<String, String> {
    HashMap::from([
        (NODE_VAR.to_string(), cause.node.clone().unwrap_or_default()),
        (DIRECTORY_VAR.to_string(), cause.directory.clone()),
        (FILES_VAR.to_string(), cause.include_patterns.clone()),
        (IGNORED_FILES_VAR.to_string(), cause.exclude_patterns.clone()),
        (
            TRIGGER_NUMBER_VAR.to_string(),
            cause.trigger_threshold.clone(),
        ),
    ])
}

/// Add the trigger variables to `env` when `run` was caused by this trigger.
/// Runs with any other cause leave `env` untouched.
pub fn build_environment_for(run: &JobRun, env: &mut HashMap<String, String>) {
    if let Some(cause) = run.files_found_cause() {
        env.extend(cause_variables(cause));
    }
}
