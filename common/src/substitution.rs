// Placeholder expansion for search configurations

use crate::models::SearchConfig;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Variables available to expansion.
pub type Environment = HashMap<String, String>;

/// Matches `${NAME}` (dots allowed inside braces) and bare `$NAME`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("placeholder pattern is valid")
});

/// Placeholders nested deeper than this are left unresolved.
const MAX_EXPANSION_DEPTH: usize = 16;

/// Resolves placeholders in the string fields of a [`SearchConfig`].
///
/// Values are expanded recursively until no known placeholder remains.
/// Unknown placeholders are left verbatim. A placeholder whose value refers
/// back to itself, or nests too deep, is left
/// verbatim as a whole, so expanding an expanded string changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExpander;

impl PatternExpander {
    pub fn new() -> Self {
        Self
    }

    /// Substitute placeholders in a single string.
    pub fn expand_str(&self, template: &str, environment: &Environment) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                let name = placeholder_name(caps);
                match self.resolve(name, environment, &mut Vec::new()) {
                    Some(value) => value,
                    None => {
                        if environment.contains_key(name) {
                            debug!(placeholder = name, "Placeholder left unexpanded (cyclic or too deep)");
                        }
                        caps[0].to_string()
                    }
                }
            })
            .into_owned()
    }

    /// Fully expanded value of `name`, or `None` when it is unknown, cyclic
    /// or nested too deep.
    fn resolve(&self, name: &str, environment: &Environment, stack: &mut Vec<String>) -> Option<String> {
        let value = environment.get(name)?;
        if stack.len() >= MAX_EXPANSION_DEPTH || stack.iter().any(|seen| seen == name) {
            return None;
        }

        stack.push(name.to_string());
        let mut complete = true;
        let expanded = PLACEHOLDER
            .replace_all(value, |caps: &Captures<'_>| {
                let inner = placeholder_name(caps);
                if !environment.contains_key(inner) {
                    return caps[0].to_string();
                }
                match self.resolve(inner, environment, stack) {
                    Some(resolved) => resolved,
                    None => {
                        complete = false;
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        stack.pop();

        complete.then_some(expanded)
    }

    /// Derive the per-cycle copy of `config` with placeholders resolved.
    pub fn expand(&self, config: &SearchConfig, environment: &Environment) -> SearchConfig {
        SearchConfig {
            node: config.node.clone(),
            directory: self.expand_str(&config.directory, environment),
            include_patterns: self.expand_str(&config.include_patterns, environment),
            exclude_patterns: self.expand_str(&config.exclude_patterns, environment),
            trigger_threshold: self.expand_str(&config.trigger_threshold, environment),
        }
    }
}

fn placeholder_name<'t>(caps: &Captures<'t>) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Merge global and local variables, local values winning.
pub fn merge_variables(global_vars: Environment, local_vars: Environment) -> Environment {
    let mut merged = global_vars;
    merged.extend(local_vars);
    merged
}

/// Build the expansion environment for a cycle: optionally the process
/// environment, overridden by configured global variables.
pub fn build_environment(globals: &Environment, include_process_env: bool) -> Environment {
    let base: Environment = if include_process_env {
        std::env::vars().collect()
    } else {
        Environment::new()
    };
    merge_variables(base, globals.clone())
}
