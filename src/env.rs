//! Environment and variable storage.
//!
//! Variables live inside named environments; one environment is active at a
//! time. Values may reference other variables with `{{name}}` placeholders;
//! expansion recurses through nested references and fails on circular
//! dependencies instead of looping.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::EnvError;

pub const DEFAULT_ENV: &str = "Global";

/// Matches `{{ name }}` placeholders.
fn placeholder_re() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder regex"))
}

#[derive(Default)]
struct EnvState {
    environments: HashMap<String, HashMap<String, String>>,
    active: String,
}

/// Thread-safe variable table, constructed once at startup and shared by
/// reference.
pub struct EnvManager {
    state: RwLock<EnvState>,
}

impl EnvManager {
    pub fn new() -> Self {
        let mut environments = HashMap::new();
        environments.insert(DEFAULT_ENV.to_string(), HashMap::new());
        Self {
            state: RwLock::new(EnvState {
                environments,
                active: DEFAULT_ENV.to_string(),
            }),
        }
    }

    pub fn active_env(&self) -> String {
        self.state.read().expect("env lock").active.clone()
    }

    /// Switch the active environment, creating it if needed.
    pub fn switch_env(&self, name: &str) {
        let mut state = self.state.write().expect("env lock");
        state
            .environments
            .entry(name.to_string())
            .or_default();
        state.active = name.to_string();
    }

    pub fn set_var(&self, name: &str, value: &str) {
        let mut state = self.state.write().expect("env lock");
        let active = state.active.clone();
        state
            .environments
            .entry(active)
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    pub fn get_var(&self, name: &str) -> Option<String> {
        let state = self.state.read().expect("env lock");
        state
            .environments
            .get(&state.active)
            .and_then(|vars| vars.get(name))
            .cloned()
    }

    /// Snapshot of the active environment's variables.
    pub fn active_vars(&self) -> HashMap<String, String> {
        let state = self.state.read().expect("env lock");
        state
            .environments
            .get(&state.active)
            .cloned()
            .unwrap_or_default()
    }

    /// Variable names starting with `prefix`, for suggestions.
    pub fn matching_vars(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .active_vars()
            .into_keys()
            .filter(|name| name.starts_with(prefix) && name != prefix)
            .collect();
        names.sort();
        names
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively replace `{{name}}` placeholders in `input` using `lookups`.
///
/// A variable whose value itself contains placeholders is resolved
/// recursively; a variable that directly or transitively refers to itself
/// is a circular dependency. Unknown variables are left untouched — the
/// sequence expander applies its own, stricter rule.
pub fn expand_placeholders(
    input: &str,
    lookups: &HashMap<String, String>,
) -> Result<String, EnvError> {
    let mut visited = HashSet::new();
    resolve(input, lookups, &mut visited)
}

fn resolve(
    current: &str,
    lookups: &HashMap<String, String>,
    visited: &mut HashSet<String>,
) -> Result<String, EnvError> {
    let mut result = current.to_string();
    for caps in placeholder_re().captures_iter(current) {
        let full = caps.get(0).expect("match").as_str();
        let name = caps.get(1).expect("group").as_str().trim();

        let Some(value) = lookups.get(name) else {
            continue;
        };

        if !visited.insert(name.to_string()) {
            return Err(EnvError::CircularVariable(name.to_string()));
        }
        let resolved = resolve(value, lookups, visited)?;
        visited.remove(name);

        result = result.replace(full, &resolved);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_expansion() {
        let lookups = vars(&[("host", "api.local")]);
        assert_eq!(
            expand_placeholders("https://{{host}}/v1", &lookups).unwrap(),
            "https://api.local/v1"
        );
    }

    #[test]
    fn test_nested_expansion() {
        let lookups = vars(&[("base", "https://{{host}}"), ("host", "api.local")]);
        assert_eq!(
            expand_placeholders("{{base}}/users", &lookups).unwrap(),
            "https://api.local/users"
        );
    }

    #[test]
    fn test_circular_dependency() {
        let lookups = vars(&[("a", "{{b}}"), ("b", "{{a}}")]);
        let err = expand_placeholders("{{a}}", &lookups).unwrap_err();
        assert!(matches!(err, EnvError::CircularVariable(_)));
    }

    #[test]
    fn test_self_reference() {
        let lookups = vars(&[("a", "x{{a}}")]);
        let err = expand_placeholders("{{a}}", &lookups).unwrap_err();
        assert_eq!(err, EnvError::CircularVariable("a".to_string()));
    }

    #[test]
    fn test_unknown_left_untouched() {
        let lookups = vars(&[]);
        assert_eq!(
            expand_placeholders("{{missing}}", &lookups).unwrap(),
            "{{missing}}"
        );
    }

    #[test]
    fn test_manager_env_isolation() {
        let mgr = EnvManager::new();
        mgr.set_var("token", "abc");
        mgr.switch_env("staging");
        assert_eq!(mgr.get_var("token"), None);
        mgr.set_var("token", "xyz");
        assert_eq!(mgr.get_var("token").as_deref(), Some("xyz"));
        mgr.switch_env(DEFAULT_ENV);
        assert_eq!(mgr.get_var("token").as_deref(), Some("abc"));
    }

    #[test]
    fn test_matching_vars_excludes_exact() {
        let mgr = EnvManager::new();
        mgr.set_var("token", "a");
        mgr.set_var("tokenExpiry", "b");
        assert_eq!(mgr.matching_vars("token"), vec!["tokenExpiry".to_string()]);
    }
}
