//! Placeholder expansion for sequence steps.
//!
//! A `{{...}}` placeholder in a recorded token resolves either as a
//! step reference (`$N.path` into step N's completed response body,
//! optionally with an array filter) or as an environment variable.
//! Every unresolvable placeholder is a hard error: a step must never
//! fire with a half-expanded token.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::env::{self, EnvManager};
use crate::error::{EnvError, ExpandError};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder regex"))
}

/// `$<N>.<path>` with a 1-based step number.
fn step_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$(\d+)\.(.+)$").expect("step ref regex"))
}

/// Expand every placeholder in `tokens`. `results` is indexed by step
/// number (slot N-1 for step N); steps that have not completed hold `None`.
/// On failure returns the offending token alongside the cause.
pub fn expand_tokens(
    tokens: &[String],
    results: &[Option<Value>],
    env: &EnvManager,
) -> Result<Vec<String>, (String, ExpandError)> {
    tokens
        .iter()
        .map(|tok| expand_token(tok, results, env).map_err(|e| (tok.clone(), e)))
        .collect()
}

fn expand_token(
    token: &str,
    results: &[Option<Value>],
    env: &EnvManager,
) -> Result<String, ExpandError> {
    let mut out = token.to_string();
    for caps in placeholder_re().captures_iter(token) {
        let full = caps.get(0).expect("match").as_str();
        let content = caps.get(1).expect("group").as_str().trim();

        let value = match step_ref_re().captures(content) {
            Some(sref) => {
                let step: usize = sref
                    .get(1)
                    .expect("step number")
                    .as_str()
                    .parse()
                    .map_err(|_| ExpandError::BadFormat(content.to_string()))?;
                let path = sref.get(2).expect("step path").as_str();
                resolve_step_ref(step, path, results)?
            }
            None => resolve_var(content, env)?,
        };
        out = out.replace(full, &value);
    }
    Ok(out)
}

/// Environment fallback: the variable must exist, and its value is itself
/// recursively expanded.
fn resolve_var(name: &str, env: &EnvManager) -> Result<String, ExpandError> {
    let value = env
        .get_var(name)
        .ok_or_else(|| EnvError::UnknownVariable(name.to_string()))?;
    Ok(env::expand_placeholders(&value, &env.active_vars())?)
}

fn resolve_step_ref(
    step: usize,
    path: &str,
    results: &[Option<Value>],
) -> Result<String, ExpandError> {
    if step == 0 || step > results.len() {
        return Err(ExpandError::StepOutOfRange {
            step,
            len: results.len(),
        });
    }
    let body = results[step - 1]
        .as_ref()
        .ok_or(ExpandError::NoResult(step))?;

    match path.split_once('=') {
        Some((left, right_spec)) => filter_array(body, left, right_spec),
        None => Ok(stringify(navigate(body, path)?)),
    }
}

/// `leftPath=value[.field]`: navigate to the array at `leftPath` minus its
/// last segment, filter elements whose last-segment property stringifies
/// to `value`, then extract `field` from each match (or the filtered
/// property itself) and join with commas.
fn filter_array(body: &Value, left: &str, right_spec: &str) -> Result<String, ExpandError> {
    let (container_path, property) = match left.rsplit_once('.') {
        Some((head, last)) => (head, last),
        None => return Err(ExpandError::BadFormat(format!("{left}={right_spec}"))),
    };
    let (value, field) = match right_spec.split_once('.') {
        Some((v, f)) => (v, Some(f)),
        None => (right_spec, None),
    };

    let array = navigate(body, container_path)?
        .as_array()
        .ok_or_else(|| ExpandError::NotAnArray(container_path.to_string()))?;

    let matches: Vec<&Value> = array
        .iter()
        .filter(|el| {
            el.get(property)
                .map(|p| stringify(p) == value)
                .unwrap_or(false)
        })
        .collect();
    if matches.is_empty() {
        return Err(ExpandError::NoMatches {
            property: property.to_string(),
            value: value.to_string(),
        });
    }

    let mut parts = Vec::with_capacity(matches.len());
    for el in matches {
        let picked = match field {
            Some(f) => el
                .get(f)
                .ok_or_else(|| ExpandError::FieldNotFound(f.to_string()))?,
            None => el.get(property).expect("filter matched on property"),
        };
        parts.push(stringify(picked));
    }
    Ok(parts.join(","))
}

/// Dotted navigation into a JSON body; numeric segments index arrays.
fn navigate<'a>(body: &'a Value, path: &str) -> Result<&'a Value, ExpandError> {
    let mut current = body;
    for segment in path.split('.') {
        current = match (current, segment.parse::<usize>()) {
            (Value::Array(items), Ok(idx)) => items
                .get(idx)
                .ok_or_else(|| ExpandError::KeyNotFound(segment.to_string()))?,
            _ => current
                .get(segment)
                .ok_or_else(|| ExpandError::KeyNotFound(segment.to_string()))?,
        };
    }
    Ok(current)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
