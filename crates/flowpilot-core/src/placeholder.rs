//! Placeholder substitution for step configuration and decision conditions.
//!
//! Two forms are recognised:
//!
//! - `{{name}}` as an entire configuration value, replaced by a prior step's
//!   output or a context variable.
//! - `{name}` inside a condition string, replaced by the variable's text.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use flowpilot_protocols::types::{ConfigMap, Metadata};

static CONDITION_VAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").ok());

/// Name inside a whole-value `{{name}}` reference.
pub fn reference_name(value: &Value) -> Option<&str> {
    let text = value.as_str()?.trim();
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(inner.trim())
}

/// Resolve one configuration value.
///
/// Step outputs are consulted first; a dotted name (`step.field`) resolves to
/// the whole output of `step`, not the field. Variables come next. Anything
/// unresolved is returned unchanged.
pub fn resolve_value(
    value: &Value,
    step_outputs: &HashMap<String, Value>,
    variables: &Metadata,
) -> Value {
    let Some(name) = reference_name(value) else {
        return value.clone();
    };

    let step_id = name.split('.').next().unwrap_or(name);
    if let Some(output) = step_outputs.get(step_id) {
        return output.clone();
    }
    if let Some(var) = variables.get(name) {
        return var.clone();
    }
    value.clone()
}

/// Resolve every value of a step configuration.
pub fn resolve_config(
    config: &ConfigMap,
    step_outputs: &HashMap<String, Value>,
    variables: &Metadata,
) -> ConfigMap {
    config
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, step_outputs, variables)))
        .collect()
}

/// Resolve `{{name}}` references against variables only.
pub fn resolve_variables(config: &ConfigMap, variables: &Metadata) -> ConfigMap {
    resolve_config(config, &HashMap::new(), variables)
}

/// Replace `{name}` occurrences with the text of the named variable. Unknown
/// names are left in place.
pub fn substitute_condition(condition: &str, variables: &Metadata) -> String {
    let Some(pattern) = CONDITION_VAR.as_ref() else {
        return condition.to_string();
    };
    pattern
        .replace_all(condition, |caps: &regex::Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value_text(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Plain text of a JSON value: strings unquoted, everything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
