//! Schema migration
//!
//! Version 0 files predate `config_version`. They keep every field at the
//! top level, and the `new` command's flags were mirrored into a `[new]`
//! table that could drift from the top-level copy. Migration folds them into
//! the canonical version 1 layout: settings at the top level, state in `[state]`.

use toml::{Table, Value};

use crate::CURRENT_CONFIG_VERSION;

const SETTING_KEYS: [&str; 3] = ["provider", "ttl", "name"];

const STATE_KEYS: [&str; 9] = [
    "status",
    "created_at",
    "expires_at",
    "project_path",
    "scheduled_job_id",
    "cleanup_attempted",
    "cleanup_attempts",
    "last_cleanup_attempt",
    "last_cleanup_error",
];

/// Rewrite a version 0 document into the current layout.
pub fn from_v0(mut legacy: Table) -> Table {
    let namespaced = match legacy.remove("new") {
        Some(Value::Table(t)) => t,
        _ => Table::new(),
    };

    let mut migrated = Table::new();
    migrated.insert(
        "config_version".into(),
        Value::Integer(i64::from(CURRENT_CONFIG_VERSION)),
    );

    for key in SETTING_KEYS {
        let top = non_empty_string(legacy.get(key));
        let nested = non_empty_string(namespaced.get(key));
        if let Some(value) = top.or(nested) {
            migrated.insert(key.into(), Value::String(value));
        }
    }

    let force = legacy
        .get("force")
        .and_then(Value::as_bool)
        .or_else(|| namespaced.get("force").and_then(Value::as_bool));
    if let Some(force) = force {
        migrated.insert("force".into(), Value::Boolean(force));
    }

    let mut state = Table::new();
    for key in STATE_KEYS {
        let Some(value) = legacy.remove(key) else {
            continue;
        };
        if is_zero_value(&value) {
            continue;
        }
        state.insert(key.into(), value);
    }
    if !state.is_empty() {
        migrated.insert("state".into(), Value::Table(state));
    }

    tracing::debug!("Migrated legacy state file to version {}", CURRENT_CONFIG_VERSION);
    migrated
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Empty strings and the `0001-01-01` placeholder timestamp mean "unset".
fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty() || s.starts_with("0001-01-01"),
        _ => false,
    }
}
