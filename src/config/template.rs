//! `{{dotted.path}}` placeholder expansion.
//!
//! Every string leaf of the merged document is expanded against the
//! *original* merged tree in a single pass. A reference to a value that
//! itself contains a placeholder is rejected rather than chained, so the
//! output never carries a `{{` forward.
//! Paths address tables by key and arrays by integer index, for example
//! `services.ollama.ports.0.container`.

use regex::Regex;
use std::sync::LazyLock;
use toml::{Table, Value};
use tracing::debug;

use crate::error::TemplateError;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern compiles"));

/// Expands every placeholder in `document`, returning a new table.
///
/// # Errors
///
/// Returns the first [`TemplateError`] encountered; partial expansion is
/// never returned.
pub fn resolve_templates(document: &Table) -> Result<Table, TemplateError> {
    let mut resolved = document.clone();
    let mut location = Vec::new();
    for (key, value) in &mut resolved {
        location.push(key.clone());
        expand_value(document, &mut location, value)?;
        location.pop();
    }
    Ok(resolved)
}

/// Expands placeholders in free text, such as a generated file, against
/// an already resolved document. `label` names the text in errors.
///
/// # Errors
///
/// Returns a [`TemplateError`] for unresolvable or unterminated
/// placeholders.
pub fn render_template(label: &str, text: &str, root: &Table) -> Result<String, TemplateError> {
    expand_string(root, &[label.to_string()], text)
}

/// Returns true if any string leaf still contains `{{`.
#[must_use]
pub fn has_placeholders(document: &Table) -> bool {
    document.values().any(value_has_placeholder)
}

fn value_has_placeholder(value: &Value) -> bool {
    match value {
        Value::String(text) => text.contains("{{"),
        Value::Array(items) => items.iter().any(value_has_placeholder),
        Value::Table(table) => table.values().any(value_has_placeholder),
        _ => false,
    }
}

fn expand_value(
    root: &Table,
    location: &mut Vec<String>,
    value: &mut Value,
) -> Result<(), TemplateError> {
    match value {
        Value::String(text) if text.contains("{{") => {
            *text = expand_string(root, location, text)?;
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                location.push(index.to_string());
                expand_value(root, location, item)?;
                location.pop();
            }
        }
        Value::Table(table) => {
            for (key, item) in table.iter_mut() {
                location.push(key.clone());
                expand_value(root, location, item)?;
                location.pop();
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_string(root: &Table, location: &[String], text: &str) -> Result<String, TemplateError> {
    let key = location.join(".");
    let mut expanded = String::with_capacity(text.len());
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(text) {
        let (Some(whole), Some(path)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let literal = &text[cursor..whole.start()];
        if literal.contains("{{") {
            return Err(TemplateError::Unterminated { key });
        }
        expanded.push_str(literal);
        expanded.push_str(&lookup(root, &key, location, path.as_str().trim())?);
        cursor = whole.end();
    }

    let tail = &text[cursor..];
    if tail.contains("{{") {
        return Err(TemplateError::Unterminated { key });
    }
    expanded.push_str(tail);

    debug!(key = %key, "expanded template");
    Ok(expanded)
}

fn lookup(root: &Table, key: &str, location: &[String], path: &str) -> Result<String, TemplateError> {
    let segments: Vec<&str> = path.split('.').collect();

    let passes_through_self = segments.len() <= location.len()
        && segments.iter().zip(location).all(|(segment, own)| *segment == own);
    if passes_through_self {
        return Err(TemplateError::SelfReference {
            key: key.to_string(),
            path: path.to_string(),
        });
    }

    let missing = || TemplateError::MissingKey {
        key: key.to_string(),
        path: path.to_string(),
    };

    let mut current = root.get(segments[0]).ok_or_else(missing)?;
    for segment in &segments[1..] {
        current = match current {
            Value::Table(table) => table.get(*segment).ok_or_else(missing)?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| TemplateError::NotAContainer {
                    key: key.to_string(),
                    path: path.to_string(),
                    segment: (*segment).to_string(),
                })?;
                items.get(index).ok_or_else(missing)?
            }
            _ => {
                return Err(TemplateError::NotAContainer {
                    key: key.to_string(),
                    path: path.to_string(),
                    segment: (*segment).to_string(),
                });
            }
        };
    }

    match current {
        Value::String(text) if text.contains("{{") => Err(TemplateError::Chained {
            key: key.to_string(),
            path: path.to_string(),
        }),
        Value::String(text) => Ok(text.clone()),
        Value::Integer(number) => Ok(number.to_string()),
        Value::Float(number) => Ok(number.to_string()),
        Value::Boolean(flag) => Ok(flag.to_string()),
        Value::Datetime(datetime) => Ok(datetime.to_string()),
        Value::Array(_) | Value::Table(_) => Err(TemplateError::NonScalar {
            key: key.to_string(),
            path: path.to_string(),
        }),
    }
}
