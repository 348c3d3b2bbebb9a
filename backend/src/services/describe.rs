//! Human-readable rendering of captured values.
//!
//! Rendering is layered: a schema-aware formatter runs first, a generic
//! heuristic formatter second, and a raw JSON dump last. The first layer that
//! succeeds wins, per field, so one malformed value never breaks the whole
//! entry. `describe` itself is infallible and always yields a summary.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::audit_log::{ActionType, AuditLogEntry};
use crate::services::schema::{FieldKind, SchemaCatalog};

/// Field names commonly carrying a record's identity, in preference order.
const IDENTIFYING_FIELDS: &[&str] = &["name", "title", "subject", "description", "email", "phone"];

const TEXT_TRUNCATE_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("no schema registered for {model}.{field}")]
    NoSchema { model: String, field: String },
    #[error("value shape does not match schema for {model}.{field}")]
    ShapeMismatch { model: String, field: String },
    #[error("value cannot be rendered generically")]
    NotRepresentable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Described {
    pub old_readable: Option<String>,
    pub new_readable: Option<String>,
    pub summary: String,
}

/// Renders one captured entry. Never fails: unformattable values degrade to
/// their raw JSON representation.
pub fn describe(entry: &AuditLogEntry, catalog: &SchemaCatalog) -> Described {
    let old_readable = entry
        .old_values
        .as_ref()
        .and_then(|values| render_values(&entry.model_name, &values.0, catalog));
    let new_readable = entry
        .new_values
        .as_ref()
        .and_then(|values| render_values(&entry.model_name, &values.0, catalog));

    Described {
        old_readable,
        new_readable,
        summary: summarize(entry, catalog),
    }
}

/// Renders a field map as "Label: value" lines, one per field, sorted by
/// field name for stable output.
fn render_values(model: &str, values: &Value, catalog: &SchemaCatalog) -> Option<String> {
    let map = values.as_object()?;
    if map.is_empty() {
        return None;
    }

    let sorted: BTreeMap<&String, &Value> = map.iter().collect();
    let lines: Vec<String> = sorted
        .into_iter()
        .map(|(field, value)| {
            let label = field_label(model, field, catalog);
            format!("{}: {}", label, format_value(model, field, value, catalog))
        })
        .collect();
    Some(lines.join("\n"))
}

fn field_label(model: &str, field: &str, catalog: &SchemaCatalog) -> String {
    catalog
        .field(model, field)
        .map(|schema| schema.label.clone())
        .unwrap_or_else(|| field.to_string())
}

/// Formats a single value, trying each layer in turn.
pub fn format_value(model: &str, field: &str, value: &Value, catalog: &SchemaCatalog) -> String {
    format_with_schema(model, field, value, catalog)
        .or_else(|_| format_generic(value))
        .unwrap_or_else(|_| format_raw(value))
}

fn format_with_schema(
    model: &str,
    field: &str,
    value: &Value,
    catalog: &SchemaCatalog,
) -> Result<String, FormatError> {
    let schema = catalog
        .field(model, field)
        .ok_or_else(|| FormatError::NoSchema {
            model: model.to_string(),
            field: field.to_string(),
        })?;

    let mismatch = || FormatError::ShapeMismatch {
        model: model.to_string(),
        field: field.to_string(),
    };

    if value.is_null() {
        return Ok("(none)".to_string());
    }

    match &schema.kind {
        FieldKind::Reference => format_reference(value).ok_or_else(mismatch),
        FieldKind::Selection { labels } => {
            let raw = scalar_to_string(value).ok_or_else(mismatch)?;
            Ok(labels.get(&raw).cloned().unwrap_or(raw))
        }
        FieldKind::Boolean => match value.as_bool() {
            Some(true) => Ok("Yes".to_string()),
            Some(false) => Ok("No".to_string()),
            None => Err(mismatch()),
        },
        FieldKind::Numeric => value.as_f64().map(format_number).ok_or_else(mismatch),
        FieldKind::Date | FieldKind::DateTime => {
            value.as_str().map(str::to_string).ok_or_else(mismatch)
        }
        FieldKind::Text => value
            .as_str()
            .map(|s| truncate(s, TEXT_TRUNCATE_LEN))
            .ok_or_else(mismatch),
        FieldKind::Char => value.as_str().map(str::to_string).ok_or_else(mismatch),
    }
}

fn format_generic(value: &Value) -> Result<String, FormatError> {
    match value {
        Value::Null => Ok("(none)".to_string()),
        Value::Bool(true) => Ok("Yes".to_string()),
        Value::Bool(false) => Ok("No".to_string()),
        Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .ok_or(FormatError::NotRepresentable),
        Value::String(s) => Ok(truncate(s, TEXT_TRUNCATE_LEN)),
        Value::Array(_) | Value::Object(_) => {
            format_reference(value).ok_or(FormatError::NotRepresentable)
        }
    }
}

fn format_raw(value: &Value) -> String {
    truncate(&value.to_string(), TEXT_TRUNCATE_LEN)
}

/// Renders a reference value as "label (ID: id)". Accepts an `[id, label]`
/// pair, an `{"id": .., "label"/"name": ..}` object, or a bare scalar id.
fn format_reference(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) if items.len() == 2 => {
            let id = scalar_to_string(&items[0])?;
            let label = scalar_to_string(&items[1])?;
            Some(format!("{} (ID: {})", label, id))
        }
        Value::Object(map) => {
            let id = map.get("id").and_then(scalar_to_string)?;
            let label = map
                .get("label")
                .or_else(|| map.get("name"))
                .and_then(scalar_to_string);
            match label {
                Some(label) => Some(format!("{} (ID: {})", label, id)),
                None => Some(format!("(ID: {})", id)),
            }
        }
        Value::String(_) | Value::Number(_) => {
            scalar_to_string(value).map(|id| format!("(ID: {})", id))
        }
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Thousands-separated rendering; integers keep no decimals, everything else
/// gets two.
fn format_number(n: f64) -> String {
    let is_integral = n.fract() == 0.0 && n.abs() < 1e15;
    let formatted = if is_integral {
        format!("{:.0}", n)
    } else {
        format!("{:.2}", n)
    };

    let (sign, rest) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted.as_str()),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{}...", cut)
}

/// One-line summary of what the entry changed.
fn summarize(entry: &AuditLogEntry, catalog: &SchemaCatalog) -> String {
    let target = entry
        .record_label
        .clone()
        .unwrap_or_else(|| format!("{} {}", entry.model_name, entry.record_id));

    match entry.action_type {
        ActionType::Create => {
            let highlights = identifying_highlights(entry, catalog);
            if highlights.is_empty() {
                let count = field_count(entry.new_values.as_ref().map(|v| &v.0));
                format!("Created {} with {} fields", target, count)
            } else {
                format!("Created {}: {}", target, highlights.join(", "))
            }
        }
        ActionType::Write => {
            let changed: Vec<String> = entry
                .new_values
                .as_ref()
                .and_then(|v| v.0.as_object())
                .map(|map| {
                    map.keys()
                        .map(|field| field_label(&entry.model_name, field, catalog))
                        .collect()
                })
                .unwrap_or_default();
            match changed.len() {
                0 => format!("Updated {}", target),
                1 => format!("Updated {} ({})", target, changed[0]),
                n => format!("Updated {} ({} fields)", target, n),
            }
        }
        ActionType::Unlink => {
            let identity = entry
                .old_values
                .as_ref()
                .and_then(|v| v.0.as_object())
                .and_then(|map| {
                    IDENTIFYING_FIELDS
                        .iter()
                        .find_map(|field| map.get(*field).and_then(scalar_to_string))
                });
            match identity {
                Some(identity) => format!("Deleted {} ({})", target, identity),
                None => format!("Deleted {}", target),
            }
        }
        ActionType::Read => format!("Accessed {}", target),
    }
}

/// Up to two identity-bearing fields from the created values.
fn identifying_highlights(entry: &AuditLogEntry, catalog: &SchemaCatalog) -> Vec<String> {
    let Some(map) = entry.new_values.as_ref().and_then(|v| v.0.as_object()) else {
        return Vec::new();
    };
    IDENTIFYING_FIELDS
        .iter()
        .filter_map(|field| {
            map.get(*field).and_then(|value| {
                if value.is_null() {
                    return None;
                }
                Some(format_value(&entry.model_name, field, value, catalog))
            })
        })
        .take(2)
        .collect()
}

fn field_count(values: Option<&Value>) -> usize {
    values
        .and_then(Value::as_object)
        .map(|m| m.len())
        .unwrap_or(0)
}
