//! Field metadata used to render captured values in a human-readable form.
//!
//! The catalog is loaded from a JSON file at startup and is intentionally
//! optional: models without registered metadata still get generic formatting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Link to another record, stored as an id or `[id, label]` pair.
    Reference,
    /// Enumerated value with display labels per raw value.
    Selection {
        #[serde(default)]
        labels: HashMap<String, String>,
    },
    Boolean,
    Numeric,
    Date,
    DateTime,
    /// Long free-form text, truncated for display.
    Text,
    /// Short free-form text.
    Char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Display label for the field, e.g. "Customer" for `partner_id`.
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSchema {
    #[serde(default)]
    pub fields: HashMap<String, FieldSchema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    models: HashMap<String, ModelSchema>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = serde_json::from_str(&raw)?;
        Ok(catalog)
    }

    pub fn register(&mut self, model_name: impl Into<String>, schema: ModelSchema) {
        self.models.insert(model_name.into(), schema);
    }

    pub fn model(&self, model_name: &str) -> Option<&ModelSchema> {
        self.models.get(model_name)
    }

    pub fn field(&self, model_name: &str, field_name: &str) -> Option<&FieldSchema> {
        self.models
            .get(model_name)
            .and_then(|m| m.fields.get(field_name))
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_parses_from_json() {
        let raw = r#"{
            "models": {
                "res.partner": {
                    "fields": {
                        "company_id": { "label": "Company", "kind": "reference" },
                        "state": {
                            "label": "Status",
                            "kind": "selection",
                            "labels": { "draft": "Draft", "done": "Done" }
                        },
                        "active": { "label": "Active", "kind": "boolean" }
                    }
                }
            }
        }"#;
        let catalog: SchemaCatalog = serde_json::from_str(raw).expect("parse");
        let field = catalog.field("res.partner", "state").expect("field");
        assert_eq!(field.label, "Status");
        match &field.kind {
            FieldKind::Selection { labels } => {
                assert_eq!(labels.get("draft").map(String::as_str), Some("Draft"));
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unknown_model_and_field_return_none() {
        let catalog = SchemaCatalog::new();
        assert!(catalog.model("missing").is_none());
        assert!(catalog.field("missing", "field").is_none());
        assert!(catalog.is_empty());
    }
}
