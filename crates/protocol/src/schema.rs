use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An active validation rule on a record type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ValidationRule {
    pub name: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldDescribe {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub length: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecordDescribe {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescribe>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

impl RecordDescribe {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &ValidationRule> {
        self.validation_rules.iter().filter(|r| r.active)
    }
}

/// Source of record-type metadata.
///
/// Implementations must be loaded before the graph builder accepts them;
/// `is_loaded` is checked once, up front.
pub trait SchemaProvider: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn describe_record(&self, name: &str) -> Option<&RecordDescribe>;

    fn describe_field(&self, record_type: &str, field: &str) -> Option<&FieldDescribe> {
        self.describe_record(record_type)?
            .fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
    }
}

/// Schema registry held entirely in memory. Names are matched case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct InMemorySchema {
    records: HashMap<String, RecordDescribe>,
    loaded: bool,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, records: impl IntoIterator<Item = RecordDescribe>) {
        for record in records {
            self.records.insert(record.name.to_ascii_lowercase(), record);
        }
        self.loaded = true;
    }

    pub fn load_json(&mut self, raw: &str) -> Result<()> {
        let records: Vec<RecordDescribe> =
            serde_json::from_str(raw).context("invalid schema JSON")?;
        self.load(records);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SchemaProvider for InMemorySchema {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn describe_record(&self, name: &str) -> Option<&RecordDescribe> {
        self.records.get(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn account() -> RecordDescribe {
        RecordDescribe {
            name: "Account".to_string(),
            label: "Account".to_string(),
            custom: false,
            fields: vec![FieldDescribe {
                name: "Name".to_string(),
                field_type: "string".to_string(),
                required: true,
                unique: false,
                length: Some(255),
            }],
            validation_rules: vec![
                ValidationRule {
                    name: "NameRequired".to_string(),
                    error_message: None,
                    active: true,
                },
                ValidationRule {
                    name: "Legacy".to_string(),
                    error_message: None,
                    active: false,
                },
            ],
        }
    }

    #[test]
    fn not_loaded_until_load_called() {
        let mut schema = InMemorySchema::new();
        assert!(!schema.is_loaded());
        schema.load(Vec::new());
        assert!(schema.is_loaded());
        assert!(schema.is_empty());
    }

    #[test]
    fn describes_fields_case_insensitively() {
        let mut schema = InMemorySchema::new();
        schema.load([account()]);

        let field = schema.describe_field("account", "NAME").expect("field known");
        assert_eq!(field.length, Some(255));
        assert!(schema.describe_field("Account", "Missing").is_none());
        assert!(schema.describe_record("Contact").is_none());
    }

    #[test]
    fn only_active_rules_are_reported() {
        let record = account();
        let names: Vec<_> = record.active_rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["NameRequired"]);
    }

    #[test]
    fn loads_from_json() {
        let mut schema = InMemorySchema::new();
        schema
            .load_json(r#"[{"name": "Invoice__c", "label": "Invoice", "custom": true}]"#)
            .expect("valid schema");
        assert!(schema.describe_record("invoice__c").expect("known").custom);
    }
}
