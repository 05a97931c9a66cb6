use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::load::LoadConfigError;

/// Environment variable holding the export rules as a JSON document.
pub const EXPORT_CONFIG_ENV_NAME: &str = "EXPORT_CONFIG";

/// Export rules keyed by source collection name.
///
/// Collections without an entry are ignored by the exporter.
///
/// ```json
/// { "rules": { "orders": { "table": "ds.orders_mirror", "fields": ["Name", "Amount"] } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, ExportRuleConfig>,
}

/// Destination and field selection for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRuleConfig {
    /// `dataset.table` or `project.dataset.table`.
    #[serde(default)]
    pub table: String,
    /// Top level document fields copied into the row, in column order.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Pub/Sub topic receiving JSON rows. Rows are written to `table` directly when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl ExportConfig {
    /// Parses an export configuration document. An empty document means no rules.
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        let document = document.trim();
        if document.is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(document)
    }

    /// Reads the rules from [`EXPORT_CONFIG_ENV_NAME`], returning [`None`] when it is unset.
    pub fn from_env() -> Result<Option<Self>, LoadConfigError> {
        let Ok(document) = std::env::var(EXPORT_CONFIG_ENV_NAME) else {
            return Ok(None);
        };

        Self::from_json(&document)
            .map(Some)
            .map_err(|source| LoadConfigError::ExportOverride {
                variable: EXPORT_CONFIG_ENV_NAME,
                source,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns true when at least one rule publishes to a topic.
    pub fn uses_topics(&self) -> bool {
        self.rules.values().any(|rule| rule.topic().is_some())
    }
}

impl ExportRuleConfig {
    /// The configured topic, treating an empty string as unset.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|topic| !topic.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let config = ExportConfig::from_json(
            r#"{"rules":{"orders":{"table":"ds.orders_mirror","fields":["Name","Amount"]},
                "users":{"table":"p.ds.users","fields":["Email"],"topic":"users-rows"}}}"#,
        )
        .unwrap();

        let orders = &config.rules["orders"];
        assert_eq!(orders.table, "ds.orders_mirror");
        assert_eq!(orders.fields, vec!["Name", "Amount"]);
        assert_eq!(orders.topic(), None);
        assert_eq!(config.rules["users"].topic(), Some("users-rows"));
        assert!(config.uses_topics());
    }

    #[test]
    fn test_empty_document_has_no_rules() {
        assert!(ExportConfig::from_json("").unwrap().is_empty());
        assert!(ExportConfig::from_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_empty_topic_is_unset() {
        let rule = ExportRuleConfig {
            table: "ds.t".to_owned(),
            fields: vec![],
            topic: Some(String::new()),
        };

        assert_eq!(rule.topic(), None);
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        assert!(ExportConfig::from_json(r#"{"rules": []}"#).is_err());
    }
}
