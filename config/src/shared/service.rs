use serde::Deserialize;

use crate::load::{Config, LoadConfigError};
use crate::shared::{BigQueryConfig, ExportConfig, ServerConfig};

/// Top level configuration of the exporter service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bigquery: BigQueryConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl ServiceConfig {
    /// Replaces the file based export rules with the `EXPORT_CONFIG` document when it is set.
    pub fn apply_export_override(mut self) -> Result<Self, LoadConfigError> {
        if let Some(export) = ExportConfig::from_env()? {
            self.export = export;
        }

        Ok(self)
    }
}

impl Config for ServiceConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
