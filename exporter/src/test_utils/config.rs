use config::shared::ExportConfig;

use crate::router::ExportRules;
use crate::test_utils::event::TEST_PROJECT_ID;
use crate::types::ResolvedTableName;

/// Builds export rules from a JSON export configuration document.
///
/// # Panics
///
/// Panics if the document is not a valid export configuration.
pub fn export_rules(document: &str) -> ExportRules {
    let config = ExportConfig::from_json(document).expect("invalid export configuration");
    ExportRules::from_config(&config).expect("invalid export rules")
}

/// A table in [`TEST_PROJECT_ID`].
pub fn test_table(dataset_id: &str, table_name: &str) -> ResolvedTableName {
    ResolvedTableName {
        project_id: TEST_PROJECT_ID.to_owned(),
        dataset_id: dataset_id.to_owned(),
        table_name: table_name.to_owned(),
    }
}
