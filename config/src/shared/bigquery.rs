use secrecy::SecretString;
use serde::Deserialize;

/// Credentials and project used for BigQuery metadata reads and Storage Write appends.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally
/// leaking the service account key into serialized forms.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BigQueryConfig {
    /// Project used for two-part table references.
    ///
    /// When unset, the project is detected from the environment, see
    /// [`crate::project::detect_project_id`].
    #[serde(default)]
    pub project_id: Option<String>,
    /// Service account key JSON. Application default credentials are used when absent.
    #[serde(default)]
    pub service_account_key: Option<SecretString>,
}
