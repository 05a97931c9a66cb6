//! Default Google Cloud project detection.

/// Environment variables consulted, in order, for the default project.
pub const KNOWN_PROJECT_ID_ENVS: &[&str] = &["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT"];

/// Returns the project from the environment, falling back to `configured`.
pub fn detect_project_id(configured: Option<&str>) -> Option<String> {
    detect_project_id_with(|name| std::env::var(name).ok(), configured)
}

fn detect_project_id_with<F>(lookup: F, configured: Option<&str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    KNOWN_PROJECT_ID_ENVS
        .iter()
        .find_map(|name| lookup(name))
        .or_else(|| configured.map(ToOwned::to_owned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_takes_precedence_in_order() {
        let lookup = |name: &str| match name {
            "CLOUDSDK_CORE_PROJECT" => Some("sdk".to_owned()),
            "GOOGLE_CLOUD_PROJECT" => Some("gcp".to_owned()),
            _ => None,
        };

        assert_eq!(
            detect_project_id_with(lookup, Some("configured")),
            Some("sdk".to_owned())
        );
    }

    #[test]
    fn test_falls_back_to_configured() {
        assert_eq!(
            detect_project_id_with(|_| None, Some("configured")),
            Some("configured".to_owned())
        );
        assert_eq!(detect_project_id_with(|_| None, None), None);
    }
}
