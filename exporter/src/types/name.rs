use std::fmt;

/// Identity of a top level Firestore document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentName {
    pub project_id: String,
    pub database_id: String,
    pub collection_name: String,
    pub document_id: String,
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/databases/{}/documents/{}/{}",
            self.project_id, self.database_id, self.collection_name, self.document_id
        )
    }
}

/// A BigQuery table reference as written in the export configuration.
///
/// The project is optional; two part references use the default project of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub project_id: Option<String>,
    pub dataset_id: String,
    pub table_name: String,
}

impl TableName {
    /// Fills in `default_project` when the reference has no project of its own.
    pub fn resolve(&self, default_project: &str) -> ResolvedTableName {
        ResolvedTableName {
            project_id: self
                .project_id
                .clone()
                .unwrap_or_else(|| default_project.to_owned()),
            dataset_id: self.dataset_id.clone(),
            table_name: self.table_name.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(project_id) = &self.project_id {
            write!(f, "{project_id}.")?;
        }
        write!(f, "{}.{}", self.dataset_id, self.table_name)
    }
}

/// A fully qualified table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedTableName {
    pub project_id: String,
    pub dataset_id: String,
    pub table_name: String,
}

impl fmt::Display for ResolvedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.project_id, self.dataset_id, self.table_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_explicit_project() {
        let explicit = TableName {
            project_id: Some("other".to_owned()),
            dataset_id: "ds".to_owned(),
            table_name: "t".to_owned(),
        };
        let implicit = TableName {
            project_id: None,
            ..explicit.clone()
        };

        assert_eq!(explicit.resolve("home").to_string(), "other.ds.t");
        assert_eq!(implicit.resolve("home").to_string(), "home.ds.t");
        assert_eq!(implicit.to_string(), "ds.t");
    }
}
