use std::fmt;

/// Type of a warehouse column as reported by the table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Bytes,
    Int64,
    Float64,
    Numeric,
    BigNumeric,
    Bool,
    Timestamp,
    Date,
    Time,
    DateTime,
    Geography,
    Json,
    Record(Vec<ColumnSchema>),
    /// A type this exporter cannot write, kept by name for error reporting.
    Unsupported(String),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "STRING",
            ColumnType::Bytes => "BYTES",
            ColumnType::Int64 => "INT64",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::BigNumeric => "BIGNUMERIC",
            ColumnType::Bool => "BOOL",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Geography => "GEOGRAPHY",
            ColumnType::Json => "JSON",
            ColumnType::Record(_) => "RECORD",
            ColumnType::Unsupported(name) => name,
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMode {
    Nullable,
    Required,
    Repeated,
    Unsupported(String),
}

impl ColumnMode {
    /// Parses the BigQuery mode string. A missing mode means `NULLABLE`.
    pub fn parse(mode: Option<&str>) -> Self {
        match mode.map(str::to_ascii_uppercase).as_deref() {
            None | Some("NULLABLE") => ColumnMode::Nullable,
            Some("REQUIRED") => ColumnMode::Required,
            Some("REPEATED") => ColumnMode::Repeated,
            Some(other) => ColumnMode::Unsupported(other.to_owned()),
        }
    }
}

/// A single column of a warehouse table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub typ: ColumnType,
    pub mode: ColumnMode,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: ColumnType, mode: ColumnMode) -> Self {
        Self {
            name: name.into(),
            typ,
            mode,
        }
    }

    pub fn nullable(name: impl Into<String>, typ: ColumnType) -> Self {
        Self::new(name, typ, ColumnMode::Nullable)
    }

    pub fn required(name: impl Into<String>, typ: ColumnType) -> Self {
        Self::new(name, typ, ColumnMode::Required)
    }

    pub fn repeated(name: impl Into<String>, typ: ColumnType) -> Self {
        Self::new(name, typ, ColumnMode::Repeated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(ColumnMode::parse(None), ColumnMode::Nullable);
        assert_eq!(ColumnMode::parse(Some("required")), ColumnMode::Required);
        assert_eq!(ColumnMode::parse(Some("REPEATED")), ColumnMode::Repeated);
        assert_eq!(
            ColumnMode::parse(Some("SOMETIMES")),
            ColumnMode::Unsupported("SOMETIMES".to_owned())
        );
    }
}
