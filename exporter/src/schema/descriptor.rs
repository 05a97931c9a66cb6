//! Translation of warehouse column schemas into protobuf message descriptors.
//!
//! The Storage Write API decodes appended rows with a `DescriptorProto` supplied by the writer.
//! [`translate_columns`] builds a typed [`MessageDescriptor`] the row encoder walks, and
//! [`MessageDescriptor::to_descriptor_proto`] renders it as a self-contained proto2
//! `DescriptorProto` with every nested record hoisted into the root message.

use std::collections::HashSet;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto};

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::schema::{ColumnMode, ColumnSchema, ColumnType};
use crate::types::{CHANGE_TYPE_COLUMN, ResolvedTableName};

/// Name of the root message of every row descriptor.
pub const ROOT_MESSAGE_NAME: &str = "root";

/// Separator between path segments of hoisted nested message names.
const NESTED_NAME_SEPARATOR: &str = "__";

/// Wire representation of a field, together with the JSON forms it accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Int64,
    Double,
    String,
    /// Decimal text for `NUMERIC` and `BIGNUMERIC`. Accepts JSON numbers as well as strings.
    Decimal,
    /// JSON text for `JSON` columns. Accepts any JSON value.
    Json,
    Bytes,
    Message(MessageDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLabel {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub number: u32,
    pub name: String,
    pub kind: FieldKind,
    pub label: FieldLabel,
}

/// A message type derived at runtime from a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Everything needed to encode rows for one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub table: ResolvedTableName,
    pub message: MessageDescriptor,
    pub descriptor_proto: DescriptorProto,
}

impl SchemaDescriptor {
    /// Translates `columns` and normalizes the result for `table`.
    pub fn derive(table: ResolvedTableName, columns: &[ColumnSchema]) -> ExportResult<Self> {
        let message = translate_columns(columns)?;
        let descriptor_proto = message.to_descriptor_proto();

        Ok(Self {
            table,
            message,
            descriptor_proto,
        })
    }
}

impl MessageDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Renders the descriptor as a self-contained `DescriptorProto`.
    pub fn to_descriptor_proto(&self) -> DescriptorProto {
        let mut hoisted = Vec::new();
        let mut root = message_proto(self, &mut hoisted);
        root.nested_type = hoisted;

        root
    }
}

/// Builds the row message for a table with `columns`, appending the change type column.
pub fn translate_columns(columns: &[ColumnSchema]) -> ExportResult<MessageDescriptor> {
    if columns.is_empty() {
        bail!(
            ErrorKind::SchemaTranslationFailed,
            "Destination table has no columns"
        );
    }

    let mut message = translate_message(ROOT_MESSAGE_NAME, columns)?;
    if message.field(CHANGE_TYPE_COLUMN).is_some() {
        bail!(
            ErrorKind::SchemaTranslationFailed,
            "Destination table declares the reserved change type column",
            CHANGE_TYPE_COLUMN
        );
    }

    message.fields.push(FieldDescriptor {
        number: message.fields.len() as u32 + 1,
        name: CHANGE_TYPE_COLUMN.to_owned(),
        kind: FieldKind::String,
        label: FieldLabel::Required,
    });

    Ok(message)
}

fn translate_message(name: &str, columns: &[ColumnSchema]) -> ExportResult<MessageDescriptor> {
    let mut seen = HashSet::with_capacity(columns.len());
    let mut fields = Vec::with_capacity(columns.len() + 1);

    for (index, column) in columns.iter().enumerate() {
        if !seen.insert(column.name.as_str()) {
            bail!(
                ErrorKind::SchemaTranslationFailed,
                "Destination table has a duplicate column",
                column.name.clone()
            );
        }

        let kind = match &column.typ {
            ColumnType::Bool => FieldKind::Bool,
            ColumnType::Int64 | ColumnType::Timestamp => FieldKind::Int64,
            ColumnType::Float64 => FieldKind::Double,
            ColumnType::String
            | ColumnType::Date
            | ColumnType::Time
            | ColumnType::DateTime
            | ColumnType::Geography => FieldKind::String,
            ColumnType::Numeric | ColumnType::BigNumeric => FieldKind::Decimal,
            ColumnType::Json => FieldKind::Json,
            ColumnType::Bytes => FieldKind::Bytes,
            ColumnType::Record(children) => {
                if children.is_empty() {
                    bail!(
                        ErrorKind::SchemaTranslationFailed,
                        "Record column has no fields",
                        column.name.clone()
                    );
                }

                let nested_name = format!("{name}{NESTED_NAME_SEPARATOR}{}", column.name);
                FieldKind::Message(translate_message(&nested_name, children)?)
            }
            ColumnType::Unsupported(typ) => bail!(
                ErrorKind::SchemaTranslationFailed,
                "Column type is not supported",
                format!("column `{}` has type {typ}", column.name)
            ),
        };

        let label = match &column.mode {
            ColumnMode::Nullable => FieldLabel::Optional,
            ColumnMode::Required => FieldLabel::Required,
            ColumnMode::Repeated => FieldLabel::Repeated,
            ColumnMode::Unsupported(mode) => bail!(
                ErrorKind::SchemaTranslationFailed,
                "Column mode is not supported",
                format!("column `{}` has mode {mode}", column.name)
            ),
        };

        fields.push(FieldDescriptor {
            number: index as u32 + 1,
            name: column.name.clone(),
            kind,
            label,
        });
    }

    Ok(MessageDescriptor {
        name: name.to_owned(),
        fields,
    })
}

fn message_proto(message: &MessageDescriptor, hoisted: &mut Vec<DescriptorProto>) -> DescriptorProto {
    let mut fields = Vec::with_capacity(message.fields.len());

    for field in &message.fields {
        let (typ, type_name) = match &field.kind {
            FieldKind::Bool => (Type::Bool, None),
            FieldKind::Int64 => (Type::Int64, None),
            FieldKind::Double => (Type::Double, None),
            FieldKind::String | FieldKind::Decimal | FieldKind::Json => (Type::String, None),
            FieldKind::Bytes => (Type::Bytes, None),
            FieldKind::Message(nested) => {
                let nested_proto = message_proto(nested, hoisted);
                hoisted.push(nested_proto);
                (Type::Message, Some(nested.name.clone()))
            }
        };

        let label = match field.label {
            FieldLabel::Optional => Label::Optional,
            FieldLabel::Required => Label::Required,
            FieldLabel::Repeated => Label::Repeated,
        };

        fields.push(FieldDescriptorProto {
            name: Some(field.name.clone()),
            number: Some(field.number as i32),
            label: Some(label as i32),
            r#type: Some(typ as i32),
            type_name,
            ..Default::default()
        });
    }

    DescriptorProto {
        name: Some(message.name.clone()),
        field: fields,
        ..Default::default()
    }
}
