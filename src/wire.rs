//! Data API request and response shapes.
//!
//! Field names follow the service's camelCase JSON protocol. These types are
//! public so custom [`ExecutionService`](crate::ExecutionService)
//! implementations can build responses.

use serde::{Deserialize, Serialize};

/// Tagged wire representation of one parameter or result field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TypedValue {
    #[serde(rename = "isNull")]
    Null(bool),
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    #[serde(rename = "longValue")]
    Long(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "blobValue", with = "base64_bytes")]
    Blob(Vec<u8>),
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),
}

impl TypedValue {
    pub fn null() -> Self {
        Self::Null(true)
    }

    /// Name of the populated variant, as used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null(_) => "isNull",
            Self::Boolean(_) => "booleanValue",
            Self::Long(_) => "longValue",
            Self::Double(_) => "doubleValue",
            Self::String(_) => "stringValue",
            Self::Blob(_) => "blobValue",
            Self::Array(_) => "arrayValue",
        }
    }
}

/// Homogeneous array payload of [`TypedValue::Array`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayValue {
    BooleanValues(Vec<bool>),
    LongValues(Vec<i64>),
    DoubleValues(Vec<f64>),
    StringValues(Vec<String>),
    ArrayValues(Vec<ArrayValue>),
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match self {
            Self::BooleanValues(values) => values.len(),
            Self::LongValues(values) => values.len(),
            Self::DoubleValues(values) => values.len(),
            Self::StringValues(values) => values.len(),
            Self::ArrayValues(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type hint telling the service how to cast a string parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeHint {
    Decimal,
    Timestamp,
    Date,
    Time,
    Json,
}

/// One named, bound statement parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlParameter {
    pub name: String,
    pub value: TypedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<TypeHint>,
}

/// Column description returned when result metadata is requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMetadata {
    pub name: String,
    pub label: String,
    /// JDBC type code.
    #[serde(rename = "type")]
    pub type_code: i32,
    pub type_name: String,
    pub nullable: i32,
    pub precision: i32,
    pub scale: i32,
    pub is_auto_increment: bool,
    pub is_signed: bool,
    pub is_case_sensitive: bool,
    pub is_currency: bool,
    pub table_name: String,
    pub schema_name: String,
    /// JDBC type code of the elements when the column is an array.
    pub array_base_column_type: i32,
}

impl ColumnMetadata {
    /// Column label, falling back to the column name.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginTransactionRequest {
    pub resource_arn: String,
    pub secret_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginTransactionResponse {
    pub transaction_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStatementRequest {
    pub resource_arn: String,
    pub secret_arn: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<SqlParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub include_result_metadata: bool,
    #[serde(default)]
    pub continue_after_timeout: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStatementResponse {
    /// Present only for row-returning statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Vec<TypedValue>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_metadata: Option<Vec<ColumnMetadata>>,
    #[serde(default)]
    pub number_of_records_updated: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_fields: Option<Vec<TypedValue>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExecuteStatementRequest {
    pub resource_arn: String,
    pub secret_arn: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub parameter_sets: Vec<Vec<SqlParameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExecuteStatementResponse {
    #[serde(default)]
    pub update_results: Vec<BatchUpdateResult>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateResult {
    #[serde(default)]
    pub generated_fields: Vec<TypedValue>,
}

/// Body of both commit and rollback calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndTransactionRequest {
    pub resource_arn: String,
    pub secret_arn: String,
    pub transaction_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndTransactionResponse {
    pub transaction_status: String,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| serde::de::Error::custom(format!("invalid base64 blob: {err}")))
    }
}
