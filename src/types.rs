use std::{fmt, ops::Index, slice, sync::Arc};

use serde::de::DeserializeOwned;

use crate::{wire::ColumnMetadata, DataApiError, Result, Value};

/// One decoded result row.
///
/// Positional access always works; name access needs the column labels that
/// come with result metadata. Rows of one result share the label list.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    values: Vec<Value>,
    columns: Option<Arc<[String]>>,
}

impl Record {
    /// A record with positional access only.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            columns: None,
        }
    }

    pub fn with_columns(values: Vec<Value>, columns: Arc<[String]>) -> Self {
        Self {
            values,
            columns: Some(columns),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns a value by column label.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is
    /// returned.
    pub fn get_by_name(&self, name: &str) -> Result<&Value> {
        let columns = self.columns.as_ref().ok_or(DataApiError::NoColumnMetadata)?;
        let index = columns
            .iter()
            .position(|column| column == name)
            .or_else(|| {
                columns
                    .iter()
                    .position(|column| column.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| DataApiError::UnknownColumn(name.to_owned()))?;
        self.values
            .get(index)
            .ok_or_else(|| DataApiError::UnknownColumn(name.to_owned()))
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn iter(&self) -> slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// JSON object keyed by column label, or a JSON array without metadata.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.columns {
            Some(columns) => serde_json::Value::Object(
                columns
                    .iter()
                    .zip(&self.values)
                    .map(|(column, value)| (column.clone(), value.to_json()))
                    .collect(),
            ),
            None => serde_json::Value::Array(self.values.iter().map(Value::to_json).collect()),
        }
    }

    /// Deserializes the record into a model type.
    ///
    /// Structs need column metadata; tuples and sequences work positionally.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|err| DataApiError::Decode {
            column: self
                .columns
                .as_ref()
                .map_or_else(|| "<record>".to_owned(), |columns| columns.join(", ")),
            message: format!("cannot deserialize record: {err}"),
        })
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = &'a Value;
    type IntoIter = slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl IntoIterator for Record {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl PartialEq<[Value]> for Record {
    fn eq(&self, other: &[Value]) -> bool {
        self.values == other
    }
}

impl PartialEq<Vec<Value>> for Record {
    fn eq(&self, other: &Vec<Value>) -> bool {
        &self.values == other
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<Record(")?;
        for (index, value) in self.values.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match self.columns.as_ref().and_then(|columns| columns.get(index)) {
                Some(column) => write!(f, "{column}={value}")?,
                None => write!(f, "{value}")?,
            }
        }
        f.write_str(")>")
    }
}

/// Generated fields of one batch row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateResult {
    pub generated_fields: Vec<Value>,
}

impl UpdateResult {
    pub fn first(&self) -> Option<&Value> {
        self.generated_fields.first()
    }
}

/// Decoded outcome of one execution.
///
/// `number_of_records_updated` is `None` for row-returning statements, so an
/// empty `SELECT` is distinguishable from a DML statement touching zero rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub(crate) records: Vec<Record>,
    pub(crate) number_of_records_updated: Option<u64>,
    pub(crate) generated_keys: Vec<Value>,
    pub(crate) column_metadata: Option<Vec<ColumnMetadata>>,
    pub(crate) update_results: Vec<UpdateResult>,
}

impl ResultSet {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Alias of [`ResultSet::records`].
    pub fn all(&self) -> &[Record] {
        &self.records
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Returns the only record.
    pub fn one(&self) -> Result<&Record> {
        match self.records.as_slice() {
            [] => Err(DataApiError::NoRecordFound),
            [record] => Ok(record),
            records => Err(DataApiError::MultipleRecordsFound(records.len())),
        }
    }

    /// Like [`ResultSet::one`], but an empty result is `Ok(None)`.
    pub fn one_or_none(&self) -> Result<Option<&Record>> {
        match self.records.as_slice() {
            [] => Ok(None),
            [record] => Ok(Some(record)),
            records => Err(DataApiError::MultipleRecordsFound(records.len())),
        }
    }

    /// Returns the value at row 0, column 0.
    ///
    /// The shape is not otherwise validated: extra rows and columns are
    /// ignored.
    pub fn scalar(&self) -> Result<&Value> {
        self.records
            .first()
            .and_then(|record| record.get(0))
            .ok_or(DataApiError::NoRecordFound)
    }

    /// Rows touched by DML, or the rows applied by a batch.
    ///
    /// `None` for a plain query. Row-returning DML such as `INSERT ...
    /// RETURNING` keeps the count the service reported, if non-zero.
    pub fn number_of_records_updated(&self) -> Option<u64> {
        self.number_of_records_updated
    }

    /// First generated field of each inserted row, in row order. Rows that
    /// generated nothing are skipped.
    pub fn generated_keys(&self) -> &[Value] {
        &self.generated_keys
    }

    /// Per-row generated fields of a batch execution.
    pub fn update_results(&self) -> &[UpdateResult] {
        &self.update_results
    }

    pub fn column_metadata(&self) -> Option<&[ColumnMetadata]> {
        self.column_metadata.as_deref()
    }

    pub fn column_names(&self) -> Option<Vec<&str>> {
        self.column_metadata
            .as_ref()
            .map(|columns| columns.iter().map(ColumnMetadata::display_name).collect())
    }

    /// Whether the statement returned rows (possibly zero of them).
    pub fn is_row_returning(&self) -> bool {
        !self.records.is_empty() || self.number_of_records_updated.is_none()
    }
}

impl Index<usize> for ResultSet {
    type Output = Record;

    fn index(&self, index: usize) -> &Self::Output {
        &self.records[index]
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
