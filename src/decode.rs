//! Conversion of raw service responses into [`ResultSet`]s.
//!
//! Decoding is eager: every field is converted when the response arrives, so
//! a malformed field fails the execution that produced it.

use std::sync::Arc;

use crate::{
    codec,
    wire::{BatchExecuteStatementResponse, ColumnMetadata, ExecuteStatementResponse, TypedValue},
    DataApiError, Engine, Record, Result, ResultSet, SqlType, UpdateResult, Value,
};

/// Decodes an `ExecuteStatement` response.
///
/// With `with_column_names` the column metadata drives typed decoding and
/// name access; without it records are positional and fields decode by their
/// wire tag alone.
pub fn decode_result(
    response: ExecuteStatementResponse,
    with_column_names: bool,
    engine: Engine,
) -> Result<ResultSet> {
    let ExecuteStatementResponse {
        records,
        column_metadata,
        number_of_records_updated,
        generated_fields,
    } = response;

    let Some(rows) = records else {
        let generated_keys = generated_fields
            .and_then(|fields| fields.into_iter().next())
            .map(|field| codec::decode(field, SqlType::Other, engine, "generatedFields"))
            .transpose()?
            .into_iter()
            .collect();
        return Ok(ResultSet {
            number_of_records_updated: Some(number_of_records_updated),
            generated_keys,
            column_metadata,
            ..ResultSet::default()
        });
    };

    let metadata = if with_column_names {
        column_metadata
    } else {
        None
    };
    let columns = metadata.as_deref().map(ColumnLayout::new);

    let records = rows
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| decode_row(row, row_index, columns.as_ref(), engine))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResultSet {
        records,
        // Row-returning DML (`RETURNING`) reports its count alongside the rows.
        number_of_records_updated: (number_of_records_updated > 0)
            .then_some(number_of_records_updated),
        generated_keys: Vec::new(),
        column_metadata: metadata,
        update_results: Vec::new(),
    })
}

/// Decodes a `BatchExecuteStatement` response.
///
/// The update count is the number of parameter sets the service applied.
pub fn decode_batch_result(
    response: BatchExecuteStatementResponse,
    engine: Engine,
) -> Result<ResultSet> {
    let update_results = response
        .update_results
        .into_iter()
        .map(|result| {
            result
                .generated_fields
                .into_iter()
                .map(|field| codec::decode(field, SqlType::Other, engine, "generatedFields"))
                .collect::<Result<Vec<_>>>()
                .map(|generated_fields| UpdateResult { generated_fields })
        })
        .collect::<Result<Vec<_>>>()?;

    let generated_keys = update_results
        .iter()
        .filter_map(|result| result.first().cloned())
        .collect();

    Ok(ResultSet {
        records: Vec::new(),
        number_of_records_updated: Some(update_results.len() as u64),
        generated_keys,
        column_metadata: None,
        update_results,
    })
}

struct ColumnLayout {
    names: Arc<[String]>,
    types: Vec<SqlType>,
}

impl ColumnLayout {
    fn new(metadata: &[ColumnMetadata]) -> Self {
        Self {
            names: metadata
                .iter()
                .map(|meta| meta.display_name().to_owned())
                .collect(),
            types: metadata.iter().map(SqlType::from_metadata).collect(),
        }
    }
}

fn decode_row(
    row: Vec<TypedValue>,
    row_index: usize,
    columns: Option<&ColumnLayout>,
    engine: Engine,
) -> Result<Record> {
    let Some(columns) = columns else {
        let values = row
            .into_iter()
            .enumerate()
            .map(|(index, field)| {
                codec::decode(field, SqlType::Other, engine, &format!("#{index}"))
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Record::new(values));
    };

    if row.len() != columns.names.len() {
        return Err(DataApiError::InvalidResponse(format!(
            "row {row_index} has {} fields but {} columns were described",
            row.len(),
            columns.names.len()
        )));
    }

    let values = row
        .into_iter()
        .zip(columns.names.iter().zip(&columns.types))
        .map(|(field, (name, declared))| codec::decode(field, *declared, engine, name))
        .collect::<Result<Vec<Value>>>()?;
    Ok(Record::with_columns(values, Arc::clone(&columns.names)))
}
