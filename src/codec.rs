//! Mapping between host [`Value`]s and wire [`TypedValue`]s.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{
    wire::{ArrayValue, TypedValue},
    DataApiError, Engine, Result, SqlType, Value,
};

/// Encodes a host value into its wire representation for `engine`.
///
/// Decimals, temporal values and JSON travel as strings; pair them with
/// [`Engine::type_hint`] when binding. An empty array encodes as null.
pub fn encode(value: &Value, engine: Engine) -> Result<TypedValue> {
    match value {
        Value::Null => Ok(TypedValue::null()),
        Value::Bool(value) => Ok(TypedValue::Boolean(*value)),
        Value::Int(value) => Ok(TypedValue::Long(*value)),
        Value::Float(value) => {
            if !value.is_finite() {
                return Err(DataApiError::UnsupportedType(format!(
                    "non-finite float value '{value}'"
                )));
            }
            Ok(TypedValue::Double(*value))
        }
        Value::Text(value) => Ok(TypedValue::String(value.clone())),
        Value::Blob(bytes) => Ok(TypedValue::Blob(bytes.clone())),
        Value::Decimal(value) => Ok(TypedValue::String(value.to_string())),
        Value::Date(value) => Ok(TypedValue::String(engine.format_date(*value))),
        Value::Time(value) => Ok(TypedValue::String(engine.format_time(*value))),
        Value::DateTime(value) => Ok(TypedValue::String(engine.format_datetime(*value))),
        Value::Json(value) => Ok(TypedValue::String(value.to_string())),
        Value::Array(values) if values.is_empty() => Ok(TypedValue::null()),
        Value::Array(values) => encode_array(values, engine).map(TypedValue::Array),
    }
}

fn encode_array(values: &[Value], engine: Engine) -> Result<ArrayValue> {
    let Some(first) = values.first() else {
        return Ok(ArrayValue::ArrayValues(Vec::new()));
    };

    if matches!(first, Value::Array(_)) {
        return values
            .iter()
            .map(|value| match value {
                Value::Array(inner) => encode_array(inner, engine),
                other => Err(mixed_array(other)),
            })
            .collect::<Result<Vec<_>>>()
            .map(ArrayValue::ArrayValues);
    }

    let fields = values
        .iter()
        .map(|value| match value {
            Value::Array(_) => Err(mixed_array(value)),
            scalar => encode(scalar, engine),
        })
        .collect::<Result<Vec<_>>>()?;

    match &fields[0] {
        TypedValue::Boolean(_) => same_kind(fields, |field| match field {
            TypedValue::Boolean(value) => Ok(value),
            other => Err(other),
        })
        .map(ArrayValue::BooleanValues),
        TypedValue::Long(_) => same_kind(fields, |field| match field {
            TypedValue::Long(value) => Ok(value),
            other => Err(other),
        })
        .map(ArrayValue::LongValues),
        TypedValue::Double(_) => same_kind(fields, |field| match field {
            TypedValue::Double(value) => Ok(value),
            other => Err(other),
        })
        .map(ArrayValue::DoubleValues),
        TypedValue::String(_) => same_kind(fields, |field| match field {
            TypedValue::String(value) => Ok(value),
            other => Err(other),
        })
        .map(ArrayValue::StringValues),
        other => Err(DataApiError::UnsupportedType(format!(
            "arrays of {} elements are not supported",
            other.kind()
        ))),
    }
}

fn same_kind<T>(
    fields: Vec<TypedValue>,
    pick: impl Fn(TypedValue) -> std::result::Result<T, TypedValue>,
) -> Result<Vec<T>> {
    fields
        .into_iter()
        .map(|field| {
            pick(field).map_err(|other| {
                DataApiError::UnsupportedType(format!(
                    "array mixes element kinds; found {}",
                    other.kind()
                ))
            })
        })
        .collect()
}

fn mixed_array(value: &Value) -> DataApiError {
    DataApiError::UnsupportedType(format!(
        "array mixes nested arrays and scalar values; found '{value}'"
    ))
}

/// Decodes a wire field into the best-typed host value.
///
/// `declared` is the column's declared type ([`SqlType::Other`] when no
/// metadata was requested); for array columns it is the element type.
/// `column` names the column in decode errors.
pub fn decode(field: TypedValue, declared: SqlType, engine: Engine, column: &str) -> Result<Value> {
    match field {
        TypedValue::Null(_) => Ok(Value::Null),
        TypedValue::Boolean(value) => Ok(Value::Bool(value)),
        TypedValue::Long(value) => Ok(match declared {
            SqlType::Decimal => Value::Decimal(Decimal::from(value)),
            SqlType::Boolean if value == 0 || value == 1 => Value::Bool(value == 1),
            _ => Value::Int(value),
        }),
        TypedValue::Double(value) => match declared {
            SqlType::Decimal => parse_decimal(&value.to_string(), column).map(Value::Decimal),
            _ => Ok(Value::Float(value)),
        },
        TypedValue::String(value) => decode_string(value, declared, engine, column),
        TypedValue::Blob(bytes) => Ok(Value::Blob(bytes)),
        TypedValue::Array(array) => decode_array(array, declared, engine, column),
    }
}

fn decode_string(value: String, declared: SqlType, engine: Engine, column: &str) -> Result<Value> {
    let parsed = match declared {
        SqlType::Decimal => return parse_decimal(&value, column).map(Value::Decimal),
        SqlType::Date => engine.parse_date(&value).map(Value::Date),
        SqlType::Time => engine.parse_time(&value).map(Value::Time),
        SqlType::Timestamp => engine.parse_datetime(&value).map(Value::DateTime),
        SqlType::Json => serde_json::from_str(&value)
            .map(Value::Json)
            .map_err(|err| format!("invalid json: {err}")),
        SqlType::Boolean | SqlType::Other => Ok(Value::Text(value)),
    };
    parsed.map_err(|message| DataApiError::decode(column, message))
}

fn decode_array(
    array: ArrayValue,
    declared: SqlType,
    engine: Engine,
    column: &str,
) -> Result<Value> {
    let fields: Vec<TypedValue> = match array {
        ArrayValue::BooleanValues(values) => values.into_iter().map(TypedValue::Boolean).collect(),
        ArrayValue::LongValues(values) => values.into_iter().map(TypedValue::Long).collect(),
        ArrayValue::DoubleValues(values) => values.into_iter().map(TypedValue::Double).collect(),
        ArrayValue::StringValues(values) => values.into_iter().map(TypedValue::String).collect(),
        ArrayValue::ArrayValues(values) => values.into_iter().map(TypedValue::Array).collect(),
    };
    fields
        .into_iter()
        .map(|field| decode(field, declared, engine, column))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    let raw = raw.trim();
    Decimal::from_str_exact(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .or_else(|_| Decimal::from_str(raw))
        .map_err(|err| DataApiError::decode(column, format!("invalid decimal '{raw}': {err}")))
}
