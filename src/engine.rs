use std::{fmt, str::FromStr};

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};

use crate::{wire::ColumnMetadata, DataApiError, TypeHint, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const FRACTION_FORMAT: &str = "%.6f";
const PARSE_TIME_FORMAT: &str = "%H:%M:%S%.f";
const PARSE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Database engine behind the Data API endpoint.
///
/// Both engines accept the same literal formats for temporal parameters.
/// They differ in what comes back: MySQL returns `YYYY-MM-DD HH:MM:SS[.f]`
/// (and a bare date for zero-time datetimes), while PostgreSQL may separate
/// date and time with `T`, trims the fractional second, and appends a zone
/// offset for `timestamptz`/`timetz` columns. Offsets are normalized to UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Engine {
    #[default]
    MySql,
    PostgreSql,
}

impl Engine {
    pub fn format_date(self, value: NaiveDate) -> String {
        value.format(DATE_FORMAT).to_string()
    }

    /// Formats a time as `HH:MM:SS[.ffffff]`, truncating to microseconds.
    pub fn format_time(self, value: NaiveTime) -> String {
        let mut out = value.format(TIME_FORMAT).to_string();
        if value.nanosecond() / 1_000 != 0 {
            let truncated = value
                .with_nanosecond(value.nanosecond() / 1_000 * 1_000)
                .unwrap_or(value);
            out.push_str(&truncated.format(FRACTION_FORMAT).to_string());
        }
        out
    }

    /// Formats a datetime as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
    pub fn format_datetime(self, value: NaiveDateTime) -> String {
        format!(
            "{} {}",
            self.format_date(value.date()),
            self.format_time(value.time())
        )
    }

    pub fn parse_date(self, raw: &str) -> Result<NaiveDate, String> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map_err(|err| format!("invalid date '{raw}': {err}"))
    }

    pub fn parse_time(self, raw: &str) -> Result<NaiveTime, String> {
        let trimmed = raw.trim();
        match self {
            Self::MySql => NaiveTime::parse_from_str(trimmed, PARSE_TIME_FORMAT)
                .map_err(|err| format!("invalid time '{trimmed}': {err}")),
            Self::PostgreSql => {
                let (local, offset) = split_offset(trimmed, 0)?;
                let time = NaiveTime::parse_from_str(local, PARSE_TIME_FORMAT)
                    .map_err(|err| format!("invalid time '{trimmed}': {err}"))?;
                match offset {
                    Some(offset) => {
                        let anchor = NaiveDate::from_ymd_opt(2000, 1, 1)
                            .ok_or_else(|| "invalid anchor date".to_owned())?
                            .and_time(time);
                        to_utc(anchor, offset, trimmed).map(|value| value.time())
                    }
                    None => Ok(time),
                }
            }
        }
    }

    pub fn parse_datetime(self, raw: &str) -> Result<NaiveDateTime, String> {
        let trimmed = raw.trim();
        match self {
            Self::MySql => parse_naive_datetime(trimmed),
            Self::PostgreSql => {
                let normalized = trimmed.replacen('T', " ", 1);
                let (local, offset) = split_offset(&normalized, DATE_FORMAT_LEN)?;
                let value = parse_naive_datetime(local)?;
                match offset {
                    Some(offset) => to_utc(value, offset, trimmed),
                    None => Ok(value),
                }
            }
        }
    }

    /// Type hint the service needs to cast the encoded form of `value`.
    pub fn type_hint(self, value: &Value) -> Option<TypeHint> {
        match value {
            Value::Decimal(_) => Some(TypeHint::Decimal),
            Value::Date(_) => Some(TypeHint::Date),
            Value::Time(_) => Some(TypeHint::Time),
            Value::DateTime(_) => Some(TypeHint::Timestamp),
            Value::Json(_) => Some(TypeHint::Json),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MySql => f.write_str("mysql"),
            Self::PostgreSql => f.write_str("postgresql"),
        }
    }
}

impl FromStr for Engine {
    type Err = DataApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "aurora-mysql" => Ok(Self::MySql),
            "postgresql" | "postgres" | "aurora-postgresql" => Ok(Self::PostgreSql),
            other => Err(DataApiError::Config(format!("unknown engine '{other}'"))),
        }
    }
}

const DATE_FORMAT_LEN: usize = "YYYY-MM-DD".len();

fn parse_naive_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    if let Ok(value) = NaiveDateTime::parse_from_str(raw, PARSE_DATETIME_FORMAT) {
        return Ok(value);
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| format!("invalid datetime '{raw}'"))
}

/// Splits a trailing zone offset (`Z`, `+HH`, `+HH:MM`, `+HHMM`) off `raw`,
/// looking only past `search_from` so date hyphens are not mistaken for it.
fn split_offset(raw: &str, search_from: usize) -> Result<(&str, Option<FixedOffset>), String> {
    if let Some(local) = raw.strip_suffix('Z') {
        return Ok((local, FixedOffset::east_opt(0)));
    }
    let Some(tail) = raw.get(search_from..) else {
        return Ok((raw, None));
    };
    let Some(position) = tail.rfind(['+', '-']) else {
        return Ok((raw, None));
    };
    let split = search_from + position;
    let (local, zone) = raw.split_at(split);
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid zone offset in '{raw}'"));
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.as_str(), "0"),
        4 => digits.split_at(2),
        _ => return Err(format!("invalid zone offset in '{raw}'")),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid zone offset in '{raw}'"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid zone offset in '{raw}'"))?;
    let offset = FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60))
        .ok_or_else(|| format!("zone offset out of range in '{raw}'"))?;
    Ok((local, Some(offset)))
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset, raw: &str) -> Result<NaiveDateTime, String> {
    offset
        .from_local_datetime(&local)
        .single()
        .map(|value| value.naive_utc())
        .ok_or_else(|| format!("ambiguous local time '{raw}'"))
}

/// Declared column type, as far as decoding cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SqlType {
    Boolean,
    Decimal,
    Date,
    Time,
    Timestamp,
    Json,
    Other,
}

impl SqlType {
    /// Classifies a column from its type name, falling back to the JDBC code.
    ///
    /// Array columns classify by their element type (`_date` type names or
    /// the array base column type).
    pub fn from_metadata(meta: &ColumnMetadata) -> Self {
        let name = meta
            .type_name
            .strip_prefix('_')
            .unwrap_or(&meta.type_name);
        match Self::from_type_name(name) {
            Self::Other => match Self::from_jdbc_code(meta.type_code) {
                Self::Other => Self::from_jdbc_code(meta.array_base_column_type),
                known => known,
            },
            known => known,
        }
    }

    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Boolean,
            "decimal" | "numeric" | "decimal unsigned" => Self::Decimal,
            "date" => Self::Date,
            "time" | "timetz" => Self::Time,
            "datetime" | "timestamp" | "timestamptz" => Self::Timestamp,
            "json" | "jsonb" => Self::Json,
            _ => Self::Other,
        }
    }

    pub fn from_jdbc_code(code: i32) -> Self {
        match code {
            -7 | 16 => Self::Boolean,
            2 | 3 => Self::Decimal,
            91 => Self::Date,
            92 | 2013 => Self::Time,
            93 | 2014 => Self::Timestamp,
            _ => Self::Other,
        }
    }
}
