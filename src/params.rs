use std::collections::BTreeSet;

use crate::{codec, wire::SqlParameter, DataApiError, Engine, Result, Value};

/// Named parameters for one statement execution, in bind order.
///
/// Names can be provided with or without the `:` prefix. Binding a name
/// twice replaces the earlier value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    values: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds parameters from `(name, value)` pairs.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        pairs
            .into_iter()
            .fold(Self::new(), |params, (name, value)| params.bind(name, value))
    }

    /// Adds or replaces one parameter.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = normalize_name(name.into());
        let value = value.into();
        match self.values.iter().position(|(existing, _)| *existing == name) {
            Some(index) => self.values[index].1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.trim_start_matches(':');
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns `self` with every parameter of `overrides` bound on top.
    pub(crate) fn merged(mut self, overrides: Params) -> Self {
        for (name, value) in overrides.values {
            self.insert(name, value);
        }
        self
    }
}

fn normalize_name(name: String) -> String {
    match name.strip_prefix(':') {
        Some(stripped) => stripped.to_owned(),
        None => name,
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl<K: Into<String>> From<Vec<(K, Value)>> for Params {
    fn from(values: Vec<(K, Value)>) -> Self {
        Self::named(values)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Params {
    fn from(values: [(K, Value); N]) -> Self {
        Self::named(values)
    }
}

/// Parameters passed to an execution: none, one row, or a batch of rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Parameters {
    #[default]
    None,
    Single(Params),
    Batch(Vec<Params>),
}

impl From<()> for Parameters {
    fn from(_: ()) -> Self {
        Self::None
    }
}

impl From<Params> for Parameters {
    fn from(params: Params) -> Self {
        Self::Single(params)
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Value); N]> for Parameters {
    fn from(values: [(K, Value); N]) -> Self {
        Self::Single(Params::named(values))
    }
}

impl From<Vec<Params>> for Parameters {
    fn from(rows: Vec<Params>) -> Self {
        Self::Batch(rows)
    }
}

impl<const N: usize> From<[Params; N]> for Parameters {
    fn from(rows: [Params; N]) -> Self {
        Self::Batch(rows.into())
    }
}

impl From<Option<Params>> for Parameters {
    fn from(params: Option<Params>) -> Self {
        params.map_or(Self::None, Self::Single)
    }
}

/// SQL text plus any parameters bound by a statement compiler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    /// Parameters produced by compilation; caller parameters are bound on top.
    pub bound: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bound: Params::default(),
        }
    }

    /// A pre-compiled statement with its bound parameters.
    pub fn compiled(sql: impl Into<String>, bound: impl Into<Params>) -> Self {
        Self {
            sql: sql.into(),
            bound: bound.into(),
        }
    }

    /// Combines compiled parameters with caller parameters.
    pub(crate) fn resolve(self, parameters: Parameters) -> (String, Parameters) {
        if self.bound.is_empty() {
            return (self.sql, parameters);
        }
        let bound = self.bound;
        let parameters = match parameters {
            Parameters::None => Parameters::Single(bound),
            Parameters::Single(params) => Parameters::Single(bound.merged(params)),
            Parameters::Batch(rows) => Parameters::Batch(
                rows.into_iter()
                    .map(|row| bound.clone().merged(row))
                    .collect(),
            ),
        };
        (self.sql, parameters)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

impl From<&String> for Statement {
    fn from(sql: &String) -> Self {
        Self::new(sql.as_str())
    }
}

/// Turns a query-builder construct into SQL text plus bound parameters.
///
/// Implement this for ORM or query-builder types to pass them straight to
/// [`DataApi::execute`](crate::DataApi::execute) via [`Statement`].
pub trait CompileStatement {
    fn compile(&self, engine: Engine) -> Result<Statement>;
}

impl CompileStatement for Statement {
    fn compile(&self, _engine: Engine) -> Result<Statement> {
        Ok(self.clone())
    }
}

/// Encodes one row of parameters, preserving the caller's order.
pub fn build_parameters(params: &Params, engine: Engine) -> Result<Vec<SqlParameter>> {
    params
        .iter()
        .map(|(name, value)| -> Result<SqlParameter> {
            Ok(SqlParameter {
                name: name.to_owned(),
                value: codec::encode(value, engine)?,
                type_hint: engine.type_hint(value),
            })
        })
        .collect()
}

/// Encodes a batch of rows after checking they all bind the same names.
///
/// The service rejects ragged parameter sets, so a row whose name set differs
/// from row 0 fails with [`DataApiError::InconsistentBatchColumns`]. Order
/// within a row may differ.
pub fn build_batch(rows: &[Params], engine: Engine) -> Result<Vec<Vec<SqlParameter>>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let expected: BTreeSet<&str> = first.names().collect();

    for (row_index, row) in rows.iter().enumerate().skip(1) {
        let found: BTreeSet<&str> = row.names().collect();
        if found != expected {
            return Err(DataApiError::InconsistentBatchColumns {
                row_index,
                expected: expected.iter().map(|name| (*name).to_owned()).collect(),
                found: found.iter().map(|name| (*name).to_owned()).collect(),
            });
        }
    }

    rows.iter()
        .map(|row| build_parameters(row, engine))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{build_batch, build_parameters, Parameters, Params, Statement};
    use crate::{
        wire::{TypeHint, TypedValue},
        DataApiError, Engine, Value,
    };

    #[test]
    fn named_builder_strips_prefix_and_replaces() {
        let params = Params::new().bind(":id", 1).bind("name", "kit").bind("id", 2);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some(&Value::Int(2)));
        assert_eq!(params.get(":name"), Some(&Value::text("kit")));
        assert_eq!(params.names().collect::<Vec<_>>(), ["id", "name"]);
    }

    #[test]
    fn build_preserves_order_and_hints() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 2).expect("date");
        let params = Params::new()
            .bind("int", 1)
            .bind("float", 1.2)
            .bind("str", "str")
            .bind("bytes", b"bytes".to_vec())
            .bind("bool", true)
            .bind("none", Value::Null)
            .bind("date", date);
        let built = build_parameters(&params, Engine::MySql).expect("build");

        let names: Vec<_> = built.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["int", "float", "str", "bytes", "bool", "none", "date"]
        );
        assert_eq!(built[0].value, TypedValue::Long(1));
        assert_eq!(built[5].value, TypedValue::Null(true));
        assert_eq!(built[0].type_hint, None);
        assert_eq!(built[6].type_hint, Some(TypeHint::Date));
        assert_eq!(built[6].value, TypedValue::String("2020-01-02".to_owned()));
    }

    #[test]
    fn batch_rejects_ragged_rows() {
        let rows = [
            Params::new().bind("a", 1).bind("b", 2),
            Params::new().bind("a", 3),
        ];
        let err = build_batch(&rows, Engine::MySql).expect_err("must fail");
        match err {
            DataApiError::InconsistentBatchColumns {
                row_index,
                expected,
                found,
            } => {
                assert_eq!(row_index, 1);
                assert_eq!(expected, ["a", "b"]);
                assert_eq!(found, ["a"]);
            }
            other => panic!("expected inconsistent batch error, got {other:?}"),
        }
    }

    #[test]
    fn batch_allows_reordered_rows() {
        let rows = [
            Params::new().bind("id", 3).bind("name", "bird"),
            Params::new().bind("name", "lion").bind("id", 4),
        ];
        let built = build_batch(&rows, Engine::PostgreSql).expect("build");
        assert_eq!(built.len(), 2);
        assert_eq!(built[1][0].name, "name");
        assert_eq!(built[1][1].value, TypedValue::Long(4));
    }

    #[test]
    fn batch_surfaces_encode_errors() {
        let rows = [Params::new().bind("x", f64::NAN)];
        let err = build_batch(&rows, Engine::MySql).expect_err("must fail");
        assert!(matches!(err, DataApiError::UnsupportedType(_)));
    }

    #[test]
    fn compiled_parameters_are_overridden_by_caller() {
        let statement = Statement::compiled(
            "UPDATE pets SET name = :name WHERE id = :id",
            Params::new().bind("id", 1).bind("name", "cat"),
        );
        let (sql, parameters) = statement.resolve(Params::new().bind("name", "dog").into());
        assert!(sql.starts_with("UPDATE"));
        match parameters {
            Parameters::Single(params) => {
                assert_eq!(params.get("id"), Some(&Value::Int(1)));
                assert_eq!(params.get("name"), Some(&Value::text("dog")));
            }
            other => panic!("expected single row, got {other:?}"),
        }
    }

    #[test]
    fn parameters_conversions() {
        assert_eq!(Parameters::from(()), Parameters::None);
        assert!(matches!(
            Parameters::from([("id", Value::Int(1))]),
            Parameters::Single(_)
        ));
        assert!(matches!(
            Parameters::from(vec![Params::new(), Params::new()]),
            Parameters::Batch(rows) if rows.len() == 2
        ));
    }
}
