use crate::{DataApiError, Engine, Result};

/// Configures the HTTP transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HttpOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Identifies the cluster, credentials and database every call targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataApiConfig {
    /// ARN of the Aurora cluster.
    pub resource_arn: String,
    /// ARN of the Secrets Manager secret holding the database credentials.
    pub secret_arn: String,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// Engine of the cluster; selects temporal decode rules.
    pub engine: Engine,
    /// Keep running statements that outlive the HTTP call timeout.
    pub continue_after_timeout: bool,
    /// Existing transaction to attach statements to.
    pub transaction_id: Option<String>,
}

impl DataApiConfig {
    pub fn new(resource_arn: impl Into<String>, secret_arn: impl Into<String>) -> Self {
        Self {
            resource_arn: resource_arn.into(),
            secret_arn: secret_arn.into(),
            database: None,
            schema: None,
            engine: Engine::default(),
            continue_after_timeout: true,
            transaction_id: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_continue_after_timeout(mut self, enabled: bool) -> Self {
        self.continue_after_timeout = enabled;
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Reads configuration from the environment.
    ///
    /// Reads:
    /// - `DATA_API_RESOURCE_ARN` (required)
    /// - `DATA_API_SECRET_ARN` (required)
    /// - `DATA_API_DATABASE`, `DATA_API_SCHEMA` (optional)
    /// - `DATA_API_ENGINE`: `mysql` or `postgresql` (default `mysql`)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            let value = lookup(key)
                .ok_or_else(|| {
                    DataApiError::Config(format!("missing {key} environment variable"))
                })?;
            if value.trim().is_empty() {
                return Err(DataApiError::Config(format!("{key} is set but empty")));
            }
            Ok(value)
        };
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = Self::new(
            required("DATA_API_RESOURCE_ARN")?,
            required("DATA_API_SECRET_ARN")?,
        );
        config.database = optional("DATA_API_DATABASE");
        config.schema = optional("DATA_API_SCHEMA");
        if let Some(engine) = optional("DATA_API_ENGINE") {
            config.engine = engine.parse()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::DataApiConfig;
    use crate::{DataApiError, Engine};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn builder_defaults() {
        let config = DataApiConfig::new("arn:aws:rds:dummy", "dummy").with_database("test");
        assert_eq!(config.database.as_deref(), Some("test"));
        assert_eq!(config.engine, Engine::MySql);
        assert!(config.continue_after_timeout);
        assert!(config.transaction_id.is_none());
    }

    #[test]
    fn env_requires_arns() {
        let err = DataApiConfig::from_lookup(lookup(&[("DATA_API_SECRET_ARN", "s")]))
            .expect_err("must fail");
        assert!(matches!(err, DataApiError::Config(message) if message.contains("RESOURCE_ARN")));

        let err = DataApiConfig::from_lookup(lookup(&[
            ("DATA_API_RESOURCE_ARN", " "),
            ("DATA_API_SECRET_ARN", "s"),
        ]))
        .expect_err("must fail");
        assert!(matches!(err, DataApiError::Config(_)));
    }

    #[test]
    fn env_reads_optional_values() {
        let config = DataApiConfig::from_lookup(lookup(&[
            ("DATA_API_RESOURCE_ARN", "arn"),
            ("DATA_API_SECRET_ARN", "secret"),
            ("DATA_API_DATABASE", "test"),
            ("DATA_API_ENGINE", "postgresql"),
        ]))
        .expect("config");
        assert_eq!(config.database.as_deref(), Some("test"));
        assert_eq!(config.schema, None);
        assert_eq!(config.engine, Engine::PostgreSql);
    }
}
