use std::{fmt, sync::Arc};

use crate::{
    decode::{decode_batch_result, decode_result},
    params::{build_batch, build_parameters},
    transaction::ScopeFuture,
    wire::{BatchExecuteStatementRequest, ExecuteStatementRequest},
    CompileStatement, DataApiConfig, DataApiError, Engine, ExecutionService,
    HttpExecutionService, Parameters, Params, Result, ResultSet, RollbackTrigger, Statement,
    Transaction,
};

/// Client for one Aurora cluster through the Data API.
///
/// Cloning is cheap; clones share the execution service and configuration.
#[derive(Clone)]
pub struct DataApi {
    service: Arc<dyn ExecutionService>,
    config: Arc<DataApiConfig>,
    trigger: RollbackTrigger,
}

impl fmt::Debug for DataApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataApi")
            .field("config", &self.config)
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

impl DataApi {
    pub fn new(service: impl ExecutionService + 'static, config: DataApiConfig) -> Self {
        Self::from_shared(Arc::new(service), config)
    }

    pub fn from_shared(service: Arc<dyn ExecutionService>, config: DataApiConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
            trigger: RollbackTrigger::default(),
        }
    }

    /// Builds an HTTP-backed client from `DATA_API_*` environment variables.
    ///
    /// See [`HttpExecutionService::from_env`] and [`DataApiConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(
            HttpExecutionService::from_env()?,
            DataApiConfig::from_env()?,
        ))
    }

    /// Sets the trigger used by scoped transactions started from this client.
    pub fn with_rollback_trigger(mut self, trigger: RollbackTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn config(&self) -> &DataApiConfig {
        &self.config
    }

    pub fn engine(&self) -> Engine {
        self.config.engine
    }

    pub fn rollback_trigger(&self) -> &RollbackTrigger {
        &self.trigger
    }

    pub(crate) fn service(&self) -> &dyn ExecutionService {
        self.service.as_ref()
    }

    /// Executes SQL text or a [`Statement`].
    ///
    /// A single row of parameters runs one `ExecuteStatement`; a batch runs one
    /// `BatchExecuteStatement` and summarizes the update count and generated
    /// keys. With `with_columns` the result carries column metadata and
    /// records support name access.
    ///
    /// Statements join the configured transaction id, if any.
    pub async fn execute(
        &self,
        statement: impl Into<Statement>,
        parameters: impl Into<Parameters>,
        with_columns: bool,
    ) -> Result<ResultSet> {
        self.run(
            statement.into(),
            parameters.into(),
            with_columns,
            self.config.transaction_id.clone(),
        )
        .await
    }

    /// Compiles a query-builder construct for this engine and executes it.
    pub async fn execute_compiled<C: CompileStatement + ?Sized>(
        &self,
        compiled: &C,
        parameters: impl Into<Parameters>,
        with_columns: bool,
    ) -> Result<ResultSet> {
        let statement = compiled.compile(self.engine())?;
        self.execute(statement, parameters, with_columns).await
    }

    /// Starts a new transaction.
    pub async fn begin(&self) -> Result<Transaction> {
        let mut transaction = Transaction::new(self.clone());
        transaction.begin().await?;
        Ok(transaction)
    }

    /// A controller in `NotStarted`, or `Open` on the configured transaction id.
    pub fn transaction_controller(&self) -> Transaction {
        match &self.config.transaction_id {
            Some(transaction_id) => Transaction::resume(self.clone(), transaction_id.clone()),
            None => Transaction::new(self.clone()),
        }
    }

    /// Adopts a transaction begun elsewhere, for example by another process.
    pub fn resume_transaction(&self, transaction_id: impl Into<String>) -> Transaction {
        Transaction::resume(self.clone(), transaction_id.into())
    }

    /// Runs `body` in a transaction; see [`Transaction::scope`].
    ///
    /// The controller is dropped on return. When a narrowed trigger or a
    /// failed rollback leaves the transaction open, use
    /// [`DataApi::transaction_controller`] and `scope` instead to keep hold
    /// of it.
    pub async fn transaction<F, T, E>(&self, body: F) -> std::result::Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> ScopeFuture<'t, std::result::Result<T, E>>,
        E: From<DataApiError> + 'static,
    {
        let mut transaction = self.transaction_controller();
        transaction.scope(body).await
    }

    pub(crate) async fn run(
        &self,
        statement: Statement,
        parameters: Parameters,
        with_columns: bool,
        transaction_id: Option<String>,
    ) -> Result<ResultSet> {
        let (sql, parameters) = statement.resolve(parameters);
        match parameters {
            Parameters::None => {
                self.run_single(sql, &Params::default(), with_columns, transaction_id)
                    .await
            }
            Parameters::Single(params) => {
                self.run_single(sql, &params, with_columns, transaction_id)
                    .await
            }
            Parameters::Batch(rows) => self.run_batch(sql, &rows, transaction_id).await,
        }
    }

    async fn run_single(
        &self,
        sql: String,
        params: &Params,
        with_columns: bool,
        transaction_id: Option<String>,
    ) -> Result<ResultSet> {
        let engine = self.engine();
        let parameters = build_parameters(params, engine)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            sql_len = sql.len(),
            parameters = parameters.len(),
            transaction_id = ?transaction_id,
            "executing statement"
        );

        let request = ExecuteStatementRequest {
            resource_arn: self.config.resource_arn.clone(),
            secret_arn: self.config.secret_arn.clone(),
            sql,
            database: self.config.database.clone(),
            schema: self.config.schema.clone(),
            parameters,
            transaction_id,
            include_result_metadata: with_columns,
            continue_after_timeout: self.config.continue_after_timeout,
        };
        let response = self.service.execute_statement(request).await?;
        decode_result(response, with_columns, engine)
    }

    async fn run_batch(
        &self,
        sql: String,
        rows: &[Params],
        transaction_id: Option<String>,
    ) -> Result<ResultSet> {
        let engine = self.engine();
        let parameter_sets = build_batch(rows, engine)?;
        if parameter_sets.is_empty() {
            return Ok(ResultSet {
                number_of_records_updated: Some(0),
                ..ResultSet::default()
            });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            sql_len = sql.len(),
            rows = parameter_sets.len(),
            transaction_id = ?transaction_id,
            "executing batch"
        );

        let request = BatchExecuteStatementRequest {
            resource_arn: self.config.resource_arn.clone(),
            secret_arn: self.config.secret_arn.clone(),
            sql,
            database: self.config.database.clone(),
            schema: self.config.schema.clone(),
            parameter_sets,
            transaction_id,
        };
        let response = self.service.batch_execute_statement(request).await?;
        decode_batch_result(response, engine)
    }
}
