use crate::TransactionState;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DataApiError {
    /// Host value has no representation in the Data API value model.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    /// Raw field could not be decoded as its declared column type.
    #[error("decode error in column '{column}': {message}")]
    Decode { column: String, message: String },
    /// Batch rows do not bind the same set of parameter names.
    #[error(
        "inconsistent batch columns at row {row_index}: expected {expected:?}, found {found:?}"
    )]
    InconsistentBatchColumns {
        /// Index of the first divergent row.
        row_index: usize,
        /// Parameter names of row 0.
        expected: Vec<String>,
        /// Parameter names of the divergent row.
        found: Vec<String>,
    },
    /// Name access on a record decoded without column metadata.
    #[error("record has no column metadata; request column names to use name access")]
    NoColumnMetadata,
    /// Name access with a column label that is not part of the result.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("no record found")]
    NoRecordFound,
    #[error("multiple records found ({0}) where one was expected")]
    MultipleRecordsFound(usize),
    /// Operation is not allowed in the current transaction state.
    #[error("cannot {operation} a transaction in state {state:?}")]
    InvalidTransactionState {
        operation: &'static str,
        state: TransactionState,
    },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with the raw error body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Fault raised by an execution service implementation.
    #[error("execution service fault: {0}")]
    Service(String),
    /// Service response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DataApiError {
    /// Returns `true` for faults passed through from the execution service
    /// (transport, HTTP status, service-reported and malformed responses).
    pub fn is_service_fault(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Http { .. } | Self::Service(_) | Self::InvalidResponse(_)
        )
    }

    pub(crate) fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }
}
