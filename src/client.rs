use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    wire::{
        BatchExecuteStatementRequest, BatchExecuteStatementResponse, BeginTransactionRequest,
        BeginTransactionResponse, EndTransactionRequest, EndTransactionResponse,
        ExecuteStatementRequest, ExecuteStatementResponse,
    },
    DataApiError, ExecutionService, HttpOptions, Result,
};

/// Formats a region into the public Data API endpoint.
///
/// Example: `"us-east-1"` → `"https://rds-data.us-east-1.amazonaws.com"`
pub fn region_to_endpoint(region: &str) -> String {
    format!("https://rds-data.{}.amazonaws.com", region.trim())
}

#[derive(Clone)]
/// [`ExecutionService`] speaking the Data API REST protocol over `reqwest`.
///
/// Each operation is a JSON `POST` to `<endpoint>/<Operation>`. Request
/// signing is not performed here: pass a pre-computed `Authorization` value
/// or point the endpoint at a signing proxy.
pub struct HttpExecutionService {
    http: reqwest::Client,
    endpoint: String,
    authorization: Option<String>,
    options: HttpOptions,
}

impl fmt::Debug for HttpExecutionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpExecutionService")
            .field("endpoint", &self.endpoint)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("options", &self.options)
            .finish()
    }
}

impl HttpExecutionService {
    /// Creates a service for an endpoint base URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            authorization: None,
            options: HttpOptions::default(),
        }
    }

    /// Creates a service for the public endpoint of an AWS region.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rds_data_api::HttpExecutionService;
    ///
    /// let service = HttpExecutionService::for_region("us-east-1");
    /// ```
    pub fn for_region(region: impl AsRef<str>) -> Self {
        Self::new(region_to_endpoint(region.as_ref()))
    }

    /// Creates a service from environment variables.
    ///
    /// Reads:
    /// - `DATA_API_ENDPOINT`: endpoint base URL (required)
    /// - `DATA_API_AUTHORIZATION`: raw `Authorization` header value (optional)
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("DATA_API_ENDPOINT").map_err(|_| {
            DataApiError::Config("missing DATA_API_ENDPOINT environment variable".to_owned())
        })?;
        if endpoint.trim().is_empty() {
            return Err(DataApiError::Config(
                "DATA_API_ENDPOINT is set but empty".to_owned(),
            ));
        }
        let service = Self::new(endpoint);
        Ok(match std::env::var("DATA_API_AUTHORIZATION") {
            Ok(value) if !value.trim().is_empty() => service.with_authorization(value),
            _ => service,
        })
    }

    /// Sends this value as the `Authorization` header of every request.
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Applies transport options such as the request timeout.
    pub fn with_options(mut self, opts: HttpOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_json<Req, Resp>(&self, operation: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{operation}", self.endpoint);

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "sending data api request");

        let mut request = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(self.options.timeout_ms))
            .json(payload);
        if let Some(authorization) = &self.authorization {
            request = request.header(header::AUTHORIZATION, authorization);
        }

        let response = request.send().await.map_err(DataApiError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(DataApiError::Transport)?;

        if !status.is_success() {
            #[cfg(feature = "tracing")]
            tracing::debug!(status = status.as_u16(), "data api request failed");

            return Err(DataApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<Resp>(&body).map_err(|err| {
            DataApiError::InvalidResponse(format!(
                "invalid {operation} response JSON: {err}; body: {body}"
            ))
        })
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse> {
        self.post_json("BeginTransaction", &request).await
    }

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> Result<ExecuteStatementResponse> {
        self.post_json("Execute", &request).await
    }

    async fn batch_execute_statement(
        &self,
        request: BatchExecuteStatementRequest,
    ) -> Result<BatchExecuteStatementResponse> {
        self.post_json("BatchExecute", &request).await
    }

    async fn commit_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse> {
        self.post_json("CommitTransaction", &request).await
    }

    async fn rollback_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse> {
        self.post_json("RollbackTransaction", &request).await
    }
}
