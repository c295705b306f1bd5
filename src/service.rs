use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    wire::{
        BatchExecuteStatementRequest, BatchExecuteStatementResponse, BeginTransactionRequest,
        BeginTransactionResponse, EndTransactionRequest, EndTransactionResponse,
        ExecuteStatementRequest, ExecuteStatementResponse,
    },
    Result,
};

/// The remote Data API operations this crate drives.
///
/// [`HttpExecutionService`](crate::HttpExecutionService) talks to the real
/// endpoint; tests and alternative transports implement this directly.
/// Implementations report remote and transport failures as service faults
/// (see [`DataApiError::is_service_fault`](crate::DataApiError::is_service_fault))
/// and must not retry on their own.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse>;

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> Result<ExecuteStatementResponse>;

    async fn batch_execute_statement(
        &self,
        request: BatchExecuteStatementRequest,
    ) -> Result<BatchExecuteStatementResponse>;

    async fn commit_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse>;

    async fn rollback_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse>;
}

#[async_trait]
impl<S: ExecutionService + ?Sized> ExecutionService for Arc<S> {
    async fn begin_transaction(
        &self,
        request: BeginTransactionRequest,
    ) -> Result<BeginTransactionResponse> {
        (**self).begin_transaction(request).await
    }

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> Result<ExecuteStatementResponse> {
        (**self).execute_statement(request).await
    }

    async fn batch_execute_statement(
        &self,
        request: BatchExecuteStatementRequest,
    ) -> Result<BatchExecuteStatementResponse> {
        (**self).batch_execute_statement(request).await
    }

    async fn commit_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse> {
        (**self).commit_transaction(request).await
    }

    async fn rollback_transaction(
        &self,
        request: EndTransactionRequest,
    ) -> Result<EndTransactionResponse> {
        (**self).rollback_transaction(request).await
    }
}
