//! Transaction lifecycle against the execution service.
//!
//! A [`Transaction`] moves `NotStarted → Open → {Committed, RolledBack}`.
//! Terminal states are absorbing: a finished controller rejects every further
//! operation and a new transaction needs a new controller.
//!
//! [`Transaction::scope`] runs a block inside the transaction and releases it
//! on every exit path. What the release does depends only on how the block
//! exited and on the configured [`RollbackTrigger`]:
//!
//! | exit                          | action      |
//! |-------------------------------|-------------|
//! | `Ok`                          | commit      |
//! | `Err` matching the trigger    | rollback    |
//! | `Err` not matching            | none        |
//! | panic, trigger is any error   | rollback    |
//! | panic, narrower trigger       | none        |
//!
//! An error that does not match a narrowed trigger propagates with the
//! transaction still **open**. Finishing it is then the caller's job, through
//! the controller it still holds.

use std::{
    any::Any,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use crate::{
    wire::{BeginTransactionRequest, EndTransactionRequest},
    CompileStatement, DataApi, DataApiError, Parameters, Result, ResultSet, Statement,
};

/// Boxed future returned by a scoped transaction block.
pub type ScopeFuture<'t, T> = Pin<Box<dyn Future<Output = T> + Send + 't>>;

/// Lifecycle state of a [`Transaction`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    NotStarted,
    Open,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

type ErrorMatcher = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Selects which errors leaving a scoped block cause a rollback.
///
/// The default rolls back on any error and on panics.
#[derive(Clone, Default)]
pub struct RollbackTrigger {
    matcher: Option<ErrorMatcher>,
}

impl RollbackTrigger {
    /// Roll back on every error.
    pub fn any_error() -> Self {
        Self::default()
    }

    /// Roll back only when the block's error type is `X`.
    pub fn on<X: Any>() -> Self {
        Self::matching::<X>(|_| true)
    }

    /// Roll back only when the block's error is an `X` accepted by `predicate`.
    ///
    /// ```
    /// use rds_data_api::{DataApiError, RollbackTrigger};
    ///
    /// let trigger = RollbackTrigger::matching(DataApiError::is_service_fault);
    /// assert!(!trigger.is_any_error());
    /// ```
    pub fn matching<X: Any>(predicate: impl Fn(&X) -> bool + Send + Sync + 'static) -> Self {
        Self {
            matcher: Some(Arc::new(move |error: &dyn Any| {
                error.downcast_ref::<X>().is_some_and(&predicate)
            })),
        }
    }

    pub fn is_any_error(&self) -> bool {
        self.matcher.is_none()
    }

    pub fn matches(&self, error: &dyn Any) -> bool {
        match &self.matcher {
            Some(matcher) => matcher(error),
            None => true,
        }
    }
}

impl fmt::Debug for RollbackTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.matcher {
            Some(_) => f.write_str("RollbackTrigger::Matching"),
            None => f.write_str("RollbackTrigger::AnyError"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ExitReason<'a> {
    Completed,
    Failed(&'a dyn Any),
    Panicked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReleaseAction {
    Commit,
    Rollback,
    LeaveOpen,
}

fn release_action(exit: ExitReason<'_>, trigger: &RollbackTrigger) -> ReleaseAction {
    match exit {
        ExitReason::Completed => ReleaseAction::Commit,
        ExitReason::Failed(error) if trigger.matches(error) => ReleaseAction::Rollback,
        ExitReason::Failed(_) => ReleaseAction::LeaveOpen,
        ExitReason::Panicked if trigger.is_any_error() => ReleaseAction::Rollback,
        ExitReason::Panicked => ReleaseAction::LeaveOpen,
    }
}

/// Controller for one remote transaction.
///
/// Not meant for concurrent use: statements of one transaction are ordered by
/// the service, so every operation takes `&mut self`.
pub struct Transaction {
    api: DataApi,
    state: TransactionState,
    transaction_id: Option<String>,
    trigger: RollbackTrigger,
    scope_active: Arc<AtomicBool>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("transaction_id", &self.transaction_id)
            .field("trigger", &self.trigger)
            .finish()
    }
}

impl Transaction {
    pub(crate) fn new(api: DataApi) -> Self {
        let trigger = api.rollback_trigger().clone();
        Self {
            api,
            state: TransactionState::NotStarted,
            transaction_id: None,
            trigger,
            scope_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adopts a transaction that was begun elsewhere.
    pub(crate) fn resume(api: DataApi, transaction_id: String) -> Self {
        let mut transaction = Self::new(api);
        transaction.state = TransactionState::Open;
        transaction.transaction_id = Some(transaction_id);
        transaction
    }

    pub fn with_rollback_trigger(mut self, trigger: RollbackTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Token of the current transaction; kept after commit or rollback.
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Starts the remote transaction and returns its token.
    pub async fn begin(&mut self) -> Result<&str> {
        if self.state != TransactionState::NotStarted {
            return Err(self.invalid_state("begin"));
        }
        let config = self.api.config();
        let response = self
            .api
            .service()
            .begin_transaction(BeginTransactionRequest {
                resource_arn: config.resource_arn.clone(),
                secret_arn: config.secret_arn.clone(),
                database: config.database.clone(),
                schema: config.schema.clone(),
            })
            .await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(transaction_id = %response.transaction_id, "began transaction");

        self.state = TransactionState::Open;
        Ok(self.transaction_id.insert(response.transaction_id).as_str())
    }

    /// Runs a statement inside the transaction.
    ///
    /// Before `begin` the statement runs on its own without a token and is
    /// committed by the service.
    pub async fn execute(
        &mut self,
        statement: impl Into<Statement>,
        parameters: impl Into<Parameters>,
        with_columns: bool,
    ) -> Result<ResultSet> {
        let transaction_id = match self.state {
            TransactionState::NotStarted => None,
            TransactionState::Open => self.transaction_id.clone(),
            TransactionState::Committed | TransactionState::RolledBack => {
                return Err(self.invalid_state("execute"));
            }
        };
        self.api
            .run(statement.into(), parameters.into(), with_columns, transaction_id)
            .await
    }

    pub async fn execute_compiled<C: CompileStatement + ?Sized>(
        &mut self,
        compiled: &C,
        parameters: impl Into<Parameters>,
        with_columns: bool,
    ) -> Result<ResultSet> {
        let statement = compiled.compile(self.api.engine())?;
        self.execute(statement, parameters, with_columns).await
    }

    /// Commits and returns the service's transaction status.
    ///
    /// A failed commit call leaves the state `Open` so the caller can still
    /// roll back.
    pub async fn commit(&mut self) -> Result<String> {
        let request = self.end_request("commit")?;
        let response = self.api.service().commit_transaction(request).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            transaction_id = ?self.transaction_id,
            status = %response.transaction_status,
            "committed transaction"
        );

        self.state = TransactionState::Committed;
        Ok(response.transaction_status)
    }

    /// Rolls back and returns the service's transaction status.
    pub async fn rollback(&mut self) -> Result<String> {
        let request = self.end_request("rollback")?;
        let response = self.api.service().rollback_transaction(request).await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            transaction_id = ?self.transaction_id,
            status = %response.transaction_status,
            "rolled back transaction"
        );

        self.state = TransactionState::RolledBack;
        Ok(response.transaction_status)
    }

    /// Runs `body` inside the transaction and releases it afterwards.
    ///
    /// Entering begins the transaction when it has not started; an open
    /// (resumed) transaction is adopted as is. On exit the block is committed,
    /// rolled back or left open per the table in the [module docs](self).
    /// After a rollback the block's own error is returned and a panic is
    /// resumed. A block that finishes the transaction itself is not released
    /// again.
    ///
    /// If the rollback itself fails, the block's error is still what is
    /// returned and the transaction stays `Open` on this controller (check
    /// [`is_open`](Self::is_open)); the rollback fault is only logged.
    ///
    /// Scopes do not nest: entering a scope from inside another fails with
    /// [`DataApiError::InvalidTransactionState`]. A scope whose future is
    /// dropped before the block finishes leaves the transaction as the block
    /// left it, and the controller accepts a new scope.
    ///
    /// ```no_run
    /// # async fn run(api: rds_data_api::DataApi) -> rds_data_api::Result<()> {
    /// let mut transaction = api.transaction_controller();
    /// transaction
    ///     .scope(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("INSERT INTO pets (name) VALUES ('dog')", (), false)
    ///                 .await?;
    ///             Ok::<_, rds_data_api::DataApiError>(())
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scope<F, T, E>(&mut self, body: F) -> std::result::Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> ScopeFuture<'t, std::result::Result<T, E>>,
        E: From<DataApiError> + 'static,
    {
        if self.scope_active.load(Ordering::Acquire) {
            return Err(self.invalid_state("enter a nested scope in").into());
        }
        match self.state {
            TransactionState::NotStarted => {
                self.begin().await?;
            }
            TransactionState::Open => {}
            TransactionState::Committed | TransactionState::RolledBack => {
                return Err(self.invalid_state("enter a scope in").into());
            }
        }

        let guard = ScopeGuard::enter(&self.scope_active);
        let outcome = CatchUnwind(body(&mut *self)).await;
        drop(guard);

        let action = match &outcome {
            Ok(Ok(_)) => release_action(ExitReason::Completed, &self.trigger),
            Ok(Err(error)) => release_action(ExitReason::Failed(error), &self.trigger),
            Err(_) => release_action(ExitReason::Panicked, &self.trigger),
        };
        let released = self.release(action).await;

        match outcome {
            Ok(Ok(value)) => {
                released?;
                Ok(value)
            }
            Ok(Err(error)) => {
                if let Err(_release_error) = released {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %_release_error, "rollback after failed scope failed");
                }
                Err(error)
            }
            Err(payload) => {
                drop(released);
                panic::resume_unwind(payload)
            }
        }
    }

    async fn release(&mut self, action: ReleaseAction) -> Result<()> {
        if self.state != TransactionState::Open {
            return Ok(());
        }
        match action {
            ReleaseAction::Commit => self.commit().await.map(drop),
            ReleaseAction::Rollback => self.rollback().await.map(drop),
            ReleaseAction::LeaveOpen => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    transaction_id = ?self.transaction_id,
                    "scope exited with an error outside the rollback trigger; transaction left open"
                );
                Ok(())
            }
        }
    }

    fn end_request(&self, operation: &'static str) -> Result<EndTransactionRequest> {
        match (&self.state, &self.transaction_id) {
            (TransactionState::Open, Some(transaction_id)) => {
                let config = self.api.config();
                Ok(EndTransactionRequest {
                    resource_arn: config.resource_arn.clone(),
                    secret_arn: config.secret_arn.clone(),
                    transaction_id: transaction_id.clone(),
                })
            }
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn invalid_state(&self, operation: &'static str) -> DataApiError {
        DataApiError::InvalidTransactionState {
            operation,
            state: self.state,
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                transaction_id = ?self.transaction_id,
                "transaction dropped while still open"
            );
        }
    }
}

/// Marks a scope as active until dropped, including when the scope future is
/// cancelled mid-block.
struct ScopeGuard(Arc<AtomicBool>);

impl ScopeGuard {
    fn enter(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Resolves to `Err(payload)` when polling the inner future panics.
struct CatchUnwind<F>(F);

impl<F: Future + Unpin> Future for CatchUnwind<F> {
    type Output = std::thread::Result<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.0;
        match panic::catch_unwind(AssertUnwindSafe(|| Pin::new(inner).poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(output)) => Poll::Ready(Ok(output)),
            Err(payload) => Poll::Ready(Err(payload)),
        }
    }
}
