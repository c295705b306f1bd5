//! `rds-data-api` is an async client for the Amazon Aurora Data API.
//!
//! The crate turns Rust values into the Data API's typed parameter model,
//! decodes typed result rows back into [`Record`]s and drives transactions:
//! - [`DataApi::execute`] for single statements and batches
//! - [`DataApi::begin`] and [`Transaction`] for explicit transactions
//! - [`DataApi::transaction`] / [`Transaction::scope`] for scoped blocks
//!
//! Network access goes through the [`ExecutionService`] trait;
//! [`HttpExecutionService`] implements it over HTTPS.

mod api;
mod client;
mod codec;
mod decode;
mod engine;
mod error;
mod options;
mod params;
mod service;
mod transaction;
mod types;
mod value;

pub mod wire;

pub use api::DataApi;
pub use client::{region_to_endpoint, HttpExecutionService};
pub use codec::{decode, encode};
pub use decode::{decode_batch_result, decode_result};
pub use engine::{Engine, SqlType};
pub use error::DataApiError;
pub use options::{DataApiConfig, HttpOptions};
pub use params::{build_batch, build_parameters, CompileStatement, Parameters, Params, Statement};
pub use service::ExecutionService;
pub use transaction::{RollbackTrigger, ScopeFuture, Transaction, TransactionState};
pub use types::{Record, ResultSet, UpdateResult};
pub use value::Value;
pub use wire::{ArrayValue, ColumnMetadata, SqlParameter, TypeHint, TypedValue};

pub type Result<T> = std::result::Result<T, DataApiError>;
