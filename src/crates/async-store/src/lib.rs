//! # async-store - Lifecycle tracking for asynchronous operations
//!
//! One consistent, queryable container for the lifecycle of many concurrent
//! asynchronous operations.
//!
//! ## Core Concepts
//!
//! - [`AsyncRecord`] - tracked state of one operation: id, type, status,
//!   timestamps, payload and result
//! - [`AsyncStore`] - keyed collection of records with a never-failing
//!   transition function ([`AsyncStore::apply`], [`reduce`])
//! - [`AsyncActionService`] - cloneable facade that stamps time and submits
//!   transitions to a single owning task, plus per-id subscriptions via
//!   [`AsyncActionService::select`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_store::{AsyncActionService, ResolvedStatus, StoreConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> async_store::Result<()> {
//!     let actions = AsyncActionService::spawn(StoreConfig::default());
//!
//!     actions.create("op1", "fetch", Some(json!({"url": "/users"})))?;
//!     actions.start("op1")?;
//!     actions.resolve_success("op1", Some(json!(42)))?;
//!
//!     let record = actions.get("op1").await?.expect("record exists");
//!     assert_eq!(record.outcome(), Some(ResolvedStatus::Success));
//!     Ok(())
//! }
//! ```
//!
//! Errors of the tracked work are data: they are stored as the record's
//! `result` with [`ResolvedStatus::Error`]. [`StoreError`] only reports a
//! stopped store task or configuration problems.

pub mod config;
pub mod error;
pub mod record;
pub mod service;
pub mod store;
pub mod transition;

pub use config::{FromEnv, StoreConfig, ValidateConfig};
pub use error::{Result, StoreError};
pub use record::{now_ms, AsyncRecord, AsyncStatus, ResolvedStatus, Timestamp};
pub use service::{AsyncActionService, RecordStream};
pub use store::AsyncStore;
pub use transition::{reduce, Transition};
