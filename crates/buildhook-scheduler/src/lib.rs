//! Task queue and workers for buildhook.
//!
//! Tasks live in PostgreSQL and are claimed with `FOR UPDATE SKIP LOCKED`, so
//! any number of workers can poll the same table. A claimed task is run
//! through the [`Dispatcher`](buildhook_handlers::Dispatcher).

pub mod error;
pub mod queue;
pub mod worker;

pub use error::QueueError;
pub use queue::{QueuedTask, TaskQueue, TaskSource};
pub use worker::{DEFAULT_STALE_AFTER_SECS, DispatcherSource, Worker, payload_project};
