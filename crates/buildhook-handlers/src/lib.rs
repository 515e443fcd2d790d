//! Event dispatch and build lifecycle handling for buildhook.
//!
//! An inbound [`Event`](buildhook_core::event::Event) is matched against the
//! jobs of a package config by the [`Dispatcher`]. Each matching job runs its
//! [`checker`] chain and, when every checker passes, its handler:
//!
//! - [`handler::BuildHandler`] submits builds
//! - [`handler::BuildStartHandler`] and [`handler::BuildEndHandler`] drive the
//!   [`tracker`] state machine from build-service callbacks
//!
//! Successful target builds fan out test jobs ([`fanout`]) and may trigger a
//! differential scan ([`scan`]).

pub mod best_effort;
pub mod checker;
pub mod context;
pub mod dispatch;
pub mod fanout;
pub mod handler;
pub mod reporter;
pub mod result;
pub mod scan;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use best_effort::run_best_effort;
pub use context::{HandlerContext, JobRun};
pub use dispatch::Dispatcher;
pub use result::{HandlerError, TaskResults};
