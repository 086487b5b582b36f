//! Request execution for sable workers.
//!
//! Requests arrive by method name, are resolved to a registered [`MethodHandler`] by the
//! [`Dispatcher`], and are admitted into a [`RequestExecutionQueue`]. The queue serializes
//! mutating requests against the shared state and fans non-mutating ones out to a bounded
//! read pool.
//!
//! # Ordering
//!
//! One sequencer task per queue consumes items strictly in admission order:
//!
//! * a mutating item waits for every in-flight read, builds its context from the current
//!   state, and runs to completion (or cancellation) before the next item is looked at;
//! * a non-mutating item captures its snapshot on the sequencer, then materializes its
//!   context and runs inside the read pool while the sequencer moves on.
//!
//! A read therefore always observes the effect of every mutation admitted before it, and no
//! read admitted after a mutation can observe the state before it.
//!
//! # Failures
//!
//! Errors of non-mutating items only reach that item's [`RequestHandle`]. A mutating item that
//! fails (while building its context, or in its handler) faults the queue: the fault is
//! recorded, [`QueueState::Faulted`] is published, and every later admission fails with
//! [`RequestError::QueueClosed`].
//!
//! A handler that panics is reported to its caller as [`HandlerError::Failed`] and is
//! otherwise treated like a handler that returned that error.

#![warn(missing_docs)]

mod context;
mod dispatcher;
mod error;
mod handle;
mod handler;
mod queue;
#[cfg(test)]
mod testing;
mod unwind;

pub use context::{ContextRequirement, ItemMeta, RequestContextFactory};
pub use dispatcher::{Dispatcher, HandlerRegistry, MethodDescriptor};
pub use error::{ContextError, HandlerError, QueueFault, RegistryError, RequestError};
pub use handle::RequestHandle;
pub use handler::{BoxFuture, MethodHandler};
pub use queue::{QueueConfig, QueueItem, QueueState, RequestExecutionQueue};
