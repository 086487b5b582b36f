//! Worker host for sable.
//!
//! A host owns a worker-side solution and serves workspace methods through a
//! [`RequestExecutionQueue`](sable_queue::RequestExecutionQueue). Requests either observe the
//! host's current solution or name a version pinned on the primary, which the host replicates
//! over the synchronization channel before the handler runs.
//!
//! [`HostEndpoint`] is the [`tower_service::Service`] callers talk to; [`PrimaryWorkspace`] is
//! the matching primary side for in-process pairs and tests.

#![warn(missing_docs)]

mod config;
mod context;
mod endpoint;
mod error;
pub mod handlers;
mod primary;

pub use config::{ConfigError, HostConfig};
pub use context::{WorkspaceContext, WorkspaceContextFactory, WorkspaceSnapshot};
pub use endpoint::{HostEndpoint, HostRequest};
pub use error::{ErrorCode, HostError};
pub use primary::PrimaryWorkspace;
