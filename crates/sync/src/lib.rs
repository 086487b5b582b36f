//! Synchronization channel between a primary process and a worker process.
//!
//! The worker never receives whole solutions. It receives a [`ScopeId`](sable_assets::ScopeId)
//! naming a pinned version on the primary, and asks for exactly the checksums it does not have
//! yet:
//!
//! * [`AssetProvider`] (primary) answers [`AssetRequest`] frames out of an
//!   [`AssetStore`](sable_assets::AssetStore), restricted to the requested scope.
//! * [`AssetClient`] (worker) performs one round trip at a time over a byte stream and checks
//!   counts and checksums of what comes back.
//! * [`AssetCache`] mirrors received assets by checksum.
//! * [`SolutionReplicator`] walks a root manifest level by level and rebuilds a
//!   [`Solution`](sable_assets::Solution), fetching only cache misses.
//!
//! See [`codec`] for the frame layout.

#![warn(missing_docs)]

mod cache;
mod client;
pub mod codec;
mod error;
mod provider;
mod replicator;

pub use cache::AssetCache;
pub use client::{AssetClient, SyncConfig};
pub use codec::AssetRequest;
pub use error::{Result, SyncError};
pub use provider::AssetProvider;
pub use replicator::SolutionReplicator;
