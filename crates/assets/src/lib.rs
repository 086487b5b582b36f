//! Content-addressed state for sable.
//!
//! A [`Solution`] is published as a graph of immutable [`Asset`]s, each identified by its
//! [`Checksum`]. The root of the graph is a [`SolutionManifest`]; project manifests hang off it
//! and reference the leaf assets (document texts, reference lists, compilation options).
//!
//! The primary process keeps graphs in an [`AssetStore`]. Requests pin the version they run
//! against through a [`PinnedScope`]; a version's assets stay resolvable until its last pin is
//! released and it is no longer the primary root.

#![warn(missing_docs)]

mod asset;
mod checksum;
mod error;
mod manifest;
mod scope;
mod solution;
mod store;

pub use asset::{Asset, AssetKind};
pub use checksum::{Checksum, ParseChecksumError};
pub use error::{AssetError, Result};
pub use manifest::{DocumentEntry, ProjectEntry, ProjectManifest, SolutionManifest};
pub use scope::{PinnedScope, ScopeId};
pub use solution::{CompilationOptions, Document, DocumentId, Project, ProjectId, Solution, StateGraph};
pub use store::{AssetResolver, AssetStore};
