use std::sync::Arc;

use async_trait::async_trait;
use sable_assets::{DocumentId, ScopeId};
use tokio_util::sync::CancellationToken;

use crate::ContextError;

/// Which state a request needs to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRequirement {
	/// The handler runs without a context.
	None,
	/// The current worker-side state.
	Latest,
	/// The exact version pinned by the primary for this request.
	Pinned {
		/// Pinned version on the primary.
		scope: ScopeId,
		/// True if the version is the primary branch rather than a fork.
		primary: bool,
	},
}

/// Per-item metadata visible to the context factory and to logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMeta {
	/// Queue-assigned id, unique per queue, increasing in admission order.
	pub id: u64,
	/// Method name.
	pub method: Arc<str>,
	/// True if the item may mutate shared state.
	pub mutates: bool,
	/// State the handler needs.
	pub requirement: ContextRequirement,
	/// Document the request targets, if any.
	pub document: Option<DocumentId>,
}

/// Builds request contexts for the queue.
///
/// Context construction is split in two so ordering never depends on I/O:
///
/// * [`capture`](Self::capture) runs on the sequencer, in admission order, and must not
///   suspend. It records which version of the state the item will see.
/// * [`materialize`](Self::materialize) may suspend (for a synchronization round trip) and turns
///   the captured snapshot into the context the handler owns. For non-mutating items it runs
///   concurrently with later items.
///
/// Neither is called for items with [`ContextRequirement::None`].
#[async_trait]
pub trait RequestContextFactory: Send + Sync + 'static {
	/// Cheap token naming the state version an item will observe.
	type Snapshot: Send + 'static;
	/// Context handed to the handler.
	type Context: Send + 'static;

	/// Records the state version for `meta`.
	fn capture(&self, meta: &ItemMeta) -> Result<Self::Snapshot, ContextError>;

	/// Builds the context from a captured snapshot.
	///
	/// Returns `Ok(None)` when the target no longer resolves in that version.
	async fn materialize(
		&self,
		snapshot: Self::Snapshot,
		meta: &ItemMeta,
		cancel: &CancellationToken,
	) -> Result<Option<Self::Context>, ContextError>;
}
