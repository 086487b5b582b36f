use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Checksum;
use crate::store::StoreState;

/// Wire identity of a pinned state version.
///
/// The generation changes every time a root is pinned from zero, so an id captured before the
/// version was released never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId {
	/// Root checksum of the pinned solution.
	pub root: Checksum,
	/// Pin generation of the root.
	pub generation: u64,
}

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.root, self.generation)
	}
}

/// Reference-counted pin on one solution version in an [`AssetStore`](crate::AssetStore).
///
/// While any clone of a scope is alive, every asset reachable from its root stays resolvable.
/// Cloning takes another pin; dropping releases one.
pub struct PinnedScope {
	id: ScopeId,
	primary: bool,
	state: Arc<Mutex<StoreState>>,
}

impl PinnedScope {
	pub(crate) fn new(id: ScopeId, primary: bool, state: Arc<Mutex<StoreState>>) -> Self {
		Self { id, primary, state }
	}

	/// Wire identity of this scope.
	pub fn id(&self) -> ScopeId {
		self.id
	}

	/// Root checksum of the pinned version.
	pub fn root(&self) -> Checksum {
		self.id.root
	}

	/// True if the pinned version is the primary branch rather than a fork.
	pub fn is_primary(&self) -> bool {
		self.primary
	}
}

impl Clone for PinnedScope {
	fn clone(&self) -> Self {
		self.state.lock().retain(&self.id);
		Self {
			id: self.id,
			primary: self.primary,
			state: Arc::clone(&self.state),
		}
	}
}

impl Drop for PinnedScope {
	fn drop(&mut self) {
		self.state.lock().release(&self.id);
	}
}

impl fmt::Debug for PinnedScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PinnedScope")
			.field("id", &self.id)
			.field("primary", &self.primary)
			.finish()
	}
}
