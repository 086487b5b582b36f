//! Authoritative asset store with pin-counted solution versions.
//!
//! # Invariants
//!
//! - An asset stays in the store while at least one live root lists it in its reachable set.
//! - A root stays live while it has pins or is the retained primary root.
//! - A root's generation changes only on a zero-to-one pin transition, so a [`ScopeId`] of a
//!   released version never resolves again.
//! - All pin and holder counts change under the single state lock.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use sable_worker::GenerationClock;
use tracing::{debug, warn};

use crate::{Asset, AssetError, Checksum, PinnedScope, Result, ScopeId, StateGraph};

/// Source of assets by checksum.
pub trait AssetResolver: Send + Sync {
	/// Resolves one checksum. `None` is the missing-asset sentinel.
	fn resolve(&self, checksum: &Checksum) -> Option<Asset>;

	/// Resolves a batch. Checksums that cannot be resolved are absent from the map.
	fn resolve_many(&self, checksums: &[Checksum]) -> HashMap<Checksum, Asset> {
		checksums
			.iter()
			.filter_map(|checksum| self.resolve(checksum).map(|asset| (*checksum, asset)))
			.collect()
	}
}

struct StoredAsset {
	asset: Asset,
	/// Number of live roots whose reachable set contains this asset.
	holders: usize,
}

struct RootEntry {
	reachable: Arc<HashSet<Checksum>>,
	generation: u64,
	pins: usize,
	/// Kept alive as the current primary root even without pins.
	retained: bool,
}

impl RootEntry {
	fn pin(&mut self, root: Checksum, clock: &GenerationClock) -> ScopeId {
		if self.pins == 0 {
			self.generation = clock.next();
		}
		self.pins += 1;
		ScopeId {
			root,
			generation: self.generation,
		}
	}
}

#[derive(Default)]
pub(crate) struct StoreState {
	assets: HashMap<Checksum, StoredAsset>,
	roots: HashMap<Checksum, RootEntry>,
	primary: Option<Checksum>,
}

impl StoreState {
	fn insert_graph(&mut self, graph: &StateGraph) -> &mut RootEntry {
		match self.roots.entry(graph.root) {
			Entry::Occupied(entry) => entry.into_mut(),
			Entry::Vacant(slot) => {
				for (checksum, asset) in &graph.assets {
					self.assets
						.entry(*checksum)
						.or_insert_with(|| StoredAsset {
							asset: asset.clone(),
							holders: 0,
						})
						.holders += 1;
				}
				debug!(root = %graph.root, assets = graph.assets.len(), "assets.root.published");
				slot.insert(RootEntry {
					reachable: Arc::new(graph.assets.keys().copied().collect()),
					generation: 0,
					pins: 0,
					retained: false,
				})
			}
		}
	}

	fn set_primary(&mut self, root: Checksum) {
		if let Some(entry) = self.roots.get_mut(&root) {
			entry.retained = true;
		}
		if let Some(previous) = self.primary.replace(root)
			&& previous != root
		{
			if let Some(entry) = self.roots.get_mut(&previous) {
				entry.retained = false;
			}
			self.evict_if_unused(previous);
		}
	}

	fn pin(&mut self, root: Checksum, clock: &GenerationClock) -> Option<ScopeId> {
		self.roots.get_mut(&root).map(|entry| entry.pin(root, clock))
	}

	pub(crate) fn retain(&mut self, scope: &ScopeId) {
		match self.roots.get_mut(&scope.root) {
			Some(entry) if entry.generation == scope.generation && entry.pins > 0 => entry.pins += 1,
			_ => warn!(scope = %scope, "assets.scope.retain_stale"),
		}
	}

	pub(crate) fn release(&mut self, scope: &ScopeId) {
		let Some(entry) = self.roots.get_mut(&scope.root) else {
			warn!(scope = %scope, "assets.scope.release_unknown");
			return;
		};
		if entry.generation != scope.generation || entry.pins == 0 {
			warn!(scope = %scope, "assets.scope.release_stale");
			return;
		}
		entry.pins -= 1;
		if entry.pins == 0 {
			debug!(scope = %scope, "assets.scope.unpinned");
			self.evict_if_unused(scope.root);
		}
	}

	fn evict_if_unused(&mut self, root: Checksum) {
		let Some(entry) = self.roots.get(&root) else {
			return;
		};
		if entry.pins > 0 || entry.retained {
			return;
		}
		let Some(entry) = self.roots.remove(&root) else {
			return;
		};
		let mut evicted = 0usize;
		for checksum in entry.reachable.iter() {
			if let Some(stored) = self.assets.get_mut(checksum) {
				stored.holders -= 1;
				if stored.holders == 0 {
					self.assets.remove(checksum);
					evicted += 1;
				}
			}
		}
		debug!(root = %root, evicted, "assets.root.evicted");
	}

	fn live_scope(&self, scope: &ScopeId) -> Result<&RootEntry> {
		self.roots
			.get(&scope.root)
			.filter(|entry| entry.generation == scope.generation && entry.pins > 0)
			.ok_or(AssetError::ScopeNotFound(*scope))
	}

	fn resolve_reachable(&self, entry: &RootEntry, checksum: &Checksum) -> Option<Asset> {
		if !entry.reachable.contains(checksum) {
			return None;
		}
		self.assets.get(checksum).map(|stored| stored.asset.clone())
	}
}

/// Primary-side store of published solution versions.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct AssetStore {
	state: Arc<Mutex<StoreState>>,
	clock: GenerationClock,
}

impl AssetStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Publishes `graph` as the latest primary version and returns its root.
	///
	/// The previous primary root is released and evicted if nothing pins it.
	pub fn publish_primary(&self, graph: &StateGraph) -> Checksum {
		let mut state = self.state.lock();
		state.insert_graph(graph);
		state.set_primary(graph.root);
		graph.root
	}

	/// Publishes `graph` (if new) and pins it.
	///
	/// A primary pin also makes the graph the retained primary version; a forked pin is
	/// evicted as soon as its last pin is released.
	pub fn pin_graph(&self, graph: &StateGraph, primary: bool) -> PinnedScope {
		let mut state = self.state.lock();
		if primary {
			state.insert_graph(graph);
			state.set_primary(graph.root);
		}
		let id = state.insert_graph(graph).pin(graph.root, &self.clock);
		PinnedScope::new(id, primary, Arc::clone(&self.state))
	}

	/// Pins an already published root.
	pub fn pin(&self, root: Checksum) -> Result<PinnedScope> {
		let mut state = self.state.lock();
		let primary = state.primary == Some(root);
		let id = state.pin(root, &self.clock).ok_or(AssetError::UnknownRoot(root))?;
		Ok(PinnedScope::new(id, primary, Arc::clone(&self.state)))
	}

	/// Pins the current primary root, if one was published.
	pub fn pin_primary(&self) -> Option<PinnedScope> {
		let root = self.state.lock().primary?;
		self.pin(root).ok()
	}

	/// Root of the current primary version.
	pub fn primary_root(&self) -> Option<Checksum> {
		self.state.lock().primary
	}

	/// Number of live pins on `root`.
	pub fn pin_count(&self, root: &Checksum) -> usize {
		self.state.lock().roots.get(root).map_or(0, |entry| entry.pins)
	}

	/// Returns true if `checksum` is stored under any live root.
	pub fn contains(&self, checksum: &Checksum) -> bool {
		self.state.lock().assets.contains_key(checksum)
	}

	/// Number of distinct stored assets.
	pub fn len(&self) -> usize {
		self.state.lock().assets.len()
	}

	/// Returns true if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Resolves one checksum within a scope's reachable set.
	///
	/// `Ok(None)` means the scope is live but does not reach `checksum`.
	pub fn resolve_in_scope(&self, scope: &ScopeId, checksum: &Checksum) -> Result<Option<Asset>> {
		let state = self.state.lock();
		let entry = state.live_scope(scope)?;
		Ok(state.resolve_reachable(entry, checksum))
	}

	/// Resolves a batch within a scope's reachable set, preserving request order.
	pub fn resolve_many_in_scope(&self, scope: &ScopeId, checksums: &[Checksum]) -> Result<Vec<(Checksum, Option<Asset>)>> {
		let state = self.state.lock();
		let entry = state.live_scope(scope)?;
		Ok(checksums
			.iter()
			.map(|checksum| (*checksum, state.resolve_reachable(entry, checksum)))
			.collect())
	}
}

impl AssetResolver for AssetStore {
	fn resolve(&self, checksum: &Checksum) -> Option<Asset> {
		self.state.lock().assets.get(checksum).map(|stored| stored.asset.clone())
	}
}

impl std::fmt::Debug for AssetStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("AssetStore")
			.field("assets", &state.assets.len())
			.field("roots", &state.roots.len())
			.field("primary", &state.primary)
			.finish()
	}
}
