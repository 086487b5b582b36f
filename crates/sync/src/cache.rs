use std::collections::HashSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use sable_assets::{Asset, AssetResolver, Checksum};

/// Worker-side mirror of received assets, keyed by checksum.
///
/// Bounded by asset count; the least recently used entry is evicted first. Assets are
/// immutable, so a hit is always valid for every scope that reaches that checksum.
pub struct AssetCache {
	entries: Mutex<LruCache<Checksum, Asset>>,
}

impl AssetCache {
	/// Creates a cache holding at most `capacity` assets (at least one).
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self {
			entries: Mutex::new(LruCache::new(capacity)),
		}
	}

	/// Returns the cached asset and marks it recently used.
	pub fn get(&self, checksum: &Checksum) -> Option<Asset> {
		self.entries.lock().get(checksum).cloned()
	}

	/// Returns true if `checksum` is cached, without touching recency.
	pub fn contains(&self, checksum: &Checksum) -> bool {
		self.entries.lock().contains(checksum)
	}

	/// Inserts a verified asset.
	pub fn insert(&self, asset: Asset) {
		self.entries.lock().put(asset.checksum(), asset);
	}

	/// Inserts every asset of a batch under one lock.
	pub fn extend(&self, assets: impl IntoIterator<Item = Asset>) {
		let mut entries = self.entries.lock();
		for asset in assets {
			entries.put(asset.checksum(), asset);
		}
	}

	/// Splits `checksums` into cached assets and checksums that must be fetched.
	///
	/// Both halves are deduplicated and keep first-seen order. Hits are marked recently used,
	/// and the split is taken under one lock so no hit can be evicted in between.
	pub fn split(&self, checksums: impl IntoIterator<Item = Checksum>) -> (Vec<Asset>, Vec<Checksum>) {
		let mut entries = self.entries.lock();
		let mut seen = HashSet::new();
		let (mut hits, mut missing) = (Vec::new(), Vec::new());
		for checksum in checksums {
			if !seen.insert(checksum) {
				continue;
			}
			match entries.get(&checksum) {
				Some(asset) => hits.push(asset.clone()),
				None => missing.push(checksum),
			}
		}
		(hits, missing)
	}

	/// Number of cached assets.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns true if nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Maximum number of cached assets.
	pub fn capacity(&self) -> usize {
		self.entries.lock().cap().get()
	}
}

impl AssetResolver for AssetCache {
	fn resolve(&self, checksum: &Checksum) -> Option<Asset> {
		self.get(checksum)
	}
}

impl std::fmt::Debug for AssetCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let entries = self.entries.lock();
		f.debug_struct("AssetCache")
			.field("len", &entries.len())
			.field("capacity", &entries.cap())
			.finish()
	}
}
