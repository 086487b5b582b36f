use pretty_assertions::assert_eq;
use sable_assets::{AssetStore, CompilationOptions, DocumentId, PinnedScope, StateGraph};
use tokio::io::duplex;

use super::*;
use crate::{AssetProvider, SyncConfig};

struct Harness {
	store: AssetStore,
	replicator: SolutionReplicator,
	cancel: CancellationToken,
}

impl Harness {
	fn new(cache_capacity: usize) -> Self {
		let store = AssetStore::new();
		let (worker, primary) = duplex(1 << 20);
		let (reader, writer) = tokio::io::split(primary);
		let provider = AssetProvider::new(store.clone());
		let cancel = CancellationToken::new();
		let serve_cancel = cancel.clone();
		sable_worker::spawn(sable_worker::TaskClass::Sync, async move {
			let _ = provider.serve(reader, writer, serve_cancel).await;
		});
		let config = SyncConfig {
			cache_capacity,
			..SyncConfig::default()
		};
		let client = AssetClient::from_stream(worker, &config);
		let replicator = SolutionReplicator::new(client, Arc::new(AssetCache::new(config.cache_capacity)));
		Self { store, replicator, cancel }
	}

	fn publish(&self, solution: &Solution) -> (StateGraph, PinnedScope) {
		let graph = solution.to_graph().unwrap();
		let scope = self.store.pin_graph(&graph, true);
		(graph, scope)
	}
}

impl Drop for Harness {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

fn workspace() -> (Solution, DocumentId) {
	let mut solution = Solution::new();
	let core = solution.add_project("core", CompilationOptions::default());
	let app = solution.add_project("app", CompilationOptions::default());
	solution.add_reference(app, core);
	let lib = solution.add_document(core, "lib.rs", "pub fn f() {}").unwrap();
	solution.add_document(core, "util.rs", "pub fn g() {}").unwrap();
	solution.add_document(app, "main.rs", "fn main() { core::f() }").unwrap();
	(solution, lib)
}

#[tokio::test]
async fn replicates_an_identical_solution() {
	let h = Harness::new(1024);
	let (solution, _) = workspace();
	let (_, scope) = h.publish(&solution);

	let replica = h.replicator.replicate(scope.id(), true, &h.cancel).await.unwrap();
	assert_eq!(*replica, solution);
	assert_eq!(h.replicator.client().round_trips(), 3);
}

#[tokio::test]
async fn same_primary_root_does_no_io() {
	let h = Harness::new(1024);
	let (solution, _) = workspace();
	let (_, scope) = h.publish(&solution);

	let first = h.replicator.replicate(scope.id(), true, &h.cancel).await.unwrap();
	let trips = h.replicator.client().round_trips();
	let second = h.replicator.replicate(scope.id(), true, &h.cancel).await.unwrap();
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(h.replicator.client().round_trips(), trips);
	assert_eq!(h.replicator.last_primary_root(), Some(scope.root()));
}

#[tokio::test]
async fn edit_fetches_only_changed_assets() {
	let h = Harness::new(1024);
	let (mut solution, lib) = workspace();
	let (_, v1) = h.publish(&solution);
	h.replicator.replicate(v1.id(), true, &h.cancel).await.unwrap();
	let received = h.replicator.client().assets_received();

	solution.set_document_text(lib, "pub fn f() -> u8 { 1 }");
	let (_, v2) = h.publish(&solution);
	let replica = h.replicator.replicate(v2.id(), true, &h.cancel).await.unwrap();

	assert_eq!(*replica, solution);
	// New root, the touched project manifest and the new text.
	assert_eq!(h.replicator.client().assets_received() - received, 3);
}

#[tokio::test]
async fn tiny_cache_still_assembles() {
	let h = Harness::new(1);
	let (solution, _) = workspace();
	let (_, scope) = h.publish(&solution);

	let replica = h.replicator.replicate(scope.id(), false, &h.cancel).await.unwrap();
	assert_eq!(*replica, solution);
	assert_eq!(h.replicator.cache().len(), 1);
	assert_eq!(h.replicator.last_primary_root(), None);
}

#[tokio::test]
async fn released_scope_is_transient() {
	let h = Harness::new(1024);
	let (solution, _) = workspace();
	let (_, scope) = h.publish(&solution);
	let id = scope.id();
	drop(scope);

	let err = h.replicator.replicate(id, true, &h.cancel).await.unwrap_err();
	assert!(err.is_transient(), "{err}");
	assert!(!h.replicator.client().is_poisoned());
}
