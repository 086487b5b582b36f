use pretty_assertions::assert_eq;
use sable_assets::{AssetKind, Checksum, CompilationOptions, PinnedScope, Solution, StateGraph};
use tokio::io::duplex;

use super::*;
use crate::codec::{ResponseEntry, read_count, read_entry};

fn published(store: &AssetStore) -> (StateGraph, PinnedScope) {
	let mut solution = Solution::new();
	let project = solution.add_project("core", CompilationOptions::default());
	solution.add_document(project, "a.rs", "fn a() {}").unwrap();
	solution.add_document(project, "b.rs", "fn b() {}").unwrap();
	let graph = solution.to_graph().unwrap();
	let scope = store.pin_graph(&graph, true);
	(graph, scope)
}

#[tokio::test]
async fn unreachable_checksum_gets_the_sentinel_in_its_slot() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store);
	let provider = AssetProvider::new(store);
	let unknown = Checksum::of(AssetKind::DocumentText, b"not in scope");
	let request = AssetRequest {
		scope: scope.id(),
		checksums: vec![graph.root, unknown],
	};

	let (mut out, mut input) = duplex(64 * 1024);
	provider.respond(&mut out, &request).await.unwrap();

	assert_eq!(read_count(&mut input).await.unwrap(), Some(2));
	assert!(matches!(read_entry(&mut input).await.unwrap(), ResponseEntry::Asset(a) if a.checksum() == graph.root));
	assert_eq!(read_entry(&mut input).await.unwrap(), ResponseEntry::Missing(unknown));
	assert_eq!(provider.requests_served(), 1);
}

#[tokio::test]
async fn released_scope_answers_with_scope_gone() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store);
	let id = scope.id();
	drop(scope);
	// Still the primary root, but the generation the worker holds is dead.
	let provider = AssetProvider::new(store);
	let request = AssetRequest {
		scope: id,
		checksums: vec![graph.root],
	};

	let (mut out, mut input) = duplex(1024);
	provider.respond(&mut out, &request).await.unwrap();
	assert_eq!(read_count(&mut input).await.unwrap(), None);
}

#[tokio::test]
async fn serve_stops_on_cancel_and_on_eof() {
	let provider = AssetProvider::new(AssetStore::new());

	let (_worker, primary) = duplex(1024);
	let (reader, writer) = tokio::io::split(primary);
	let cancel = CancellationToken::new();
	cancel.cancel();
	provider.serve(reader, writer, cancel).await.unwrap();

	let (worker, primary) = duplex(1024);
	drop(worker);
	let (reader, writer) = tokio::io::split(primary);
	provider.serve(reader, writer, CancellationToken::new()).await.unwrap();
	assert_eq!(provider.requests_served(), 0);
}
