//! Worker/primary round trips over an in-memory stream.

use pretty_assertions::assert_eq;
use rstest::rstest;
use sable_assets::{AssetKind, AssetStore, Checksum, CompilationOptions, PinnedScope, Solution, StateGraph};
use sable_sync::{AssetClient, AssetProvider, SyncConfig, SyncError};
use sable_worker::TaskClass;
use tokio::io::duplex;
use tokio_util::sync::CancellationToken;

fn published(store: &AssetStore, documents: usize) -> (StateGraph, PinnedScope) {
	let mut solution = Solution::new();
	let project = solution.add_project("core", CompilationOptions::default());
	for i in 0..documents {
		solution.add_document(project, format!("d{i}.rs"), format!("// document {i}")).unwrap();
	}
	let graph = solution.to_graph().unwrap();
	let scope = store.pin_graph(&graph, true);
	(graph, scope)
}

fn connect(store: &AssetStore, config: &SyncConfig) -> (AssetClient, CancellationToken) {
	let (worker, primary) = duplex(1 << 20);
	let (reader, writer) = tokio::io::split(primary);
	let provider = AssetProvider::new(store.clone());
	let cancel = CancellationToken::new();
	let serve_cancel = cancel.clone();
	sable_worker::spawn(TaskClass::Sync, async move {
		let _ = provider.serve(reader, writer, serve_cancel).await;
	});
	(AssetClient::from_stream(worker, config), cancel)
}

#[rstest]
#[case::none(0)]
#[case::one(1)]
#[case::many(7)]
#[tokio::test]
async fn returns_exactly_what_was_asked(#[case] count: usize) {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 8);
	let (client, cancel) = connect(&store, &SyncConfig::default());

	let mut requested: Vec<Checksum> = graph.assets.keys().copied().collect();
	requested.sort();
	requested.truncate(count);

	let assets = client.request_assets(scope.id(), &requested, &cancel).await.unwrap();
	assert_eq!(assets.len(), count);
	for (asset, checksum) in assets.iter().zip(&requested) {
		assert_eq!(asset.checksum(), *checksum);
		assert!(asset.verify());
	}
	assert_eq!(client.round_trips(), 1);
	cancel.cancel();
}

#[tokio::test]
async fn unknown_middle_checksum_is_fatal_and_poisons() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 2);
	let (client, cancel) = connect(&store, &SyncConfig::default());

	let mut known = graph.assets.keys().copied();
	let c1 = known.next().unwrap();
	let c3 = known.next().unwrap();
	let c2 = Checksum::of(AssetKind::DocumentText, b"never published");

	let err = client.request_assets(scope.id(), &[c1, c2, c3], &cancel).await.unwrap_err();
	assert!(matches!(err, SyncError::MissingAsset(c) if c == c2), "{err}");
	assert!(!err.is_transient());
	assert!(client.is_poisoned());

	let err = client.request_assets(scope.id(), &[c1], &cancel).await.unwrap_err();
	assert!(matches!(err, SyncError::Poisoned));
	cancel.cancel();
}

#[tokio::test]
async fn asset_of_another_version_is_not_served() {
	let store = AssetStore::new();
	let (_, scope) = published(&store, 1);
	let (other, _other_scope) = published(&store, 3);
	let (client, cancel) = connect(&store, &SyncConfig::default());

	let err = client.request_assets(scope.id(), &[other.root], &cancel).await.unwrap_err();
	assert!(matches!(err, SyncError::MissingAsset(_)));
	cancel.cancel();
}

#[tokio::test]
async fn resolving_twice_yields_identical_bytes() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 3);
	let (client, cancel) = connect(&store, &SyncConfig::default());

	let first = client.request_assets(scope.id(), &[graph.root], &cancel).await.unwrap();
	let second = client.request_assets(scope.id(), &[graph.root], &cancel).await.unwrap();
	assert_eq!(first[0].payload(), second[0].payload());
	cancel.cancel();
}

#[tokio::test]
async fn disposed_scope_is_transient_and_keeps_the_channel() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 1);
	let (client, cancel) = connect(&store, &SyncConfig::default());
	let stale = scope.id();
	drop(scope);

	let err = client.request_assets(stale, &[graph.root], &cancel).await.unwrap_err();
	assert!(matches!(err, SyncError::ScopeNotFound(s) if s == stale));
	assert!(err.is_transient());
	assert!(!client.is_poisoned());

	let fresh = store.pin(graph.root).unwrap();
	let assets = client.request_assets(fresh.id(), &[graph.root], &cancel).await.unwrap();
	assert_eq!(assets.len(), 1);
	cancel.cancel();
}

#[tokio::test]
async fn closed_primary_is_transient() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 1);
	let (worker, primary) = duplex(1024);
	drop(primary);
	let client = AssetClient::from_stream(worker, &SyncConfig::default());

	let err = client
		.request_assets(scope.id(), &[graph.root], &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(err.is_transient(), "{err}");
}

#[tokio::test(start_paused = true)]
async fn silent_primary_times_out_and_poisons() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 1);
	let (worker, _primary) = duplex(1 << 16);
	let config = SyncConfig {
		request_timeout_ms: 100,
		..SyncConfig::default()
	};
	let client = AssetClient::from_stream(worker, &config);

	let err = client
		.request_assets(scope.id(), &[graph.root], &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, SyncError::Timeout));
	assert!(client.is_poisoned());
}

#[tokio::test]
async fn cancelled_requester_stops_waiting() {
	let store = AssetStore::new();
	let (graph, scope) = published(&store, 1);
	let (worker, _primary) = duplex(1 << 16);
	let client = AssetClient::from_stream(worker, &SyncConfig::default());
	let cancel = CancellationToken::new();

	let pending = {
		let client = client.clone();
		let cancel = cancel.clone();
		let id = scope.id();
		sable_worker::spawn(TaskClass::Read, async move { client.request_assets(id, &[graph.root], &cancel).await })
	};
	cancel.cancel();
	let err = pending.await.unwrap().unwrap_err();
	assert!(matches!(err, SyncError::Cancelled));
	assert!(!client.is_poisoned());
}
