//! Primary-process side of a host pair.

use std::future::poll_fn;
use std::sync::Arc;

use parking_lot::Mutex;
use sable_assets::{AssetError, AssetStore, PinnedScope, Solution};
use sable_sync::{AssetCache, AssetClient, AssetProvider, SolutionReplicator, SyncConfig};
use sable_worker::TaskClass;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing::{debug, warn};

use crate::{HostError, HostRequest};

const CHANNEL_BUFFER: usize = 64 * 1024;

/// Authoritative workspace owned by the primary process.
///
/// Every edit republishes the solution into the backing [`AssetStore`]; requests sent to a
/// worker pin the version they should observe for as long as they run.
pub struct PrimaryWorkspace {
	solution: Mutex<Solution>,
	store: AssetStore,
}

impl PrimaryWorkspace {
	/// Publishes `solution` as the first primary version.
	pub fn new(solution: Solution) -> Result<Self, AssetError> {
		let store = AssetStore::new();
		let root = store.publish_primary(&solution.to_graph()?);
		debug!(%root, "host.primary.published");
		Ok(Self {
			solution: Mutex::new(solution),
			store,
		})
	}

	/// A copy of the current primary solution.
	pub fn solution(&self) -> Solution {
		self.solution.lock().clone()
	}

	/// The backing store.
	pub fn store(&self) -> &AssetStore {
		&self.store
	}

	/// Applies `edit` and publishes the result as the new primary version.
	pub fn update<R>(&self, edit: impl FnOnce(&mut Solution) -> R) -> Result<R, AssetError> {
		let mut solution = self.solution.lock();
		let mut next = solution.clone();
		let out = edit(&mut next);
		let root = self.store.publish_primary(&next.to_graph()?);
		*solution = next;
		debug!(%root, "host.primary.published");
		Ok(out)
	}

	/// Pins the current primary version.
	///
	/// The published primary root is reused; the graph is only re-encoded if the store has no
	/// primary to pin.
	pub fn pin_current(&self) -> Result<PinnedScope, AssetError> {
		let solution = self.solution.lock();
		match self.store.pin_primary() {
			Some(scope) => Ok(scope),
			None => Ok(self.store.pin_graph(&solution.to_graph()?, true)),
		}
	}

	/// Pins `solution` as a forked version next to the primary branch.
	pub fn fork(&self, solution: &Solution) -> Result<PinnedScope, AssetError> {
		Ok(self.store.pin_graph(&solution.to_graph()?, false))
	}

	/// A provider answering worker requests out of this workspace's store.
	pub fn provider(&self) -> AssetProvider {
		AssetProvider::new(self.store.clone())
	}

	/// Connects a worker-side replicator to this workspace over an in-process stream.
	///
	/// The provider loop runs until `cancel` fires or the replicator is dropped.
	pub fn connect(&self, config: &SyncConfig, cancel: CancellationToken) -> (SolutionReplicator, JoinHandle<()>) {
		let (worker, primary) = tokio::io::duplex(CHANNEL_BUFFER);
		let provider = self.provider();
		let serving = sable_worker::spawn(TaskClass::Sync, async move {
			let (reader, writer) = tokio::io::split(primary);
			if let Err(err) = provider.serve(reader, writer, cancel).await {
				warn!(error = %err, "host.primary.provider_failed");
			}
		});
		let client = AssetClient::from_stream(worker, config);
		let replicator = SolutionReplicator::new(client, Arc::new(AssetCache::new(config.cache_capacity)));
		(replicator, serving)
	}

	/// Sends `request` to `service` against the current primary version, keeping that version
	/// pinned until the response arrives.
	pub async fn invoke<S>(&self, service: &mut S, request: HostRequest) -> Result<Value, HostError>
	where
		S: Service<HostRequest, Response = Value, Error = HostError>,
	{
		let scope = self.pin_current()?;
		call_pinned(service, request, scope).await
	}

	/// Sends `request` to `service` against `solution`, pinned as a fork for the duration of the
	/// call.
	pub async fn invoke_forked<S>(&self, service: &mut S, solution: &Solution, request: HostRequest) -> Result<Value, HostError>
	where
		S: Service<HostRequest, Response = Value, Error = HostError>,
	{
		let scope = self.fork(solution)?;
		call_pinned(service, request, scope).await
	}
}

async fn call_pinned<S>(service: &mut S, request: HostRequest, scope: PinnedScope) -> Result<Value, HostError>
where
	S: Service<HostRequest, Response = Value, Error = HostError>,
{
	let request = request.with_scope(scope.id(), scope.is_primary());
	poll_fn(|cx| service.poll_ready(cx)).await?;
	let response = service.call(request).await;
	drop(scope);
	response
}

impl std::fmt::Debug for PrimaryWorkspace {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PrimaryWorkspace")
			.field("documents", &self.solution.lock().document_count())
			.field("store", &self.store)
			.finish()
	}
}
