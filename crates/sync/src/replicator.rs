use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sable_assets::{Asset, AssetError, Checksum, ProjectManifest, ScopeId, Solution, SolutionManifest};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AssetCache, AssetClient, Result};

/// Rebuilds solutions on the worker from a root checksum.
///
/// Replication walks the state graph one level at a time (root manifest, project manifests,
/// leaves) and issues at most one round trip per level, for the checksums the cache does not
/// already hold. Assets gathered for one replication are kept aside until the solution is
/// assembled, so a small cache never evicts something the current walk still needs.
pub struct SolutionReplicator {
	client: AssetClient,
	cache: Arc<AssetCache>,
	last_primary: Mutex<Option<(Checksum, Arc<Solution>)>>,
}

impl SolutionReplicator {
	/// Creates a replicator fetching through `client` and mirroring into `cache`.
	pub fn new(client: AssetClient, cache: Arc<AssetCache>) -> Self {
		Self {
			client,
			cache,
			last_primary: Mutex::new(None),
		}
	}

	/// The channel used for round trips.
	pub fn client(&self) -> &AssetClient {
		&self.client
	}

	/// The worker-side asset mirror.
	pub fn cache(&self) -> &Arc<AssetCache> {
		&self.cache
	}

	/// Root of the last replicated primary-branch version.
	pub fn last_primary_root(&self) -> Option<Checksum> {
		self.last_primary.lock().as_ref().map(|(root, _)| *root)
	}

	/// Replicates the solution pinned by `scope`.
	///
	/// A primary-branch version is remembered by root, so asking for the same primary version
	/// again does no I/O.
	pub async fn replicate(&self, scope: ScopeId, primary: bool, cancel: &CancellationToken) -> Result<Arc<Solution>> {
		let root = scope.root;
		if primary
			&& let Some((last, solution)) = self.last_primary.lock().as_ref()
			&& *last == root
		{
			return Ok(Arc::clone(solution));
		}

		let mut local = HashMap::new();
		self.fetch_missing(scope, [root], &mut local, cancel).await?;
		let manifest = SolutionManifest::from_asset(lookup(&local, &root)?)?;

		self.fetch_missing(scope, manifest.project_checksums(), &mut local, cancel).await?;
		let mut projects = HashMap::with_capacity(manifest.projects.len());
		for checksum in manifest.project_checksums() {
			projects.insert(checksum, ProjectManifest::from_asset(lookup(&local, &checksum)?)?);
		}

		let leaves: Vec<Checksum> = projects.values().flat_map(ProjectManifest::leaf_checksums).collect();
		self.fetch_missing(scope, leaves, &mut local, cancel).await?;

		let solution = Arc::new(Solution::assemble(&manifest, &projects, |c| local.get(c).cloned())?);
		debug!(scope = %scope, primary, assets = local.len(), "sync.replicator.assembled");
		if primary {
			*self.last_primary.lock() = Some((root, Arc::clone(&solution)));
		}
		Ok(solution)
	}

	async fn fetch_missing(
		&self,
		scope: ScopeId,
		checksums: impl IntoIterator<Item = Checksum>,
		local: &mut HashMap<Checksum, Asset>,
		cancel: &CancellationToken,
	) -> Result<()> {
		let (hits, wanted) = self.cache.split(checksums.into_iter().filter(|c| !local.contains_key(c)));
		local.extend(hits.into_iter().map(|asset| (asset.checksum(), asset)));
		if wanted.is_empty() {
			return Ok(());
		}
		let assets = self.client.request_assets(scope, &wanted, cancel).await?;
		self.cache.extend(assets.iter().cloned());
		local.extend(assets.into_iter().map(|asset| (asset.checksum(), asset)));
		Ok(())
	}
}

fn lookup<'a>(local: &'a HashMap<Checksum, Asset>, checksum: &Checksum) -> Result<&'a Asset> {
	Ok(local.get(checksum).ok_or(AssetError::Missing(*checksum))?)
}

impl std::fmt::Debug for SolutionReplicator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SolutionReplicator")
			.field("client", &self.client)
			.field("cache", &self.cache)
			.field("last_primary", &self.last_primary_root())
			.finish()
	}
}

#[cfg(test)]
mod tests;
