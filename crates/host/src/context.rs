use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use sable_assets::{Document, DocumentId, ScopeId, Solution};
use sable_queue::{ContextError, ContextRequirement, ItemMeta, RequestContextFactory};
use sable_sync::{SolutionReplicator, SyncError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// State version captured for one request.
#[derive(Debug, Clone)]
pub enum WorkspaceSnapshot {
	/// The worker's current solution at capture time.
	Latest(Arc<Solution>),
	/// A version pinned on the primary, replicated on demand.
	Pinned {
		/// Pinned version.
		scope: ScopeId,
		/// True for the primary branch.
		primary: bool,
	},
}

/// Builds [`WorkspaceContext`]s from the worker's current solution or from versions pinned on
/// the primary.
pub struct WorkspaceContextFactory {
	current: Arc<ArcSwap<Solution>>,
	replicator: Option<SolutionReplicator>,
}

impl WorkspaceContextFactory {
	/// Creates a factory starting from `initial`. Without a replicator, pinned requests fail.
	pub fn new(initial: Solution, replicator: Option<SolutionReplicator>) -> Self {
		Self {
			current: Arc::new(ArcSwap::from_pointee(initial)),
			replicator,
		}
	}

	/// The worker's current solution.
	pub fn current(&self) -> Arc<Solution> {
		self.current.load_full()
	}

	/// The replicator used for pinned requests.
	pub fn replicator(&self) -> Option<&SolutionReplicator> {
		self.replicator.as_ref()
	}
}

impl std::fmt::Debug for WorkspaceContextFactory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkspaceContextFactory")
			.field("documents", &self.current.load().document_count())
			.field("replicator", &self.replicator)
			.finish()
	}
}

fn context_error(err: SyncError) -> ContextError {
	if err.is_transient() {
		debug!(error = %err, "host.context.connection_gone");
		ContextError::ConnectionGone
	} else {
		warn!(error = %err, "host.context.sync_failed");
		ContextError::Failed(err.to_string())
	}
}

#[async_trait]
impl RequestContextFactory for WorkspaceContextFactory {
	type Snapshot = WorkspaceSnapshot;
	type Context = WorkspaceContext;

	fn capture(&self, meta: &ItemMeta) -> Result<WorkspaceSnapshot, ContextError> {
		Ok(match meta.requirement {
			ContextRequirement::Pinned { scope, primary } => WorkspaceSnapshot::Pinned { scope, primary },
			_ => WorkspaceSnapshot::Latest(self.current.load_full()),
		})
	}

	async fn materialize(
		&self,
		snapshot: WorkspaceSnapshot,
		meta: &ItemMeta,
		cancel: &CancellationToken,
	) -> Result<Option<WorkspaceContext>, ContextError> {
		let (solution, scope) = match snapshot {
			WorkspaceSnapshot::Latest(solution) => (solution, None),
			WorkspaceSnapshot::Pinned { scope, primary } => {
				let replicator = self
					.replicator
					.as_ref()
					.ok_or_else(|| ContextError::Failed("no synchronization channel configured".into()))?;
				let solution = replicator.replicate(scope, primary, cancel).await.map_err(context_error)?;
				(solution, Some(scope))
			}
		};
		if let Some(id) = meta.document
			&& solution.document(id).is_none()
		{
			debug!(item = meta.id, document = %id, "host.context.document_gone");
			return Ok(None);
		}
		Ok(Some(WorkspaceContext {
			solution,
			document: meta.document,
			scope,
			current: Arc::clone(&self.current),
		}))
	}
}

/// State visible to one request's handler.
pub struct WorkspaceContext {
	solution: Arc<Solution>,
	document: Option<DocumentId>,
	scope: Option<ScopeId>,
	current: Arc<ArcSwap<Solution>>,
}

impl WorkspaceContext {
	/// The observed solution version.
	pub fn solution(&self) -> &Arc<Solution> {
		&self.solution
	}

	/// Id of the targeted document, if the request named one.
	pub fn document_id(&self) -> Option<DocumentId> {
		self.document
	}

	/// The targeted document. Always resolves when the request named one.
	pub fn document(&self) -> Option<&Document> {
		self.solution.document(self.document?)
	}

	/// The pinned version this context was replicated from.
	pub fn scope(&self) -> Option<ScopeId> {
		self.scope
	}

	/// Makes `solution` the worker's current state. Only meaningful from mutating handlers,
	/// which the queue runs one at a time.
	pub fn commit(&self, solution: impl Into<Arc<Solution>>) {
		self.current.store(solution.into());
	}
}

impl std::fmt::Debug for WorkspaceContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WorkspaceContext")
			.field("document", &self.document)
			.field("scope", &self.scope)
			.finish()
	}
}
