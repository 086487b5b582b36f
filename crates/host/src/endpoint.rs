//! Request entry point of a worker host.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sable_assets::{DocumentId, ScopeId, Solution};
use sable_queue::{ContextRequirement, Dispatcher, HandlerRegistry, MethodDescriptor, QueueState, RequestError, RequestExecutionQueue};
use sable_sync::SolutionReplicator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing::{debug, info};

use crate::handlers::register_workspace_handlers;
use crate::{HostConfig, HostError, WorkspaceContextFactory};

/// One request addressed to a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRequest {
	/// Method name.
	pub method: String,
	/// JSON parameters. Methods without parameters take `null`.
	#[serde(default)]
	pub params: Value,
	/// Target document.
	#[serde(default)]
	pub document: Option<DocumentId>,
	/// Pinned primary version to run against. Without one the request observes the host's
	/// current solution.
	#[serde(default)]
	pub scope: Option<ScopeId>,
	/// True if `scope` is on the primary branch.
	#[serde(default = "default_primary")]
	pub primary: bool,
	/// Caller-side cancellation.
	#[serde(skip)]
	pub cancel: CancellationToken,
}

fn default_primary() -> bool {
	true
}

impl HostRequest {
	/// Creates a request against the host's current solution.
	pub fn new(method: impl Into<String>, params: Value) -> Self {
		Self {
			method: method.into(),
			params,
			document: None,
			scope: None,
			primary: true,
			cancel: CancellationToken::new(),
		}
	}

	/// Targets `document`.
	pub fn with_document(mut self, document: DocumentId) -> Self {
		self.document = Some(document);
		self
	}

	/// Runs against the pinned version `scope`.
	pub fn with_scope(mut self, scope: ScopeId, primary: bool) -> Self {
		self.scope = Some(scope);
		self.primary = primary;
		self
	}

	/// Uses `cancel` as the request's cancellation token.
	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}

	fn requirement(&self) -> ContextRequirement {
		match self.scope {
			Some(scope) => ContextRequirement::Pinned { scope, primary: self.primary },
			None => ContextRequirement::Latest,
		}
	}
}

/// Worker host: workspace handlers behind a request execution queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct HostEndpoint {
	dispatcher: Dispatcher<WorkspaceContextFactory>,
}

impl HostEndpoint {
	/// Builds the context factory, the queue and every workspace handler. Must be called from
	/// within a Tokio runtime.
	pub fn new(config: &HostConfig, initial: Solution, replicator: Option<SolutionReplicator>) -> Result<Self, HostError> {
		let factory = Arc::new(WorkspaceContextFactory::new(initial, replicator));
		let mut registry = HandlerRegistry::new();
		register_workspace_handlers(&mut registry)?;
		let queue = RequestExecutionQueue::new(factory, config.queue.clone());
		info!(methods = registry.len(), "host.endpoint.started");
		Ok(Self {
			dispatcher: Dispatcher::new(registry, queue),
		})
	}

	/// The underlying dispatcher.
	pub fn dispatcher(&self) -> &Dispatcher<WorkspaceContextFactory> {
		&self.dispatcher
	}

	/// The host's current solution.
	pub fn current(&self) -> Arc<Solution> {
		self.dispatcher.queue().factory().current()
	}

	/// Every registered method.
	pub fn registered_methods(&self) -> Vec<MethodDescriptor> {
		self.dispatcher.registered_methods()
	}

	/// Queue lifecycle state.
	pub fn state(&self) -> QueueState {
		self.dispatcher.queue().state()
	}

	/// Stops admission and waits for in-flight requests.
	pub async fn shutdown(&self) {
		self.dispatcher.queue().shutdown().await;
	}
}

impl std::fmt::Debug for HostEndpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HostEndpoint").field("dispatcher", &self.dispatcher).finish()
	}
}

impl Service<HostRequest> for HostEndpoint {
	type Response = Value;
	type Error = HostError;
	type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		match self.state() {
			QueueState::Running => Poll::Ready(Ok(())),
			_ => Poll::Ready(Err(RequestError::QueueClosed.into())),
		}
	}

	/// Resolves and admits the request before returning, so requests are ordered by `call`
	/// rather than by when their futures are first polled.
	fn call(&mut self, req: HostRequest) -> Self::Future {
		let requirement = req.requirement();
		debug!(method = %req.method, document = ?req.document, ?requirement, "host.request");
		let admitted = self
			.dispatcher
			.submit_json(&req.method, req.params, req.document, requirement, req.cancel);
		Box::pin(async move { Ok::<_, HostError>(admitted?.await?) })
	}
}
