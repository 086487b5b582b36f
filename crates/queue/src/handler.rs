use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::HandlerError;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for one method, generic over the request context type `C`.
///
/// A handler is identified in the registry by its method name together with its request and
/// response types.
#[async_trait]
pub trait MethodHandler<C: Send + 'static>: Send + Sync + 'static {
	/// Decoded request payload.
	type Request: Send + 'static;
	/// Response payload.
	type Response: Send + 'static;

	/// True if the handler may mutate shared state. Mutating handlers run one at a time.
	fn mutates(&self) -> bool;

	/// False if the handler never looks at its context, so none is built.
	fn requires_context(&self) -> bool {
		true
	}

	/// Handles one request.
	///
	/// `context` is `None` when the handler does not require one, or when its target no longer
	/// resolves in the observed state version.
	async fn handle(&self, request: Self::Request, context: Option<C>, cancel: CancellationToken) -> Result<Self::Response, HandlerError>;
}
