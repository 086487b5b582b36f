use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use sable_assets::DocumentId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
	ContextRequirement, HandlerError, MethodHandler, QueueItem, RegistryError, RequestContextFactory, RequestError,
	RequestExecutionQueue, RequestHandle,
};

/// Public description of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
	/// Method name.
	pub method: String,
	/// Request payload type name.
	pub request_type: &'static str,
	/// Response payload type name.
	pub response_type: &'static str,
	/// True if requests are serialized against other mutations.
	pub mutates: bool,
	/// False if the handler runs without a context.
	pub requires_context: bool,
}

type TypedHandler<C, Req, Resp> = Arc<dyn MethodHandler<C, Request = Req, Response = Resp>>;

trait JsonRoute<C>: Send + Sync {
	fn item(&self, method: &str, payload: Value) -> Result<QueueItem<C, Value>, HandlerError>;
}

struct JsonAdapter<H>(Arc<H>);

impl<C, H> JsonRoute<C> for JsonAdapter<H>
where
	C: Send + 'static,
	H: MethodHandler<C>,
	H::Request: DeserializeOwned,
	H::Response: Serialize,
{
	fn item(&self, method: &str, payload: Value) -> Result<QueueItem<C, Value>, HandlerError> {
		let request: H::Request = serde_json::from_value(payload).map_err(|err| HandlerError::InvalidRequest(err.to_string()))?;
		let handler = Arc::clone(&self.0);
		Ok(QueueItem::new(method, handler.mutates(), move |context, cancel| async move {
			let response = handler.handle(request, context, cancel).await?;
			serde_json::to_value(response).map_err(HandlerError::failed)
		}))
	}
}

struct Registration<C> {
	descriptor: MethodDescriptor,
	request: TypeId,
	response: TypeId,
	/// Holds a `TypedHandler<C, Req, Resp>`.
	typed: Arc<dyn Any + Send + Sync>,
	json: Arc<dyn JsonRoute<C>>,
}

/// Startup-time collection of method handlers.
///
/// Handlers are keyed by method name plus request and response types. The registry is frozen
/// into a [`Dispatcher`] once every handler is registered.
pub struct HandlerRegistry<C> {
	methods: HashMap<Arc<str>, Vec<Registration<C>>>,
}

impl<C> Default for HandlerRegistry<C> {
	fn default() -> Self {
		Self { methods: HashMap::new() }
	}
}

impl<C: Send + 'static> HandlerRegistry<C> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` for `method`.
	///
	/// Fails if a handler with the same method, request type and response type exists. The
	/// first registration of a method name also serves JSON requests for it.
	pub fn register<H>(&mut self, method: &str, handler: H) -> Result<(), RegistryError>
	where
		H: MethodHandler<C>,
		H::Request: DeserializeOwned,
		H::Response: Serialize,
	{
		let request = TypeId::of::<H::Request>();
		let response = TypeId::of::<H::Response>();
		let entries = self.methods.entry(Arc::from(method)).or_default();
		if entries.iter().any(|r| r.request == request && r.response == response) {
			return Err(RegistryError::Duplicate {
				method: method.to_owned(),
				request: type_name::<H::Request>(),
				response: type_name::<H::Response>(),
			});
		}

		let handler = Arc::new(handler);
		let typed: TypedHandler<C, H::Request, H::Response> = handler.clone();
		entries.push(Registration {
			descriptor: MethodDescriptor {
				method: method.to_owned(),
				request_type: type_name::<H::Request>(),
				response_type: type_name::<H::Response>(),
				mutates: handler.mutates(),
				requires_context: handler.requires_context(),
			},
			request,
			response,
			typed: Arc::new(typed),
			json: Arc::new(JsonAdapter(handler)),
		});
		debug!(method, registrations = entries.len(), "dispatch.handler.registered");
		Ok(())
	}

	/// Number of registrations.
	pub fn len(&self) -> usize {
		self.methods.values().map(Vec::len).sum()
	}

	/// Returns true if nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Routes requests to registered handlers and admits them into a queue.
///
/// Handler resolution happens before admission: a request for an unknown method never reaches
/// the queue.
pub struct Dispatcher<F: RequestContextFactory> {
	methods: Arc<HashMap<Arc<str>, Vec<Registration<F::Context>>>>,
	queue: RequestExecutionQueue<F>,
}

impl<F: RequestContextFactory> Clone for Dispatcher<F> {
	fn clone(&self) -> Self {
		Self {
			methods: Arc::clone(&self.methods),
			queue: self.queue.clone(),
		}
	}
}

impl<F: RequestContextFactory> Dispatcher<F> {
	/// Freezes `registry` and routes into `queue`.
	pub fn new(registry: HandlerRegistry<F::Context>, queue: RequestExecutionQueue<F>) -> Self {
		Self {
			methods: Arc::new(registry.methods),
			queue,
		}
	}

	/// The queue requests are admitted into.
	pub fn queue(&self) -> &RequestExecutionQueue<F> {
		&self.queue
	}

	fn registration<Req: 'static, Resp: 'static>(&self, method: &str) -> Option<&Registration<F::Context>> {
		let (request, response) = (TypeId::of::<Req>(), TypeId::of::<Resp>());
		self.methods
			.get(method)?
			.iter()
			.find(|r| r.request == request && r.response == response)
	}

	/// Looks up the handler for `method` with the given payload types.
	pub fn get_handler<Req: 'static, Resp: 'static>(&self, method: &str) -> Option<TypedHandler<F::Context, Req, Resp>> {
		self.registration::<Req, Resp>(method)?
			.typed
			.downcast_ref::<TypedHandler<F::Context, Req, Resp>>()
			.cloned()
	}

	/// Every registration, ordered by method name.
	pub fn registered_methods(&self) -> Vec<MethodDescriptor> {
		let mut out: Vec<_> = self
			.methods
			.values()
			.flat_map(|entries| entries.iter().map(|r| r.descriptor.clone()))
			.collect();
		out.sort_by(|a, b| a.method.cmp(&b.method));
		out
	}

	fn requirement_for(descriptor: &MethodDescriptor, requested: ContextRequirement) -> ContextRequirement {
		if descriptor.requires_context {
			requested
		} else {
			ContextRequirement::None
		}
	}

	/// Resolves the handler and admits a typed request.
	pub fn submit<Req, Resp>(
		&self,
		method: &str,
		request: Req,
		document: Option<DocumentId>,
		requirement: ContextRequirement,
		cancel: CancellationToken,
	) -> Result<RequestHandle<Resp>, RequestError>
	where
		Req: Send + 'static,
		Resp: Send + 'static,
	{
		let not_found = || RequestError::HandlerNotFound { method: method.to_owned() };
		let registration = self.registration::<Req, Resp>(method).ok_or_else(not_found)?;
		let handler = registration
			.typed
			.downcast_ref::<TypedHandler<F::Context, Req, Resp>>()
			.cloned()
			.ok_or_else(not_found)?;
		let item = QueueItem::new(method, registration.descriptor.mutates, move |context, cancel| async move {
			handler.handle(request, context, cancel).await
		})
		.with_requirement(Self::requirement_for(&registration.descriptor, requirement))
		.with_document(document)
		.with_cancel(cancel);
		Ok(self.queue.enqueue(item))
	}

	/// Resolves, admits, and awaits a typed request.
	pub async fn execute<Req, Resp>(
		&self,
		method: &str,
		request: Req,
		document: Option<DocumentId>,
		requirement: ContextRequirement,
		cancel: CancellationToken,
	) -> Result<Resp, RequestError>
	where
		Req: Send + 'static,
		Resp: Send + 'static,
	{
		self.submit(method, request, document, requirement, cancel)?.await
	}

	/// Resolves the JSON route of `method`, decodes `payload`, and admits the request.
	pub fn submit_json(
		&self,
		method: &str,
		payload: Value,
		document: Option<DocumentId>,
		requirement: ContextRequirement,
		cancel: CancellationToken,
	) -> Result<RequestHandle<Value>, RequestError> {
		let registration = self
			.methods
			.get(method)
			.and_then(|entries| entries.first())
			.ok_or_else(|| RequestError::HandlerNotFound { method: method.to_owned() })?;
		let item = registration
			.json
			.item(method, payload)?
			.with_requirement(Self::requirement_for(&registration.descriptor, requirement))
			.with_document(document)
			.with_cancel(cancel);
		Ok(self.queue.enqueue(item))
	}

	/// Resolves, admits, and awaits a JSON request.
	pub async fn execute_json(
		&self,
		method: &str,
		payload: Value,
		document: Option<DocumentId>,
		requirement: ContextRequirement,
		cancel: CancellationToken,
	) -> Result<Value, RequestError> {
		self.submit_json(method, payload, document, requirement, cancel)?.await
	}
}

impl<F: RequestContextFactory> std::fmt::Debug for Dispatcher<F> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher")
			.field("methods", &self.methods.len())
			.field("queue", &self.queue)
			.finish()
	}
}
