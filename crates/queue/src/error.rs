use std::fmt;

/// Failure reported by a method handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
	/// The request payload was not acceptable for the method.
	#[error("invalid request: {0}")]
	InvalidRequest(String),
	/// The handler ran and failed.
	#[error("{0}")]
	Failed(String),
}

impl HandlerError {
	/// Wraps any displayable failure.
	pub fn failed(err: impl fmt::Display) -> Self {
		Self::Failed(err.to_string())
	}
}

/// Failure while building a request context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
	/// The state source went away (channel closed, scope disposed, request cancelled).
	///
	/// Never faults the queue; the item completes as [`RequestError::Cancelled`].
	#[error("state source connection gone")]
	ConnectionGone,
	/// Any other failure to reconstruct state.
	#[error("{0}")]
	Failed(String),
}

/// Error returned to the caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
	/// No handler is registered for the method and payload types.
	#[error("no handler registered for `{method}`")]
	HandlerNotFound {
		/// Requested method name.
		method: String,
	},
	/// The handler failed.
	#[error(transparent)]
	Handler(#[from] HandlerError),
	/// The request context could not be built.
	#[error("context construction failed: {0}")]
	Context(String),
	/// The request was cancelled, or the queue stopped before it completed.
	#[error("request cancelled")]
	Cancelled,
	/// The queue is shutting down, faulted, or closed.
	#[error("request queue is closed")]
	QueueClosed,
}

/// Registration-time error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	/// A handler for the same method and payload types is already registered.
	#[error("handler for `{method}` ({request} -> {response}) is already registered")]
	Duplicate {
		/// Method name.
		method: String,
		/// Request type name.
		request: &'static str,
		/// Response type name.
		response: &'static str,
	},
}

/// Queue-fatal failure recorded when a mutating item fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFault {
	/// Queue-assigned id of the failing item.
	pub item: u64,
	/// Method of the failing item.
	pub method: String,
	/// Failure description.
	pub reason: String,
}

impl fmt::Display for QueueFault {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "mutating request #{} `{}` failed: {}", self.item, self.method, self.reason)
	}
}

impl std::error::Error for QueueFault {}
