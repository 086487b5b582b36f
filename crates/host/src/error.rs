use sable_assets::AssetError;
use sable_queue::{HandlerError, RegistryError, RequestError};
use serde::{Deserialize, Serialize};

/// Stable, serializable classification of a failed host request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	/// No handler for the method.
	MethodNotFound,
	/// Payload did not decode or was rejected by the handler.
	InvalidParams,
	/// The handler failed.
	HandlerFailed,
	/// The request state could not be reconstructed.
	ContextFailed,
	/// Cancelled by the caller, or its state source went away.
	Cancelled,
	/// The queue no longer admits requests.
	Closed,
	/// Host setup failed.
	Internal,
}

/// Error returned by [`HostEndpoint`](crate::HostEndpoint).
#[derive(Debug, thiserror::Error)]
pub enum HostError {
	/// The request failed in the queue or its handler.
	#[error(transparent)]
	Request(#[from] RequestError),
	/// Handler registration failed while building the endpoint.
	#[error(transparent)]
	Registry(#[from] RegistryError),
	/// A primary-side version could not be published or pinned.
	#[error(transparent)]
	Asset(#[from] AssetError),
}

impl HostError {
	/// Classification of this error.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Request(RequestError::HandlerNotFound { .. }) => ErrorCode::MethodNotFound,
			Self::Request(RequestError::Handler(HandlerError::InvalidRequest(_))) => ErrorCode::InvalidParams,
			Self::Request(RequestError::Handler(HandlerError::Failed(_))) => ErrorCode::HandlerFailed,
			Self::Request(RequestError::Context(_)) => ErrorCode::ContextFailed,
			Self::Request(RequestError::Cancelled) => ErrorCode::Cancelled,
			Self::Request(RequestError::QueueClosed) => ErrorCode::Closed,
			Self::Registry(_) | Self::Asset(_) => ErrorCode::Internal,
		}
	}

	/// The underlying request error, if any.
	pub fn as_request(&self) -> Option<&RequestError> {
		match self {
			Self::Request(err) => Some(err),
			_ => None,
		}
	}
}
