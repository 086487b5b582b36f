use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::RequestError;

pin_project! {
	/// Completion of one admitted request.
	///
	/// Resolves exactly once with the handler's response or the reason it did not produce
	/// one. Dropping the handle does not cancel the request; use [`RequestHandle::cancel`].
	#[must_use = "a request handle does nothing unless awaited or cancelled"]
	pub struct RequestHandle<T> {
		#[pin]
		rx: oneshot::Receiver<Result<T, RequestError>>,
		id: u64,
		cancel: CancellationToken,
	}
}

impl<T> RequestHandle<T> {
	pub(crate) fn new(id: u64, rx: oneshot::Receiver<Result<T, RequestError>>, cancel: CancellationToken) -> Self {
		Self { rx, id, cancel }
	}

	/// Queue-assigned id of the request.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Requests cancellation. The handle then resolves to [`RequestError::Cancelled`] unless
	/// the request already completed.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// The request's cancellation token.
	pub fn cancellation_token(&self) -> &CancellationToken {
		&self.cancel
	}
}

impl<T> Future for RequestHandle<T> {
	type Output = Result<T, RequestError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		// A sink dropped without a result means the task running the item was torn down.
		Poll::Ready(ready!(this.rx.poll(cx)).unwrap_or(Err(RequestError::Cancelled)))
	}
}

impl<T> std::fmt::Debug for RequestHandle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestHandle")
			.field("id", &self.id)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}
