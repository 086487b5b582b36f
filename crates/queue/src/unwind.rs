//! Panic isolation for handler futures.

use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

use crate::{BoxFuture, HandlerError};

pin_project! {
	/// Resolves to the inner output, or to [`HandlerError::Failed`] if polling it panicked.
	pub(crate) struct CatchUnwind<F> {
		#[pin]
		inner: F,
	}
}

impl<T, F> Future for CatchUnwind<F>
where
	F: Future<Output = Result<T, HandlerError>>,
{
	type Output = Result<T, HandlerError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let inner = self.project().inner;
		match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
			Ok(poll) => poll,
			Err(payload) => Poll::Ready(Err(panicked(payload.as_ref()))),
		}
	}
}

/// Builds the handler future with `build` and isolates panics from both the call and the
/// future it returns.
pub(crate) fn guarded<T, B>(build: B) -> CatchUnwind<BoxFuture<'static, Result<T, HandlerError>>>
where
	T: Send + 'static,
	B: FnOnce() -> BoxFuture<'static, Result<T, HandlerError>>,
{
	let inner: BoxFuture<'static, Result<T, HandlerError>> = match catch_unwind(AssertUnwindSafe(build)) {
		Ok(future) => future,
		Err(payload) => {
			let err = panicked(payload.as_ref());
			Box::pin(async move { Err(err) })
		}
	};
	CatchUnwind { inner }
}

fn panicked(payload: &(dyn Any + Send)) -> HandlerError {
	let message = if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic payload".to_owned()
	};
	HandlerError::Failed(format!("handler panicked: {message}"))
}
