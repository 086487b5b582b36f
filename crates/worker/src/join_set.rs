use std::future::Future;

use tokio::task::{JoinError, JoinSet};

use crate::TaskClass;

/// Runtime-aware wrapper for a Tokio [`JoinSet`].
///
/// Task spawning is routed through the worker runtime entry so tasks are attached to the
/// active runtime even when the owner was created outside of one.
#[derive(Debug)]
pub struct WorkerJoinSet<T> {
	class: TaskClass,
	inner: JoinSet<T>,
}

impl<T> WorkerJoinSet<T>
where
	T: Send + 'static,
{
	/// Creates an empty worker join set for the given task class.
	pub fn new(class: TaskClass) -> Self {
		Self { class, inner: JoinSet::new() }
	}

	/// Returns the number of tasks currently in the set.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns a future into the set on the current worker runtime handle.
	#[allow(clippy::disallowed_methods)]
	pub fn spawn<F>(&mut self, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(worker_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.spawn");
		let handle = crate::spawn::runtime_handle();
		let _guard = handle.enter();
		self.inner.spawn(fut);
	}

	/// Waits for the next completed task.
	pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.join_next().await
	}

	/// Returns one ready completion without waiting.
	pub fn try_join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.try_join_next()
	}

	/// Reaps every already-finished task without waiting. Returns the number reaped.
	pub fn reap(&mut self) -> usize {
		let mut reaped = 0;
		while self.inner.try_join_next().is_some() {
			reaped += 1;
		}
		reaped
	}

	/// Aborts every task in the set. Aborted tasks still have to be joined.
	pub fn abort_all(&mut self) {
		tracing::debug!(worker_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.abort_all");
		self.inner.abort_all();
	}

	/// Waits until every task in the set has finished.
	pub async fn drain(&mut self) {
		while let Some(result) = self.inner.join_next().await {
			if let Err(err) = result
				&& !err.is_cancelled()
			{
				tracing::warn!(worker_class = self.class.as_str(), error = %err, "worker.join_set.task_failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn reap_collects_only_finished_tasks() {
		let mut set = WorkerJoinSet::new(TaskClass::Read);
		set.spawn(async {});
		set.spawn(std::future::pending::<()>());
		tokio::time::sleep(Duration::from_millis(10)).await;

		assert_eq!(set.reap(), 1);
		assert_eq!(set.len(), 1);

		set.abort_all();
		set.drain().await;
		assert!(set.is_empty());
	}
}
