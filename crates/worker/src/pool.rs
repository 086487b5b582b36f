use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{TaskClass, WorkerJoinSet};

/// Concurrency-limited pool for fanned-out work.
///
/// Spawning never waits for capacity: the task is created immediately and parks on a pool
/// permit before running its body, so a saturated pool queues work instead of blocking the
/// spawner.
#[derive(Debug, Clone)]
pub struct WorkerPool {
	class: TaskClass,
	limit: usize,
	permits: Option<Arc<Semaphore>>,
}

impl WorkerPool {
	/// Creates a pool allowing at most `limit` bodies to run at once. `0` means unbounded.
	pub fn new(class: TaskClass, limit: usize) -> Self {
		let permits = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
		Self { class, limit, permits }
	}

	/// Returns the configured concurrency limit, `None` when unbounded.
	pub fn limit(&self) -> Option<usize> {
		(self.limit > 0).then_some(self.limit)
	}

	/// Returns the number of idle permits, `None` when unbounded.
	pub fn available(&self) -> Option<usize> {
		self.permits.as_ref().map(|sem| sem.available_permits())
	}

	/// Spawns `fut` into `set`, gated on a pool permit.
	pub fn spawn_in<T, F>(&self, set: &mut WorkerJoinSet<T>, fut: F)
	where
		T: Send + 'static,
		F: Future<Output = T> + Send + 'static,
	{
		let permits = self.permits.clone();
		let class = self.class;
		set.spawn(async move {
			// The semaphore is never closed, so acquisition only fails if that changes.
			let _permit = match permits {
				Some(sem) => match sem.acquire_owned().await {
					Ok(permit) => Some(permit),
					Err(_) => {
						tracing::warn!(worker_class = class.as_str(), "worker.pool.closed");
						None
					}
				},
				None => None,
			};
			fut.await
		});
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn bounded_pool_caps_running_bodies() {
		let pool = WorkerPool::new(TaskClass::Read, 2);
		let mut set = WorkerJoinSet::new(TaskClass::Read);
		let running = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));

		for _ in 0..8 {
			let running = Arc::clone(&running);
			let peak = Arc::clone(&peak);
			pool.spawn_in(&mut set, async move {
				let now = running.fetch_add(1, Ordering::SeqCst) + 1;
				peak.fetch_max(now, Ordering::SeqCst);
				tokio::time::sleep(Duration::from_millis(5)).await;
				running.fetch_sub(1, Ordering::SeqCst);
			});
		}

		assert_eq!(set.len(), 8, "spawning must not wait for permits");
		set.drain().await;
		assert!(peak.load(Ordering::SeqCst) <= 2);
		assert_eq!(pool.available(), Some(2));
	}

	#[tokio::test]
	async fn unbounded_pool_reports_no_limit() {
		let pool = WorkerPool::new(TaskClass::Read, 0);
		assert_eq!(pool.limit(), None);
		assert_eq!(pool.available(), None);

		let mut set = WorkerJoinSet::new(TaskClass::Read);
		pool.spawn_in(&mut set, async { 7 });
		assert_eq!(set.join_next().await.and_then(Result::ok), Some(7));
	}
}
