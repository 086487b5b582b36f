use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sable_assets::DocumentId;
use sable_worker::{GenerationClock, TaskClass, WorkerJoinSet, WorkerPool};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
	BoxFuture, ContextError, ContextRequirement, HandlerError, ItemMeta, QueueFault, RequestContextFactory, RequestError,
	RequestHandle,
};
use crate::unwind::guarded;

/// Queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
	/// Maximum number of non-mutating items running at once. `0` means unbounded.
	pub max_concurrent_reads: usize,
	/// How long shutdown waits for in-flight items before aborting them, in milliseconds.
	pub shutdown_timeout_ms: u64,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			max_concurrent_reads: 64,
			shutdown_timeout_ms: 5_000,
		}
	}
}

/// Lifecycle of a queue.
///
/// `Running → ShuttingDown → Closed` after [`RequestExecutionQueue::shutdown`], or
/// `Running → Faulted → Closed` after a mutating item failed. Only `Running` admits items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueState {
	/// Admitting and executing items.
	Running,
	/// Shutdown requested; in-flight items are finishing.
	ShuttingDown,
	/// A mutating item failed; in-flight items are finishing.
	Faulted,
	/// Terminal. Nothing runs any more.
	Closed,
}

type RunFn<C, T> = Box<dyn FnOnce(Option<C>, CancellationToken) -> BoxFuture<'static, Result<T, HandlerError>> + Send>;

/// One unit of work submitted to a [`RequestExecutionQueue`].
pub struct QueueItem<C, T> {
	method: Arc<str>,
	mutates: bool,
	requirement: ContextRequirement,
	document: Option<DocumentId>,
	cancel: CancellationToken,
	run: RunFn<C, T>,
}

impl<C, T> QueueItem<C, T> {
	/// Creates an item running `run` with the item's context and cancellation token.
	///
	/// Items default to [`ContextRequirement::Latest`], no target document, and a fresh
	/// cancellation token.
	pub fn new<R, Fut>(method: impl Into<Arc<str>>, mutates: bool, run: R) -> Self
	where
		R: FnOnce(Option<C>, CancellationToken) -> Fut + Send + 'static,
		Fut: Future<Output = Result<T, HandlerError>> + Send + 'static,
	{
		Self {
			method: method.into(),
			mutates,
			requirement: ContextRequirement::Latest,
			document: None,
			cancel: CancellationToken::new(),
			run: Box::new(move |context, cancel| Box::pin(run(context, cancel))),
		}
	}

	/// Sets the state the item needs.
	pub fn with_requirement(mut self, requirement: ContextRequirement) -> Self {
		self.requirement = requirement;
		self
	}

	/// Sets the document the item targets.
	pub fn with_document(mut self, document: Option<DocumentId>) -> Self {
		self.document = document;
		self
	}

	/// Uses the caller's cancellation token instead of a fresh one.
	pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;
		self
	}
}

enum Outcome {
	Completed,
	Cancelled,
	Failed(String),
}

trait Job<C>: Send {
	fn execute(self: Box<Self>, context: Option<C>, cancel: CancellationToken, token: CancellationToken) -> BoxFuture<'static, Outcome>;

	fn fail(self: Box<Self>, err: RequestError);
}

struct TypedJob<C, T> {
	run: RunFn<C, T>,
	sink: oneshot::Sender<Result<T, RequestError>>,
}

impl<C, T> Job<C> for TypedJob<C, T>
where
	C: Send + 'static,
	T: Send + 'static,
{
	fn execute(self: Box<Self>, context: Option<C>, cancel: CancellationToken, token: CancellationToken) -> BoxFuture<'static, Outcome> {
		let Self { run, sink } = *self;
		Box::pin(async move {
			let handler = guarded(|| run(context, token.clone()));
			let result = tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					token.cancel();
					Err(RequestError::Cancelled)
				}
				_ = token.cancelled() => Err(RequestError::Cancelled),
				result = handler => result.map_err(RequestError::Handler),
			};
			let outcome = match &result {
				Ok(_) => Outcome::Completed,
				Err(RequestError::Cancelled) => Outcome::Cancelled,
				Err(err) => Outcome::Failed(err.to_string()),
			};
			let _ = sink.send(result);
			outcome
		})
	}

	fn fail(self: Box<Self>, err: RequestError) {
		let _ = self.sink.send(Err(err));
	}
}

struct Entry<C> {
	meta: ItemMeta,
	cancel: CancellationToken,
	job: Box<dyn Job<C>>,
}

struct Inner<F: RequestContextFactory> {
	factory: Arc<F>,
	config: QueueConfig,
	state: watch::Sender<QueueState>,
	fault: Mutex<Option<QueueFault>>,
	shutdown: CancellationToken,
	ids: GenerationClock,
}

impl<F: RequestContextFactory> Inner<F> {
	fn stop_admission(&self) {
		let changed = self.state.send_if_modified(|state| {
			if *state == QueueState::Running {
				*state = QueueState::ShuttingDown;
				true
			} else {
				false
			}
		});
		if changed {
			debug!("queue.shutting_down");
		}
	}

	fn begin_shutdown(&self) {
		self.stop_admission();
		self.shutdown.cancel();
	}

	fn record_fault(&self, fault: QueueFault) {
		error!(item = fault.item, method = %fault.method, reason = %fault.reason, "queue.faulted");
		*self.fault.lock() = Some(fault);
		self.state.send_if_modified(|state| {
			if *state == QueueState::Closed {
				false
			} else {
				*state = QueueState::Faulted;
				true
			}
		});
		self.shutdown.cancel();
	}

	fn capture(&self, meta: &ItemMeta) -> Result<Option<F::Snapshot>, ContextError> {
		match meta.requirement {
			ContextRequirement::None => Ok(None),
			_ => self.factory.capture(meta).map(Some),
		}
	}

	/// Materializes the context (if any) and runs the item, racing both against cancellation.
	async fn execute(&self, meta: ItemMeta, snapshot: Option<F::Snapshot>, cancel: CancellationToken, job: Box<dyn Job<F::Context>>) -> Outcome {
		let token = self.shutdown.child_token();
		let context = match snapshot {
			None => None,
			Some(snapshot) => {
				let built = tokio::select! {
					biased;
					_ = cancel.cancelled() => Err(ContextError::ConnectionGone),
					_ = token.cancelled() => Err(ContextError::ConnectionGone),
					built = self.factory.materialize(snapshot, &meta, &token) => built,
				};
				match built {
					Ok(context) => {
						if context.is_none() {
							trace!(item = meta.id, method = %meta.method, "queue.item.no_context");
						}
						context
					}
					Err(err) => return fail_context(&meta, job, err),
				}
			}
		};
		job.execute(context, cancel, token).await
	}
}

fn fail_context<C>(meta: &ItemMeta, job: Box<dyn Job<C>>, err: ContextError) -> Outcome {
	match err {
		ContextError::ConnectionGone => {
			debug!(item = meta.id, method = %meta.method, "queue.item.connection_gone");
			job.fail(RequestError::Cancelled);
			Outcome::Cancelled
		}
		ContextError::Failed(reason) => {
			warn!(item = meta.id, method = %meta.method, %reason, "queue.item.context_failed");
			job.fail(RequestError::Context(reason.clone()));
			Outcome::Failed(reason)
		}
	}
}

/// Executes requests against shared state with single-writer, many-reader ordering.
///
/// Cloning yields another handle to the same queue. When every handle is dropped, the queue
/// finishes the items already admitted and closes.
pub struct RequestExecutionQueue<F: RequestContextFactory> {
	inner: Arc<Inner<F>>,
	tx: mpsc::UnboundedSender<Entry<F::Context>>,
}

impl<F: RequestContextFactory> Clone for RequestExecutionQueue<F> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
			tx: self.tx.clone(),
		}
	}
}

impl<F: RequestContextFactory> RequestExecutionQueue<F> {
	/// Creates a queue and starts its sequencer on the current runtime.
	pub fn new(factory: Arc<F>, config: QueueConfig) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (state, _) = watch::channel(QueueState::Running);
		let pool = WorkerPool::new(TaskClass::Read, config.max_concurrent_reads);
		let inner = Arc::new(Inner {
			factory,
			config,
			state,
			fault: Mutex::new(None),
			shutdown: CancellationToken::new(),
			ids: GenerationClock::new(),
		});
		let sequencer = Sequencer {
			inner: Arc::clone(&inner),
			rx,
			reads: WorkerJoinSet::new(TaskClass::Read),
			pool,
		};
		sable_worker::spawn(TaskClass::Sequencer, sequencer.run());
		Self { inner, tx }
	}

	/// The context factory items are built with.
	pub fn factory(&self) -> &Arc<F> {
		&self.inner.factory
	}

	/// Admits an item. Never blocks.
	///
	/// If the queue is not [`QueueState::Running`], the returned handle resolves to
	/// [`RequestError::QueueClosed`] immediately.
	pub fn enqueue<T: Send + 'static>(&self, item: QueueItem<F::Context, T>) -> RequestHandle<T> {
		let id = self.inner.ids.next();
		let (sink, rx) = oneshot::channel();
		let handle = RequestHandle::new(id, rx, item.cancel.clone());
		let meta = ItemMeta {
			id,
			method: item.method,
			mutates: item.mutates,
			requirement: item.requirement,
			document: item.document,
		};
		let job: Box<dyn Job<F::Context>> = Box::new(TypedJob { run: item.run, sink });

		if self.state() != QueueState::Running {
			trace!(item = id, method = %meta.method, "queue.item.rejected");
			job.fail(RequestError::QueueClosed);
			return handle;
		}
		trace!(item = id, method = %meta.method, mutates = meta.mutates, "queue.item.admitted");
		let entry = Entry {
			meta,
			cancel: item.cancel,
			job,
		};
		if let Err(mpsc::error::SendError(entry)) = self.tx.send(entry) {
			entry.job.fail(RequestError::QueueClosed);
		}
		handle
	}

	/// Current lifecycle state.
	pub fn state(&self) -> QueueState {
		*self.inner.state.borrow()
	}

	/// Subscribes to lifecycle transitions.
	pub fn subscribe(&self) -> watch::Receiver<QueueState> {
		self.inner.state.subscribe()
	}

	/// The fault recorded when a mutating item failed.
	pub fn fault(&self) -> Option<QueueFault> {
		self.inner.fault.lock().clone()
	}

	/// Stops admission, cancels in-flight items, and waits for [`QueueState::Closed`].
	///
	/// Queued items that were not started yet fail with [`RequestError::QueueClosed`].
	/// Idempotent; concurrent callers all return once the queue is closed.
	pub async fn shutdown(&self) {
		self.inner.begin_shutdown();
		let mut state = self.subscribe();
		let _ = state.wait_for(|state| *state == QueueState::Closed).await;
	}
}

impl<F: RequestContextFactory> std::fmt::Debug for RequestExecutionQueue<F> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestExecutionQueue")
			.field("state", &self.state())
			.field("config", &self.inner.config)
			.finish()
	}
}

struct Sequencer<F: RequestContextFactory> {
	inner: Arc<Inner<F>>,
	rx: mpsc::UnboundedReceiver<Entry<F::Context>>,
	reads: WorkerJoinSet<()>,
	pool: WorkerPool,
}

impl<F: RequestContextFactory> Sequencer<F> {
	async fn run(mut self) {
		debug!(max_reads = ?self.pool.limit(), "queue.sequencer.started");
		loop {
			self.reads.reap();
			let entry = tokio::select! {
				biased;
				_ = self.inner.shutdown.cancelled() => break,
				entry = self.rx.recv() => match entry {
					Some(entry) => entry,
					None => {
						// Every handle is gone: let admitted work finish.
						self.inner.stop_admission();
						break;
					}
				},
			};
			if entry.cancel.is_cancelled() {
				trace!(item = entry.meta.id, "queue.item.cancelled");
				entry.job.fail(RequestError::Cancelled);
				continue;
			}
			if entry.meta.mutates {
				if let Err(fault) = self.run_mutation(entry).await {
					self.inner.record_fault(fault);
					break;
				}
			} else {
				self.dispatch_read(entry);
			}
		}
		self.close().await;
	}

	fn dispatch_read(&mut self, entry: Entry<F::Context>) {
		let Entry { meta, cancel, job } = entry;
		let snapshot = match self.inner.capture(&meta) {
			Ok(snapshot) => snapshot,
			Err(err) => {
				fail_context(&meta, job, err);
				return;
			}
		};
		let inner = Arc::clone(&self.inner);
		self.pool.spawn_in(&mut self.reads, async move {
			let (id, method) = (meta.id, Arc::clone(&meta.method));
			match inner.execute(meta, snapshot, cancel, job).await {
				Outcome::Completed => trace!(item = id, %method, "queue.read.completed"),
				Outcome::Cancelled => debug!(item = id, %method, "queue.read.cancelled"),
				Outcome::Failed(reason) => debug!(item = id, %method, %reason, "queue.read.failed"),
			}
		});
	}

	async fn run_mutation(&mut self, entry: Entry<F::Context>) -> Result<(), QueueFault> {
		let Entry { meta, cancel, job } = entry;
		if !self.reads.is_empty() {
			trace!(item = meta.id, pending = self.reads.len(), "queue.mutation.draining");
			tokio::select! {
				biased;
				_ = self.inner.shutdown.cancelled() => {
					job.fail(RequestError::QueueClosed);
					return Ok(());
				}
				_ = cancel.cancelled() => {
					debug!(item = meta.id, "queue.mutation.cancelled");
					job.fail(RequestError::Cancelled);
					return Ok(());
				}
				_ = self.reads.drain() => {}
			}
		}

		let fault = |reason: String| QueueFault {
			item: meta.id,
			method: meta.method.to_string(),
			reason,
		};
		let snapshot = match self.inner.capture(&meta) {
			Ok(snapshot) => snapshot,
			Err(err) => {
				return match fail_context(&meta, job, err) {
					Outcome::Failed(reason) => Err(fault(reason)),
					_ => Ok(()),
				};
			}
		};

		trace!(item = meta.id, method = %meta.method, "queue.mutation.started");
		let inner = Arc::clone(&self.inner);
		let task_meta = meta.clone();
		let task = sable_worker::spawn(TaskClass::Sequencer, async move { inner.execute(task_meta, snapshot, cancel, job).await });
		match task.await {
			Ok(Outcome::Completed) => {
				trace!(item = meta.id, "queue.mutation.completed");
				Ok(())
			}
			Ok(Outcome::Cancelled) => {
				debug!(item = meta.id, method = %meta.method, "queue.mutation.cancelled");
				Ok(())
			}
			Ok(Outcome::Failed(reason)) => Err(fault(reason)),
			Err(err) if err.is_panic() => Err(fault("handler panicked".to_owned())),
			Err(err) => Err(fault(err.to_string())),
		}
	}

	async fn close(mut self) {
		self.rx.close();
		let mut rejected = 0usize;
		while let Ok(entry) = self.rx.try_recv() {
			entry.job.fail(RequestError::QueueClosed);
			rejected += 1;
		}

		// Without an explicit shutdown or fault, admitted reads run to completion.
		if !self.inner.shutdown.is_cancelled() {
			self.reads.drain().await;
		}
		let timeout = Duration::from_millis(self.inner.config.shutdown_timeout_ms);
		if tokio::time::timeout(timeout, self.reads.drain()).await.is_err() {
			warn!(pending = self.reads.len(), "queue.shutdown.timeout");
			self.reads.abort_all();
			self.reads.drain().await;
		}
		self.inner.shutdown.cancel();
		self.inner.state.send_replace(QueueState::Closed);
		debug!(rejected, "queue.closed");
	}
}
