//! In-memory context factory used by the queue and dispatcher tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sable_assets::{DocumentId, ProjectId};
use tokio_util::sync::CancellationToken;

use crate::{ContextError, ItemMeta, RequestContextFactory};

pub(crate) type Docs = Arc<BTreeMap<DocumentId, String>>;

pub(crate) fn doc(index: u32) -> DocumentId {
	DocumentId::new(ProjectId(0), index)
}

#[derive(Default)]
pub(crate) struct DocsFactory {
	current: Arc<Mutex<Docs>>,
	pub captures: AtomicUsize,
	pub gone: AtomicBool,
	pub broken: AtomicBool,
	pub delay: Mutex<Option<Duration>>,
}

impl DocsFactory {
	pub fn with_docs(docs: impl IntoIterator<Item = (DocumentId, &'static str)>) -> Arc<Self> {
		let factory = Self::default();
		*factory.current.lock() = Arc::new(docs.into_iter().map(|(id, text)| (id, text.to_owned())).collect());
		Arc::new(factory)
	}

	pub fn text(&self, id: DocumentId) -> Option<String> {
		self.current.lock().get(&id).cloned()
	}
}

pub(crate) struct DocsContext {
	pub docs: Docs,
	pub target: Option<String>,
	current: Arc<Mutex<Docs>>,
}

impl DocsContext {
	/// Publishes a new authoritative version derived from the observed one.
	pub fn commit(&self, edit: impl FnOnce(&mut BTreeMap<DocumentId, String>)) {
		let mut next = (*self.docs).clone();
		edit(&mut next);
		*self.current.lock() = Arc::new(next);
	}
}

#[async_trait]
impl RequestContextFactory for DocsFactory {
	type Snapshot = Docs;
	type Context = DocsContext;

	fn capture(&self, _meta: &ItemMeta) -> Result<Docs, ContextError> {
		self.captures.fetch_add(1, Ordering::SeqCst);
		Ok(Arc::clone(&self.current.lock()))
	}

	async fn materialize(&self, docs: Docs, meta: &ItemMeta, cancel: &CancellationToken) -> Result<Option<DocsContext>, ContextError> {
		let delay = *self.delay.lock();
		if let Some(delay) = delay {
			tokio::select! {
				_ = cancel.cancelled() => return Err(ContextError::ConnectionGone),
				_ = tokio::time::sleep(delay) => {}
			}
		}
		if self.gone.load(Ordering::SeqCst) {
			return Err(ContextError::ConnectionGone);
		}
		if self.broken.load(Ordering::SeqCst) {
			return Err(ContextError::Failed("state source corrupted".into()));
		}
		let target = match meta.document {
			Some(id) => match docs.get(&id) {
				Some(text) => Some(text.clone()),
				None => return Ok(None),
			},
			None => None,
		};
		Ok(Some(DocsContext {
			docs,
			target,
			current: Arc::clone(&self.current),
		}))
	}
}
