use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use sable_assets::{Asset, Checksum, ScopeId};
use sable_worker::TaskClass;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::codec::{self, AssetRequest};
use crate::{Result, SyncError};

/// Worker-side channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
	/// Maximum number of assets kept in the worker mirror.
	pub cache_capacity: usize,
	/// Upper bound for one round trip in milliseconds. `0` disables the timeout.
	pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			cache_capacity: 4096,
			request_timeout_ms: 30_000,
		}
	}
}

impl SyncConfig {
	/// Round-trip timeout, `None` when disabled.
	pub fn request_timeout(&self) -> Option<Duration> {
		(self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
	}
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Channel {
	reader: BoxReader,
	writer: BoxWriter,
}

impl Channel {
	async fn round_trip(&mut self, request: &AssetRequest) -> Result<Vec<Asset>> {
		codec::write_request(&mut self.writer, request).await?;
		codec::read_response(&mut self.reader, request.scope, &request.checksums).await
	}
}

struct Shared {
	channel: Mutex<Channel>,
	poisoned: AtomicBool,
	round_trips: AtomicU64,
	assets_received: AtomicU64,
}

/// Worker side of the synchronization channel.
///
/// Owns both halves of the byte stream to the primary. Round trips are serialized: one
/// request frame is in flight per channel, and its response is read to the end before the
/// next request is written.
///
/// Each round trip runs in its own task, so a requester that is cancelled or times out stops
/// waiting without leaving half a frame on the stream. A timed-out or protocol-fatal round
/// trip poisons the channel; every later request fails with [`SyncError::Poisoned`].
#[derive(Clone)]
pub struct AssetClient {
	shared: Arc<Shared>,
	timeout: Option<Duration>,
}

impl AssetClient {
	/// Creates a client over separate read and write halves.
	pub fn new<R, W>(reader: R, writer: W, config: &SyncConfig) -> Self
	where
		R: AsyncRead + Send + Unpin + 'static,
		W: AsyncWrite + Send + Unpin + 'static,
	{
		Self {
			shared: Arc::new(Shared {
				channel: Mutex::new(Channel {
					reader: Box::new(reader),
					writer: Box::new(writer),
				}),
				poisoned: AtomicBool::new(false),
				round_trips: AtomicU64::new(0),
				assets_received: AtomicU64::new(0),
			}),
			timeout: config.request_timeout(),
		}
	}

	/// Creates a client over a bidirectional stream.
	pub fn from_stream<S>(stream: S, config: &SyncConfig) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (reader, writer) = tokio::io::split(stream);
		Self::new(reader, writer, config)
	}

	/// Returns true once a fatal error has made the channel unusable.
	pub fn is_poisoned(&self) -> bool {
		self.shared.poisoned.load(Ordering::Acquire)
	}

	/// Number of completed round trips.
	pub fn round_trips(&self) -> u64 {
		self.shared.round_trips.load(Ordering::Relaxed)
	}

	/// Number of assets received over all round trips.
	pub fn assets_received(&self) -> u64 {
		self.shared.assets_received.load(Ordering::Relaxed)
	}

	/// Requests the assets behind `checksums` within `scope`.
	///
	/// Returns exactly one verified asset per requested checksum, in request order.
	pub async fn request_assets(&self, scope: ScopeId, checksums: &[Checksum], cancel: &CancellationToken) -> Result<Vec<Asset>> {
		if self.is_poisoned() {
			return Err(SyncError::Poisoned);
		}
		let shared = Arc::clone(&self.shared);
		let timeout = self.timeout;
		let request = AssetRequest {
			scope,
			checksums: checksums.to_vec(),
		};

		let task = sable_worker::spawn(TaskClass::Sync, async move {
			let mut channel = shared.channel.lock().await;
			if shared.poisoned.load(Ordering::Acquire) {
				return Err(SyncError::Poisoned);
			}
			trace!(scope = %request.scope, count = request.checksums.len(), "sync.client.request");
			let result = match timeout {
				Some(limit) => tokio::time::timeout(limit, channel.round_trip(&request))
					.await
					.unwrap_or(Err(SyncError::Timeout)),
				None => channel.round_trip(&request).await,
			};
			match &result {
				Ok(assets) => {
					shared.round_trips.fetch_add(1, Ordering::Relaxed);
					shared.assets_received.fetch_add(assets.len() as u64, Ordering::Relaxed);
				}
				Err(err) if err.is_transient() => {
					debug!(scope = %request.scope, error = %err, "sync.client.transient");
				}
				Err(err) => {
					error!(scope = %request.scope, error = %err, "sync.client.poisoned");
					shared.poisoned.store(true, Ordering::Release);
				}
			}
			result
		});

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(SyncError::Cancelled),
			joined = task => joined.map_err(|err| SyncError::Io(io::Error::other(err)))?,
		}
	}
}

impl std::fmt::Debug for AssetClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AssetClient")
			.field("poisoned", &self.is_poisoned())
			.field("round_trips", &self.round_trips())
			.field("timeout", &self.timeout)
			.finish()
	}
}
