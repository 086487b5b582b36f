use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use sable_assets::{AssetError, AssetStore};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::codec::{self, AssetRequest};
use crate::{Result, SyncError};

/// Primary side of the synchronization channel.
///
/// Answers [`AssetRequest`] frames out of an [`AssetStore`], only ever returning assets
/// reachable from the requested scope. Cloning yields another handle sharing the same store
/// and counters.
#[derive(Debug, Clone)]
pub struct AssetProvider {
	store: AssetStore,
	served: Arc<AtomicU64>,
}

impl AssetProvider {
	/// Creates a provider serving out of `store`.
	pub fn new(store: AssetStore) -> Self {
		Self {
			store,
			served: Arc::new(AtomicU64::new(0)),
		}
	}

	/// The backing store.
	pub fn store(&self) -> &AssetStore {
		&self.store
	}

	/// Number of request frames answered so far.
	pub fn requests_served(&self) -> u64 {
		self.served.load(Ordering::Relaxed)
	}

	/// Serves request frames until the peer closes the stream or `cancel` fires.
	///
	/// A clean end of stream between frames is a normal shutdown. Transient I/O failures are
	/// logged and end the loop without an error.
	pub async fn serve<R, W>(&self, mut reader: R, mut writer: W, cancel: CancellationToken) -> Result<()>
	where
		R: AsyncRead + Unpin,
		W: AsyncWrite + Unpin,
	{
		loop {
			let request = tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					debug!("sync.provider.cancelled");
					return Ok(());
				}
				request = codec::read_request(&mut reader) => request,
			};
			let request = match request {
				Ok(Some(request)) => request,
				Ok(None) => {
					debug!("sync.provider.eof");
					return Ok(());
				}
				Err(err) if err.is_transient() => {
					warn!(error = %err, "sync.provider.connection_lost");
					return Ok(());
				}
				Err(err) => return Err(err),
			};
			if let Err(err) = self.respond(&mut writer, &request).await {
				if err.is_transient() {
					warn!(error = %err, "sync.provider.connection_lost");
					return Ok(());
				}
				return Err(err);
			}
		}
	}

	/// Writes the response to one request.
	///
	/// A released scope produces the scope-gone marker. A checksum outside the scope's reachable
	/// set produces the missing-asset sentinel in its slot.
	pub async fn respond<W>(&self, writer: &mut W, request: &AssetRequest) -> Result<()>
	where
		W: AsyncWrite + Unpin,
	{
		let scope = request.scope;
		trace!(scope = %scope, count = request.checksums.len(), "sync.provider.request");
		let resolved = match request.checksums.as_slice() {
			[checksum] => self
				.store
				.resolve_in_scope(&scope, checksum)
				.map(|asset| vec![(*checksum, asset)]),
			checksums => self.store.resolve_many_in_scope(&scope, checksums),
		};
		match resolved {
			Ok(entries) => {
				codec::write_count(writer, entries.len()).await?;
				for (checksum, asset) in &entries {
					if asset.is_none() {
						warn!(scope = %scope, checksum = %checksum, "sync.provider.missing");
					}
					codec::write_entry(writer, checksum, asset.as_ref()).await?;
				}
			}
			Err(AssetError::ScopeNotFound(_)) => {
				debug!(scope = %scope, "sync.provider.scope_gone");
				codec::write_scope_gone(writer).await?;
			}
			Err(err) => return Err(SyncError::Asset(err)),
		}
		self.finish(writer).await
	}

	async fn finish<W>(&self, writer: &mut W) -> Result<()>
	where
		W: AsyncWrite + Unpin,
	{
		writer.flush().await?;
		self.served.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}
}

#[cfg(test)]
mod tests;
