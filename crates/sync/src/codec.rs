//! Frame layout of the synchronization channel.
//!
//! Worker to primary, one frame per round trip:
//!
//! ```text
//! u32 LE length | postcard(AssetRequest)
//! ```
//!
//! Primary to worker:
//!
//! ```text
//! u32 LE count | count x ( checksum[16] | kind u8 | u32 LE len | payload[len] )
//! ```
//!
//! A count of [`SCOPE_GONE`] means the scope was released before the request was served and
//! no entries follow. An entry with kind [`MISSING_TAG`] and length 0 is the missing-asset
//! sentinel: the checksum is not reachable in the scope.

use std::collections::HashMap;

use bytes::Bytes;
use sable_assets::{Asset, AssetKind, Checksum, ScopeId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Result, SyncError};

/// Kind tag of the missing-asset sentinel entry.
pub const MISSING_TAG: u8 = 0xFF;
/// Count marker announcing that the scope is gone.
pub const SCOPE_GONE: u32 = u32::MAX;
/// Upper bound for a request frame.
pub const MAX_REQUEST_LEN: usize = 16 * 1024 * 1024;
/// Upper bound for one asset payload.
pub const MAX_ASSET_LEN: usize = 256 * 1024 * 1024;

/// Request for the assets behind a list of checksums in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
	/// Pinned version the checksums must be reachable from.
	pub scope: ScopeId,
	/// Requested checksums.
	pub checksums: Vec<Checksum>,
}

/// Writes one request frame.
pub async fn write_request<W>(writer: &mut W, request: &AssetRequest) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let body = postcard::to_stdvec(request)?;
	if body.len() > MAX_REQUEST_LEN {
		return Err(SyncError::FrameTooLarge(body.len()));
	}
	writer.write_u32_le(body.len() as u32).await?;
	writer.write_all(&body).await?;
	writer.flush().await?;
	Ok(())
}

/// Reads one request frame. Returns `None` on a clean end of stream between frames.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<AssetRequest>>
where
	R: AsyncRead + Unpin,
{
	let len = match reader.read_u32_le().await {
		Ok(len) => len as usize,
		Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
		Err(err) => return Err(err.into()),
	};
	if len > MAX_REQUEST_LEN {
		return Err(SyncError::FrameTooLarge(len));
	}
	let mut body = vec![0; len];
	reader.read_exact(&mut body).await?;
	Ok(Some(postcard::from_bytes(&body)?))
}

/// Writes a response count marker.
pub async fn write_count<W>(writer: &mut W, count: usize) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	let count = u32::try_from(count).ok().filter(|c| *c != SCOPE_GONE).ok_or(SyncError::FrameTooLarge(count))?;
	writer.write_u32_le(count).await?;
	Ok(())
}

/// Writes the scope-gone marker in place of a count.
pub async fn write_scope_gone<W>(writer: &mut W) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	writer.write_u32_le(SCOPE_GONE).await?;
	Ok(())
}

/// Writes one response entry: the asset, or the missing-asset sentinel for `checksum`.
pub async fn write_entry<W>(writer: &mut W, checksum: &Checksum, asset: Option<&Asset>) -> Result<()>
where
	W: AsyncWrite + Unpin,
{
	writer.write_all(checksum.as_bytes()).await?;
	match asset {
		Some(asset) => {
			let payload = asset.payload();
			if payload.len() > MAX_ASSET_LEN {
				return Err(SyncError::FrameTooLarge(payload.len()));
			}
			writer.write_u8(asset.kind().tag()).await?;
			writer.write_u32_le(payload.len() as u32).await?;
			writer.write_all(payload).await?;
		}
		None => {
			writer.write_u8(MISSING_TAG).await?;
			writer.write_u32_le(0).await?;
		}
	}
	Ok(())
}

/// One decoded response entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEntry {
	/// A transferred asset, not yet verified.
	Asset(Asset),
	/// The primary could not resolve this checksum in the scope.
	Missing(Checksum),
}

/// Reads a response count marker. `None` means the scope is gone.
pub async fn read_count<R>(reader: &mut R) -> Result<Option<usize>>
where
	R: AsyncRead + Unpin,
{
	match reader.read_u32_le().await? {
		SCOPE_GONE => Ok(None),
		count => Ok(Some(count as usize)),
	}
}

/// Reads one response entry.
pub async fn read_entry<R>(reader: &mut R) -> Result<ResponseEntry>
where
	R: AsyncRead + Unpin,
{
	let mut raw = [0u8; Checksum::LEN];
	reader.read_exact(&mut raw).await?;
	let checksum = Checksum::from_bytes(raw);
	let tag = reader.read_u8().await?;
	let len = reader.read_u32_le().await? as usize;
	if tag == MISSING_TAG {
		return Ok(ResponseEntry::Missing(checksum));
	}
	let kind = AssetKind::from_tag(tag).ok_or(SyncError::UnknownKind(tag))?;
	if len > MAX_ASSET_LEN {
		return Err(SyncError::FrameTooLarge(len));
	}
	let mut payload = vec![0; len];
	reader.read_exact(&mut payload).await?;
	Ok(ResponseEntry::Asset(Asset::from_parts(kind, checksum, Bytes::from(payload))))
}

/// Reads a full response to a request for `requested` in `scope` and validates it.
///
/// Every entry is consumed before any sentinel is reported, so the stream stays aligned on
/// frame boundaries. On success the assets come back in request order, one per requested
/// checksum. Fails with:
/// * [`SyncError::ScopeNotFound`] for the scope-gone marker,
/// * [`SyncError::CountMismatch`] if the count differs from the request,
/// * [`SyncError::MissingAsset`] for a missing-asset sentinel or a requested checksum that
///   never arrived,
/// * [`SyncError::Unexpected`] for an entry that was not requested, or sent more often than
///   requested,
/// * [`SyncError::Integrity`] for a payload that does not hash to its checksum.
pub async fn read_response<R>(reader: &mut R, scope: ScopeId, requested: &[Checksum]) -> Result<Vec<Asset>>
where
	R: AsyncRead + Unpin,
{
	let Some(count) = read_count(reader).await? else {
		return Err(SyncError::ScopeNotFound(scope));
	};
	if count != requested.len() {
		return Err(SyncError::CountMismatch {
			expected: requested.len(),
			actual: count,
		});
	}

	let mut assets = Vec::with_capacity(count);
	let mut missing = None;
	for _ in 0..count {
		match read_entry(reader).await? {
			ResponseEntry::Asset(asset) => assets.push(asset),
			ResponseEntry::Missing(checksum) => {
				missing.get_or_insert(checksum);
			}
		}
	}
	if let Some(checksum) = missing {
		return Err(SyncError::MissingAsset(checksum));
	}

	let mut outstanding: HashMap<Checksum, usize> = HashMap::with_capacity(requested.len());
	for checksum in requested {
		*outstanding.entry(*checksum).or_default() += 1;
	}
	let mut received = HashMap::with_capacity(assets.len());
	for asset in assets {
		let checksum = asset.checksum();
		match outstanding.get_mut(&checksum) {
			Some(left) if *left > 0 => *left -= 1,
			_ => return Err(SyncError::Unexpected(checksum)),
		}
		if !asset.verify() {
			return Err(SyncError::Integrity(checksum));
		}
		received.insert(checksum, asset);
	}
	requested
		.iter()
		.map(|checksum| received.get(checksum).cloned().ok_or(SyncError::MissingAsset(*checksum)))
		.collect()
}
