use std::io;

use sable_assets::{AssetError, Checksum, ScopeId};

/// A convenient type alias for `Result` with `E` = [`SyncError`].
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Errors raised by the synchronization channel.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
	/// Input/output errors from the underlying stream.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// A request frame could not be encoded or decoded.
	#[error("malformed request frame: {0}")]
	Frame(#[from] postcard::Error),
	/// A frame or payload exceeds the protocol limit.
	#[error("frame of {0} bytes exceeds the limit")]
	FrameTooLarge(usize),
	/// The peer sent an asset kind tag this side does not know.
	#[error("unknown asset kind tag {0:#04x}")]
	UnknownKind(u8),
	/// The primary could not resolve a requested checksum in the scope.
	#[error("asset {0} is not reachable in the requested scope")]
	MissingAsset(Checksum),
	/// A payload does not hash to the checksum it was sent under.
	#[error("asset {0} failed integrity check")]
	Integrity(Checksum),
	/// The primary returned a checksum that was not requested, or returned it more often than
	/// it was requested.
	#[error("asset {0} was not requested")]
	Unexpected(Checksum),
	/// The response count does not match the request.
	#[error("expected {expected} assets, peer announced {actual}")]
	CountMismatch {
		/// Number of checksums requested.
		expected: usize,
		/// Count marker received.
		actual: usize,
	},
	/// The scope was released on the primary before the request was served.
	#[error("scope {0} is no longer pinned")]
	ScopeNotFound(ScopeId),
	/// The requester stopped waiting.
	#[error("asset request cancelled")]
	Cancelled,
	/// The round trip did not complete in time.
	#[error("asset request timed out")]
	Timeout,
	/// An earlier fatal error left the channel unusable.
	#[error("synchronization channel is poisoned")]
	Poisoned,
	/// A received manifest could not be decoded or assembled.
	#[error(transparent)]
	Asset(#[from] AssetError),
}

impl SyncError {
	/// True for failures expected during teardown: the stream went away, the scope was
	/// disposed, or the requester cancelled. These are reported as "connection gone" rather
	/// than as handler-visible errors.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Io(err) => matches!(
				err.kind(),
				io::ErrorKind::UnexpectedEof
					| io::ErrorKind::BrokenPipe
					| io::ErrorKind::ConnectionReset
					| io::ErrorKind::ConnectionAborted
			),
			Self::ScopeNotFound(_) | Self::Cancelled => true,
			_ => false,
		}
	}
}
