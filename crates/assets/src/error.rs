use crate::{AssetKind, Checksum, ScopeId};

/// A convenient type alias for `Result` with `E` = [`AssetError`].
pub type Result<T, E = AssetError> = std::result::Result<T, E>;

/// Errors raised while decoding assets or resolving them from a store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AssetError {
	/// A payload could not be decoded as its declared kind.
	#[error("failed to decode {kind} asset {checksum}: {source}")]
	Decode {
		/// Declared kind.
		kind: AssetKind,
		/// Checksum of the offending asset.
		checksum: Checksum,
		/// Underlying codec error.
		#[source]
		source: postcard::Error,
	},
	/// An asset was found under a checksum but with a different kind.
	#[error("asset {checksum} has kind {found}, expected {expected}")]
	KindMismatch {
		/// Requested checksum.
		checksum: Checksum,
		/// Kind the caller needed.
		expected: AssetKind,
		/// Kind actually stored.
		found: AssetKind,
	},
	/// A checksum referenced by the graph could not be resolved.
	#[error("missing asset {0}")]
	Missing(Checksum),
	/// A document text asset is not valid UTF-8.
	#[error("document text {0} is not valid UTF-8")]
	InvalidText(Checksum),
	/// The scope was released or never existed.
	#[error("scope {0} is not pinned")]
	ScopeNotFound(ScopeId),
	/// The root was never published or has been evicted.
	#[error("unknown root {0}")]
	UnknownRoot(Checksum),
	/// A manifest could not be encoded.
	#[error("failed to encode {kind} asset: {source}")]
	Encode {
		/// Kind being encoded.
		kind: AssetKind,
		/// Underlying codec error.
		#[source]
		source: postcard::Error,
	},
}
