use std::fmt;

use bytes::Bytes;

use crate::Checksum;

/// Discriminates how an asset payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AssetKind {
	/// Root of a solution graph.
	SolutionManifest = 1,
	/// One project's manifest.
	ProjectManifest = 2,
	/// UTF-8 text of a document.
	DocumentText = 3,
	/// A project's reference list.
	ProjectReferences = 4,
	/// A project's compilation options.
	CompilationOptions = 5,
}

impl AssetKind {
	/// Every kind, in tag order.
	pub const ALL: [Self; 5] = [
		Self::SolutionManifest,
		Self::ProjectManifest,
		Self::DocumentText,
		Self::ProjectReferences,
		Self::CompilationOptions,
	];

	/// Wire tag of this kind.
	pub const fn tag(self) -> u8 {
		self as u8
	}

	/// Parses a wire tag.
	pub fn from_tag(tag: u8) -> Option<Self> {
		Self::ALL.into_iter().find(|kind| kind.tag() == tag)
	}

	/// Stable name used in logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::SolutionManifest => "solution_manifest",
			Self::ProjectManifest => "project_manifest",
			Self::DocumentText => "document_text",
			Self::ProjectReferences => "project_references",
			Self::CompilationOptions => "compilation_options",
		}
	}
}

impl fmt::Display for AssetKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Immutable payload tagged with its kind and checksum.
///
/// Cloning is cheap; the payload is reference counted.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
	kind: AssetKind,
	checksum: Checksum,
	payload: Bytes,
}

impl Asset {
	/// Creates an asset, computing its checksum from the payload.
	pub fn new(kind: AssetKind, payload: impl Into<Bytes>) -> Self {
		let payload = payload.into();
		let checksum = Checksum::of(kind, &payload);
		Self { kind, checksum, payload }
	}

	/// Rebuilds an asset received from a peer under the checksum the peer claimed.
	///
	/// Use [`Asset::verify`] before trusting it.
	pub fn from_parts(kind: AssetKind, checksum: Checksum, payload: Bytes) -> Self {
		Self { kind, checksum, payload }
	}

	/// Asset kind.
	pub fn kind(&self) -> AssetKind {
		self.kind
	}

	/// Content checksum.
	pub fn checksum(&self) -> Checksum {
		self.checksum
	}

	/// Serialized payload.
	pub fn payload(&self) -> &Bytes {
		&self.payload
	}

	/// Returns true if the payload re-hashes to the recorded checksum.
	pub fn verify(&self) -> bool {
		Checksum::of(self.kind, &self.payload) == self.checksum
	}
}

impl fmt::Debug for Asset {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Asset")
			.field("kind", &self.kind)
			.field("checksum", &self.checksum)
			.field("len", &self.payload.len())
			.finish()
	}
}
