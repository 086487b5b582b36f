//! Manifest assets linking a solution root to its projects and leaves.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Asset, AssetError, AssetKind, Checksum, DocumentId, ProjectId, Result};

/// Root asset of a solution graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionManifest {
	/// Projects in id order.
	pub projects: Vec<ProjectEntry>,
	/// Id the next added project receives.
	pub next_project: u32,
}

/// One project as listed by the solution manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
	/// Project id.
	pub id: ProjectId,
	/// Checksum of the project's [`ProjectManifest`].
	pub manifest: Checksum,
}

/// Per-project manifest referencing the project's leaf assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectManifest {
	/// Project id.
	pub id: ProjectId,
	/// Display name.
	pub name: String,
	/// Checksum of the [`AssetKind::CompilationOptions`] leaf.
	pub options: Checksum,
	/// Checksum of the [`AssetKind::ProjectReferences`] leaf.
	pub references: Checksum,
	/// Documents in id order.
	pub documents: Vec<DocumentEntry>,
	/// Index the next added document receives.
	pub next_document: u32,
}

/// One document as listed by its project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
	/// Document id.
	pub id: DocumentId,
	/// Workspace-relative path.
	pub path: String,
	/// Checksum of the [`AssetKind::DocumentText`] leaf.
	pub text: Checksum,
}

impl SolutionManifest {
	/// Encodes the manifest as a [`AssetKind::SolutionManifest`] asset.
	pub fn to_asset(&self) -> Result<Asset> {
		encode(AssetKind::SolutionManifest, self)
	}

	/// Decodes a solution manifest asset.
	pub fn from_asset(asset: &Asset) -> Result<Self> {
		decode(asset, AssetKind::SolutionManifest)
	}

	/// Checksums of every project manifest.
	pub fn project_checksums(&self) -> impl Iterator<Item = Checksum> + '_ {
		self.projects.iter().map(|p| p.manifest)
	}
}

impl ProjectManifest {
	/// Encodes the manifest as a [`AssetKind::ProjectManifest`] asset.
	pub fn to_asset(&self) -> Result<Asset> {
		encode(AssetKind::ProjectManifest, self)
	}

	/// Decodes a project manifest asset.
	pub fn from_asset(asset: &Asset) -> Result<Self> {
		decode(asset, AssetKind::ProjectManifest)
	}

	/// Checksums of every leaf asset this project references.
	pub fn leaf_checksums(&self) -> impl Iterator<Item = Checksum> + '_ {
		[self.options, self.references]
			.into_iter()
			.chain(self.documents.iter().map(|d| d.text))
	}
}

pub(crate) fn encode<T: Serialize>(kind: AssetKind, value: &T) -> Result<Asset> {
	let bytes = postcard::to_stdvec(value).map_err(|source| AssetError::Encode { kind, source })?;
	Ok(Asset::new(kind, bytes))
}

pub(crate) fn decode<T: DeserializeOwned>(asset: &Asset, expected: AssetKind) -> Result<T> {
	if asset.kind() != expected {
		return Err(AssetError::KindMismatch {
			checksum: asset.checksum(),
			expected,
			found: asset.kind(),
		});
	}
	postcard::from_bytes(asset.payload()).map_err(|source| AssetError::Decode {
		kind: expected,
		checksum: asset.checksum(),
		source,
	})
}
