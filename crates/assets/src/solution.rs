//! In-memory workspace model and its conversion to and from state graphs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::manifest::{decode, encode};
use crate::{
	Asset, AssetError, AssetKind, Checksum, DocumentEntry, ProjectEntry, ProjectManifest, Result, SolutionManifest,
};

/// Identifies a project within a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub u32);

/// Identifies a document within its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId {
	/// Owning project.
	pub project: ProjectId,
	/// Index within the project.
	pub index: u32,
}

impl DocumentId {
	/// Creates a document id.
	pub const fn new(project: ProjectId, index: u32) -> Self {
		Self { project, index }
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "p{}/d{}", self.project.0, self.index)
	}
}

/// Options a project is compiled with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationOptions {
	/// Language identifier.
	pub language: String,
	/// Preprocessor symbols.
	pub defines: Vec<String>,
}

/// A single source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
	id: DocumentId,
	path: String,
	text: Arc<str>,
}

impl Document {
	/// Document id.
	pub fn id(&self) -> DocumentId {
		self.id
	}

	/// Workspace-relative path.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Full text.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Checksum the text is published under.
	pub fn text_checksum(&self) -> Checksum {
		Checksum::of(AssetKind::DocumentText, self.text.as_bytes())
	}
}

/// A project: options, references, and documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
	id: ProjectId,
	name: String,
	options: CompilationOptions,
	references: Vec<ProjectId>,
	documents: BTreeMap<DocumentId, Document>,
	/// Index the next added document receives. Never reused after removal.
	next_document: u32,
}

impl Project {
	/// Project id.
	pub fn id(&self) -> ProjectId {
		self.id
	}

	/// Display name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Compilation options.
	pub fn options(&self) -> &CompilationOptions {
		&self.options
	}

	/// Referenced projects.
	pub fn references(&self) -> &[ProjectId] {
		&self.references
	}

	/// Documents in id order.
	pub fn documents(&self) -> impl Iterator<Item = &Document> {
		self.documents.values()
	}

	fn manifest(&self, graph: &mut HashMap<Checksum, Asset>) -> Result<ProjectManifest> {
		let options = insert(graph, encode(AssetKind::CompilationOptions, &self.options)?);
		let references = insert(graph, encode(AssetKind::ProjectReferences, &self.references)?);
		let documents = self
			.documents
			.values()
			.map(|doc| DocumentEntry {
				id: doc.id,
				path: doc.path.clone(),
				text: insert(
					graph,
					Asset::new(AssetKind::DocumentText, Bytes::copy_from_slice(doc.text.as_bytes())),
				),
			})
			.collect();
		Ok(ProjectManifest {
			id: self.id,
			name: self.name.clone(),
			options,
			references,
			documents,
			next_document: self.next_document,
		})
	}
}

/// A whole workspace version.
///
/// Projects are shared between versions, so cloning a solution and editing one document only
/// copies the touched project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
	projects: BTreeMap<ProjectId, Arc<Project>>,
	next_project: u32,
}

/// A solution encoded as content-addressed assets.
#[derive(Debug, Clone)]
pub struct StateGraph {
	/// Checksum of the root [`SolutionManifest`] asset.
	pub root: Checksum,
	/// Every asset reachable from the root, including the root itself.
	pub assets: HashMap<Checksum, Asset>,
}

impl StateGraph {
	/// Returns the asset stored under `checksum`.
	pub fn get(&self, checksum: &Checksum) -> Option<&Asset> {
		self.assets.get(checksum)
	}
}

impl Solution {
	/// Creates an empty solution.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a project and returns its id.
	pub fn add_project(&mut self, name: impl Into<String>, options: CompilationOptions) -> ProjectId {
		let id = ProjectId(self.next_project);
		self.next_project += 1;
		self.projects.insert(
			id,
			Arc::new(Project {
				id,
				name: name.into(),
				options,
				references: Vec::new(),
				documents: BTreeMap::new(),
				next_document: 0,
			}),
		);
		id
	}

	/// Records that `from` references `to`. Returns false if either project is unknown.
	pub fn add_reference(&mut self, from: ProjectId, to: ProjectId) -> bool {
		if !self.projects.contains_key(&to) {
			return false;
		}
		let Some(project) = self.projects.get_mut(&from) else {
			return false;
		};
		let project = Arc::make_mut(project);
		if !project.references.contains(&to) {
			project.references.push(to);
		}
		true
	}

	/// Adds a document to `project`. Returns `None` if the project is unknown.
	pub fn add_document(&mut self, project: ProjectId, path: impl Into<String>, text: impl Into<Arc<str>>) -> Option<DocumentId> {
		let project = Arc::make_mut(self.projects.get_mut(&project)?);
		let id = DocumentId::new(project.id, project.next_document);
		project.next_document += 1;
		project.documents.insert(
			id,
			Document {
				id,
				path: path.into(),
				text: text.into(),
			},
		);
		Some(id)
	}

	/// Replaces a document's text. Returns false if the document is unknown.
	pub fn set_document_text(&mut self, id: DocumentId, text: impl Into<Arc<str>>) -> bool {
		let Some(project) = self.projects.get_mut(&id.project) else {
			return false;
		};
		if !project.documents.contains_key(&id) {
			return false;
		}
		let project = Arc::make_mut(project);
		if let Some(doc) = project.documents.get_mut(&id) {
			doc.text = text.into();
		}
		true
	}

	/// Removes a document. Returns false if it was not present.
	pub fn remove_document(&mut self, id: DocumentId) -> bool {
		let Some(project) = self.projects.get_mut(&id.project) else {
			return false;
		};
		if !project.documents.contains_key(&id) {
			return false;
		}
		Arc::make_mut(project).documents.remove(&id).is_some()
	}

	/// Looks up a project.
	pub fn project(&self, id: ProjectId) -> Option<&Project> {
		self.projects.get(&id).map(Arc::as_ref)
	}

	/// Projects in id order.
	pub fn projects(&self) -> impl Iterator<Item = &Project> {
		self.projects.values().map(Arc::as_ref)
	}

	/// Looks up a document.
	pub fn document(&self, id: DocumentId) -> Option<&Document> {
		self.projects.get(&id.project)?.documents.get(&id)
	}

	/// Total number of documents across projects.
	pub fn document_count(&self) -> usize {
		self.projects.values().map(|p| p.documents.len()).sum()
	}

	/// Encodes this solution as a state graph.
	pub fn to_graph(&self) -> Result<StateGraph> {
		let mut assets = HashMap::new();
		let mut projects = Vec::with_capacity(self.projects.len());
		for project in self.projects.values() {
			let manifest = project.manifest(&mut assets)?;
			projects.push(ProjectEntry {
				id: project.id,
				manifest: insert(&mut assets, manifest.to_asset()?),
			});
		}
		let manifest = SolutionManifest {
			projects,
			next_project: self.next_project,
		};
		let root = insert(&mut assets, manifest.to_asset()?);
		Ok(StateGraph { root, assets })
	}

	/// Checksum of this solution's root manifest.
	pub fn checksum(&self) -> Result<Checksum> {
		Ok(self.to_graph()?.root)
	}

	/// Rebuilds a solution from its manifests and a leaf lookup.
	///
	/// Every project manifest named by `manifest` must be present in `projects`, and every leaf
	/// they reference must be returned by `lookup`. Id counters resume past every id in use, so
	/// ids freed before the manifest was written stay retired.
	pub fn assemble(
		manifest: &SolutionManifest,
		projects: &HashMap<Checksum, ProjectManifest>,
		lookup: impl Fn(&Checksum) -> Option<Asset>,
	) -> Result<Self> {
		let fetch = |checksum: &Checksum| lookup(checksum).ok_or(AssetError::Missing(*checksum));
		let mut out = BTreeMap::new();
		for entry in &manifest.projects {
			let pm = projects.get(&entry.manifest).ok_or(AssetError::Missing(entry.manifest))?;
			let options: CompilationOptions = decode(&fetch(&pm.options)?, AssetKind::CompilationOptions)?;
			let references: Vec<ProjectId> = decode(&fetch(&pm.references)?, AssetKind::ProjectReferences)?;
			let mut documents = BTreeMap::new();
			for doc in &pm.documents {
				let asset = fetch(&doc.text)?;
				if asset.kind() != AssetKind::DocumentText {
					return Err(AssetError::KindMismatch {
						checksum: doc.text,
						expected: AssetKind::DocumentText,
						found: asset.kind(),
					});
				}
				let text = std::str::from_utf8(asset.payload()).map_err(|_| AssetError::InvalidText(doc.text))?;
				documents.insert(
					doc.id,
					Document {
						id: doc.id,
						path: doc.path.clone(),
						text: Arc::from(text),
					},
				);
			}
			let next_document = documents.keys().next_back().map_or(0, |id| id.index + 1).max(pm.next_document);
			out.insert(
				pm.id,
				Arc::new(Project {
					id: pm.id,
					name: pm.name.clone(),
					options,
					references,
					documents,
					next_document,
				}),
			);
		}
		let next_project = out.keys().next_back().map_or(0, |id| id.0 + 1).max(manifest.next_project);
		Ok(Self {
			projects: out,
			next_project,
		})
	}

	/// Rebuilds a solution from a complete state graph.
	pub fn from_graph(graph: &StateGraph) -> Result<Self> {
		let root = graph.get(&graph.root).ok_or(AssetError::Missing(graph.root))?;
		let manifest = SolutionManifest::from_asset(root)?;
		let mut projects = HashMap::new();
		for checksum in manifest.project_checksums() {
			let asset = graph.get(&checksum).ok_or(AssetError::Missing(checksum))?;
			projects.insert(checksum, ProjectManifest::from_asset(asset)?);
		}
		Self::assemble(&manifest, &projects, |c| graph.get(c).cloned())
	}
}

fn insert(graph: &mut HashMap<Checksum, Asset>, asset: Asset) -> Checksum {
	let checksum = asset.checksum();
	graph.entry(checksum).or_insert(asset);
	checksum
}
