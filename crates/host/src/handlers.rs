//! Workspace methods served by the host.

use std::sync::Arc;

use async_trait::async_trait;
use sable_assets::Solution;
use sable_queue::{HandlerError, HandlerRegistry, MethodHandler, RegistryError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::WorkspaceContext;

/// Method names.
pub mod methods {
	/// Text of the target document.
	pub const DOCUMENT_TEXT: &str = "workspace/documentText";
	/// Checksum of the target document's text asset.
	pub const DOCUMENT_CHECKSUM: &str = "workspace/documentChecksum";
	/// Replace the target document's text.
	pub const APPLY_EDIT: &str = "workspace/applyEdit";
	/// Remove the target document.
	pub const REMOVE_DOCUMENT: &str = "workspace/removeDocument";
	/// Adopt a pinned primary version as the current solution.
	pub const SYNCHRONIZE: &str = "workspace/synchronize";
	/// Project and document counts.
	pub const SOLUTION_INFO: &str = "workspace/solutionInfo";
}

/// Parameters of [`methods::APPLY_EDIT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditParams {
	/// New document text.
	pub text: String,
}

/// Result of [`methods::SOLUTION_INFO`] and [`methods::SYNCHRONIZE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionInfo {
	/// Number of projects.
	pub projects: usize,
	/// Number of documents across projects.
	pub documents: usize,
	/// Root checksum of the solution, as hex.
	pub root: String,
}

impl SolutionInfo {
	fn of(context: &WorkspaceContext) -> Result<Self, HandlerError> {
		let solution = context.solution();
		Ok(Self {
			projects: solution.projects().count(),
			documents: solution.document_count(),
			root: solution.checksum().map_err(HandlerError::failed)?.to_string(),
		})
	}
}

fn required(context: Option<WorkspaceContext>) -> Result<WorkspaceContext, HandlerError> {
	context.ok_or_else(|| HandlerError::failed("request has no workspace context"))
}

/// Returns the target document's text, or `null` once it no longer exists.
pub struct DocumentText;

#[async_trait]
impl MethodHandler<WorkspaceContext> for DocumentText {
	type Request = ();
	type Response = Option<String>;

	fn mutates(&self) -> bool {
		false
	}

	async fn handle(&self, _: (), context: Option<WorkspaceContext>, _: CancellationToken) -> Result<Option<String>, HandlerError> {
		Ok(context.and_then(|c| c.document().map(|d| d.text().to_owned())))
	}
}

/// Returns the checksum of the target document's text asset.
pub struct DocumentChecksum;

#[async_trait]
impl MethodHandler<WorkspaceContext> for DocumentChecksum {
	type Request = ();
	type Response = Option<String>;

	fn mutates(&self) -> bool {
		false
	}

	async fn handle(&self, _: (), context: Option<WorkspaceContext>, _: CancellationToken) -> Result<Option<String>, HandlerError> {
		Ok(context.and_then(|c| c.document().map(|d| d.text_checksum().to_string())))
	}
}

/// Replaces the target document's text. Returns false if the document is gone or none was
/// named.
pub struct ApplyEdit;

#[async_trait]
impl MethodHandler<WorkspaceContext> for ApplyEdit {
	type Request = EditParams;
	type Response = bool;

	fn mutates(&self) -> bool {
		true
	}

	async fn handle(&self, params: EditParams, context: Option<WorkspaceContext>, _: CancellationToken) -> Result<bool, HandlerError> {
		let Some(context) = context else {
			return Ok(false);
		};
		let Some(id) = context.document_id() else {
			return Ok(false);
		};
		let mut next = Solution::clone(context.solution());
		if !next.set_document_text(id, params.text) {
			return Ok(false);
		}
		context.commit(next);
		Ok(true)
	}
}

/// Removes the target document. Returns false if it was already gone.
pub struct RemoveDocument;

#[async_trait]
impl MethodHandler<WorkspaceContext> for RemoveDocument {
	type Request = ();
	type Response = bool;

	fn mutates(&self) -> bool {
		true
	}

	async fn handle(&self, _: (), context: Option<WorkspaceContext>, _: CancellationToken) -> Result<bool, HandlerError> {
		let Some(context) = context else {
			return Ok(false);
		};
		let Some(id) = context.document_id() else {
			return Ok(false);
		};
		let mut next = Solution::clone(context.solution());
		if !next.remove_document(id) {
			return Ok(false);
		}
		context.commit(next);
		Ok(true)
	}
}

/// Makes the pinned version the worker's current solution.
pub struct Synchronize;

#[async_trait]
impl MethodHandler<WorkspaceContext> for Synchronize {
	type Request = ();
	type Response = SolutionInfo;

	fn mutates(&self) -> bool {
		true
	}

	async fn handle(&self, _: (), context: Option<WorkspaceContext>, _: CancellationToken) -> Result<SolutionInfo, HandlerError> {
		let context = required(context)?;
		let info = SolutionInfo::of(&context)?;
		// Without a pinned scope the context already is the current solution.
		if context.scope().is_some() {
			context.commit(Arc::clone(context.solution()));
		}
		Ok(info)
	}
}

/// Describes the observed solution.
pub struct SolutionInfoHandler;

#[async_trait]
impl MethodHandler<WorkspaceContext> for SolutionInfoHandler {
	type Request = ();
	type Response = SolutionInfo;

	fn mutates(&self) -> bool {
		false
	}

	async fn handle(&self, _: (), context: Option<WorkspaceContext>, _: CancellationToken) -> Result<SolutionInfo, HandlerError> {
		SolutionInfo::of(&required(context)?)
	}
}

/// Registers every workspace method.
pub fn register_workspace_handlers(registry: &mut HandlerRegistry<WorkspaceContext>) -> Result<(), RegistryError> {
	registry.register(methods::DOCUMENT_TEXT, DocumentText)?;
	registry.register(methods::DOCUMENT_CHECKSUM, DocumentChecksum)?;
	registry.register(methods::APPLY_EDIT, ApplyEdit)?;
	registry.register(methods::REMOVE_DOCUMENT, RemoveDocument)?;
	registry.register(methods::SYNCHRONIZE, Synchronize)?;
	registry.register(methods::SOLUTION_INFO, SolutionInfoHandler)?;
	Ok(())
}
