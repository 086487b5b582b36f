//! Primary and worker host wired together over an in-process asset channel.

use std::future::poll_fn;

use pretty_assertions::assert_eq;
use sable_assets::{CompilationOptions, DocumentId, Solution};
use sable_host::handlers::{SolutionInfo, methods};
use sable_host::{ErrorCode, HostConfig, HostEndpoint, HostRequest, PrimaryWorkspace};
use sable_queue::QueueState;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_service::Service;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

struct Pair {
	primary: PrimaryWorkspace,
	endpoint: HostEndpoint,
	lib: DocumentId,
	main: DocumentId,
	cancel: CancellationToken,
}

fn sample() -> (Solution, DocumentId, DocumentId) {
	let mut solution = Solution::new();
	let core = solution.add_project("core", CompilationOptions::default());
	let app = solution.add_project("app", CompilationOptions::default());
	solution.add_reference(app, core);
	let lib = solution.add_document(core, "src/lib.rs", "pub fn answer() -> u32 { 42 }").unwrap();
	let main = solution.add_document(app, "src/main.rs", "fn main() {}").unwrap();
	(solution, lib, main)
}

fn pair() -> Pair {
	init_tracing();
	let (solution, lib, main) = sample();
	let primary = PrimaryWorkspace::new(solution).unwrap();
	let config = HostConfig::default();
	let cancel = CancellationToken::new();
	let (replicator, _serving) = primary.connect(&config.sync, cancel.clone());
	let endpoint = HostEndpoint::new(&config, Solution::new(), Some(replicator)).unwrap();
	Pair {
		primary,
		endpoint,
		lib,
		main,
		cancel,
	}
}

async fn call(endpoint: &mut HostEndpoint, request: HostRequest) -> Result<Value, ErrorCode> {
	poll_fn(|cx| endpoint.poll_ready(cx)).await.map_err(|e| e.code())?;
	endpoint.call(request).await.map_err(|e| e.code())
}

fn text_of(document: DocumentId) -> HostRequest {
	HostRequest::new(methods::DOCUMENT_TEXT, Value::Null).with_document(document)
}

#[tokio::test]
async fn synchronize_adopts_the_pinned_primary_version() {
	let mut p = pair();
	let info = p
		.primary
		.invoke(&mut p.endpoint, HostRequest::new(methods::SYNCHRONIZE, Value::Null))
		.await
		.unwrap();
	let info: SolutionInfo = serde_json::from_value(info).unwrap();
	assert_eq!(info.projects, 2);
	assert_eq!(info.documents, 2);
	assert_eq!(info.root, p.primary.solution().checksum().unwrap().to_string());

	assert_eq!(*p.endpoint.current(), p.primary.solution());
	let text = call(&mut p.endpoint, text_of(p.lib)).await.unwrap();
	assert_eq!(text, json!("pub fn answer() -> u32 { 42 }"));
	p.cancel.cancel();
}

#[tokio::test]
async fn pinned_reads_do_not_change_the_current_solution() {
	let mut p = pair();
	let text = p.primary.invoke(&mut p.endpoint, text_of(p.main)).await.unwrap();
	assert_eq!(text, json!("fn main() {}"));
	assert_eq!(p.endpoint.current().document_count(), 0);
	p.cancel.cancel();
}

#[tokio::test]
async fn primary_edits_are_visible_to_the_next_pinned_request() {
	let mut p = pair();
	p.primary.invoke(&mut p.endpoint, text_of(p.lib)).await.unwrap();

	let lib = p.lib;
	assert!(p.primary.update(|s| s.set_document_text(lib, "pub fn answer() -> u32 { 7 }")).unwrap());
	let text = p.primary.invoke(&mut p.endpoint, text_of(p.lib)).await.unwrap();
	assert_eq!(text, json!("pub fn answer() -> u32 { 7 }"));
	p.cancel.cancel();
}

#[tokio::test]
async fn forked_versions_are_served_without_touching_the_primary() {
	let mut p = pair();
	let mut fork = p.primary.solution();
	fork.set_document_text(p.main, "fn main() { forked() }");

	let text = p.primary.invoke_forked(&mut p.endpoint, &fork, text_of(p.main)).await.unwrap();
	assert_eq!(text, json!("fn main() { forked() }"));
	let text = p.primary.invoke(&mut p.endpoint, text_of(p.main)).await.unwrap();
	assert_eq!(text, json!("fn main() {}"));
	p.cancel.cancel();
}

#[tokio::test]
async fn edits_and_removals_apply_in_submission_order() {
	let mut p = pair();
	p.primary
		.invoke(&mut p.endpoint, HostRequest::new(methods::SYNCHRONIZE, Value::Null))
		.await
		.unwrap();

	// Admission happens in `call`, so the futures can be awaited in any order.
	let edit = p.endpoint.call(
		HostRequest::new(methods::APPLY_EDIT, json!({ "text": "pub fn answer() -> u32 { 1 }" })).with_document(p.lib),
	);
	let read_edited = p.endpoint.call(text_of(p.lib));
	let remove = p
		.endpoint
		.call(HostRequest::new(methods::REMOVE_DOCUMENT, Value::Null).with_document(p.lib));
	let read_removed = p.endpoint.call(text_of(p.lib));

	assert_eq!(read_removed.await.unwrap(), Value::Null);
	assert_eq!(remove.await.unwrap(), json!(true));
	assert_eq!(read_edited.await.unwrap(), json!("pub fn answer() -> u32 { 1 }"));
	assert_eq!(edit.await.unwrap(), json!(true));
	assert_eq!(p.endpoint.current().document_count(), 1);
	p.cancel.cancel();
}

#[tokio::test]
async fn unknown_methods_and_bad_params_are_rejected_before_admission() {
	let mut p = pair();
	let err = call(&mut p.endpoint, HostRequest::new("workspace/nope", Value::Null)).await.unwrap_err();
	assert_eq!(err, ErrorCode::MethodNotFound);

	let err = call(
		&mut p.endpoint,
		HostRequest::new(methods::APPLY_EDIT, json!({ "body": 1 })).with_document(p.lib),
	)
	.await
	.unwrap_err();
	assert_eq!(err, ErrorCode::InvalidParams);
	assert_eq!(p.endpoint.state(), QueueState::Running);
	p.cancel.cancel();
}

#[tokio::test]
async fn released_scope_cancels_the_request() {
	let mut p = pair();
	let scope = p.primary.fork(&p.primary.solution()).unwrap();
	let id = scope.id();
	drop(scope);

	let err = call(&mut p.endpoint, text_of(p.lib).with_scope(id, false)).await.unwrap_err();
	assert_eq!(err, ErrorCode::Cancelled);
	assert_eq!(p.endpoint.state(), QueueState::Running);
	p.cancel.cancel();
}

#[tokio::test]
async fn pinned_read_without_a_channel_fails_its_context() {
	init_tracing();
	let (solution, lib, _) = sample();
	let primary = PrimaryWorkspace::new(solution).unwrap();
	let mut endpoint = HostEndpoint::new(&HostConfig::default(), Solution::new(), None).unwrap();

	let err = primary.invoke(&mut endpoint, text_of(lib)).await.unwrap_err();
	assert_eq!(err.code(), ErrorCode::ContextFailed);
	assert_eq!(endpoint.state(), QueueState::Running);
}

#[tokio::test]
async fn failed_mutation_faults_the_host() {
	let mut p = pair();
	let mut states = p.endpoint.dispatcher().queue().subscribe();
	let missing = DocumentId::new(p.lib.project, 99);

	let err = call(
		&mut p.endpoint,
		HostRequest::new(methods::SYNCHRONIZE, Value::Null).with_document(missing),
	)
	.await
	.unwrap_err();
	assert_eq!(err, ErrorCode::HandlerFailed);

	states.wait_for(|s| *s == QueueState::Closed).await.unwrap();
	let fault = p.endpoint.dispatcher().queue().fault().unwrap();
	assert_eq!(fault.method, methods::SYNCHRONIZE);
	let err = call(&mut p.endpoint, text_of(p.lib)).await.unwrap_err();
	assert_eq!(err, ErrorCode::Closed);
	p.cancel.cancel();
}

#[tokio::test]
async fn shutdown_closes_the_endpoint() {
	let mut p = pair();
	assert_eq!(p.endpoint.registered_methods().len(), 6);
	p.endpoint.shutdown().await;
	assert_eq!(p.endpoint.state(), QueueState::Closed);

	let err = call(&mut p.endpoint, text_of(p.lib)).await.unwrap_err();
	assert_eq!(err, ErrorCode::Closed);
	let err = p.endpoint.call(text_of(p.lib)).await.unwrap_err();
	assert_eq!(err.code(), ErrorCode::Closed);
	p.cancel.cancel();
}

#[test]
fn pinning_current_follows_the_published_primary() {
	let (solution, lib, _) = sample();
	let primary = PrimaryWorkspace::new(solution).unwrap();
	let before = primary.pin_current().unwrap();
	assert!(before.is_primary());
	assert_eq!(primary.store().primary_root(), Some(before.root()));

	primary.update(|s| s.set_document_text(lib, "pub fn answer() -> u32 { 7 }")).unwrap();
	let after = primary.pin_current().unwrap();
	assert_ne!(after.root(), before.root());
	assert_eq!(primary.store().primary_root(), Some(after.root()));
	assert_eq!(primary.store().pin_count(&after.root()), 1);
	assert_eq!(primary.solution().checksum().unwrap(), after.root());
}
