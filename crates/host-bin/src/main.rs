//! sable host binary.
//!
//! Loads a directory as a single-project solution, publishes it on an in-process primary,
//! synchronizes a worker host over the asset channel, and prints the worker's view of the
//! solution as JSON.

use std::path::{Path, PathBuf};

use clap::Parser;
use sable_assets::{CompilationOptions, Solution};
use sable_host::handlers::methods;
use sable_host::{HostConfig, HostEndpoint, HostRequest, PrimaryWorkspace};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Host command line arguments.
#[derive(Parser, Debug)]
#[command(name = "sable-host")]
#[command(about = "Replicates a workspace into a sable worker host")]
struct Args {
	/// Configuration file (TOML)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Directory whose files become the documents of the solution
	#[arg(short, long, value_name = "DIR", default_value = ".")]
	root: PathBuf,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

fn setup_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
	let fallback = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
	let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).finish();
	tracing::subscriber::set_global_default(subscriber)?;
	Ok(())
}

fn load_solution(root: &Path) -> std::io::Result<Solution> {
	let mut solution = Solution::new();
	let name = root
		.canonicalize()?
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "workspace".to_owned());
	let project = solution.add_project(name, CompilationOptions::default());

	let mut paths = Vec::new();
	for entry in std::fs::read_dir(root)? {
		let entry = entry?;
		if entry.file_type()?.is_file() {
			paths.push(entry.path());
		}
	}
	paths.sort();

	for path in paths {
		match std::fs::read_to_string(&path) {
			Ok(text) => {
				let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().into_owned();
				solution.add_document(project, relative, text);
			}
			Err(err) => warn!(path = %path.display(), error = %err, "host.load.skipped"),
		}
	}
	Ok(solution)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	setup_tracing(args.verbose)?;

	let config = match &args.config {
		Some(path) => HostConfig::load(path)?,
		None => HostConfig::default(),
	};

	let root = args.root.clone();
	let solution = sable_worker::spawn_blocking(move || load_solution(&root)).await??;
	info!(root = %args.root.display(), documents = solution.document_count(), "host.load.done");

	let primary = PrimaryWorkspace::new(solution)?;
	let cancel = CancellationToken::new();
	let (replicator, serving) = primary.connect(&config.sync, cancel.clone());
	let mut endpoint = HostEndpoint::new(&config, Solution::new(), Some(replicator))?;

	primary
		.invoke(&mut endpoint, HostRequest::new(methods::SYNCHRONIZE, Value::Null))
		.await?;
	let info = primary
		.invoke(&mut endpoint, HostRequest::new(methods::SOLUTION_INFO, Value::Null))
		.await?;
	println!("{}", serde_json::to_string_pretty(&info)?);

	endpoint.shutdown().await;
	cancel.cancel();
	serving.await?;
	Ok(())
}
