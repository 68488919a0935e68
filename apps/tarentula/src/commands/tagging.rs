use std::{io::Write, path::PathBuf, time::Duration};

use clap::Args;
use color_eyre::{Result, eyre};

use tarentula_client::{
	CompletionMode, DatashareClient, MutationConfig, MutationController, MutationTask, TaggingReport,
	mutation::{self, DEFAULT_SCROLL_SIZE},
};
use tarentula_config::Config;

use crate::commands::ConnectionArgs;

#[derive(Clone, Debug, Args)]
pub struct TaggingArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	/// JSON object mapping each tag label to a query string or query body.
	#[arg(value_name = "JSON_PATH")]
	pub json_path: PathBuf,
	/// Pause between two tags, in milliseconds.
	#[arg(long, value_name = "MS", default_value_t = 0)]
	pub throttle: u64,
	/// Log the full error chain of failed tags.
	#[arg(long)]
	pub traceback: bool,
	/// Submit each tag as a background task and report its status URL.
	#[arg(long)]
	pub no_wait_for_completion: bool,
	/// Documents visited per batch by the update-by-query.
	#[arg(long, value_name = "N", default_value_t = DEFAULT_SCROLL_SIZE)]
	pub scroll_size: u64,
}
impl TaggingArgs {
	pub fn mutation_config(&self, project: String) -> MutationConfig {
		MutationConfig {
			completion: CompletionMode::from_wait_for_completion(!self.no_wait_for_completion),
			scroll_size: self.scroll_size,
			throttle: Duration::from_millis(self.throttle),
			traceback: self.traceback,
			..MutationConfig::new(project)
		}
	}
}

pub async fn run(args: &TaggingArgs, config: &Config, out: &mut impl Write) -> Result<()> {
	let client = args.connection.client(config, args.connection.write_endpoints(config))?;
	let report = execute(args, client, args.connection.project(config)).await?;

	write_report(&report, out)?;

	Ok(())
}

/// Loads every tag before sending anything, so a bad file never leaves a partial run.
pub async fn execute(
	args: &TaggingArgs,
	client: DatashareClient,
	project: String,
) -> Result<TaggingReport> {
	let tags = mutation::load_tag_definitions(&args.json_path).map_err(|err| {
		eyre::eyre!("Failed to load tag definitions from {}: {err}", args.json_path.display())
	})?;
	let controller = MutationController::new(client, args.mutation_config(project));

	Ok(controller.apply_tags(&tags).await)
}

pub fn write_report(report: &TaggingReport, out: &mut impl Write) -> Result<()> {
	for applied in &report.applied {
		match &applied.task {
			MutationTask::Completed { took_ms, updated } =>
				writeln!(out, "{}\tupdated {updated} document(s) in {took_ms}ms", applied.label)?,
			MutationTask::Submitted { status_url, .. } =>
				writeln!(out, "{}\tsubmitted, status at {status_url}", applied.label)?,
		}
	}
	for failed in &report.failed {
		writeln!(out, "{}\tfailed: {}", failed.label, failed.error)?;
	}

	writeln!(out, "{} tag(s) applied, {} failed.", report.applied.len(), report.failed.len())?;

	Ok(())
}
