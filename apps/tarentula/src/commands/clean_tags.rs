use std::io::Write;

use clap::Args;
use color_eyre::Result;

use tarentula_client::{
	CompletionMode, DatashareClient, MutationConfig, MutationController, MutationTask, Query,
};
use tarentula_config::Config;

use crate::commands::{ConnectionArgs, query_builder};

#[derive(Clone, Debug, Args)]
pub struct CleanTagsArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	/// Documents to clean. `@path` reads the query from a file. Defaults to every document.
	#[arg(long, short = 'q', value_name = "QUERY")]
	pub query: Option<String>,
	/// Submit the update as a background task and report its status URL.
	#[arg(long)]
	pub no_wait_for_completion: bool,
}

pub async fn run(args: &CleanTagsArgs, config: &Config, out: &mut impl Write) -> Result<()> {
	let client = args.connection.client(config, args.connection.write_endpoints(config))?;

	match execute(args, client, args.connection.project(config)).await? {
		MutationTask::Completed { took_ms, updated } =>
			writeln!(out, "Cleaned tags of {updated} document(s) in {took_ms}ms.")?,
		MutationTask::Submitted { status_url, .. } =>
			writeln!(out, "Tag cleaning submitted, status at {status_url}.")?,
	}

	Ok(())
}

pub async fn execute(
	args: &CleanTagsArgs,
	client: DatashareClient,
	project: String,
) -> Result<MutationTask> {
	let query = match args.query.as_deref() {
		Some(raw) => query_builder(raw)?.build(),
		None => Query::match_all(),
	};
	let config = MutationConfig {
		completion: CompletionMode::from_wait_for_completion(!args.no_wait_for_completion),
		..MutationConfig::new(project)
	};
	let controller = MutationController::new(client, config);

	tracing::info!(project = %controller.config().project, "Cleaning tags.");

	Ok(controller.clear_tags(&query).await?)
}
