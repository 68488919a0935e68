pub mod commands;

use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
	aggregate::AggregateArgs, clean_tags::CleanTagsArgs, count::CountArgs, download::DownloadArgs,
	export::ExportArgs, tagging::TaggingArgs,
};

#[derive(Debug, Parser)]
#[command(
	version = tarentula_cli::VERSION,
	rename_all = "kebab",
	styles = tarentula_cli::styles(),
)]
pub struct Args {
	/// TOML configuration file. Defaults to ./tarentula.toml when present.
	#[arg(long, short = 'c', value_name = "FILE", global = true)]
	pub config: Option<PathBuf>,
	/// Log filter for stdout, e.g. "info" or "tarentula_client=debug".
	#[arg(long, value_name = "LEVEL", global = true)]
	pub stdout_loglevel: Option<String>,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Count documents matching a query.
	Count(CountArgs),
	/// Export document metadata matching a query to CSV.
	ExportByQuery(ExportArgs),
	/// Download the files behind documents matching a query.
	Download(DownloadArgs),
	/// Tag documents from a JSON file mapping labels to queries.
	TaggingByQuery(TaggingArgs),
	/// Remove every tag from documents matching a query.
	CleanTagsByQuery(CleanTagsArgs),
	/// Run one aggregation over documents matching a query.
	Aggregate(AggregateArgs),
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = tarentula_config::load_or_default(args.config.as_deref())?;
	let level = args.stdout_loglevel.as_deref().unwrap_or(&config.logger.stdout_loglevel);
	init_tracing(level);
	let mut stdout = io::stdout();

	match &args.command {
		Command::Count(cmd) => commands::count::run(cmd, &config, &mut stdout).await,
		Command::ExportByQuery(cmd) => commands::export::run(cmd, &config).await,
		Command::Download(cmd) => commands::download::run(cmd, &config).await,
		Command::TaggingByQuery(cmd) => commands::tagging::run(cmd, &config, &mut stdout).await,
		Command::CleanTagsByQuery(cmd) => commands::clean_tags::run(cmd, &config, &mut stdout).await,
		Command::Aggregate(cmd) => commands::aggregate::run(cmd, &config, &mut stdout).await,
	}
}

fn init_tracing(level: &str) {
	let filter = EnvFilter::try_new(level)
		.unwrap_or_else(|_| EnvFilter::new(tarentula_config::DEFAULT_STDOUT_LOGLEVEL));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}
