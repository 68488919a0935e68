use std::io::Write;

use clap::Args;
use color_eyre::Result;

use tarentula_client::DatashareClient;
use tarentula_config::Config;

use crate::commands::{ConnectionArgs, DOCUMENT_TYPES, query_builder};

#[derive(Clone, Debug, Args)]
pub struct CountArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	/// Query-string expression or JSON body. `@path` reads it from a file.
	#[arg(long, short = 'q', value_name = "QUERY", default_value = "*")]
	pub query: String,
	#[arg(long = "type", value_name = "TYPE", default_value = "Document", value_parser = DOCUMENT_TYPES)]
	pub document_type: String,
}

pub async fn run(args: &CountArgs, config: &Config, out: &mut impl Write) -> Result<()> {
	let client = args.connection.client(config, args.connection.read_endpoints(config))?;
	let count = execute(args, &client, &args.connection.project(config)).await?;

	writeln!(out, "{count}")?;

	Ok(())
}

pub async fn execute(args: &CountArgs, client: &DatashareClient, index: &str) -> Result<u64> {
	let query = query_builder(&args.query)?.document_type(args.document_type.clone()).build();

	Ok(client.count(index, &query).await?)
}
