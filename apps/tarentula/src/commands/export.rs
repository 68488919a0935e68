use std::{fs::File, io::Write, path::PathBuf, time::Duration};

use clap::Args;
use color_eyre::Result;
use serde_json::Value;

use tarentula_client::{DatashareClient, Hit};
use tarentula_config::Config;

use crate::commands::{ConnectionArgs, SearchArgs};

pub const DEFAULT_SOURCE: &str = "contentType,contentLength:0,extractionDate,path";

#[derive(Clone, Debug, Args)]
pub struct ExportArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	#[command(flatten)]
	pub search: SearchArgs,
	#[arg(long, value_name = "FILE", default_value = "tarentula_documents.csv")]
	pub output_file: PathBuf,
	/// Comma-separated source fields. `name:default` fills in documents missing the field.
	#[arg(long, value_name = "FIELDS", default_value = DEFAULT_SOURCE)]
	pub source: String,
	/// Pause between two exported documents, in milliseconds.
	#[arg(long, value_name = "MS", default_value_t = 0)]
	pub throttle: u64,
	/// Leave the query column out of the CSV.
	#[arg(long)]
	pub no_query_field: bool,
}

/// One exported source column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
	pub name: String,
	pub default: Option<String>,
}
impl FieldSpec {
	pub fn parse_list(raw: &str) -> Vec<Self> {
		raw.split(',')
			.map(str::trim)
			.filter(|entry| !entry.is_empty())
			.map(|entry| match entry.split_once(':') {
				Some((name, default)) =>
					Self { name: name.trim().to_string(), default: Some(default.to_string()) },
				None => Self { name: entry.to_string(), default: None },
			})
			.collect()
	}

	fn cell(&self, hit: &Hit) -> String {
		match hit.source.get(&self.name) {
			None | Some(Value::Null) => self.default.clone().unwrap_or_default(),
			Some(Value::String(value)) => value.clone(),
			Some(value) => value.to_string(),
		}
	}
}

pub async fn run(args: &ExportArgs, config: &Config) -> Result<()> {
	let client = args.connection.client(config, args.connection.read_endpoints(config))?;
	let file = File::create(&args.output_file)?;
	let exported = execute(args, &client, &args.connection.project(config), file).await?;

	tracing::info!(exported, path = %args.output_file.display(), "Export finished.");

	Ok(())
}

/// Streams every hit into `out` as CSV and returns the number of rows written.
pub async fn execute<W>(args: &ExportArgs, client: &DatashareClient, index: &str, out: W) -> Result<u64>
where
	W: Write,
{
	let fields = FieldSpec::parse_list(&args.source);
	let names = fields.iter().map(|field| field.name.clone()).collect::<Vec<_>>();
	let config = args.search.session(index, Some(names.clone()))?;
	let mut session = client.retrieve(config)?;
	let mut writer = csv::Writer::from_writer(out);
	let mut header = Vec::new();

	if !args.no_query_field {
		header.push("query".to_string());
	}

	header.extend(["documentUrl", "documentId", "rootId"].map(str::to_string));
	header.extend(names);
	writer.write_record(&header)?;

	let throttle = Duration::from_millis(args.throttle);
	let mut rows = 0;

	while let Some(hit) = session.next().await? {
		if rows > 0 && !throttle.is_zero() {
			tokio::time::sleep(throttle).await;
		}

		let mut record = Vec::with_capacity(header.len());

		if !args.no_query_field {
			record.push(args.search.query.clone());
		}

		record.push(client.document_url(index, &hit.id, Some(hit.routing_or_id())));
		record.push(hit.id.clone());
		record.push(hit.routing_or_id().to_string());
		record.extend(fields.iter().map(|field| field.cell(&hit)));
		writer.write_record(&record)?;

		rows += 1;
	}

	writer.flush()?;

	Ok(rows)
}
