use std::io::Write;

use clap::{Args, ValueEnum};
use color_eyre::{Result, eyre};

use tarentula_client::{AggregateResult, Aggregation, CalendarInterval, DatashareClient, MetricKind};
use tarentula_config::Config;

use crate::commands::{ConnectionArgs, DOCUMENT_TYPES, query_builder};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Operation {
	Count,
	Nunique,
	DateHistogram,
	Sum,
	Stats,
	StringStats,
	Min,
	Max,
	Avg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Interval {
	Year,
	Month,
}

#[derive(Clone, Debug, Args)]
pub struct AggregateArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	/// Query-string expression or JSON body. `@path` reads it from a file.
	#[arg(long, short = 'q', value_name = "QUERY", default_value = "*")]
	pub query: String,
	#[arg(long = "type", value_name = "TYPE", default_value = "Document", value_parser = DOCUMENT_TYPES)]
	pub document_type: String,
	#[arg(long, value_name = "OPERATION", value_enum, default_value_t = Operation::Count)]
	pub run: Operation,
	/// Field to group documents by. Used by `count`.
	#[arg(long, value_name = "FIELD")]
	pub group_by: Option<String>,
	/// Field the operation runs on. Used by every operation but `count`.
	#[arg(long, value_name = "FIELD")]
	pub operation_field: Option<String>,
	#[arg(long, value_name = "INTERVAL", value_enum, default_value_t = Interval::Year)]
	pub calendar_interval: Interval,
}
impl AggregateArgs {
	/// Resolves the operation name into an aggregation once, before anything is sent.
	pub fn aggregation(&self) -> Result<Aggregation> {
		let metric = |kind| -> Result<Aggregation> {
			Ok(Aggregation::Metric { kind, field: self.operation_field()? })
		};

		match self.run {
			Operation::Count => {
				let group_by = self
					.group_by
					.clone()
					.ok_or_else(|| eyre::eyre!("--group-by is required by the count operation."))?;

				Ok(Aggregation::Count { group_by })
			},
			Operation::Nunique => Ok(Aggregation::NumUnique { field: self.operation_field()? }),
			Operation::DateHistogram => Ok(Aggregation::DateHistogram {
				field: self.operation_field()?,
				interval: match self.calendar_interval {
					Interval::Year => CalendarInterval::Year,
					Interval::Month => CalendarInterval::Month,
				},
			}),
			Operation::Sum => metric(MetricKind::Sum),
			Operation::Stats => metric(MetricKind::Stats),
			Operation::StringStats => metric(MetricKind::StringStats),
			Operation::Min => metric(MetricKind::Min),
			Operation::Max => metric(MetricKind::Max),
			Operation::Avg => metric(MetricKind::Avg),
		}
	}

	fn operation_field(&self) -> Result<String> {
		self.operation_field
			.clone()
			.ok_or_else(|| eyre::eyre!("--operation-field is required by the {:?} operation.", self.run))
	}
}

pub async fn run(args: &AggregateArgs, config: &Config, out: &mut impl Write) -> Result<()> {
	let client = args.connection.client(config, args.connection.read_endpoints(config))?;
	let result = execute(args, &client, &args.connection.project(config)).await?;

	write!(out, "{result}")?;

	Ok(())
}

pub async fn execute(
	args: &AggregateArgs,
	client: &DatashareClient,
	index: &str,
) -> Result<AggregateResult> {
	let aggregation = args.aggregation()?;
	let query = query_builder(&args.query)?.document_type(args.document_type.clone()).build();

	tracing::info!(%index, operation = ?args.run, "Running aggregation.");

	Ok(client.aggregate(index, &query, &aggregation).await?)
}
