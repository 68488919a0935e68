use std::{
	fs,
	path::{Path, PathBuf},
	time::Duration,
};

use clap::Args;
use color_eyre::Result;

use tarentula_client::{DatashareClient, Hit};
use tarentula_config::Config;

use crate::commands::{ConnectionArgs, SearchArgs};

pub const DEFAULT_PATH_FORMAT: &str = "{id_2b}/{id_4b}/{id}";

#[derive(Clone, Debug, Args)]
pub struct DownloadArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
	#[command(flatten)]
	pub search: SearchArgs,
	#[arg(long, value_name = "DIR", default_value = "./tmp")]
	pub destination_directory: PathBuf,
	/// Relative file path. Supports {id}, {id_2b}, {id_4b} and {routing}.
	#[arg(long, value_name = "TEMPLATE", default_value = DEFAULT_PATH_FORMAT)]
	pub path_format: String,
	/// Comma-separated source fields kept in saved JSON documents.
	#[arg(long, value_name = "FIELDS")]
	pub source: Option<String>,
	/// Pause between two downloads, in milliseconds.
	#[arg(long, value_name = "MS", default_value_t = 0)]
	pub throttle: u64,
	/// Skip documents whose file already exists.
	#[arg(long)]
	pub once: bool,
	/// Save the indexed JSON document instead of the original file.
	#[arg(long)]
	pub no_raw_file: bool,
	/// Log the full error chain of failed downloads.
	#[arg(long)]
	pub traceback: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
	pub saved: u64,
	pub skipped: u64,
	pub failed: u64,
}

pub async fn run(args: &DownloadArgs, config: &Config) -> Result<()> {
	let client = args.connection.client(config, args.connection.read_endpoints(config))?;
	let summary = execute(args, &client, &args.connection.project(config)).await?;

	tracing::info!(
		saved = summary.saved,
		skipped = summary.skipped,
		failed = summary.failed,
		"Download finished."
	);

	Ok(())
}

/// Walks the result set and saves one file per hit. A failed download is logged and counted;
/// a failed search page ends the run.
pub async fn execute(
	args: &DownloadArgs,
	client: &DatashareClient,
	index: &str,
) -> Result<DownloadSummary> {
	let source = args.source.as_deref().map(|fields| {
		fields
			.split(',')
			.map(str::trim)
			.filter(|field| !field.is_empty())
			.map(str::to_string)
			.collect::<Vec<_>>()
	});
	let mut session = client.retrieve(args.search.session(index, source)?)?;
	let throttle = Duration::from_millis(args.throttle);
	let mut summary = DownloadSummary::default();

	while let Some(hit) = session.next().await? {
		let mut path = args.destination_directory.join(render_path(&args.path_format, &hit));

		if args.no_raw_file {
			path.set_extension("json");
		}
		if args.once && path.exists() {
			summary.skipped += 1;

			continue;
		}
		if summary.saved + summary.failed > 0 && !throttle.is_zero() {
			tokio::time::sleep(throttle).await;
		}

		match save(args, client, index, &hit, &path).await {
			Ok(()) => summary.saved += 1,
			Err(err) => {
				if args.traceback {
					tracing::error!(id = %hit.id, error = ?err, "Unable to download document.");
				} else {
					tracing::error!(id = %hit.id, error = %err, "Unable to download document.");
				}

				summary.failed += 1;
			},
		}
	}

	Ok(summary)
}

async fn save(
	args: &DownloadArgs,
	client: &DatashareClient,
	index: &str,
	hit: &Hit,
	path: &Path,
) -> Result<()> {
	let bytes = if args.no_raw_file {
		serde_json::to_vec_pretty(&hit.source)?
	} else {
		client.download(index, &hit.id, Some(hit.routing_or_id())).await?
	};

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}

	fs::write(path, bytes)?;

	tracing::debug!(id = %hit.id, path = %path.display(), "Document saved.");

	Ok(())
}

/// Expands the path template. `{id_2b}` is the first two characters of the id and `{id_4b}`
/// the next two, which spreads files over nested directories.
pub fn render_path(format: &str, hit: &Hit) -> String {
	let id = hit.id.as_str();
	let id_2b = id.get(0..2).unwrap_or(id);
	let id_4b = id.get(2..4).unwrap_or_default();

	format
		.replace("{id_2b}", id_2b)
		.replace("{id_4b}", id_4b)
		.replace("{routing}", hit.routing_or_id())
		.replace("{id}", id)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn hit(id: &str, routing: Option<&str>) -> Hit {
		serde_json::from_value(json!({ "_id": id, "_routing": routing })).expect("Failed to build hit.")
	}

	#[test]
	fn renders_nested_paths() {
		assert_eq!(render_path(DEFAULT_PATH_FORMAT, &hit("abcdef", None)), "ab/cd/abcdef");
		assert_eq!(render_path("{routing}/{id}", &hit("child", Some("root"))), "root/child");
		assert_eq!(render_path(DEFAULT_PATH_FORMAT, &hit("a", None)), "a//a");
	}
}
