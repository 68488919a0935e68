//! One module per subcommand. Each exposes `run`, which wires configuration to a client, and
//! `execute`, which does the work against any client.

pub mod aggregate;
pub mod clean_tags;
pub mod count;
pub mod download;
pub mod export;
pub mod tagging;

use std::{fs, time::Duration};

use clap::Args;
use color_eyre::{Result, eyre};

use tarentula_client::{
	DatashareClient, Endpoints, QueryBuilder, SessionConfig, SortOrder, TransportConfig,
};
use tarentula_config::Config;

pub const DOCUMENT_TYPES: [&str; 3] = ["Document", "NamedEntity", "Duplicate"];

/// Backend location and credentials. Flags override the configuration file.
#[derive(Clone, Debug, Default, Args)]
pub struct ConnectionArgs {
	/// Datashare API key.
	#[arg(long, value_name = "KEY")]
	pub apikey: Option<String>,
	#[arg(long, value_name = "URL")]
	pub datashare_url: Option<String>,
	#[arg(long, value_name = "NAME")]
	pub datashare_project: Option<String>,
	/// Elasticsearch URL. Searches go through the Datashare proxy when unset.
	#[arg(long, value_name = "URL")]
	pub elasticsearch_url: Option<String>,
	/// Cookies sent with every request, as key1=val1;key2=val2.
	#[arg(long, value_name = "COOKIES", default_value = "")]
	pub cookies: String,
}
impl ConnectionArgs {
	pub fn project(&self, config: &Config) -> String {
		self.datashare_project.clone().unwrap_or_else(|| config.datashare.project.clone())
	}

	pub fn transport(&self, config: &Config) -> TransportConfig {
		TransportConfig {
			apikey: self
				.apikey
				.clone()
				.filter(|key| !key.trim().is_empty())
				.or_else(|| config.datashare.apikey.clone()),
			cookies: self.cookies.clone(),
			timeout: Duration::from_secs(config.http.timeout_secs),
		}
	}

	/// Endpoints for read-only commands.
	pub fn read_endpoints(&self, config: &Config) -> Endpoints {
		let elasticsearch_url =
			self.elasticsearch_url.clone().or_else(|| config.elasticsearch.url.clone());

		Endpoints::new(self.datashare_url(config), elasticsearch_url)
	}

	/// Endpoints for mutations, which are only accepted by Elasticsearch itself.
	pub fn write_endpoints(&self, config: &Config) -> Endpoints {
		let elasticsearch_url = self
			.elasticsearch_url
			.clone()
			.unwrap_or_else(|| config.elasticsearch.url_or_default().to_string());

		Endpoints::new(self.datashare_url(config), Some(elasticsearch_url))
	}

	pub fn client(&self, config: &Config, endpoints: Endpoints) -> Result<DatashareClient> {
		Ok(DatashareClient::connect(&self.transport(config), endpoints)?)
	}

	fn datashare_url(&self, config: &Config) -> String {
		self.datashare_url.clone().unwrap_or_else(|| config.datashare.url.clone())
	}
}

/// Options shared by the commands that walk a result set.
#[derive(Clone, Debug, Args)]
pub struct SearchArgs {
	/// Query-string expression or JSON body. `@path` reads it from a file.
	#[arg(long, short = 'q', value_name = "QUERY", default_value = "*")]
	pub query: String,
	/// Scroll keep-alive such as "10m". Uses search_after paging when unset.
	#[arg(long, value_name = "DURATION")]
	pub scroll: Option<String>,
	/// Hits per page.
	#[arg(long, value_name = "N", default_value_t = 1_000)]
	pub size: u64,
	/// Skip the first N hits. Ignored when scrolling.
	#[arg(long, short = 'f', value_name = "N", default_value_t = 0)]
	pub from: u64,
	/// Stop after N hits. Zero means no limit.
	#[arg(long, short = 'l', value_name = "N", default_value_t = 0)]
	pub limit: u64,
	#[arg(long, value_name = "FIELD", default_value = "_score")]
	pub sort_by: String,
	#[arg(long, value_name = "ORDER", default_value = "desc")]
	pub order_by: SortOrder,
	#[arg(long = "type", value_name = "TYPE", default_value = "Document", value_parser = DOCUMENT_TYPES)]
	pub document_type: String,
}
impl SearchArgs {
	pub fn session(&self, index: &str, source: Option<Vec<String>>) -> Result<SessionConfig> {
		let mut builder = query_builder(&self.query)?
			.sort_by(self.sort_by.clone(), self.order_by)
			.document_type(self.document_type.clone());

		if let Some(source) = source {
			builder = builder.source(source);
		}

		Ok(SessionConfig {
			page_size: self.size,
			limit: self.limit,
			scroll: self.scroll.clone(),
			from: self.from,
			..SessionConfig::new(index, builder.build())
		})
	}
}

/// Parses a `--query` argument, reading `@path` arguments from file first.
pub fn query_builder(raw: &str) -> Result<QueryBuilder> {
	let raw = match raw.strip_prefix('@') {
		Some(path) => fs::read_to_string(path)
			.map_err(|err| eyre::eyre!("Failed to read query file {path}: {err}."))?,
		None => raw.to_string(),
	};

	Ok(QueryBuilder::from_user_input(&raw)?)
}
