use serde::Deserialize;

pub const DEFAULT_DATASHARE_URL: &str = "http://localhost:8080";
pub const DEFAULT_DATASHARE_PROJECT: &str = "local-datashare";
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STDOUT_LOGLEVEL: &str = "error";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	#[serde(default)]
	pub datashare: Datashare,
	#[serde(default)]
	pub elasticsearch: Elasticsearch,
	#[serde(default)]
	pub logger: Logger,
	#[serde(default)]
	pub http: Http,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Datashare {
	#[serde(default = "default_datashare_url")]
	pub url: String,
	#[serde(default = "default_datashare_project")]
	pub project: String,
	/// Sent as `Authorization: bearer <apikey>` when present.
	pub apikey: Option<String>,
}
impl Default for Datashare {
	fn default() -> Self {
		Self { url: default_datashare_url(), project: default_datashare_project(), apikey: None }
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Elasticsearch {
	/// Searches go through the Datashare proxy when unset. Tag mutations fall back to
	/// [`DEFAULT_ELASTICSEARCH_URL`].
	pub url: Option<String>,
}
impl Elasticsearch {
	pub fn url_or_default(&self) -> &str {
		self.url.as_deref().unwrap_or(DEFAULT_ELASTICSEARCH_URL)
	}
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Logger {
	/// An `EnvFilter` directive, e.g. "info" or "tarentula_client=debug".
	#[serde(default = "default_stdout_loglevel")]
	pub stdout_loglevel: String,
}
impl Default for Logger {
	fn default() -> Self {
		Self { stdout_loglevel: default_stdout_loglevel() }
	}
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Http {
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
}
impl Default for Http {
	fn default() -> Self {
		Self { timeout_secs: default_timeout_secs() }
	}
}

fn default_datashare_url() -> String {
	DEFAULT_DATASHARE_URL.to_string()
}

fn default_datashare_project() -> String {
	DEFAULT_DATASHARE_PROJECT.to_string()
}

fn default_stdout_loglevel() -> String {
	DEFAULT_STDOUT_LOGLEVEL.to_string()
}

fn default_timeout_secs() -> u64 {
	DEFAULT_TIMEOUT_SECS
}
