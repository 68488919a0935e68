mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, DEFAULT_DATASHARE_PROJECT, DEFAULT_DATASHARE_URL, DEFAULT_ELASTICSEARCH_URL,
	DEFAULT_STDOUT_LOGLEVEL, DEFAULT_TIMEOUT_SECS, Datashare, Elasticsearch, Http, Logger,
};

use std::{
	fs,
	path::{Path, PathBuf},
};

pub const DEFAULT_CONFIG_FILE: &str = "tarentula.toml";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|source| Error::Read { path: path.to_path_buf(), source })?;

	parse(&raw, &path.display().to_string())
}

/// Loads `path` when given, else `./tarentula.toml` when it exists, else the defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
	if let Some(path) = path {
		return load(path);
	}

	let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);

	if fallback.is_file() {
		return load(&fallback);
	}

	Ok(Config::default())
}

/// Parses, normalizes, and validates a TOML document. `origin` names it in errors.
pub fn parse(raw: &str, origin: &str) -> Result<Config> {
	let mut cfg = toml::from_str::<Config>(raw)
		.map_err(|source| Error::Parse { origin: origin.to_string(), source })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	let mut urls = vec![("datashare.url", cfg.datashare.url.as_str())];

	if let Some(url) = cfg.elasticsearch.url.as_deref() {
		urls.push(("elasticsearch.url", url));
	}

	for (key, url) in urls {
		if url.trim().is_empty() {
			return Err(Error::Invalid { key, reason: "must be non-empty" });
		}
		if !url.starts_with("http://") && !url.starts_with("https://") {
			return Err(Error::Invalid { key, reason: "must start with http:// or https://" });
		}
	}

	if cfg.datashare.project.trim().is_empty() {
		return Err(Error::Invalid { key: "datashare.project", reason: "must be non-empty" });
	}
	if cfg.http.timeout_secs == 0 {
		return Err(Error::Invalid { key: "http.timeout_secs", reason: "must be greater than zero" });
	}
	if cfg.logger.stdout_loglevel.trim().is_empty() {
		return Err(Error::Invalid { key: "logger.stdout_loglevel", reason: "must be non-empty" });
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.datashare.apikey.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.datashare.apikey = None;
	}

	cfg.datashare.url = cfg.datashare.url.trim().trim_end_matches('/').to_string();
	cfg.elasticsearch.url = cfg
		.elasticsearch
		.url
		.as_deref()
		.map(|url| url.trim().trim_end_matches('/').to_string())
		.filter(|url| !url.is_empty());
}
