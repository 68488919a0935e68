use std::{fs, path::PathBuf};

use tempfile::TempDir;

use tarentula_config::{
	Config, DEFAULT_DATASHARE_PROJECT, DEFAULT_DATASHARE_URL, DEFAULT_ELASTICSEARCH_URL, Error,
};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn write_config(dir: &TempDir, raw: &str) -> PathBuf {
	let path = dir.path().join("tarentula.toml");

	fs::write(&path, raw).expect("Failed to write config fixture.");

	path
}

fn load_raw(raw: &str) -> tarentula_config::Result<Config> {
	let dir = TempDir::new().expect("Failed to create temp dir.");
	let path = write_config(&dir, raw);

	tarentula_config::load(&path)
}

#[test]
fn sample_config_is_loaded_and_normalized() {
	let cfg = load_raw(SAMPLE_CONFIG_TOML).expect("Sample config must load.");

	assert_eq!(cfg.datashare.url, "https://datashare.example.org");
	assert_eq!(cfg.datashare.project, "panama-papers");
	assert!(cfg.datashare.apikey.is_none(), "Blank apikey must normalize to None.");
	assert_eq!(cfg.elasticsearch.url.as_deref(), Some("http://elasticsearch.example.org:9200"));
	assert_eq!(cfg.logger.stdout_loglevel, "info");
	assert_eq!(cfg.http.timeout_secs, 30);
}

#[test]
fn empty_file_yields_defaults() {
	let cfg = load_raw("").expect("Empty config must load.");

	assert_eq!(cfg.datashare.url, DEFAULT_DATASHARE_URL);
	assert_eq!(cfg.datashare.project, DEFAULT_DATASHARE_PROJECT);
	assert!(cfg.elasticsearch.url.is_none());
	assert_eq!(cfg.elasticsearch.url_or_default(), DEFAULT_ELASTICSEARCH_URL);
	assert_eq!(cfg.http.timeout_secs, 60);
	assert_eq!(cfg.logger.stdout_loglevel, "error");
}

#[test]
fn apikey_is_kept_when_present() {
	let cfg = load_raw("[datashare]\napikey = \"secret\"\n").expect("Config must load.");

	assert_eq!(cfg.datashare.apikey.as_deref(), Some("secret"));
}

#[test]
fn rejects_zero_timeout() {
	let err = load_raw("[http]\ntimeout_secs = 0\n").expect_err("Zero timeout must be rejected.");

	assert!(matches!(err, Error::Invalid { key: "http.timeout_secs", .. }));
	assert_eq!(err.to_string(), "Invalid tarentula setting http.timeout_secs: must be greater than zero.");
}

#[test]
fn rejects_url_without_scheme() {
	let err = load_raw("[elasticsearch]\nurl = \"localhost:9200\"\n")
		.expect_err("Scheme-less url must be rejected.");

	assert!(err.to_string().contains("elasticsearch.url"));
}

#[test]
fn rejects_blank_project() {
	let err =
		load_raw("[datashare]\nproject = \" \"\n").expect_err("Blank project must be rejected.");

	assert!(err.to_string().contains("datashare.project"));
}

#[test]
fn rejects_unknown_keys() {
	let err = load_raw("[datashare]\nprojetc = \"typo\"\n").expect_err("Unknown keys must fail.");

	assert!(matches!(&err, Error::Parse { origin, .. } if origin.ends_with("tarentula.toml")));
}

#[test]
fn missing_file_is_a_read_error() {
	let dir = TempDir::new().expect("Failed to create temp dir.");
	let err = tarentula_config::load(&dir.path().join("missing.toml"))
		.expect_err("Missing file must fail.");

	assert!(matches!(err, Error::Read { .. }));
}

#[test]
fn explicit_path_wins_over_defaults() {
	let dir = TempDir::new().expect("Failed to create temp dir.");
	let path = write_config(&dir, "[datashare]\nproject = \"offshore-leaks\"\n");
	let cfg = tarentula_config::load_or_default(Some(&path)).expect("Config must load.");

	assert_eq!(cfg.datashare.project, "offshore-leaks");
}

#[test]
fn inline_toml_is_validated_like_files() {
	let cfg = tarentula_config::parse("[logger]\nstdout_loglevel = \"debug\"\n", "inline")
		.expect("Inline config must parse.");

	assert_eq!(cfg.logger.stdout_loglevel, "debug");

	let err = tarentula_config::parse("[datashare]\nurl = \"\"\n", "inline")
		.expect_err("Blank url must be rejected.");

	assert_eq!(err.to_string(), "Invalid tarentula setting datashare.url: must be non-empty.");
}
