use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read tarentula config {}.", path.display())]
	Read { path: PathBuf, source: std::io::Error },
	#[error("Tarentula config {origin} is not valid TOML.")]
	Parse { origin: String, source: toml::de::Error },
	/// `key` is the dotted `section.field` name as written in `tarentula.toml`.
	#[error("Invalid tarentula setting {key}: {reason}.")]
	Invalid { key: &'static str, reason: &'static str },
}
