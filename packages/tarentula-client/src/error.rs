pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Http(#[from] reqwest::Error),
	#[error("{method} {url} failed with status {status}: {body}")]
	Status { method: String, url: String, status: u16, body: String },
	#[error("Backend unavailable: {message}")]
	Unavailable { message: String },
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidRequest { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error(
		"Cursor pagination over {index} stalled: the last hit carries no sort values. Provide a sort specification."
	)]
	MissingSortValues { index: String },
}
impl Error {
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Http(err) => err.status().map(|status| status.as_u16()),
			_ => None,
		}
	}
}
