mod backend;
mod matcher;

pub use backend::{DATASHARE_URL, ELASTICSEARCH_URL, FakeBackend, FailureRule};

use std::{env, sync::Arc, time::Duration};

use tarentula_client::{DatashareClient, Endpoints, TransportConfig};

pub fn env_elasticsearch_url() -> Option<String> {
	env::var("TARENTULA_ELASTICSEARCH_URL").ok()
}

pub fn env_datashare_url() -> Option<String> {
	env::var("TARENTULA_DATASHARE_URL").ok()
}

pub fn env_project() -> String {
	env::var("TARENTULA_DATASHARE_PROJECT").unwrap_or_else(|_| "test-datashare".to_string())
}

/// A client against the live backend named by the environment, if any.
pub fn live_client() -> Option<DatashareClient> {
	let elasticsearch_url = env_elasticsearch_url()?;
	let datashare_url = env_datashare_url()?;
	let cfg = TransportConfig { timeout: Duration::from_secs(30), ..TransportConfig::default() };

	match DatashareClient::connect(&cfg, Endpoints::new(datashare_url, Some(elasticsearch_url))) {
		Ok(client) => Some(client),
		Err(err) => {
			eprintln!("Failed to build live client: {err}.");

			None
		},
	}
}

/// A client wired to a fresh in-memory backend.
pub fn fake_client() -> (Arc<FakeBackend>, DatashareClient) {
	let backend = Arc::new(FakeBackend::new());
	let client = backend.client();

	(backend, client)
}
