pub mod aggregate;
pub mod documents;
pub mod lifecycle;
pub mod mutation;
pub mod query;
pub mod retrieval;
pub mod transport;

mod error;

pub use aggregate::{AggregateResult, Aggregation, Bucket, CalendarInterval, MetricKind};
pub use error::{Error, Result};
pub use lifecycle::{IndexManager, Workspace};
pub use mutation::{
	AppliedTag, CompletionMode, FailedTag, MutationConfig, MutationController, MutationTask, Tag,
	TaggingReport,
};
pub use query::{Filter, Query, QueryBuilder, SortField, SortOrder};
pub use reqwest::Method;
pub use retrieval::{Hit, RetrievalSession, SearchPage, SessionConfig, Strategy};
pub use transport::{
	BackendRequest, BackendResponse, HttpTransport, Transport, TransportConfig, url_join,
};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug)]
pub struct Endpoints {
	pub datashare_url: String,
	/// When unset, searches are sent through the Datashare search proxy.
	pub elasticsearch_url: Option<String>,
}
impl Endpoints {
	pub fn new(datashare_url: impl Into<String>, elasticsearch_url: Option<String>) -> Self {
		Self { datashare_url: datashare_url.into(), elasticsearch_url }
	}

	/// The base url for read operations: Elasticsearch itself or the Datashare proxy.
	pub fn search_host(&self) -> String {
		match self.elasticsearch_url.as_deref() {
			Some(url) => url.to_string(),
			None => url_join(&[self.datashare_url.as_str(), "api/index/search"]),
		}
	}

	/// The base url for write operations, which the Datashare proxy does not forward.
	pub fn elasticsearch(&self) -> Result<&str> {
		self.elasticsearch_url.as_deref().ok_or_else(|| Error::InvalidRequest {
			message: "This operation needs an Elasticsearch URL.".to_string(),
		})
	}
}

/// A cheap-to-clone handle pairing a transport with the backend endpoints.
#[derive(Clone)]
pub struct DatashareClient {
	transport: Arc<dyn Transport>,
	endpoints: Endpoints,
}
impl DatashareClient {
	pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
		Self { transport, endpoints }
	}

	pub fn connect(cfg: &TransportConfig, endpoints: Endpoints) -> Result<Self> {
		Ok(Self::new(Arc::new(HttpTransport::new(cfg)?), endpoints))
	}

	/// A client on a fresh transport, safe to use from a runtime other than the caller's.
	pub fn detached(&self) -> Result<Self> {
		Ok(Self::new(self.transport.clone().detach()?, self.endpoints.clone()))
	}

	pub fn endpoints(&self) -> &Endpoints {
		&self.endpoints
	}

	pub async fn execute(&self, request: BackendRequest) -> Result<BackendResponse> {
		self.transport.execute(&request).await
	}

	/// One `_search` request. `scroll` opens a scroll context with that keep-alive.
	pub async fn search(
		&self,
		index: &str,
		body: Map<String, Value>,
		scroll: Option<&str>,
	) -> Result<SearchPage> {
		let url = url_join(&[self.endpoints.search_host().as_str(), index, "_search"]);
		let mut request = BackendRequest::post(url).json(Value::Object(body));

		if let Some(scroll) = scroll {
			request = request.param("scroll", scroll);
		}

		self.execute(request).await?.json()
	}

	/// Advances a scroll context. The returned page may carry a renewed identifier.
	pub async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<SearchPage> {
		let url = url_join(&[self.endpoints.search_host().as_str(), "_search/scroll"]);
		let body = serde_json::json!({ "scroll_id": scroll_id, "scroll": keep_alive });

		self.execute(BackendRequest::post(url).json(body)).await?.json()
	}

	pub fn retrieve(&self, config: SessionConfig) -> Result<RetrievalSession<'_>> {
		RetrievalSession::open(self, config)
	}
}
