use serde::Deserialize;
use serde_json::Value;

use crate::{BackendRequest, DatashareClient, Query, Result, url_join};

#[derive(Debug, Deserialize)]
struct CountResponse {
	count: u64,
}

impl DatashareClient {
	pub async fn count(&self, index: &str, query: &Query) -> Result<u64> {
		let url = url_join(&[self.endpoints().search_host().as_str(), index, "_count"]);
		let response: CountResponse =
			self.execute(BackendRequest::post(url).json(query.count_body())).await?.json()?;

		Ok(response.count)
	}

	/// Fetches one indexed document, optionally projected onto `source` fields.
	pub async fn document(
		&self,
		index: &str,
		id: &str,
		routing: Option<&str>,
		source: Option<&[String]>,
	) -> Result<Value> {
		let url = url_join(&[self.endpoints().search_host().as_str(), index, "_doc", id]);
		let mut request = BackendRequest::get(url);

		if let Some(routing) = routing {
			request = request.param("routing", routing);
		}
		if let Some(source) = source {
			request = request.param("_source", source.join(","));
		}

		self.execute(request).await?.json()
	}

	/// Downloads the original file behind a document from Datashare.
	pub async fn download(&self, index: &str, id: &str, routing: Option<&str>) -> Result<Vec<u8>> {
		let url = url_join(&[self.endpoints().datashare_url.as_str(), "api", index, "documents/src", id]);
		let request = BackendRequest::get(url).param("routing", routing.unwrap_or(id));

		Ok(self.execute(request).await?.body)
	}

	pub fn document_url(&self, index: &str, id: &str, routing: Option<&str>) -> String {
		let fragment = format!("#/d/{index}/{id}/{}", routing.unwrap_or(id));

		url_join(&[self.endpoints().datashare_url.as_str(), fragment.as_str()])
	}
}
