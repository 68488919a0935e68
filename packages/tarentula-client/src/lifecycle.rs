//! Whole-index operations and disposable workspace copies.

use std::{future::Future, thread};

use serde::Deserialize;
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use tokio::runtime::Builder;
use uuid::Uuid;

use crate::{BackendRequest, DatashareClient, Error, Result, url_join};

const EXTRACTION_DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
	"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);
const SENTINEL_CONTENT: &str = "This is a temporary document";

#[derive(Debug, Deserialize)]
struct IndexResponse {
	#[serde(rename = "_id")]
	id: String,
}

#[derive(Clone)]
pub struct IndexManager {
	client: DatashareClient,
}
impl IndexManager {
	pub fn new(client: DatashareClient) -> Self {
		Self { client }
	}

	/// Creates an index through Datashare, which applies its own mappings.
	pub async fn create_index(&self, name: &str) -> Result<()> {
		let url = url_join(&[self.client.endpoints().datashare_url.as_str(), "api/index", name]);

		self.client.execute(BackendRequest::put(url)).await?;

		Ok(())
	}

	pub async fn delete_index(&self, name: &str) -> Result<()> {
		let url = url_join(&[self.client.endpoints().elasticsearch()?, name]);

		self.client.execute(BackendRequest::delete(url)).await?;

		Ok(())
	}

	pub async fn refresh(&self, index: &str) -> Result<()> {
		let url = url_join(&[self.client.endpoints().elasticsearch()?, index, "_refresh"]);

		self.client.execute(BackendRequest::post(url)).await?;

		Ok(())
	}

	/// Upserts a document and returns its id. Without `id` the backend assigns one.
	pub async fn index_document(
		&self,
		index: &str,
		document: &Map<String, Value>,
		id: Option<&str>,
		routing: Option<&str>,
	) -> Result<String> {
		let es = self.client.endpoints().elasticsearch()?;
		let mut document = document.clone();

		document.remove("_id");
		document.remove("_routing");

		if let Some(length) = document.get("content").and_then(Value::as_str).map(str::len) {
			document.insert("contentLength".to_string(), Value::from(length));
		}

		let extraction_date = OffsetDateTime::now_utc().format(EXTRACTION_DATE_FORMAT).map_err(|err| {
			Error::InvalidRequest { message: format!("Failed to format extraction date: {err}.") }
		})?;

		document.insert("extractionDate".to_string(), Value::from(extraction_date));

		let mut request = match id {
			Some(id) => BackendRequest::put(format!("{}?refresh", url_join(&[es, index, "_doc", id]))),
			None => BackendRequest::post(format!("{}?refresh", url_join(&[es, index, "_doc"]))),
		};

		if let Some(routing) = routing {
			request = request.param("routing", routing);
		}

		let response: IndexResponse =
			self.client.execute(request.json(Value::Object(document))).await?.json()?;

		Ok(response.id)
	}

	pub async fn delete_document(&self, index: &str, id: &str) -> Result<()> {
		let es = self.client.endpoints().elasticsearch()?;
		let url = format!("{}?refresh", url_join(&[es, index, "_doc", id]));

		self.client.execute(BackendRequest::delete(url)).await?;

		Ok(())
	}

	/// Removes every document from `index`, skipping version conflicts.
	pub async fn delete_all(&self, index: &str) -> Result<()> {
		let url = url_join(&[self.client.endpoints().elasticsearch()?, index, "_delete_by_query"]);
		let request = BackendRequest::post(url)
			.param("conflicts", "proceed")
			.param("refresh", "true")
			.json(serde_json::json!({ "query": { "match_all": {} } }));

		self.client.execute(request).await?;

		Ok(())
	}

	/// Copies `source` into `dest` (or a fresh `{source}-copy-xxxxxx` name) and returns the
	/// destination name. A sentinel document keeps an empty source from being a no-op.
	pub async fn reindex(&self, source: &str, dest: Option<&str>, size: Option<u64>) -> Result<String> {
		let es = self.client.endpoints().elasticsearch()?;
		let dest = dest.map(str::to_string).unwrap_or_else(|| copy_name(source));
		let mut sentinel = Map::new();

		sentinel.insert("content".to_string(), Value::from(SENTINEL_CONTENT));
		sentinel.insert("tags".to_string(), serde_json::json!(["tmp"]));

		let sentinel_id = self.index_document(source, &sentinel, None, None).await?;
		let mut body = serde_json::json!({
			"source": { "index": source },
			"dest": { "index": dest },
		});

		if let Some(size) = size {
			body["size"] = Value::from(size);
		}

		let url = format!("{}?refresh", url_join(&[es, "_reindex"]));
		let copied = self.client.execute(BackendRequest::post(url).json(body)).await;

		self.delete_document(source, &sentinel_id).await?;

		copied?;

		self.delete_document_if_exists(&dest, &sentinel_id).await?;

		tracing::info!(%source, %dest, "Index copied.");

		Ok(dest)
	}

	/// Creates an empty copy of `source` (same mappings, no documents) that is deleted when
	/// the returned guard is cleaned up or dropped.
	pub async fn temporary_workspace(&self, source: &str) -> Result<Workspace> {
		let name = self.reindex(source, None, Some(1)).await?;
		let workspace = Workspace { name, manager: self.clone(), keep: false, cleaned: false };

		self.delete_all(workspace.name()).await?;

		Ok(workspace)
	}

	/// Runs `f` against a temporary workspace and deletes it on every exit path unless
	/// `keep` is set.
	pub async fn with_temporary_workspace<F, Fut, T>(&self, source: &str, keep: bool, f: F) -> Result<T>
	where
		F: FnOnce(String) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut workspace = self.temporary_workspace(source).await?;

		if keep {
			workspace.keep = true;
		}

		let result = f(workspace.name().to_string()).await;

		if let Err(err) = workspace.cleanup().await {
			tracing::warn!(error = %err, "Temporary workspace cleanup failed.");

			if result.is_ok() {
				return Err(err);
			}
		}

		result
	}

	async fn delete_document_if_exists(&self, index: &str, id: &str) -> Result<bool> {
		match self.delete_document(index, id).await {
			Ok(()) => Ok(true),
			Err(err) if err.status() == Some(404) => Ok(false),
			Err(err) => Err(err),
		}
	}
}

/// A disposable index copy. Deleted by [`Workspace::cleanup`], or on drop as a fallback.
pub struct Workspace {
	name: String,
	manager: IndexManager,
	keep: bool,
	cleaned: bool,
}
impl Workspace {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Opts out of deletion and hands back the index name.
	pub fn keep(mut self) -> String {
		self.keep = true;

		self.name.clone()
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner().await
	}

	async fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned || self.keep {
			return Ok(());
		}

		self.manager.delete_index(&self.name).await?;

		self.cleaned = true;

		tracing::info!(index = %self.name, "Temporary workspace deleted.");

		Ok(())
	}
}
impl Drop for Workspace {
	fn drop(&mut self) {
		if self.cleaned || self.keep {
			return;
		}

		let name = self.name.clone();
		let client = self.manager.client.clone();
		// The caller's runtime is blocked on the join below, so the thread needs its own
		// runtime and connections.
		let cleanup_thread = thread::spawn(move || {
			let cleanup = || -> Result<()> {
				let runtime = Builder::new_current_thread().enable_all().build()?;
				let manager = IndexManager::new(client.detached()?);

				runtime.block_on(manager.delete_index(&name))
			};

			match cleanup() {
				Ok(()) => tracing::info!(index = %name, "Temporary workspace deleted."),
				Err(err) => {
					tracing::error!(error = %err, index = %name, "Temporary workspace cleanup failed.");
				},
			}
		});
		let _ = cleanup_thread.join();
	}
}

fn copy_name(source: &str) -> String {
	let suffix = Uuid::new_v4().simple().to_string();

	format!("{source}-copy-{}", &suffix[..6])
}
