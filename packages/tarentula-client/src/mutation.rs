//! Index-wide tag mutations submitted through update-by-query.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_json::Value;

use crate::{BackendRequest, DatashareClient, Error, Query, QueryBuilder, Result, url_join};

pub const DEFAULT_SCROLL_SIZE: u64 = 1_000;

/// Set-inserts `params.tag`: documents already holding the tag are left unchanged.
pub const ADD_TAG_SCRIPT: &str = "\
if (!ctx._source.containsKey(\"tags\")) { ctx._source.tags = []; }
if (!ctx._source.tags.contains(params.tag)) { ctx._source.tags.add(params.tag); }";

pub const CLEAR_TAGS_SCRIPT: &str = "ctx._source.tags = [];";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletionMode {
	/// Block until the backend reports completion.
	#[default]
	Sync,
	/// Return a task handle right away. The handle is reported, never polled.
	Async,
}
impl CompletionMode {
	pub fn from_wait_for_completion(wait: bool) -> Self {
		if wait { Self::Sync } else { Self::Async }
	}

	fn wait_for_completion(&self) -> &'static str {
		match self {
			Self::Sync => "true",
			Self::Async => "false",
		}
	}
}

#[derive(Clone, Debug)]
pub struct MutationConfig {
	pub project: String,
	pub completion: CompletionMode,
	/// Documents visited per internal batch on the backend.
	pub scroll_size: u64,
	/// Pause between two consecutive tag submissions.
	pub throttle: Duration,
	/// Log the full error chain of failed tags.
	pub traceback: bool,
}
impl MutationConfig {
	pub fn new(project: impl Into<String>) -> Self {
		Self {
			project: project.into(),
			completion: CompletionMode::Sync,
			scroll_size: DEFAULT_SCROLL_SIZE,
			throttle: Duration::ZERO,
			traceback: false,
		}
	}
}

#[derive(Clone, Debug)]
pub struct Tag {
	pub label: String,
	pub query: Query,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationTask {
	Completed { took_ms: u64, updated: u64 },
	Submitted { task_id: String, status_url: String },
}

#[derive(Clone, Debug)]
pub struct AppliedTag {
	pub label: String,
	pub task: MutationTask,
}

#[derive(Clone, Debug)]
pub struct FailedTag {
	pub label: String,
	pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct TaggingReport {
	pub applied: Vec<AppliedTag>,
	pub failed: Vec<FailedTag>,
}
impl TaggingReport {
	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

#[derive(Debug, Deserialize)]
struct UpdateByQueryResponse {
	took: Option<u64>,
	updated: Option<u64>,
	task: Option<String>,
}

pub struct MutationController {
	client: DatashareClient,
	config: MutationConfig,
}
impl MutationController {
	pub fn new(client: DatashareClient, config: MutationConfig) -> Self {
		Self { client, config }
	}

	pub fn config(&self) -> &MutationConfig {
		&self.config
	}

	pub fn endpoint(&self) -> Result<String> {
		let url = url_join(&[self.client.endpoints().elasticsearch()?, self.config.project.as_str()]);

		Ok(format!("{url}/_update_by_query?conflicts=proceed"))
	}

	pub fn task_url(&self, task_id: &str) -> Result<String> {
		Ok(url_join(&[self.client.endpoints().elasticsearch()?, "_tasks", task_id]))
	}

	pub async fn tag_documents(&self, tag: &str, query: &Query) -> Result<MutationTask> {
		let script = serde_json::json!({
			"source": ADD_TAG_SCRIPT,
			"lang": "painless",
			"params": { "tag": tag },
		});

		self.update_by_query(script, query).await
	}

	pub async fn clear_tags(&self, query: &Query) -> Result<MutationTask> {
		let script = serde_json::json!({ "source": CLEAR_TAGS_SCRIPT, "lang": "painless" });

		self.update_by_query(script, query).await
	}

	/// Applies each tag as its own mutation. A failing tag is logged and skipped; the
	/// remaining tags are still attempted.
	pub async fn apply_tags(&self, tags: &[Tag]) -> TaggingReport {
		let mut report = TaggingReport::default();

		tracing::info!(count = tags.len(), project = %self.config.project, "Adding tag(s).");

		for (position, tag) in tags.iter().enumerate() {
			if position > 0 && !self.config.throttle.is_zero() {
				tokio::time::sleep(self.config.throttle).await;
			}

			match self.tag_documents(&tag.label, &tag.query).await {
				Ok(task) => {
					match &task {
						MutationTask::Completed { took_ms, updated } => tracing::info!(
							tag = %tag.label,
							took_ms,
							updated,
							"Documents tagged."
						),
						MutationTask::Submitted { task_id, .. } => {
							tracing::info!(tag = %tag.label, task_id = %task_id, "Tagging task created.")
						},
					}

					report.applied.push(AppliedTag { label: tag.label.clone(), task });
				},
				Err(err) => {
					if self.config.traceback {
						tracing::error!(tag = %tag.label, error = ?err, "Unable to add tag.");
					} else {
						tracing::error!(tag = %tag.label, error = %err, "Unable to add tag.");
					}

					report.failed.push(FailedTag { label: tag.label.clone(), error: err.to_string() });
				},
			}
		}

		report
	}

	async fn update_by_query(&self, script: Value, query: &Query) -> Result<MutationTask> {
		let mut body = query.filter_body();

		body.insert("script".to_string(), script);

		let request = BackendRequest::post(self.endpoint()?)
			.param("wait_for_completion", self.config.completion.wait_for_completion())
			.param("scroll_size", self.config.scroll_size)
			.json(Value::Object(body));
		let response: UpdateByQueryResponse = self.client.execute(request).await?.json()?;

		match self.config.completion {
			CompletionMode::Sync => Ok(MutationTask::Completed {
				took_ms: response.took.ok_or_else(|| Error::InvalidResponse {
					message: "Update-by-query response is missing took.".to_string(),
				})?,
				updated: response.updated.unwrap_or(0),
			}),
			CompletionMode::Async => {
				let task_id = response.task.ok_or_else(|| Error::InvalidResponse {
					message: "Update-by-query response is missing task.".to_string(),
				})?;
				let status_url = self.task_url(&task_id)?;

				Ok(MutationTask::Submitted { task_id, status_url })
			},
		}
	}
}

/// Reads a JSON object mapping tag labels to queries, keeping file order.
pub fn load_tag_definitions(path: &Path) -> Result<Vec<Tag>> {
	let raw = fs::read_to_string(path)?;

	parse_tag_definitions(&raw)
}

pub fn parse_tag_definitions(raw: &str) -> Result<Vec<Tag>> {
	let Value::Object(definitions) = serde_json::from_str::<Value>(raw)? else {
		return Err(Error::InvalidRequest {
			message: "Tag definitions must be a JSON object of label to query.".to_string(),
		});
	};

	definitions
		.into_iter()
		.map(|(label, query)| {
			if label.trim().is_empty() {
				return Err(Error::InvalidRequest {
					message: "Tag labels must be non-empty.".to_string(),
				});
			}

			Ok(Tag { query: QueryBuilder::from_value(query)?.build(), label })
		})
		.collect()
}
