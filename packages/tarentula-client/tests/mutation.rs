use std::{fs, time::Duration};

use serde_json::{Value, json};

use tarentula_client::{
	CompletionMode, Error, MutationConfig, MutationController, MutationTask, Query, QueryBuilder,
	Tag, mutation,
};
use tarentula_testkit::{ELASTICSEARCH_URL, FakeBackend};

const PROJECT: &str = "test-datashare";

fn seed(backend: &FakeBackend) {
	backend.insert(PROJECT, "migidae", json!({ "name": "Migidae", "tags": [] }));
	backend.insert(PROJECT, "atypidae", json!({ "name": "Atypidae", "tags": ["spider"] }));
	backend.insert(PROJECT, "barychelidae", json!({ "name": "Barychelidae", "tags": [] }));
}

fn tags_of(backend: &FakeBackend, id: &str) -> Value {
	backend.document(PROJECT, id).expect("Document must exist.")["tags"].clone()
}

fn tag(label: &str, query: &str) -> Tag {
	Tag { label: label.to_string(), query: QueryBuilder::text(query).build() }
}

#[tokio::test]
async fn tagging_twice_keeps_a_single_label() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend);

	let controller = MutationController::new(client, MutationConfig::new(PROJECT));
	let query = QueryBuilder::text("name:Migidae").build();

	for _ in 0..2 {
		let task = controller.tag_documents("foo", &query).await.expect("Failed to tag documents.");

		assert!(matches!(task, MutationTask::Completed { updated: 1, .. }));
	}

	assert_eq!(tags_of(&backend, "migidae"), json!(["foo"]));
	assert_eq!(tags_of(&backend, "barychelidae"), json!([]));

	// The fake only skips present tags when the submitted script carries the same guard.
	let request = backend.requests().pop().expect("A request must be recorded.");
	let script = request
		.body
		.as_ref()
		.and_then(|body| body.get("script"))
		.and_then(|script| script.get("source"))
		.and_then(Value::as_str)
		.expect("Missing script source.");

	assert!(script.contains("if (!ctx._source.tags.contains(params.tag))"), "Script: {script}");
	assert!(script.contains("ctx._source.tags.add(params.tag)"), "Script: {script}");
}

#[tokio::test]
async fn update_requests_proceed_on_conflicts() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend);

	let config = MutationConfig { scroll_size: 50, ..MutationConfig::new(PROJECT) };
	let controller = MutationController::new(client, config);

	controller.tag_documents("foo", &Query::match_all()).await.expect("Failed to tag documents.");

	let request = backend.requests().pop().expect("A request must be recorded.");

	assert_eq!(request.path(), format!("{ELASTICSEARCH_URL}/{PROJECT}/_update_by_query"));
	assert_eq!(request.param_value("conflicts"), Some("proceed"));
	assert_eq!(request.param_value("scroll_size"), Some("50"));
	assert_eq!(request.param_value("wait_for_completion"), Some("true"));
}

#[tokio::test]
async fn failing_tag_does_not_stop_the_rest() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend);
	backend.fail_when(|request| {
		request
			.body
			.as_ref()
			.and_then(|body| body.pointer("/script/params/tag"))
			.is_some_and(|tag| tag == "second")
	});

	let config = MutationConfig { throttle: Duration::from_millis(1), ..MutationConfig::new(PROJECT) };
	let controller = MutationController::new(client, config);
	let tags = [tag("first", "name:Migidae"), tag("second", "name:Atypidae"), tag("third", "*")];
	let report = controller.apply_tags(&tags).await;

	assert!(!report.is_success());
	assert_eq!(
		report.applied.iter().map(|applied| applied.label.as_str()).collect::<Vec<_>>(),
		["first", "third"]
	);
	assert_eq!(report.failed.len(), 1);
	assert_eq!(report.failed[0].label, "second");
	assert_eq!(tags_of(&backend, "migidae"), json!(["first", "third"]));
	assert_eq!(tags_of(&backend, "atypidae"), json!(["spider", "third"]));
}

#[tokio::test]
async fn async_mutation_reports_task_status_url() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend);

	let config = MutationConfig {
		completion: CompletionMode::from_wait_for_completion(false),
		..MutationConfig::new(PROJECT)
	};
	let controller = MutationController::new(client, config);
	let task = controller.tag_documents("foo", &Query::match_all()).await.expect("Failed to submit.");

	assert_eq!(
		task,
		MutationTask::Submitted {
			task_id: "fake-node:1".to_string(),
			status_url: format!("{ELASTICSEARCH_URL}/_tasks/fake-node:1"),
		}
	);
	assert!(
		!backend.requests().iter().any(|request| request.path().contains("/_tasks/")),
		"Submitted tasks must not be polled."
	);
}

#[tokio::test]
async fn clear_tags_empties_matching_documents() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend);

	let controller = MutationController::new(client, MutationConfig::new(PROJECT));

	controller
		.clear_tags(&QueryBuilder::text("name:Atyp*").build())
		.await
		.expect("Failed to clear tags.");

	assert_eq!(tags_of(&backend, "atypidae"), json!([]));
}

#[tokio::test]
async fn mutations_need_an_elasticsearch_url() {
	let backend = std::sync::Arc::new(FakeBackend::new());
	let controller = MutationController::new(backend.proxied_client(), MutationConfig::new(PROJECT));

	assert!(matches!(
		controller.tag_documents("foo", &Query::match_all()).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(backend.requests().is_empty());
}

#[test]
fn loads_tag_definitions_from_file() {
	let dir = tempfile::tempdir().expect("Failed to create temp dir.");
	let path = dir.path().join("tags.json");

	fs::write(&path, r#"{ "spiders": "name:*idae", "empty": { "query": { "match_none": {} } } }"#)
		.expect("Failed to write tag file.");

	let tags = mutation::load_tag_definitions(&path).expect("Failed to load tag definitions.");

	assert_eq!(tags.len(), 2);
	assert_eq!(tags[0].label, "spiders");
	assert_eq!(tags[1].query.query_clause(), json!({ "match_none": {} }));
	assert!(mutation::parse_tag_definitions("[]").is_err());
	assert!(mutation::parse_tag_definitions(r#"{ "bad": 3 }"#).is_err());
}
