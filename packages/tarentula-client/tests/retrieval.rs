use std::collections::HashSet;

use serde_json::{Value, json};

use tarentula_client::{Error, Query, QueryBuilder, SessionConfig, SortOrder, Strategy};
use tarentula_testkit::{DATASHARE_URL, FakeBackend};

const INDEX: &str = "test-datashare";

fn seed(backend: &FakeBackend, count: usize) {
	for n in 0..count {
		backend.insert(
			INDEX,
			&format!("doc-{n}"),
			json!({ "n": n, "name": format!("document {n}"), "type": "Document", "tags": [] }),
		);
	}
}

fn sorted_query() -> Query {
	QueryBuilder::structured(Default::default()).sort_by("n", SortOrder::Asc).build()
}

fn search_bodies(backend: &FakeBackend) -> Vec<Value> {
	backend
		.requests()
		.into_iter()
		.filter(|request| request.path().ends_with("/_search"))
		.filter_map(|request| request.body)
		.collect()
}

#[tokio::test]
async fn cursor_pages_yield_every_hit_once() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 9);

	let config = SessionConfig { page_size: 2, limit: 9, ..SessionConfig::new(INDEX, sorted_query()) };
	let session = client.retrieve(config).expect("Failed to open session.");

	assert_eq!(session.strategy(), Strategy::Cursor);

	let hits = session.collect_all().await.expect("Failed to collect hits.");
	let ids = hits.iter().map(|hit| hit.id.as_str()).collect::<HashSet<_>>();

	assert_eq!(hits.len(), 9);
	assert_eq!(ids.len(), 9);
	assert_eq!(hits[0].id, "doc-0");
	assert_eq!(hits[8].id, "doc-8");
}

#[tokio::test]
async fn cursor_sends_offset_on_first_page_only() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 9);

	let config = SessionConfig { page_size: 3, from: 2, ..SessionConfig::new(INDEX, sorted_query()) };
	let hits = client
		.retrieve(config)
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert_eq!(hits.len(), 7);
	assert_eq!(hits[0].id, "doc-2");

	let bodies = search_bodies(&backend);

	assert_eq!(bodies[0]["from"], json!(2));
	assert!(bodies[0].get("search_after").is_none());

	for body in &bodies[1..] {
		assert!(body.get("from").is_none());
		assert!(body.get("search_after").is_some());
	}
}

#[tokio::test]
async fn limit_caps_yielded_hits_and_shrinks_last_request() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 9);

	let config = SessionConfig { page_size: 2, limit: 5, ..SessionConfig::new(INDEX, sorted_query()) };
	let mut session = client.retrieve(config).expect("Failed to open session.");
	let mut count = 0;

	while let Some(_hit) = session.next().await.expect("Failed to pull hit.") {
		count += 1;
	}

	assert_eq!(count, 5);
	assert_eq!(session.yielded(), 5);

	let sizes = search_bodies(&backend).iter().map(|body| body["size"].clone()).collect::<Vec<_>>();

	assert_eq!(sizes, vec![json!(2), json!(2), json!(1)]);
}

#[tokio::test]
async fn scroll_walks_every_page_with_fresh_identifiers() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 7);

	let config = SessionConfig {
		page_size: 2,
		scroll: Some("1m".to_string()),
		..SessionConfig::new(INDEX, Query::match_all())
	};
	let session = client.retrieve(config).expect("Failed to open session.");

	assert_eq!(session.strategy(), Strategy::Scroll);

	let hits = session.collect_all().await.expect("Failed to collect hits.");
	let ids = hits.iter().map(|hit| hit.id.as_str()).collect::<HashSet<_>>();

	assert_eq!(hits.len(), 7);
	assert_eq!(ids.len(), 7);

	let scroll_ids = backend
		.requests()
		.into_iter()
		.filter(|request| request.path().ends_with("/_search/scroll"))
		.filter_map(|request| request.body?.get("scroll_id")?.as_str().map(str::to_string))
		.collect::<Vec<_>>();
	let distinct = scroll_ids.iter().collect::<HashSet<_>>();

	assert!(!scroll_ids.is_empty());
	assert_eq!(distinct.len(), scroll_ids.len());
	assert_eq!(backend.open_scrolls(), 1, "Only the latest scroll identifier stays valid.");
}

#[tokio::test]
async fn scroll_enforces_limit_client_side() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 7);

	let config = SessionConfig {
		page_size: 2,
		limit: 3,
		scroll: Some("1m".to_string()),
		from: 4,
		..SessionConfig::new(INDEX, Query::match_all())
	};
	let hits = client
		.retrieve(config)
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert_eq!(hits.len(), 3);
	assert!(search_bodies(&backend).iter().all(|body| body.get("from").is_none()));
}

#[tokio::test]
async fn scroll_and_cursor_yield_the_same_hits() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 11);

	let query = QueryBuilder::text("document*").sort_by("_id", SortOrder::Asc).build();
	let cursor = client
		.retrieve(SessionConfig { page_size: 3, ..SessionConfig::new(INDEX, query.clone()) })
		.expect("Failed to open cursor session.")
		.collect_all()
		.await
		.expect("Failed to collect cursor hits.");
	let scroll = client
		.retrieve(SessionConfig {
			page_size: 4,
			scroll: Some("1m".to_string()),
			..SessionConfig::new(INDEX, query)
		})
		.expect("Failed to open scroll session.")
		.collect_all()
		.await
		.expect("Failed to collect scroll hits.");
	let cursor_ids = cursor.iter().map(|hit| hit.id.as_str()).collect::<HashSet<_>>();
	let scroll_ids = scroll.iter().map(|hit| hit.id.as_str()).collect::<HashSet<_>>();

	assert_eq!(cursor.len(), 11);
	assert_eq!(scroll.len(), 11);
	assert_eq!(cursor_ids, scroll_ids);
}

#[tokio::test]
async fn unsorted_cursor_stops_with_missing_sort_values() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 5);

	let config = SessionConfig { page_size: 2, ..SessionConfig::new(INDEX, Query::match_all()) };
	let mut session = client.retrieve(config).expect("Failed to open session.");

	assert!(session.next().await.expect("First hit must arrive.").is_some());
	assert!(session.next().await.expect("Second hit must arrive.").is_some());
	assert!(matches!(session.next().await, Err(Error::MissingSortValues { .. })));
	assert!(session.next().await.expect("Ended session must stay quiet.").is_none());
}

#[tokio::test]
async fn transport_failure_ends_the_session() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 6);
	backend.fail_when(|request| {
		request.body.as_ref().is_some_and(|body| body.get("search_after").is_some())
	});

	let config = SessionConfig { page_size: 2, ..SessionConfig::new(INDEX, sorted_query()) };
	let mut session = client.retrieve(config).expect("Failed to open session.");

	assert!(session.next().await.expect("First hit must arrive.").is_some());
	assert!(session.next().await.expect("Second hit must arrive.").is_some());
	assert!(matches!(session.next().await, Err(Error::Unavailable { .. })));

	backend.clear_failures();

	assert!(session.next().await.expect("Ended session must stay quiet.").is_none());
}

#[tokio::test]
async fn empty_result_set_yields_nothing() {
	let (backend, client) = tarentula_testkit::fake_client();

	backend.create_index(INDEX);

	let hits = client
		.retrieve(SessionConfig::new(INDEX, sorted_query()))
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert!(hits.is_empty());
}

#[tokio::test]
async fn rejects_zero_page_size() {
	let (_backend, client) = tarentula_testkit::fake_client();
	let config = SessionConfig { page_size: 0, ..SessionConfig::new(INDEX, Query::match_all()) };

	assert!(matches!(client.retrieve(config), Err(Error::InvalidRequest { .. })));
}

#[tokio::test]
async fn text_filter_counts_matching_documents() {
	let (backend, client) = tarentula_testkit::fake_client();

	backend.insert(INDEX, "a", json!({ "name": "Migidae", "type": "Document" }));
	backend.insert(INDEX, "b", json!({ "name": "Atypidae", "type": "Document" }));
	backend.insert(INDEX, "c", json!({ "name": "Barychelidae", "type": "NamedEntity" }));

	let query = QueryBuilder::from_user_input("name:Migi*").expect("Failed to parse query.").build();

	assert_eq!(client.count(INDEX, &query).await.expect("Failed to count."), 1);

	let query = QueryBuilder::text("*").document_type("Document").build();

	assert_eq!(client.count(INDEX, &query).await.expect("Failed to count."), 2);
}

#[tokio::test]
async fn projection_limits_returned_source_fields() {
	let (backend, client) = tarentula_testkit::fake_client();

	seed(&backend, 3);

	let query = QueryBuilder::structured(Default::default())
		.source(["name"])
		.sort_by("n", SortOrder::Desc)
		.build();
	let hits = client
		.retrieve(SessionConfig::new(INDEX, query))
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert_eq!(hits[0].id, "doc-2");
	assert_eq!(hits[0].source.keys().collect::<Vec<_>>(), ["name"]);
}

#[tokio::test]
async fn searches_through_the_datashare_proxy() {
	let backend = std::sync::Arc::new(FakeBackend::new());
	let client = backend.proxied_client();

	seed(&backend, 3);

	let hits = client
		.retrieve(SessionConfig::new(INDEX, sorted_query()))
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert_eq!(hits.len(), 3);
	assert!(
		backend
			.requests()
			.iter()
			.all(|request| request.url.starts_with(&format!("{DATASHARE_URL}/api/index/search/")))
	);
}

#[tokio::test]
#[ignore = "Requires external Elasticsearch and Datashare. Set TARENTULA_ELASTICSEARCH_URL and TARENTULA_DATASHARE_URL to run."]
async fn live_cursor_pagination_respects_limit() {
	let Some(client) = tarentula_testkit::live_client() else {
		eprintln!(
			"Skipping live_cursor_pagination_respects_limit; set TARENTULA_ELASTICSEARCH_URL and TARENTULA_DATASHARE_URL to run this test."
		);

		return;
	};
	let query = QueryBuilder::structured(Default::default()).sort_by("_id", SortOrder::Asc).build();
	let config = SessionConfig {
		page_size: 2,
		limit: 5,
		..SessionConfig::new(tarentula_testkit::env_project(), query)
	};
	let hits = client
		.retrieve(config)
		.expect("Failed to open session.")
		.collect_all()
		.await
		.expect("Failed to collect hits.");

	assert!(hits.len() <= 5);
}
