//! An in-memory stand-in for Datashare and Elasticsearch behind the `Transport` seam.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap},
	sync::{Arc, Mutex, MutexGuard},
};

use serde_json::{Map, Value, json};
use tarentula_client::{
	BackendRequest, BackendResponse, BoxFuture, DatashareClient, Endpoints, Error, Method, Result,
	Transport,
};

use crate::matcher::{self, Doc};

pub const ELASTICSEARCH_URL: &str = "http://elasticsearch.test";
pub const DATASHARE_URL: &str = "http://datashare.test";

const DEFAULT_SEARCH_SIZE: usize = 10;

/// Decides whether a request fails as if the backend were unreachable.
pub type FailureRule = Box<dyn Fn(&BackendRequest) -> bool + Send + Sync>;

#[derive(Clone, Debug)]
struct StoredDocument {
	id: String,
	routing: Option<String>,
	source: Map<String, Value>,
}

struct ScrollContext {
	hits: Vec<Value>,
	size: usize,
}

#[derive(Default)]
struct State {
	indices: BTreeMap<String, Vec<StoredDocument>>,
	scrolls: HashMap<String, ScrollContext>,
	requests: Vec<BackendRequest>,
	failures: Vec<FailureRule>,
	next_id: u64,
	next_scroll: u64,
	next_task: u64,
}

#[derive(Default)]
pub struct FakeBackend {
	state: Mutex<State>,
}
impl FakeBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn client(self: &Arc<Self>) -> DatashareClient {
		let transport: Arc<dyn Transport> = self.clone();
		let endpoints = Endpoints::new(DATASHARE_URL, Some(ELASTICSEARCH_URL.to_string()));

		DatashareClient::new(transport, endpoints)
	}

	/// A client that reaches Elasticsearch only through the Datashare search proxy.
	pub fn proxied_client(self: &Arc<Self>) -> DatashareClient {
		let transport: Arc<dyn Transport> = self.clone();

		DatashareClient::new(transport, Endpoints::new(DATASHARE_URL, None))
	}

	pub fn create_index(&self, index: &str) {
		self.lock().indices.entry(index.to_string()).or_default();
	}

	pub fn has_index(&self, index: &str) -> bool {
		self.lock().indices.contains_key(index)
	}

	pub fn index_names(&self) -> Vec<String> {
		self.lock().indices.keys().cloned().collect()
	}

	pub fn insert(&self, index: &str, id: &str, source: Value) {
		let Value::Object(source) = source else {
			panic!("Fake documents must be JSON objects.");
		};

		upsert(&mut self.lock(), index, id.to_string(), None, source);
	}

	pub fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
		self.lock()
			.indices
			.get(index)?
			.iter()
			.find(|doc| doc.id == id)
			.map(|doc| doc.source.clone())
	}

	pub fn document_count(&self, index: &str) -> usize {
		self.lock().indices.get(index).map(Vec::len).unwrap_or(0)
	}

	pub fn requests(&self) -> Vec<BackendRequest> {
		self.lock().requests.clone()
	}

	pub fn open_scrolls(&self) -> usize {
		self.lock().scrolls.len()
	}

	pub fn fail_when<F>(&self, rule: F)
	where
		F: Fn(&BackendRequest) -> bool + Send + Sync + 'static,
	{
		self.lock().failures.push(Box::new(rule));
	}

	pub fn clear_failures(&self) {
		self.lock().failures.clear();
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn handle(&self, request: &BackendRequest) -> Result<Value> {
		let mut state = self.lock();

		state.requests.push(request.clone());

		if state.failures.iter().any(|rule| rule(request)) {
			return Err(Error::Unavailable {
				message: format!("Connection refused while calling {}.", request.url),
			});
		}

		let path = request.path();

		if let Some(rest) = path.strip_prefix(ELASTICSEARCH_URL) {
			return elasticsearch(&mut state, request, &segments(rest));
		}
		if let Some(rest) = path.strip_prefix(DATASHARE_URL) {
			let segments = segments(rest);

			return match segments.as_slice() {
				["api", "index", "search", rest @ ..] => elasticsearch(&mut state, request, rest),
				["api", "index", name] if request.method == Method::PUT => {
					state.indices.entry(name.to_string()).or_default();

					Ok(json!({ "ok": true }))
				},
				_ => Err(status(request, 404, "Unknown Datashare route.")),
			};
		}

		Err(Error::Unavailable { message: format!("Unknown host in {}.", request.url) })
	}

	fn handle_download(&self, request: &BackendRequest) -> Option<Result<Vec<u8>>> {
		let path = request.path().strip_prefix(DATASHARE_URL)?;
		let segments = segments(path);
		let ["api", index, "documents", "src", id] = segments.as_slice() else {
			return None;
		};
		let mut state = self.lock();

		state.requests.push(request.clone());

		if state.failures.iter().any(|rule| rule(request)) {
			return Some(Err(Error::Unavailable {
				message: format!("Connection refused while calling {}.", request.url),
			}));
		}

		let content = state
			.indices
			.get(*index)
			.and_then(|docs| docs.iter().find(|doc| doc.id == *id))
			.map(|doc| doc.source.get("content").and_then(Value::as_str).unwrap_or_default().to_string());

		Some(match content {
			Some(content) => Ok(content.into_bytes()),
			None => Err(status(request, 404, "Document not found.")),
		})
	}
}
impl Transport for FakeBackend {
	fn execute<'a>(&'a self, request: &'a BackendRequest) -> BoxFuture<'a, Result<BackendResponse>> {
		Box::pin(async move {
			if let Some(download) = self.handle_download(request) {
				return download.map(BackendResponse::ok);
			}

			self.handle(request).map(|body| BackendResponse::from_json(&body))
		})
	}

	fn detach(self: Arc<Self>) -> Result<Arc<dyn Transport>> {
		Ok(self)
	}
}

fn segments(path: &str) -> Vec<&str> {
	path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn status(request: &BackendRequest, code: u16, message: &str) -> Error {
	Error::Status {
		method: request.method.to_string(),
		url: request.url.clone(),
		status: code,
		body: json!({ "error": message }).to_string(),
	}
}

fn body(request: &BackendRequest) -> Map<String, Value> {
	request.body.as_ref().and_then(Value::as_object).cloned().unwrap_or_default()
}

fn elasticsearch(state: &mut State, request: &BackendRequest, segments: &[&str]) -> Result<Value> {
	let method = &request.method;

	match segments {
		["_search", "scroll"] if *method == Method::POST => scroll(state, request),
		["_reindex"] if *method == Method::POST => reindex(state, request),
		["_tasks", task] if *method == Method::GET =>
			Ok(json!({ "completed": false, "task": { "id": task } })),
		[index] if *method == Method::DELETE => match state.indices.remove(*index) {
			Some(_) => Ok(json!({ "acknowledged": true })),
			None => Err(status(request, 404, "Index not found.")),
		},
		[_, "_refresh"] if *method == Method::POST => Ok(json!({ "_shards": {} })),
		[index, "_search"] if *method == Method::POST => search(state, request, index),
		[index, "_count"] if *method == Method::POST => {
			let count = matching(state, request, index)?.len();

			Ok(json!({ "count": count }))
		},
		[index, "_doc"] if *method == Method::POST => {
			state.next_id += 1;

			let id = format!("fake-{}", state.next_id);

			upsert(state, index, id.clone(), request.param_value("routing").map(str::to_string), body(request));

			Ok(json!({ "_id": id, "result": "created" }))
		},
		[index, "_doc", id] if *method == Method::PUT => {
			upsert(
				state,
				index,
				id.to_string(),
				request.param_value("routing").map(str::to_string),
				body(request),
			);

			Ok(json!({ "_id": id, "result": "updated" }))
		},
		[index, "_doc", id] if *method == Method::GET => {
			let doc = state
				.indices
				.get(*index)
				.and_then(|docs| docs.iter().find(|doc| doc.id == *id))
				.ok_or_else(|| status(request, 404, "Document not found."))?;

			Ok(json!({ "_index": index, "_id": doc.id, "found": true, "_source": doc.source }))
		},
		[index, "_doc", id] if *method == Method::DELETE => {
			let docs = state.indices.get_mut(*index).ok_or_else(|| status(request, 404, "Index not found."))?;
			let before = docs.len();

			docs.retain(|doc| doc.id != *id);

			if docs.len() == before {
				return Err(status(request, 404, "Document not found."));
			}

			Ok(json!({ "_id": id, "result": "deleted" }))
		},
		[index, "_delete_by_query"] if *method == Method::POST => {
			let ids = matching(state, request, index)?.into_iter().map(|doc| doc.id).collect::<Vec<_>>();

			if let Some(docs) = state.indices.get_mut(*index) {
				docs.retain(|doc| !ids.contains(&doc.id));
			}

			Ok(json!({ "deleted": ids.len() }))
		},
		[index, "_update_by_query"] if *method == Method::POST => update_by_query(state, request, index),
		_ => Err(status(request, 400, "Unsupported Elasticsearch route.")),
	}
}

fn upsert(state: &mut State, index: &str, id: String, routing: Option<String>, source: Map<String, Value>) {
	let docs = state.indices.entry(index.to_string()).or_default();

	match docs.iter_mut().find(|doc| doc.id == id) {
		Some(doc) => {
			doc.source = source;
			doc.routing = routing;
		},
		None => docs.push(StoredDocument { id, routing, source }),
	}
}

fn matching(state: &State, request: &BackendRequest, index: &str) -> Result<Vec<StoredDocument>> {
	let docs = state.indices.get(index).ok_or_else(|| status(request, 404, "Index not found."))?;
	let body = body(request);
	let clause = body.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
	let mut matched = Vec::new();

	for doc in docs {
		let hit = matcher::matches(&clause, &Doc { id: &doc.id, source: &doc.source })
			.map_err(|message| status(request, 400, &message))?;

		if hit {
			matched.push(doc.clone());
		}
	}

	Ok(matched)
}

fn sort_fields(body: &Map<String, Value>) -> Vec<(String, bool)> {
	let entries = match body.get("sort") {
		Some(Value::Array(entries)) => entries.clone(),
		Some(entry) => vec![entry.clone()],
		None => Vec::new(),
	};

	entries
		.iter()
		.filter_map(|entry| match entry {
			Value::String(field) => Some((field.clone(), field != "_score")),
			Value::Object(object) => object.iter().next().map(|(field, order)| {
				let order = order.get("order").unwrap_or(order);

				(field.clone(), order.as_str() != Some("desc"))
			}),
			_ => None,
		})
		.collect()
}

fn compare_tuples(left: &[Value], right: &[Value], sorting: &[(String, bool)]) -> Ordering {
	for ((left, right), (_, ascending)) in left.iter().zip(right).zip(sorting) {
		let ordering = matcher::compare_values(left, right);
		let ordering = if *ascending { ordering } else { ordering.reverse() };

		if ordering != Ordering::Equal {
			return ordering;
		}
	}

	Ordering::Equal
}

fn to_hit(index: &str, doc: &StoredDocument, body: &Map<String, Value>, sort: Option<Vec<Value>>) -> Value {
	let source = match body.get("_source") {
		Some(Value::Array(fields)) => {
			let fields = fields.iter().filter_map(Value::as_str).collect::<Vec<_>>();

			doc.source
				.iter()
				.filter(|(key, _)| fields.contains(&key.as_str()))
				.map(|(key, value)| (key.clone(), value.clone()))
				.collect()
		},
		_ => doc.source.clone(),
	};
	let mut hit = json!({ "_index": index, "_id": doc.id, "_score": 1.0, "_source": source });

	if let Some(routing) = doc.routing.as_ref() {
		hit["_routing"] = Value::from(routing.clone());
	}
	if let Some(sort) = sort {
		hit["sort"] = Value::Array(sort);
	}

	hit
}

fn search(state: &mut State, request: &BackendRequest, index: &str) -> Result<Value> {
	let body = body(request);
	let sorting = sort_fields(&body);
	let mut matched = matching(state, request, index)?
		.into_iter()
		.map(|doc| {
			let doc_view = Doc { id: &doc.id, source: &doc.source };
			let tuple = sorting
				.iter()
				.map(|(field, _)| matcher::sort_value(&doc_view, field))
				.collect::<Vec<_>>();

			(tuple, doc)
		})
		.collect::<Vec<_>>();
	let total = matched.len();

	if !sorting.is_empty() {
		matched.sort_by(|(left, _), (right, _)| compare_tuples(left, right, &sorting));
	}
	if let Some(after) = body.get("search_after").and_then(Value::as_array) {
		if sorting.is_empty() {
			return Err(status(request, 400, "search_after needs a sort."));
		}

		matched.retain(|(tuple, _)| compare_tuples(tuple, after, &sorting) == Ordering::Greater);
	}

	let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
	let size = body.get("size").and_then(Value::as_u64).map(|size| size as usize).unwrap_or(DEFAULT_SEARCH_SIZE);
	let hits = matched
		.iter()
		.map(|(tuple, doc)| to_hit(index, doc, &body, (!sorting.is_empty()).then(|| tuple.clone())))
		.collect::<Vec<_>>();
	let aggregations = aggregations(&body, matched.iter().map(|(_, doc)| doc));
	let mut response = json!({ "took": 1, "hits": { "total": { "value": total, "relation": "eq" } } });

	if let Some(keep_alive) = request.param_value("scroll") {
		if keep_alive.is_empty() {
			return Err(status(request, 400, "scroll needs a keep-alive."));
		}
		if from > 0 {
			return Err(status(request, 400, "from is not allowed in a scroll context."));
		}

		let (page, rest) = split_page(hits, size);

		state.next_scroll += 1;

		let scroll_id = format!("scroll-{}", state.next_scroll);

		state.scrolls.insert(scroll_id.clone(), ScrollContext { hits: rest, size });

		response["_scroll_id"] = Value::from(scroll_id);
		response["hits"]["hits"] = Value::Array(page);
	} else {
		let page = hits.into_iter().skip(from).take(size).collect::<Vec<_>>();

		response["hits"]["hits"] = Value::Array(page);
	}

	if let Some(aggregations) = aggregations {
		response["aggregations"] = aggregations;
	}

	Ok(response)
}

fn split_page(hits: Vec<Value>, size: usize) -> (Vec<Value>, Vec<Value>) {
	let mut page = hits;
	let rest = if page.len() > size { page.split_off(size) } else { Vec::new() };

	(page, rest)
}

/// Issues a fresh identifier on every page; the previous one stops working.
fn scroll(state: &mut State, request: &BackendRequest) -> Result<Value> {
	let body = body(request);
	let scroll_id = body.get("scroll_id").and_then(Value::as_str).unwrap_or_default();

	if body.get("scroll").and_then(Value::as_str).unwrap_or_default().is_empty() {
		return Err(status(request, 400, "scroll needs a keep-alive."));
	}

	let context =
		state.scrolls.remove(scroll_id).ok_or_else(|| status(request, 404, "No search context found."))?;
	let (page, rest) = split_page(context.hits, context.size);

	state.next_scroll += 1;

	let next_id = format!("scroll-{}", state.next_scroll);

	state.scrolls.insert(next_id.clone(), ScrollContext { hits: rest, size: context.size });

	Ok(json!({ "_scroll_id": next_id, "took": 1, "hits": { "hits": page } }))
}

fn reindex(state: &mut State, request: &BackendRequest) -> Result<Value> {
	let body = body(request);
	let index_name = |key: &str| {
		body.get(key)
			.and_then(|target| target.get("index"))
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string()
	};
	let source = index_name("source");
	let dest = index_name("dest");
	let docs = state.indices.get(&source).cloned().ok_or_else(|| status(request, 404, "Index not found."))?;
	let limit = body.get("size").and_then(Value::as_u64).map(|size| size as usize).unwrap_or(docs.len());
	let copied = docs.into_iter().take(limit).collect::<Vec<_>>();
	let created = copied.len();

	state.indices.entry(dest.clone()).or_default();

	for doc in copied {
		upsert(state, &dest, doc.id, doc.routing, doc.source);
	}

	Ok(json!({ "took": 1, "created": created }))
}

/// Runs the two scripts the client submits: a tag set-insert and a tag reset.
fn update_by_query(state: &mut State, request: &BackendRequest, index: &str) -> Result<Value> {
	if request.param_value("conflicts") != Some("proceed") {
		return Err(status(request, 409, "Version conflict."));
	}

	let body = body(request);
	let script = body.get("script").and_then(Value::as_object).cloned().unwrap_or_default();
	let source = script.get("source").and_then(Value::as_str).unwrap_or_default().to_string();
	let tag = script.get("params").and_then(|params| params.get("tag")).cloned();
	let ids = matching(state, request, index)?.into_iter().map(|doc| doc.id).collect::<Vec<_>>();
	let docs = state.indices.get_mut(index).ok_or_else(|| status(request, 404, "Index not found."))?;

	for doc in docs.iter_mut().filter(|doc| ids.contains(&doc.id)) {
		let tags = doc.source.entry("tags").or_insert_with(|| Value::Array(Vec::new()));
		let Value::Array(tags) = tags else {
			return Err(status(request, 400, "tags must be an array."));
		};

		match (&tag, source.contains("tags.add(params.tag)")) {
			(Some(tag), true) => {
				// Mirrors the script guard; a blind add would duplicate.
				if !source.contains("!ctx._source.tags.contains(params.tag)") || !tags.contains(tag) {
					tags.push(tag.clone());
				}
			},
			(None, false) if source.contains("tags = []") => tags.clear(),
			_ => return Err(status(request, 400, "Unsupported script.")),
		}
	}

	if request.param_value("wait_for_completion") == Some("false") {
		state.next_task += 1;

		return Ok(json!({ "task": format!("fake-node:{}", state.next_task) }));
	}

	Ok(json!({ "took": 1, "total": ids.len(), "updated": ids.len(), "version_conflicts": 0, "failures": [] }))
}

fn aggregations<'a, I>(body: &Map<String, Value>, docs: I) -> Option<Value>
where
	I: Iterator<Item = &'a StoredDocument>,
{
	let aggs = body.get("aggs").or_else(|| body.get("aggregations"))?.as_object()?;
	let docs = docs.collect::<Vec<_>>();
	let mut results = Map::new();

	for (name, definition) in aggs {
		let Some((kind, args)) = definition.as_object().and_then(|object| object.iter().next()) else {
			continue;
		};
		let field = args.get("field").and_then(Value::as_str).unwrap_or_default();
		let values = docs.iter().filter_map(|doc| doc.source.get(field)).collect::<Vec<_>>();
		let numbers = values.iter().filter_map(|value| value.as_f64()).collect::<Vec<_>>();
		let result = match kind.as_str() {
			"terms" => {
				let mut counts = BTreeMap::<String, u64>::new();

				for value in &values {
					let key = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());

					*counts.entry(key).or_default() += 1;
				}

				let mut buckets = counts.into_iter().collect::<Vec<_>>();

				buckets.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));

				json!({
					"buckets": buckets
						.into_iter()
						.map(|(key, doc_count)| json!({ "key": key, "doc_count": doc_count }))
						.collect::<Vec<_>>()
				})
			},
			"cardinality" => {
				let mut distinct = values.iter().map(|value| value.to_string()).collect::<Vec<_>>();

				distinct.sort();
				distinct.dedup();

				json!({ "value": distinct.len() })
			},
			"sum" => json!({ "value": numbers.iter().sum::<f64>() }),
			"min" => json!({ "value": numbers.iter().copied().reduce(f64::min) }),
			"max" => json!({ "value": numbers.iter().copied().reduce(f64::max) }),
			"avg" => json!({
				"value": (!numbers.is_empty()).then(|| numbers.iter().sum::<f64>() / numbers.len() as f64)
			}),
			_ => continue,
		};

		results.insert(name.clone(), result);
	}

	Some(Value::Object(results))
}
