use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

const UNIQUE_SORT_FIELD: &str = "_id";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
	Asc,
	#[default]
	Desc,
}
impl SortOrder {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Asc => "asc",
			Self::Desc => "desc",
		}
	}
}
impl fmt::Display for SortOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
impl FromStr for SortOrder {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.trim().to_ascii_lowercase().as_str() {
			"asc" => Ok(Self::Asc),
			"desc" => Ok(Self::Desc),
			other => Err(Error::InvalidRequest {
				message: format!("Sort order must be asc or desc, got {other:?}."),
			}),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortField {
	pub field: String,
	pub order: SortOrder,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
	/// A Lucene query-string expression.
	Text(String),
	/// A request body passed through as-is, usually `{"query": {...}}`.
	Structured(Map<String, Value>),
}

/// A normalized search request. Immutable once built; use [`QueryBuilder`] to make one.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
	filter: Filter,
	source: Option<Vec<String>>,
	sort: Vec<SortField>,
	document_type: Option<String>,
}
impl Query {
	pub fn match_all() -> Self {
		QueryBuilder::structured(Map::new()).build()
	}

	pub fn filter(&self) -> &Filter {
		&self.filter
	}

	pub fn source(&self) -> Option<&[String]> {
		self.source.as_deref()
	}

	pub fn sort(&self) -> &[SortField] {
		&self.sort
	}

	pub fn document_type(&self) -> Option<&str> {
		self.document_type.as_deref()
	}

	/// The `query` clause, restricted to the document type when one is set.
	pub fn query_clause(&self) -> Value {
		let clause = match &self.filter {
			Filter::Text(expr) => serde_json::json!({ "query_string": { "query": expr } }),
			Filter::Structured(body) => body
				.get("query")
				.cloned()
				.unwrap_or_else(|| serde_json::json!({ "match_all": {} })),
		};

		match self.document_type.as_deref() {
			Some(ty) => serde_json::json!({
				"bool": { "must": [clause, { "term": { "type": ty } }] }
			}),
			None => clause,
		}
	}

	/// The filter-only body used by mutations: structured keys are kept, projection and sort
	/// are not added.
	pub fn filter_body(&self) -> Map<String, Value> {
		let mut body = match &self.filter {
			Filter::Text(_) => Map::new(),
			Filter::Structured(body) => body.clone(),
		};

		body.insert("query".to_string(), self.query_clause());

		body
	}

	/// The search body: the filter plus `_source` projection and sort specification.
	pub fn request_body(&self) -> Map<String, Value> {
		let mut body = self.filter_body();

		if let Some(source) = self.source.as_ref() {
			body.insert("_source".to_string(), Value::from(source.clone()));
		}
		if !self.sort.is_empty() {
			let sort = self
				.sort
				.iter()
				.map(|entry| {
					let mut pair = Map::new();

					pair.insert(entry.field.clone(), Value::from(entry.order.as_str()));

					Value::Object(pair)
				})
				.collect::<Vec<_>>();

			body.insert("sort".to_string(), Value::Array(sort));
		}

		body
	}

	/// Whether the sort ends on ties with `_id`. Without it, cursor pages skip hits that share
	/// sort values with the last hit of the previous page.
	pub fn has_unique_tiebreak(&self) -> bool {
		let body = self.request_body();
		let entries = match body.get("sort") {
			Some(Value::Array(entries)) => entries.iter().collect::<Vec<_>>(),
			Some(entry) => vec![entry],
			None => Vec::new(),
		};

		entries.into_iter().any(|entry| match entry {
			Value::String(field) => field == UNIQUE_SORT_FIELD,
			Value::Object(object) => object.contains_key(UNIQUE_SORT_FIELD),
			_ => false,
		})
	}

	pub fn count_body(&self) -> Value {
		serde_json::json!({ "query": self.query_clause() })
	}
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
	filter: Filter,
	source: Option<Vec<String>>,
	sort: Vec<SortField>,
	document_type: Option<String>,
}
impl QueryBuilder {
	pub fn text(expr: impl Into<String>) -> Self {
		Self::with_filter(Filter::Text(expr.into()))
	}

	pub fn structured(body: Map<String, Value>) -> Self {
		Self::with_filter(Filter::Structured(body))
	}

	/// A JSON object is taken as a structured body; anything else is a query-string expression.
	pub fn from_user_input(input: &str) -> Result<Self> {
		let trimmed = input.trim();

		if !trimmed.starts_with('{') {
			return Ok(Self::text(trimmed));
		}

		match serde_json::from_str::<Value>(trimmed)? {
			Value::Object(body) => Ok(Self::structured(body)),
			_ => Err(Error::InvalidRequest {
				message: "A structured query must be a JSON object.".to_string(),
			}),
		}
	}

	/// Accepts the shapes allowed in a tag definition file: a string or an object.
	pub fn from_value(value: Value) -> Result<Self> {
		match value {
			Value::String(expr) => Ok(Self::text(expr)),
			Value::Object(body) => Ok(Self::structured(body)),
			other => Err(Error::InvalidRequest {
				message: format!("A query must be a string or an object, got {other}."),
			}),
		}
	}

	pub fn source<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.source = Some(fields.into_iter().map(Into::into).collect());

		self
	}

	pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
		self.sort.push(SortField { field: field.into(), order });

		self
	}

	pub fn document_type(mut self, ty: impl Into<String>) -> Self {
		self.document_type = Some(ty.into());

		self
	}

	pub fn build(self) -> Query {
		Query {
			filter: self.filter,
			source: self.source,
			sort: self.sort,
			document_type: self.document_type,
		}
	}

	fn with_filter(filter: Filter) -> Self {
		Self { filter, source: None, sort: Vec::new(), document_type: None }
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn text_becomes_query_string() {
		let query = QueryBuilder::text("name:Migi*").build();

		assert_eq!(query.count_body(), json!({ "query": { "query_string": { "query": "name:Migi*" } } }));
	}

	#[test]
	fn structured_body_passes_through_with_options() {
		let body = json!({
			"query": { "term": { "contentType": "application/pdf" } },
			"runtime_mappings": {}
		});
		let Value::Object(body) = body else { unreachable!() };
		let query = QueryBuilder::structured(body)
			.source(["path", "contentType"])
			.sort_by("_id", SortOrder::Asc)
			.build();

		assert_eq!(
			Value::Object(query.request_body()),
			json!({
				"query": { "term": { "contentType": "application/pdf" } },
				"runtime_mappings": {},
				"_source": ["path", "contentType"],
				"sort": [{ "_id": "asc" }]
			})
		);
		assert_eq!(
			query.count_body(),
			json!({ "query": { "term": { "contentType": "application/pdf" } } })
		);
	}

	#[test]
	fn filter_body_omits_projection_and_sort() {
		let query = QueryBuilder::text("*").source(["path"]).sort_by("_score", SortOrder::Desc).build();

		assert_eq!(
			Value::Object(query.filter_body()),
			json!({ "query": { "query_string": { "query": "*" } } })
		);
	}

	#[test]
	fn missing_query_defaults_to_match_all() {
		assert_eq!(Query::match_all().count_body(), json!({ "query": { "match_all": {} } }));
	}

	#[test]
	fn document_type_wraps_clause() {
		let query = QueryBuilder::text("*").document_type("Document").build();

		assert_eq!(
			query.query_clause(),
			json!({
				"bool": {
					"must": [
						{ "query_string": { "query": "*" } },
						{ "term": { "type": "Document" } }
					]
				}
			})
		);
	}

	#[test]
	fn user_input_is_classified() {
		let text = QueryBuilder::from_user_input(" paris ").expect("Text input must parse.").build();

		assert_eq!(text.filter(), &Filter::Text("paris".to_string()));

		let structured = QueryBuilder::from_user_input(r#"{"query":{"match_all":{}}}"#)
			.expect("Object input must parse.")
			.build();

		assert!(matches!(structured.filter(), Filter::Structured(_)));
		assert!(QueryBuilder::from_user_input("{not json").is_err());
		assert!(QueryBuilder::from_value(json!(3)).is_err());
	}

	#[test]
	fn tiebreak_needs_an_id_sort() {
		assert!(!QueryBuilder::text("*").sort_by("_score", SortOrder::Desc).build().has_unique_tiebreak());
		assert!(!Query::match_all().has_unique_tiebreak());
		assert!(
			QueryBuilder::text("*")
				.sort_by("_score", SortOrder::Desc)
				.sort_by("_id", SortOrder::Asc)
				.build()
				.has_unique_tiebreak()
		);

		let Value::Object(body) = json!({ "sort": ["_id"] }) else { unreachable!() };

		assert!(QueryBuilder::structured(body).build().has_unique_tiebreak());
	}

	#[test]
	fn sort_order_parses_case_insensitively() {
		assert_eq!("ASC".parse::<SortOrder>().expect("asc must parse."), SortOrder::Asc);
		assert!("sideways".parse::<SortOrder>().is_err());
	}
}
