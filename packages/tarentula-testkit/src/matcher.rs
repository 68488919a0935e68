//! The slice of the Elasticsearch query DSL the fake backend understands.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};

pub(crate) struct Doc<'a> {
	pub(crate) id: &'a str,
	pub(crate) source: &'a Map<String, Value>,
}

pub(crate) fn matches(clause: &Value, doc: &Doc<'_>) -> Result<bool, String> {
	let Some((kind, args)) = clause.as_object().and_then(|object| object.iter().next()) else {
		return Err(format!("Unsupported query clause {clause}."));
	};

	match kind.as_str() {
		"match_all" => Ok(true),
		"match_none" => Ok(false),
		"query_string" => {
			let query = args.get("query").and_then(Value::as_str).unwrap_or("*");

			Ok(query_string_matches(query, doc))
		},
		"term" => {
			let Some((field, expected)) = args.as_object().and_then(|object| object.iter().next())
			else {
				return Err("term needs a field.".to_string());
			};
			let expected = expected.get("value").unwrap_or(expected);

			Ok(field_values(doc, field).iter().any(|value| *value == expected))
		},
		"ids" => {
			let values = args.get("values").and_then(Value::as_array).cloned().unwrap_or_default();

			Ok(values.iter().any(|value| value.as_str() == Some(doc.id)))
		},
		"bool" => bool_matches(args, doc),
		other => Err(format!("Unsupported query clause {other}.")),
	}
}

fn bool_matches(args: &Value, doc: &Doc<'_>) -> Result<bool, String> {
	for occur in ["must", "filter"] {
		for clause in clauses(args.get(occur)) {
			if !matches(clause, doc)? {
				return Ok(false);
			}
		}
	}
	for clause in clauses(args.get("must_not")) {
		if matches(clause, doc)? {
			return Ok(false);
		}
	}

	let should = clauses(args.get("should"));

	if should.is_empty() {
		return Ok(true);
	}

	for clause in should {
		if matches(clause, doc)? {
			return Ok(true);
		}
	}

	Ok(false)
}

fn clauses(value: Option<&Value>) -> Vec<&Value> {
	match value {
		Some(Value::Array(items)) => items.iter().collect(),
		Some(other) => vec![other],
		None => Vec::new(),
	}
}

/// Supports `*`, `field:pattern`, and bare patterns with `*`/`?` wildcards, case-insensitive.
fn query_string_matches(query: &str, doc: &Doc<'_>) -> bool {
	let query = query.trim();

	if query.is_empty() || query == "*" {
		return true;
	}

	let (field, pattern) = match query.split_once(':') {
		Some((field, pattern)) => (Some(field.trim()), pattern.trim()),
		None => (None, query),
	};
	let candidates = match field {
		Some(field) => field_values(doc, field).into_iter().cloned().collect::<Vec<_>>(),
		None => doc.source.values().cloned().collect(),
	};

	candidates.iter().flat_map(flatten).any(|text| wildcard_matches(pattern, &text))
}

fn flatten(value: &Value) -> Vec<String> {
	match value {
		Value::String(text) => vec![text.clone()],
		Value::Array(items) => items.iter().flat_map(flatten).collect(),
		Value::Null => Vec::new(),
		other => vec![other.to_string()],
	}
}

fn wildcard_matches(pattern: &str, text: &str) -> bool {
	let escaped = regex::escape(pattern).replace("\\*", ".*").replace("\\?", ".");

	RegexBuilder::new(&format!("^{escaped}$"))
		.case_insensitive(true)
		.build()
		.map(|re| re.is_match(text))
		.unwrap_or(false)
}

/// The values a source field holds, with arrays expanded.
fn field_values<'a>(doc: &'a Doc<'_>, field: &str) -> Vec<&'a Value> {
	match doc.source.get(field) {
		Some(Value::Array(items)) => items.iter().collect(),
		Some(value) => vec![value],
		None => Vec::new(),
	}
}

pub(crate) fn sort_value(doc: &Doc<'_>, field: &str) -> Value {
	match field {
		"_id" => Value::from(doc.id),
		"_score" => Value::from(1.0),
		_ => doc.source.get(field).cloned().unwrap_or(Value::Null),
	}
}

pub(crate) fn compare_values(left: &Value, right: &Value) -> Ordering {
	match (left, right) {
		(Value::Number(left), Value::Number(right)) => left
			.as_f64()
			.unwrap_or(0.0)
			.partial_cmp(&right.as_f64().unwrap_or(0.0))
			.unwrap_or(Ordering::Equal),
		(Value::String(left), Value::String(right)) => left.cmp(right),
		(Value::Null, Value::Null) => Ordering::Equal,
		// Missing values sort last.
		(Value::Null, _) => Ordering::Greater,
		(_, Value::Null) => Ordering::Less,
		(left, right) => left.to_string().cmp(&right.to_string()),
	}
}
