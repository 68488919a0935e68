use std::fmt;

use serde_json::{Map, Value};

use crate::{DatashareClient, Error, Query, Result};

const AGGREGATION_NAME: &str = "result";
const DEFAULT_BUCKET_COUNT: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalendarInterval {
	Year,
	Month,
}
impl CalendarInterval {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Year => "year",
			Self::Month => "month",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
	Sum,
	Stats,
	StringStats,
	Min,
	Max,
	Avg,
}
impl MetricKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Sum => "sum",
			Self::Stats => "stats",
			Self::StringStats => "string_stats",
			Self::Min => "min",
			Self::Max => "max",
			Self::Avg => "avg",
		}
	}
}

/// One aggregation, chosen once from the command configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregation {
	/// Documents per distinct value of `group_by`.
	Count { group_by: String },
	/// Approximate number of distinct values of `field`.
	NumUnique { field: String },
	DateHistogram { field: String, interval: CalendarInterval },
	Metric { kind: MetricKind, field: String },
}
impl Aggregation {
	pub fn body(&self) -> Value {
		match self {
			Self::Count { group_by } => serde_json::json!({
				"terms": { "field": group_by, "size": DEFAULT_BUCKET_COUNT }
			}),
			Self::NumUnique { field } => serde_json::json!({ "cardinality": { "field": field } }),
			Self::DateHistogram { field, interval } => serde_json::json!({
				"date_histogram": { "field": field, "calendar_interval": interval.as_str() }
			}),
			Self::Metric { kind, field } => {
				let mut metric = Map::new();

				metric.insert(kind.as_str().to_string(), serde_json::json!({ "field": field }));

				Value::Object(metric)
			},
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bucket {
	pub key: String,
	pub doc_count: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AggregateResult {
	Buckets(Vec<Bucket>),
	/// A single value, or the object returned by `stats` and `string_stats`.
	Metric(Value),
}
impl fmt::Display for AggregateResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Buckets(buckets) => {
				for bucket in buckets {
					writeln!(f, "{},{}", bucket.key, bucket.doc_count)?;
				}

				Ok(())
			},
			Self::Metric(value) => writeln!(f, "{value}"),
		}
	}
}

impl DatashareClient {
	pub async fn aggregate(
		&self,
		index: &str,
		query: &Query,
		aggregation: &Aggregation,
	) -> Result<AggregateResult> {
		let mut aggs = Map::new();

		aggs.insert(AGGREGATION_NAME.to_string(), aggregation.body());

		let mut body = Map::new();

		body.insert("query".to_string(), query.query_clause());
		body.insert("size".to_string(), Value::from(0));
		body.insert("aggs".to_string(), Value::Object(aggs));

		let page = self.search(index, body, None).await?;
		let result = page
			.aggregations
			.as_ref()
			.and_then(|aggregations| aggregations.get(AGGREGATION_NAME))
			.ok_or_else(|| Error::InvalidResponse {
				message: "Search response is missing the aggregation result.".to_string(),
			})?;

		parse_result(aggregation, result)
	}
}

fn parse_result(aggregation: &Aggregation, result: &Value) -> Result<AggregateResult> {
	match aggregation {
		Aggregation::Count { .. } | Aggregation::DateHistogram { .. } => {
			let buckets = result.get("buckets").and_then(Value::as_array).ok_or_else(|| {
				Error::InvalidResponse { message: "Aggregation result is missing buckets.".to_string() }
			})?;

			buckets
				.iter()
				.map(|bucket| {
					let key = bucket
						.get("key_as_string")
						.or_else(|| bucket.get("key"))
						.map(|key| match key {
							Value::String(key) => key.clone(),
							other => other.to_string(),
						})
						.ok_or_else(|| Error::InvalidResponse {
							message: "Aggregation bucket is missing key.".to_string(),
						})?;
					let doc_count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);

					Ok(Bucket { key, doc_count })
				})
				.collect::<Result<Vec<_>>>()
				.map(AggregateResult::Buckets)
		},
		Aggregation::NumUnique { .. } => Ok(AggregateResult::Metric(
			result.get("value").cloned().unwrap_or(Value::Null),
		)),
		Aggregation::Metric { kind: MetricKind::Stats | MetricKind::StringStats, .. } =>
			Ok(AggregateResult::Metric(result.clone())),
		Aggregation::Metric { .. } =>
			Ok(AggregateResult::Metric(result.get("value").cloned().unwrap_or(Value::Null))),
	}
}
