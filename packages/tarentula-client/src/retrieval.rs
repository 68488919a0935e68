//! Walks arbitrarily large result sets one hit at a time.
//!
//! A session either replays the last hit's sort values as `search_after` (cursor strategy) or
//! advances a backend-held scroll context (scroll strategy). Both honor a global hit limit.

use std::{collections::VecDeque, mem};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{DatashareClient, Error, Query, Result};

pub const DEFAULT_PAGE_SIZE: u64 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
	Cursor,
	Scroll,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
	pub index: String,
	pub query: Query,
	pub page_size: u64,
	/// Maximum number of hits to yield. Zero means unlimited.
	pub limit: u64,
	/// Scroll keep-alive such as `10m`. Selects the scroll strategy when set.
	pub scroll: Option<String>,
	/// Offset of the first page. Ignored by the scroll strategy.
	pub from: u64,
}
impl SessionConfig {
	pub fn new(index: impl Into<String>, query: Query) -> Self {
		Self {
			index: index.into(),
			query,
			page_size: DEFAULT_PAGE_SIZE,
			limit: 0,
			scroll: None,
			from: 0,
		}
	}

	pub fn strategy(&self) -> Strategy {
		if self.scroll.is_some() { Strategy::Scroll } else { Strategy::Cursor }
	}
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Hit {
	#[serde(rename = "_id")]
	pub id: String,
	#[serde(rename = "_index", default)]
	pub index: Option<String>,
	#[serde(rename = "_routing", default)]
	pub routing: Option<String>,
	#[serde(rename = "_score", default)]
	pub score: Option<f64>,
	#[serde(rename = "_source", default)]
	pub source: Map<String, Value>,
	#[serde(default)]
	pub sort: Vec<Value>,
}
impl Hit {
	/// Routing falls back to the document id, as Datashare does for root documents.
	pub fn routing_or_id(&self) -> &str {
		self.routing.as_deref().unwrap_or(&self.id)
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchPage {
	#[serde(rename = "_scroll_id", default)]
	pub scroll_id: Option<String>,
	#[serde(default)]
	pub took: Option<u64>,
	pub hits: SearchHits,
	#[serde(default)]
	pub aggregations: Option<Map<String, Value>>,
}
impl SearchPage {
	/// Reads `hits.total` in both its object (`{"value": n}`) and bare-number forms.
	pub fn total(&self) -> Option<u64> {
		match self.hits.total.as_ref()? {
			Value::Number(number) => number.as_u64(),
			Value::Object(total) => total.get("value").and_then(Value::as_u64),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct SearchHits {
	#[serde(default)]
	pub total: Option<Value>,
	#[serde(default)]
	pub hits: Vec<Hit>,
}

#[derive(Debug)]
enum Cursor {
	Start,
	SearchAfter(Vec<Value>),
	Scroll(String),
	/// The last page ended on a hit without sort values, so there is no way to continue.
	Unsortable,
	Exhausted,
}

/// A single-pass, pull-driven sequence of hits. Not restartable; open a new session instead.
pub struct RetrievalSession<'a> {
	client: &'a DatashareClient,
	config: SessionConfig,
	strategy: Strategy,
	cursor: Cursor,
	buffer: VecDeque<Hit>,
	yielded: u64,
	pages: u64,
}
impl<'a> RetrievalSession<'a> {
	pub(crate) fn open(client: &'a DatashareClient, config: SessionConfig) -> Result<Self> {
		if config.index.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "A retrieval session needs an index name.".to_string(),
			});
		}
		if config.page_size == 0 {
			return Err(Error::InvalidRequest {
				message: "Page size must be greater than zero.".to_string(),
			});
		}

		let strategy = config.strategy();

		match strategy {
			Strategy::Cursor => {
				tracing::info!(index = %config.index, "Searching document(s) metadata.");

				if !config.query.has_unique_tiebreak() {
					tracing::warn!(
						index = %config.index,
						"Sort has no _id tie-break; hits tied across a page boundary are skipped."
					);
				}
			},
			Strategy::Scroll => {
				tracing::info!(index = %config.index, "Scrolling over document(s) metadata.");

				if config.from > 0 {
					tracing::warn!(from = config.from, "\"from\" is ignored when scrolling documents.");
				}
			},
		}

		Ok(Self {
			client,
			config,
			strategy,
			cursor: Cursor::Start,
			buffer: VecDeque::new(),
			yielded: 0,
			pages: 0,
		})
	}

	pub fn strategy(&self) -> Strategy {
		self.strategy
	}

	pub fn yielded(&self) -> u64 {
		self.yielded
	}

	/// Pulls the next hit, fetching a page when the buffer is empty. Any error ends the session.
	pub async fn next(&mut self) -> Result<Option<Hit>> {
		loop {
			if self.remaining() == Some(0) {
				self.finish();

				return Ok(None);
			}
			if let Some(hit) = self.buffer.pop_front() {
				self.yielded += 1;

				return Ok(Some(hit));
			}
			if matches!(self.cursor, Cursor::Exhausted) {
				return Ok(None);
			}
			if let Err(err) = self.fetch_page().await {
				self.finish();

				return Err(err);
			}
		}
	}

	/// Drains the session into memory. Fails on the first backend error.
	pub async fn collect_all(mut self) -> Result<Vec<Hit>> {
		let mut hits = Vec::new();

		while let Some(hit) = self.next().await? {
			hits.push(hit);
		}

		Ok(hits)
	}

	fn remaining(&self) -> Option<u64> {
		(self.config.limit > 0).then(|| self.config.limit.saturating_sub(self.yielded))
	}

	fn request_size(&self) -> u64 {
		match self.remaining() {
			Some(remaining) => self.config.page_size.min(remaining),
			None => self.config.page_size,
		}
	}

	fn finish(&mut self) {
		self.cursor = Cursor::Exhausted;
		self.buffer.clear();
	}

	async fn fetch_page(&mut self) -> Result<()> {
		match mem::replace(&mut self.cursor, Cursor::Exhausted) {
			Cursor::Start => match self.strategy {
				Strategy::Cursor => self.fetch_cursor_page(None).await,
				Strategy::Scroll => self.fetch_first_scroll_page().await,
			},
			Cursor::SearchAfter(values) => self.fetch_cursor_page(Some(values)).await,
			Cursor::Scroll(scroll_id) => self.fetch_next_scroll_page(&scroll_id).await,
			Cursor::Unsortable => Err(Error::MissingSortValues { index: self.config.index.clone() }),
			Cursor::Exhausted => Ok(()),
		}
	}

	async fn fetch_cursor_page(&mut self, search_after: Option<Vec<Value>>) -> Result<()> {
		let size = self.request_size();
		let mut body = self.config.query.request_body();

		body.insert("size".to_string(), Value::from(size));

		match search_after {
			Some(values) => {
				body.insert("search_after".to_string(), Value::Array(values));
			},
			None if self.config.from > 0 => {
				body.insert("from".to_string(), Value::from(self.config.from));
			},
			None => {},
		}

		let page = self.client.search(&self.config.index, body, None).await?;
		let received = page.hits.hits.len() as u64;

		self.pages += 1;

		tracing::debug!(
			index = %self.config.index,
			page = self.pages,
			requested = size,
			received,
			total = ?page.total(),
			took = ?page.took,
			"Fetched cursor page."
		);

		let budget_left = self.remaining().map(|remaining| remaining.saturating_sub(received));

		self.cursor = if received < size || budget_left == Some(0) {
			Cursor::Exhausted
		} else {
			match page.hits.hits.last() {
				Some(last) if !last.sort.is_empty() => Cursor::SearchAfter(last.sort.clone()),
				_ => Cursor::Unsortable,
			}
		};
		self.buffer.extend(page.hits.hits);

		Ok(())
	}

	async fn fetch_first_scroll_page(&mut self) -> Result<()> {
		let keep_alive = self.keep_alive()?;
		let mut body = self.config.query.request_body();

		body.insert("size".to_string(), Value::from(self.request_size()));

		let page = self.client.search(&self.config.index, body, Some(&keep_alive)).await?;

		self.accept_scroll_page(page);

		Ok(())
	}

	async fn fetch_next_scroll_page(&mut self, scroll_id: &str) -> Result<()> {
		let keep_alive = self.keep_alive()?;
		let page = self.client.scroll(scroll_id, &keep_alive).await?;

		self.accept_scroll_page(page);

		Ok(())
	}

	fn accept_scroll_page(&mut self, page: SearchPage) {
		self.pages += 1;

		tracing::debug!(
			index = %self.config.index,
			page = self.pages,
			received = page.hits.hits.len(),
			took = ?page.took,
			"Fetched scroll page."
		);

		self.cursor = match page.scroll_id {
			Some(scroll_id) if !page.hits.hits.is_empty() => Cursor::Scroll(scroll_id),
			_ => Cursor::Exhausted,
		};
		self.buffer.extend(page.hits.hits);
	}

	fn keep_alive(&self) -> Result<String> {
		self.config.scroll.clone().ok_or_else(|| Error::InvalidRequest {
			message: "Scroll strategy needs a keep-alive duration.".to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn parses_hits_with_optional_fields() {
		let page: SearchPage = serde_json::from_value(json!({
			"_scroll_id": "abc",
			"hits": {
				"total": { "value": 2, "relation": "eq" },
				"hits": [
					{ "_id": "a", "_routing": "root", "_score": 1.5, "_source": { "name": "x" }, "sort": [1] },
					{ "_id": "b" }
				]
			}
		}))
		.expect("Failed to parse search page.");

		assert_eq!(page.total(), Some(2));
		assert_eq!(page.scroll_id.as_deref(), Some("abc"));
		assert_eq!(page.hits.hits[0].routing_or_id(), "root");
		assert_eq!(page.hits.hits[1].routing_or_id(), "b");
		assert!(page.hits.hits[1].sort.is_empty());
	}

	#[test]
	fn reads_legacy_numeric_total() {
		let page: SearchPage = serde_json::from_value(json!({ "hits": { "total": 7, "hits": [] } }))
			.expect("Failed to parse search page.");

		assert_eq!(page.total(), Some(7));
	}

	#[test]
	fn scroll_keep_alive_selects_strategy() {
		let mut config = SessionConfig::new("idx", Query::match_all());

		assert_eq!(config.strategy(), Strategy::Cursor);

		config.scroll = Some("1m".to_string());

		assert_eq!(config.strategy(), Strategy::Scroll);
	}
}
