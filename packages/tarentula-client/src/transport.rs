use std::{sync::Arc, time::Duration};

use reqwest::{
	Client, Method,
	header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{BoxFuture, Error, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Executes one backend request. Implementations must turn non-success statuses into errors.
pub trait Transport
where
	Self: Send + Sync,
{
	fn execute<'a>(&'a self, request: &'a BackendRequest) -> BoxFuture<'a, Result<BackendResponse>>;

	/// A transport that can be driven from another runtime. Pooled connections are bound to the
	/// runtime that opened them, so pooling transports must hand back a fresh instance.
	fn detach(self: Arc<Self>) -> Result<Arc<dyn Transport>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackendRequest {
	pub method: Method,
	pub url: String,
	pub params: Vec<(String, String)>,
	pub body: Option<Value>,
}
impl BackendRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self { method, url: url.into(), params: Vec::new(), body: None }
	}

	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::POST, url)
	}

	pub fn put(url: impl Into<String>) -> Self {
		Self::new(Method::PUT, url)
	}

	pub fn delete(url: impl Into<String>) -> Self {
		Self::new(Method::DELETE, url)
	}

	pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.params.push((key.into(), value.to_string()));

		self
	}

	pub fn json(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Looks a parameter up in `params` first, then in the query string embedded in `url`.
	pub fn param_value(&self, key: &str) -> Option<&str> {
		if let Some((_, value)) = self.params.iter().find(|(name, _)| name == key) {
			return Some(value.as_str());
		}

		let (_, query) = self.url.split_once('?')?;

		query.split('&').find_map(|pair| {
			let (name, value) = pair.split_once('=').unwrap_or((pair, ""));

			(name == key).then_some(value)
		})
	}

	/// The url without its embedded query string.
	pub fn path(&self) -> &str {
		self.url.split_once('?').map(|(path, _)| path).unwrap_or(&self.url)
	}
}

#[derive(Clone, Debug, Default)]
pub struct BackendResponse {
	pub status: u16,
	pub body: Vec<u8>,
}
impl BackendResponse {
	pub fn ok(body: Vec<u8>) -> Self {
		Self { status: 200, body }
	}

	pub fn from_json(value: &Value) -> Self {
		Self::ok(value.to_string().into_bytes())
	}

	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(serde_json::from_slice(&self.body)?)
	}
}

#[derive(Clone, Debug)]
pub struct TransportConfig {
	pub apikey: Option<String>,
	/// Semicolon-delimited `key=value` pairs, e.g. `session=abc;lang=en`.
	pub cookies: String,
	pub timeout: Duration,
}
impl Default for TransportConfig {
	fn default() -> Self {
		Self { apikey: None, cookies: String::new(), timeout: DEFAULT_TIMEOUT }
	}
}

/// The reqwest-backed transport used against live Datashare and Elasticsearch instances.
pub struct HttpTransport {
	client: Client,
	headers: HeaderMap,
	cfg: TransportConfig,
}
impl HttpTransport {
	pub fn new(cfg: &TransportConfig) -> Result<Self> {
		let client = Client::builder().timeout(cfg.timeout).build()?;
		let headers = request_headers(cfg.apikey.as_deref(), &cfg.cookies)?;

		Ok(Self { client, headers, cfg: cfg.clone() })
	}
}
impl Transport for HttpTransport {
	fn execute<'a>(&'a self, request: &'a BackendRequest) -> BoxFuture<'a, Result<BackendResponse>> {
		Box::pin(async move {
			let mut builder = self
				.client
				.request(request.method.clone(), &request.url)
				.headers(self.headers.clone());

			if !request.params.is_empty() {
				builder = builder.query(&request.params);
			}
			if let Some(body) = request.body.as_ref() {
				builder = builder.json(body);
			}

			tracing::debug!(method = %request.method, url = %request.url, "Sending backend request.");

			let res = builder.send().await.map_err(|err| unavailable(request, err))?;
			let status = res.status();
			let body = res.bytes().await?.to_vec();

			if !status.is_success() {
				return Err(Error::Status {
					method: request.method.to_string(),
					url: request.url.clone(),
					status: status.as_u16(),
					body: String::from_utf8_lossy(&body).chars().take(MAX_ERROR_BODY_CHARS).collect(),
				});
			}

			Ok(BackendResponse { status: status.as_u16(), body })
		})
	}

	fn detach(self: Arc<Self>) -> Result<Arc<dyn Transport>> {
		Ok(Arc::new(Self::new(&self.cfg)?))
	}
}

/// Connection and timeout failures mean the backend is unreachable; other errors pass through.
fn unavailable(request: &BackendRequest, err: reqwest::Error) -> Error {
	if err.is_connect() || err.is_timeout() {
		return Error::Unavailable { message: format!("{} {}: {err}.", request.method, request.url) };
	}

	Error::Http(err)
}

pub fn request_headers(apikey: Option<&str>, cookies: &str) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	if let Some(apikey) = apikey {
		headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("bearer {apikey}"))?);
	}

	let cookies = parse_cookies(cookies);

	if !cookies.is_empty() {
		let raw = cookies
			.iter()
			.map(|(name, value)| format!("{name}={value}"))
			.collect::<Vec<_>>()
			.join("; ");

		headers.insert(COOKIE, HeaderValue::from_str(&raw)?);
	}

	Ok(headers)
}

/// Splits `key1=val1;key2=val2` into pairs. Segments without a name or `=` are dropped.
pub fn parse_cookies(raw: &str) -> Vec<(String, String)> {
	raw.split(';')
		.filter_map(|segment| {
			let (name, value) = segment.split_once('=')?;
			let name = name.trim();

			if name.is_empty() {
				return None;
			}

			Some((name.to_string(), value.trim().trim_matches('"').to_string()))
		})
		.collect()
}

/// Joins url segments with a single `/`, trimming slashes around each one.
pub fn url_join<S>(parts: &[S]) -> String
where
	S: AsRef<str>,
{
	parts
		.iter()
		.map(|part| part.as_ref().trim_matches('/'))
		.filter(|part| !part.is_empty())
		.collect::<Vec<_>>()
		.join("/")
}
