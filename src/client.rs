//! Caller-facing facade: one `request` entry point that routes reads straight to the dispatcher
//! and mutations through the CSRF retry policy, returning [`NormalizedError`] on every failure.

// self
use crate::{
	_prelude::*,
	auth::TokenSource,
	config::PipelineConfig,
	csrf::{CsrfTokenCache, HttpCsrfFetcher},
	dispatch::{Method, RequestDescriptor, RequestDispatcher},
	error::{ConfigError, NormalizedError},
	http::HttpTransport,
	obs::{self, CallKind, CallOutcome, CallSpan, PipelineMetrics, record_call_outcome},
	retry::RetryCoordinator,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Per-call options for [`ApiClient::request`]; GET without body by default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
	/// HTTP method.
	pub method: Method,
	/// JSON body, if any.
	pub body: Option<Value>,
	/// Extra headers as `(name, value)` pairs.
	pub headers: Vec<(String, String)>,
}
impl RequestOptions {
	/// Options for a GET.
	pub fn get() -> Self {
		Self::default()
	}

	/// Options for a POST.
	pub fn post() -> Self {
		Self::with_method(Method::Post)
	}

	/// Options for a PUT.
	pub fn put() -> Self {
		Self::with_method(Method::Put)
	}

	/// Options for a PATCH.
	pub fn patch() -> Self {
		Self::with_method(Method::Patch)
	}

	/// Options for a DELETE.
	pub fn delete() -> Self {
		Self::with_method(Method::Delete)
	}

	/// Options for an arbitrary supported method.
	pub fn with_method(method: Method) -> Self {
		Self { method, ..Default::default() }
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Serializes `body` and attaches it.
	pub fn with_json<T>(self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let value = serde_json::to_value(body).map_err(ConfigError::BodySerialize)?;

		Ok(self.with_body(value))
	}

	/// Adds an extra header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}
}

/// The request pipeline as seen by application code.
///
/// `ApiClient` owns one [`CsrfTokenCache`], so independent clients (or tests) never share
/// token state. Clone the surrounding `Arc` to share a client across tasks.
pub struct ApiClient {
	config: PipelineConfig,
	csrf: Arc<CsrfTokenCache>,
	dispatcher: Arc<RequestDispatcher>,
	coordinator: RetryCoordinator,
	metrics: Arc<PipelineMetrics>,
}
impl ApiClient {
	/// Creates a client backed by the bundled reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn new(config: PipelineConfig, token_source: Arc<dyn TokenSource>) -> Result<Self> {
		let transport = ReqwestHttpClient::try_default()?;

		Self::with_transport(config, token_source, Arc::new(transport))
	}

	/// Creates a client over a caller-provided transport.
	pub fn with_transport(
		config: PipelineConfig,
		token_source: Arc<dyn TokenSource>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self> {
		let metrics = Arc::new(PipelineMetrics::default());
		let fetcher = HttpCsrfFetcher::new(&config, transport.clone(), token_source.clone())?;
		let csrf = Arc::new(CsrfTokenCache::with_metrics(Arc::new(fetcher), metrics.clone()));
		let dispatcher = Arc::new(RequestDispatcher::new(
			&config,
			transport,
			token_source,
			csrf.clone(),
			metrics.clone(),
		)?);
		let coordinator = RetryCoordinator::new(
			dispatcher.clone(),
			csrf.clone(),
			config.retry_policy.clone(),
			metrics.clone(),
		);

		Ok(Self { config, csrf, dispatcher, coordinator, metrics })
	}

	/// Performs one logical call and returns the parsed JSON body.
	///
	/// GET calls go straight to the dispatcher and never touch the CSRF cache; every other
	/// method goes through the stale-token retry.
	pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, NormalizedError> {
		let kind = call_kind(options.method);
		let span = CallSpan::new(kind, "request");

		record_call_outcome(kind, CallOutcome::Attempt);

		let result = span.instrument(self.route(path, options)).await;

		self.finish(kind, result)
	}

	/// Typed variant of [`request`](Self::request); a body that does not match `T` is a
	/// malformed response.
	pub async fn request_as<T>(&self, path: &str, options: RequestOptions) -> Result<T, NormalizedError>
	where
		T: DeserializeOwned,
	{
		let kind = call_kind(options.method);
		let span = CallSpan::new(kind, "request_as");

		record_call_outcome(kind, CallOutcome::Attempt);

		let result = span.instrument(self.route_as(path, options)).await;

		self.finish(kind, result)
	}

	/// Shorthand for a GET.
	pub async fn get(&self, path: &str) -> Result<Value, NormalizedError> {
		self.request(path, RequestOptions::get()).await
	}

	/// Shorthand for a POST with a JSON body.
	pub async fn post(&self, path: &str, body: Value) -> Result<Value, NormalizedError> {
		self.request(path, RequestOptions::post().with_body(body)).await
	}

	/// Preloads the CSRF token. Failures are logged, never returned; the cache refetches on the
	/// next mutating call.
	pub async fn warm_csrf(&self) {
		if let Err(err) = self.csrf.get().await {
			obs::warm_up_failed(&Error::from(err));
		}
	}

	/// Drops the cached CSRF token (e.g. on sign-out).
	pub fn invalidate_csrf(&self) {
		self.csrf.invalidate();
	}

	/// The client's CSRF cache.
	pub fn csrf_cache(&self) -> &CsrfTokenCache {
		&self.csrf
	}

	/// Counters for this client.
	pub fn metrics(&self) -> &PipelineMetrics {
		&self.metrics
	}

	/// The validated configuration.
	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	async fn route(&self, path: &str, options: RequestOptions) -> Result<Value> {
		let descriptor = self.describe(path, options)?;

		if descriptor.method.is_mutating() {
			self.coordinator.execute(&descriptor).await
		} else {
			self.dispatcher.dispatch(&descriptor).await
		}
	}

	async fn route_as<T>(&self, path: &str, options: RequestOptions) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let descriptor = self.describe(path, options)?;

		if descriptor.method.is_mutating() {
			self.coordinator.execute_as(&descriptor).await
		} else {
			self.dispatcher.dispatch_as(&descriptor).await
		}
	}

	fn describe(&self, path: &str, options: RequestOptions) -> Result<RequestDescriptor> {
		let RequestOptions { method, body, headers } = options;
		let mut descriptor = RequestDescriptor::new(method, self.config.resolve(path)?);

		for (name, value) in headers {
			let header_name = HeaderName::from_str(&name)
				.map_err(|_| ConfigError::InvalidHeaderName { name: name.clone() })?;
			let header_value = HeaderValue::from_str(&value)
				.map_err(|_| ConfigError::InvalidHeaderValue { name })?;

			descriptor = descriptor.with_header(header_name, header_value);
		}
		if let Some(body) = body {
			descriptor = descriptor.with_body(body);
		}

		Ok(descriptor)
	}

	fn finish<T>(&self, kind: CallKind, result: Result<T>) -> Result<T, NormalizedError> {
		self.metrics.record_outcome(kind, &result);

		result.map_err(NormalizedError::from)
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("csrf", &self.csrf)
			.finish()
	}
}

fn call_kind(method: Method) -> CallKind {
	if method.is_mutating() { CallKind::Mutation } else { CallKind::Read }
}
