//! Single-exchange request dispatch: header assembly, one network call, outcome normalization.

pub(crate) mod body;

// self
use crate::{
	_prelude::*,
	auth::{TokenSource, resolve_bearer},
	config::PipelineConfig,
	csrf::CsrfTokenCache,
	error::ConfigError,
	http::{self, HttpTransport, TransportRequest, TransportResponse},
	obs::PipelineMetrics,
};

/// HTTP methods the pipeline accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	#[default]
	/// Read-only call; never carries a CSRF token.
	Get,
	/// Create.
	Post,
	/// Replace.
	Put,
	/// Partial update.
	Patch,
	/// Remove.
	Delete,
}
impl Method {
	/// Returns the canonical upper-case name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	/// Returns `true` for state-changing methods (everything except GET).
	pub const fn is_mutating(self) -> bool {
		!matches!(self, Method::Get)
	}

	/// Converts into the `http` crate's method type.
	pub fn to_http(self) -> ::http::Method {
		match self {
			Method::Get => ::http::Method::GET,
			Method::Post => ::http::Method::POST,
			Method::Put => ::http::Method::PUT,
			Method::Patch => ::http::Method::PATCH,
			Method::Delete => ::http::Method::DELETE,
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Method {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"GET" => Ok(Method::Get),
			"POST" => Ok(Method::Post),
			"PUT" => Ok(Method::Put),
			"PATCH" => Ok(Method::Patch),
			"DELETE" => Ok(Method::Delete),
			_ => Err(ConfigError::UnsupportedMethod { method: s.to_owned() }),
		}
	}
}

/// Per-call request description; built fresh for every call and never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Caller-supplied extra headers.
	pub headers: HeaderMap,
	/// JSON body, if any.
	pub body: Option<Value>,
}
impl RequestDescriptor {
	/// Creates a descriptor without body or extra headers.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Attaches a JSON body.
	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Adds an extra header. `Authorization` and the CSRF header are always owned by the
	/// pipeline and will be overwritten at dispatch time.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}
}

/// Performs exactly one HTTP exchange and normalizes its outcome.
///
/// For mutating methods the CSRF header is filled from [`CsrfTokenCache::get`] on every call;
/// the dispatcher never keeps its own copy. The dispatcher never invalidates the cache; that
/// decision belongs to [`RetryCoordinator`](crate::retry::RetryCoordinator).
///
/// Every exchange is bounded by [`PipelineConfig::timeout`]. The deadline is passed to the
/// transport and also enforced here, so a transport that ignores it still yields
/// [`Error::Timeout`] instead of hanging the call. The timer runs on the tokio runtime.
pub struct RequestDispatcher {
	transport: Arc<dyn HttpTransport>,
	token_source: Arc<dyn TokenSource>,
	csrf: Arc<CsrfTokenCache>,
	metrics: Arc<PipelineMetrics>,
	csrf_header: HeaderName,
	timeout: StdDuration,
}
impl RequestDispatcher {
	/// Creates a dispatcher sharing `csrf` and `metrics` with the rest of the pipeline.
	pub fn new(
		config: &PipelineConfig,
		transport: Arc<dyn HttpTransport>,
		token_source: Arc<dyn TokenSource>,
		csrf: Arc<CsrfTokenCache>,
		metrics: Arc<PipelineMetrics>,
	) -> Result<Self> {
		Ok(Self {
			transport,
			token_source,
			csrf,
			metrics,
			csrf_header: config.csrf_header_name()?,
			timeout: config.timeout,
		})
	}

	/// Dispatches the request and returns the parsed JSON body.
	///
	/// Empty bodies (including `204`) become [`Value::Null`]; bodies without a JSON content type
	/// that do not parse as JSON are returned as [`Value::String`].
	pub async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Value> {
		let response = self.exchange(descriptor).await?;

		body::parse_success(&response)
	}

	/// Dispatches the request and deserializes the body into `T`.
	pub async fn dispatch_as<T>(&self, descriptor: &RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.exchange(descriptor).await?;

		body::parse_typed(&response)
	}

	async fn exchange(&self, descriptor: &RequestDescriptor) -> Result<TransportResponse> {
		let mut headers = descriptor.headers.clone();

		headers.remove(AUTHORIZATION);
		headers.remove(&self.csrf_header);
		headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

		if descriptor.method.is_mutating() {
			let token = self.csrf.get().await?;
			let value = token.secret().header_value("").ok_or_else(|| {
				ConfigError::InvalidHeaderValue { name: self.csrf_header.to_string() }
			})?;

			headers.insert(self.csrf_header.clone(), value);
		}
		if let Some(bearer) = resolve_bearer(self.token_source.as_ref()).await {
			let value = bearer.header_value("Bearer ").ok_or_else(|| {
				ConfigError::InvalidHeaderValue { name: AUTHORIZATION.to_string() }
			})?;

			headers.insert(AUTHORIZATION, value);
		}

		let body = match &descriptor.body {
			Some(value) => {
				headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

				Some(serde_json::to_vec(value).map_err(ConfigError::BodySerialize)?)
			},
			None => None,
		};
		let request = TransportRequest {
			method: descriptor.method.to_http(),
			url: descriptor.url.clone(),
			headers,
			body,
			timeout: self.timeout,
		};

		self.metrics.record_dispatch();

		let response = http::execute_within(self.transport.as_ref(), request).await?;

		if response.is_success() { Ok(response) } else { Err(body::http_error(&response).into()) }
	}
}
impl Debug for RequestDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDispatcher")
			.field("csrf_header", &self.csrf_header)
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{SCRIPTED_BASE_URL, ScriptedReply, ScriptedTransport, scripted_config},
		auth::StaticTokenSource,
		csrf::HttpCsrfFetcher,
	};

	struct Fixture {
		dispatcher: RequestDispatcher,
		transport: ScriptedTransport,
		csrf: Arc<CsrfTokenCache>,
	}

	fn fixture(bearer: Option<&str>) -> Fixture {
		let config = scripted_config();
		let transport = ScriptedTransport::default();
		let shared: Arc<dyn HttpTransport> = Arc::new(transport.clone());
		let token_source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new(bearer));
		let fetcher = HttpCsrfFetcher::new(&config, shared.clone(), token_source.clone())
			.expect("Fetcher should build.");
		let csrf = Arc::new(CsrfTokenCache::new(Arc::new(fetcher)));
		let dispatcher = RequestDispatcher::new(
			&config,
			shared,
			token_source,
			csrf.clone(),
			Default::default(),
		)
		.expect("Dispatcher should build.");

		Fixture { dispatcher, transport, csrf }
	}

	fn url(path: &str) -> Url {
		scripted_config().resolve(path).expect("Test path should resolve.")
	}

	#[test]
	fn methods_parse_case_insensitively() {
		assert_eq!("post".parse::<Method>().expect("post should parse."), Method::Post);
		assert_eq!(" Delete ".parse::<Method>().expect("delete should parse."), Method::Delete);
		assert!(matches!(
			"OPTIONS".parse::<Method>(),
			Err(ConfigError::UnsupportedMethod { .. })
		));
		assert!(!Method::Get.is_mutating());
		assert!(Method::Patch.is_mutating());
	}

	#[tokio::test]
	async fn get_skips_csrf_and_attaches_bearer() {
		let fx = fixture(Some("bearer-1"));

		fx.transport.push("/y", ScriptedReply::json(200, serde_json::json!({ "items": [] })));

		let value = fx
			.dispatcher
			.dispatch(&RequestDescriptor::new(Method::Get, url("/y")))
			.await
			.expect("GET should succeed.");
		let request = &fx.transport.requests()[0];

		assert_eq!(value, serde_json::json!({ "items": [] }));
		assert_eq!(fx.transport.requests().len(), 1);
		assert_eq!(request.header("authorization"), Some("Bearer bearer-1"));
		assert!(request.header("x-csrf-token").is_none());
		assert!(fx.csrf.peek().is_none());
	}

	#[tokio::test]
	async fn mutating_call_carries_cached_csrf_and_json_body() {
		let fx = fixture(None);

		fx.transport
			.push("/api/csrf-token", ScriptedReply::csrf("csrf-1"))
			.push("/x", ScriptedReply::json(201, serde_json::json!({ "id": 7 })));

		let descriptor = RequestDescriptor::new(Method::Post, url("/x"))
			.with_body(serde_json::json!({ "a": 1 }))
			.with_header(HeaderName::from_static("x-csrf-token"), HeaderValue::from_static("forged"));
		let value = fx.dispatcher.dispatch(&descriptor).await.expect("POST should succeed.");
		let post = &fx.transport.requests_to("/x")[0];

		assert_eq!(value["id"], 7);
		assert_eq!(post.header("x-csrf-token"), Some("csrf-1"));
		assert_eq!(post.header("content-type"), Some("application/json"));
		assert!(post.header("authorization").is_none());
		assert_eq!(
			serde_json::from_slice::<Value>(post.body.as_deref().expect("POST should carry a body."))
				.expect("Body should be JSON."),
			serde_json::json!({ "a": 1 })
		);
	}

	#[tokio::test]
	async fn non_success_becomes_http_error_with_extracted_message() {
		let fx = fixture(None);

		fx.transport.push(
			"/y",
			ScriptedReply::json(
				422,
				serde_json::json!({ "error": { "message": "Amount too large", "code": "limit" } }),
			),
		);

		let err = fx
			.dispatcher
			.dispatch(&RequestDescriptor::new(Method::Get, url("/y")))
			.await
			.expect_err("422 should surface as an error.");

		match err {
			Error::Http(http) => {
				assert_eq!(http.status, 422);
				assert_eq!(http.message, "Amount too large");
				assert_eq!(http.code.as_deref(), Some("limit"));
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[tokio::test]
	async fn timeout_surfaces_with_gateway_status() {
		let fx = fixture(None);

		fx.transport.push("/slow", ScriptedReply::Timeout);

		let err = fx
			.dispatcher
			.dispatch(&RequestDescriptor::new(Method::Get, url("/slow")))
			.await
			.expect_err("Timeouts should surface as errors.");

		assert!(matches!(err, Error::Timeout { .. }));
		assert_eq!(err.status(), Some(504));
	}

	#[tokio::test]
	async fn deadline_holds_when_transport_ignores_it() {
		let config = PipelineConfig::builder(
			Url::parse(SCRIPTED_BASE_URL).expect("Scripted base URL should parse."),
		)
		.timeout(StdDuration::from_millis(20))
		.build()
		.expect("Config should build.");
		let transport = ScriptedTransport::default();
		let shared: Arc<dyn HttpTransport> = Arc::new(transport.clone());
		let token_source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::signed_out());
		let fetcher = HttpCsrfFetcher::new(&config, shared.clone(), token_source.clone())
			.expect("Fetcher should build.");
		let csrf = Arc::new(CsrfTokenCache::new(Arc::new(fetcher)));
		let dispatcher =
			RequestDispatcher::new(&config, shared, token_source, csrf, Default::default())
				.expect("Dispatcher should build.");

		transport.push("/hang", ScriptedReply::Stall);

		let descriptor = RequestDescriptor::new(
			Method::Get,
			config.resolve("/hang").expect("Test path should resolve."),
		);
		let err = dispatcher
			.dispatch(&descriptor)
			.await
			.expect_err("A stalled exchange should time out.");

		assert!(matches!(err, Error::Timeout { after } if after == StdDuration::from_millis(20)));
		assert_eq!(err.status(), Some(504));
	}

	#[tokio::test]
	async fn typed_dispatch_reports_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Order {
			#[allow(dead_code)]
			id: u64,
		}

		let fx = fixture(None);

		fx.transport.push("/orders/1", ScriptedReply::json(200, serde_json::json!({ "id": "x" })));

		let err = fx
			.dispatcher
			.dispatch_as::<Order>(&RequestDescriptor::new(Method::Get, url("/orders/1")))
			.await
			.expect_err("A string id should not deserialize.");

		match err {
			Error::MalformedResponse { source, status } => {
				assert_eq!(status, 200);
				assert_eq!(source.path().to_string(), "id");
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}
}
