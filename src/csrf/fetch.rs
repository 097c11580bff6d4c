//! Token-endpoint client used by [`CsrfTokenCache`](crate::csrf::CsrfTokenCache).

// crates.io
use ::http::Method;
// self
use crate::{
	_prelude::*,
	auth::{TokenSource, resolve_bearer},
	config::PipelineConfig,
	csrf::CsrfToken,
	dispatch::body,
	error::CsrfFetchError,
	http::{self, HttpTransport, TransportRequest},
};

/// Boxed, owned future returned by [`CsrfTokenProvider::fetch`].
///
/// The future must be `'static` because the cache stores it and shares it with every caller
/// that arrives while it is in flight.
pub type CsrfFetchFuture = Pin<Box<dyn Future<Output = Result<CsrfToken, CsrfFetchError>> + Send>>;

/// Source of fresh CSRF tokens.
pub trait CsrfTokenProvider
where
	Self: Send + Sync,
{
	/// Starts one token fetch. Each call is exactly one network round trip.
	fn fetch(&self) -> CsrfFetchFuture;
}

/// Fetches tokens with `GET <csrf_token_path>` and reads `{ "<field>": string }`.
#[derive(Clone)]
pub struct HttpCsrfFetcher {
	transport: Arc<dyn HttpTransport>,
	token_source: Arc<dyn TokenSource>,
	url: Url,
	field: String,
	timeout: StdDuration,
}
impl HttpCsrfFetcher {
	/// Builds a fetcher for the token endpoint described by `config`.
	pub fn new(
		config: &PipelineConfig,
		transport: Arc<dyn HttpTransport>,
		token_source: Arc<dyn TokenSource>,
	) -> Result<Self> {
		Ok(Self {
			transport,
			token_source,
			url: config.resolve(&config.csrf_token_path)?,
			field: config.csrf_response_field.clone(),
			timeout: config.timeout,
		})
	}

	/// Token endpoint URL.
	pub fn url(&self) -> &Url {
		&self.url
	}
}
impl CsrfTokenProvider for HttpCsrfFetcher {
	fn fetch(&self) -> CsrfFetchFuture {
		let this = self.clone();

		Box::pin(async move {
			let mut headers = HeaderMap::new();

			headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

			if let Some(bearer) = resolve_bearer(this.token_source.as_ref()).await
				&& let Some(value) = bearer.header_value("Bearer ")
			{
				headers.insert(AUTHORIZATION, value);
			}

			let request = TransportRequest {
				method: Method::GET,
				url: this.url.clone(),
				headers,
				body: None,
				timeout: this.timeout,
			};
			let response = http::execute_within(this.transport.as_ref(), request).await?;

			if !response.is_success() {
				let (message, _) = body::failure_details(&response);

				return Err(CsrfFetchError::Status { status: response.status.as_u16(), message });
			}

			let de = &mut serde_json::Deserializer::from_slice(&response.body);
			let payload: Value =
				serde_path_to_error::deserialize(de).map_err(CsrfFetchError::Parse)?;
			let value = payload
				.get(&this.field)
				.and_then(Value::as_str)
				.ok_or_else(|| CsrfFetchError::MissingField { field: this.field.clone() })?;

			if value.trim().is_empty() {
				return Err(CsrfFetchError::Empty);
			}

			Ok(CsrfToken::new(value))
		})
	}
}
impl Debug for HttpCsrfFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpCsrfFetcher")
			.field("url", &self.url.as_str())
			.field("field", &self.field)
			.field("timeout", &self.timeout)
			.finish()
	}
}
