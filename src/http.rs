//! Transport primitives for pipeline HTTP exchanges.
//!
//! The module exposes [`HttpTransport`] alongside [`TransportRequest`] and
//! [`TransportResponse`] so downstream crates can plug in custom HTTP stacks (a browser fetch
//! binding, a test double, a proxying client) without touching the CSRF cache or the retry
//! policy. Implementations should honor [`TransportRequest::timeout`] and report an elapsed
//! deadline as [`TransportError::Timeout`]. The dispatcher and the CSRF fetcher also race every
//! exchange against the same deadline, so a transport that ignores it cannot hang a call.

// crates.io
use ::http::Method;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a single request.
///
/// The trait is the pipeline's only dependency on an HTTP client. Implementations must be
/// `Send + Sync + 'static` so one transport can be shared (behind `Arc`) by the CSRF fetcher
/// and the dispatcher. Transports never follow the pipeline's retry policy themselves: one
/// call to [`execute`](HttpTransport::execute) is exactly one exchange on the wire.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Performs the exchange described by `request`.
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Fully-built outgoing request handed to a [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Outgoing headers, including auth and CSRF headers.
	pub headers: HeaderMap,
	/// Serialized body, if any.
	pub body: Option<Vec<u8>>,
	/// Deadline for the whole exchange.
	pub timeout: StdDuration,
}
impl TransportRequest {
	/// Returns the header value as a string, if present and valid UTF-8.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}

/// Raw response returned by a [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Fully-read response body.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns the declared `Content-Type`, if any.
	pub fn content_type(&self) -> Option<&str> {
		self.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
	}

	/// Returns `true` when the server declared a JSON media type (`application/json`,
	/// `application/problem+json`, and similar `+json` suffixes).
	pub fn declares_json(&self) -> bool {
		let Some(content_type) = self.content_type() else {
			return false;
		};
		let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

		essence == "application/json" || essence.ends_with("+json")
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// API calls should not follow redirects: a redirected mutating call would silently drop
/// or replay credentials on another URL. [`ReqwestHttpClient::try_default`] disables redirect
/// following; configure any client passed to [`ReqwestHttpClient::with_client`] the same way.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds the default client with redirects disabled.
	pub fn try_default() -> Result<Self> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let TransportRequest { method, url, headers, body, timeout } = request;
			let mut builder = self.0.request(method, url).headers(headers).timeout(timeout);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(|e| map_reqwest_error(e, timeout))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| map_reqwest_error(e, timeout))?.to_vec();

			Ok(TransportResponse { status, headers, body })
		})
	}
}

/// Runs one exchange, failing with [`TransportError::Timeout`] once the request deadline elapses
/// even if the transport never resolves.
pub(crate) async fn execute_within(
	transport: &dyn HttpTransport,
	request: TransportRequest,
) -> Result<TransportResponse, TransportError> {
	let after = request.timeout;

	tokio::time::timeout(after, transport.execute(request))
		.await
		.unwrap_or(Err(TransportError::Timeout { after }))
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(e: ReqwestError, timeout: StdDuration) -> TransportError {
	if e.is_timeout() { TransportError::Timeout { after: timeout } } else { TransportError::network(e) }
}
