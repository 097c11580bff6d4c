//! Pipeline error types shared across the cache, dispatcher, retry coordinator, and facade.

mod normalized;

pub use normalized::*;

// self
use crate::_prelude::*;

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical pipeline error exposed by the component APIs.
///
/// Callers of [`ApiClient`](crate::client::ApiClient) never see this type directly; it is
/// converted into a [`NormalizedError`] at the facade boundary.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration or request-construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) that produced no HTTP response.
	#[error(transparent)]
	Transport(TransportError),
	/// The CSRF token endpoint could not supply a token.
	///
	/// The failure is shared by every caller that joined the same fetch.
	#[error(transparent)]
	CsrfFetch(Arc<CsrfFetchError>),
	/// Server answered with a non-2xx status.
	#[error(transparent)]
	Http(#[from] HttpError),
	/// A mutating call was rejected with `403` again after the CSRF token was refreshed.
	#[error("CSRF token was rejected after a refresh: {0}")]
	CsrfRejected(HttpError),

	/// Network call exceeded its deadline.
	#[error("Request timed out after {} ms.", after.as_millis())]
	Timeout {
		/// Deadline that elapsed.
		after: StdDuration,
	},
	/// A 2xx response carried a body that could not be parsed as the expected JSON.
	#[error("Server returned a malformed response body.")]
	MalformedResponse {
		/// Structured parsing failure, including the failing JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl Error {
	/// Returns the HTTP status associated with the failure, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http(err) | Self::CsrfRejected(err) => Some(err.status),
			Self::CsrfFetch(err) => err.status(),
			Self::Timeout { .. } => Some(StatusCode::GATEWAY_TIMEOUT.as_u16()),
			Self::MalformedResponse { status, .. } => Some(*status),
			Self::Config(_) | Self::Transport(_) => None,
		}
	}
}
impl From<CsrfFetchError> for Error {
	fn from(e: CsrfFetchError) -> Self {
		Self::CsrfFetch(Arc::new(e))
	}
}
impl From<Arc<CsrfFetchError>> for Error {
	fn from(e: Arc<CsrfFetchError>) -> Self {
		Self::CsrfFetch(e)
	}
}
impl From<TransportError> for Error {
	fn from(e: TransportError) -> Self {
		match e {
			TransportError::Timeout { after } => Self::Timeout { after },
			other => Self::Transport(other),
		}
	}
}

/// Configuration and request-construction failures raised locally.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Request path cannot be joined onto the base URL.
	#[error("Request path `{path}` is not a valid URL reference.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Absolute URL points at a different origin than the configured base URL.
	#[error("Request URL `{url}` is outside the configured origin.")]
	ForeignOrigin {
		/// Offending URL.
		url: String,
	},
	/// HTTP method is not one the pipeline accepts.
	#[error("HTTP method `{method}` is not supported.")]
	UnsupportedMethod {
		/// Method that was supplied.
		method: String,
	},
	/// Header value contains characters HTTP cannot carry.
	#[error("Header `{name}` carries an invalid value.")]
	InvalidHeaderValue {
		/// Header name.
		name: String,
	},
	/// Header name is not a valid HTTP token.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Header name that failed validation.
		name: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	BodySerialize(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, deadline).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Call did not complete before its deadline.
	#[error("Request timed out after {} ms.", after.as_millis())]
	Timeout {
		/// Deadline that elapsed.
		after: StdDuration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Non-2xx response from a protected or public endpoint.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Server responded with HTTP {status}: {message}")]
pub struct HttpError {
	/// HTTP status code.
	pub status: u16,
	/// Best-effort human-readable message extracted from the body.
	pub message: String,
	/// Machine-readable error code from the body, when present.
	pub code: Option<String>,
}

/// Failure to obtain a CSRF token from the token endpoint.
#[derive(Debug, ThisError)]
pub enum CsrfFetchError {
	/// Token endpoint answered with a non-2xx status.
	#[error("CSRF token endpoint responded with HTTP {status}: {message}")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Best-effort message extracted from the body.
		message: String,
	},
	/// Token endpoint could not be reached.
	#[error("CSRF token endpoint could not be reached.")]
	Transport(#[source] TransportError),
	/// Token endpoint body did not match `{ "<field>": string }`.
	#[error("CSRF token endpoint returned malformed JSON.")]
	Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// Token endpoint body lacked a string token field.
	#[error("CSRF token endpoint response is missing the `{field}` string field.")]
	MissingField {
		/// Expected field name.
		field: String,
	},
	/// Token endpoint returned a blank token.
	#[error("CSRF token endpoint returned an empty token.")]
	Empty,
}
impl CsrfFetchError {
	/// Returns the token endpoint status, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Transport(TransportError::Timeout { .. }) =>
				Some(StatusCode::GATEWAY_TIMEOUT.as_u16()),
			Self::Transport(_) | Self::Parse(_) | Self::MissingField { .. } | Self::Empty => None,
		}
	}
}
impl From<TransportError> for CsrfFetchError {
	fn from(e: TransportError) -> Self {
		Self::Transport(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn transport_timeout_promotes_to_pipeline_timeout() {
		let err = Error::from(TransportError::Timeout { after: StdDuration::from_millis(250) });

		assert!(matches!(err, Error::Timeout { .. }));
		assert_eq!(err.status(), Some(504));
		assert_eq!(err.to_string(), "Request timed out after 250 ms.");
	}

	#[test]
	fn csrf_fetch_errors_report_endpoint_status() {
		let err = Error::from(CsrfFetchError::Status { status: 500, message: "boom".into() });

		assert_eq!(err.status(), Some(500));
		assert_eq!(err.to_string(), "CSRF token endpoint responded with HTTP 500: boom");

		let timed_out = Error::from(CsrfFetchError::from(TransportError::Timeout {
			after: StdDuration::from_secs(1),
		}));

		assert_eq!(timed_out.status(), Some(504));
	}
}
