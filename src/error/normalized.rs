//! Uniform failure shape handed to UI-layer callers.

// self
use crate::_prelude::*;

/// Failure category carried by every [`NormalizedError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// The CSRF token endpoint could not be reached or returned non-2xx.
	CsrfFetchFailed,
	/// A mutating call was rejected with `403` even after a token refresh.
	CsrfRejected,
	/// Any other non-2xx response.
	Http,
	/// The network call exceeded its deadline.
	Timeout,
	/// A 2xx response body could not be parsed as JSON.
	MalformedResponse,
	/// No HTTP response was received.
	Transport,
	/// The request could not be built locally.
	Config,
}
impl ErrorKind {
	/// Returns a stable label suitable for logs, metrics, or UI lookups.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::CsrfFetchFailed => "csrf_fetch_failed",
			ErrorKind::CsrfRejected => "csrf_rejected",
			ErrorKind::Http => "http",
			ErrorKind::Timeout => "timeout",
			ErrorKind::MalformedResponse => "malformed_response",
			ErrorKind::Transport => "transport",
			ErrorKind::Config => "config",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The single error contract surfaced by [`ApiClient`](crate::client::ApiClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
pub struct NormalizedError {
	/// Human-readable message, safe to render.
	pub message: String,
	/// HTTP status, real or synthetic (`504` for timeouts).
	pub status: Option<u16>,
	/// Machine-readable code from the server body, when present.
	pub code: Option<String>,
	/// Failure category.
	pub kind: ErrorKind,
}
impl NormalizedError {
	/// Returns `true` when the server answered `401`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == Some(StatusCode::UNAUTHORIZED.as_u16())
	}
}
impl From<Error> for NormalizedError {
	fn from(e: Error) -> Self {
		let status = e.status();

		match e {
			Error::Http(http) =>
				Self { message: http.message, status, code: http.code, kind: ErrorKind::Http },
			Error::CsrfRejected(http) => Self {
				message: http.message,
				status,
				code: http.code,
				kind: ErrorKind::CsrfRejected,
			},
			Error::CsrfFetch(err) => Self {
				message: err.to_string(),
				status,
				code: None,
				kind: ErrorKind::CsrfFetchFailed,
			},
			Error::Timeout { .. } =>
				Self { message: e.to_string(), status, code: None, kind: ErrorKind::Timeout },
			Error::MalformedResponse { ref source, .. } => Self {
				message: format!("Server returned a malformed response body at `{}`.", source.path()),
				status,
				code: None,
				kind: ErrorKind::MalformedResponse,
			},
			Error::Transport(err) =>
				Self { message: err.to_string(), status, code: None, kind: ErrorKind::Transport },
			Error::Config(err) =>
				Self { message: err.to_string(), status, code: None, kind: ErrorKind::Config },
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{CsrfFetchError, HttpError, TransportError};

	fn http(status: u16, message: &str, code: Option<&str>) -> HttpError {
		HttpError { status, message: message.into(), code: code.map(Into::into) }
	}

	#[test]
	fn http_errors_keep_extracted_message_and_code() {
		let normalized =
			NormalizedError::from(Error::from(http(422, "Amount is required", Some("invalid"))));

		assert_eq!(normalized.message, "Amount is required");
		assert_eq!(normalized.status, Some(422));
		assert_eq!(normalized.code.as_deref(), Some("invalid"));
		assert_eq!(normalized.kind, ErrorKind::Http);
	}

	#[test]
	fn csrf_rejection_is_distinguishable_from_plain_http() {
		let normalized = NormalizedError::from(Error::CsrfRejected(http(403, "Forbidden", None)));

		assert_eq!(normalized.kind, ErrorKind::CsrfRejected);
		assert_eq!(normalized.status, Some(403));
	}

	#[test]
	fn timeouts_get_a_synthetic_gateway_status() {
		let normalized = NormalizedError::from(Error::from(TransportError::Timeout {
			after: StdDuration::from_secs(30),
		}));

		assert_eq!(normalized.kind, ErrorKind::Timeout);
		assert_eq!(normalized.status, Some(504));
		assert_eq!(normalized.message, "Request timed out after 30000 ms.");
	}

	#[test]
	fn csrf_fetch_failures_carry_endpoint_status() {
		let normalized = NormalizedError::from(Error::from(CsrfFetchError::Status {
			status: 500,
			message: "Internal Server Error".into(),
		}));

		assert_eq!(normalized.kind, ErrorKind::CsrfFetchFailed);
		assert_eq!(normalized.status, Some(500));
	}

	#[test]
	fn normalized_errors_serialize_with_snake_case_kinds() {
		let normalized = NormalizedError::from(Error::from(http(401, "Unauthorized", None)));
		let json = serde_json::to_value(&normalized).expect("Normalized error should serialize.");

		assert!(normalized.is_unauthorized());
		assert_eq!(json["kind"], "http");
		assert_eq!(json["status"], 401);
	}
}
