//! Response-body interpretation shared by the dispatcher and the CSRF fetcher.

// self
use crate::{_prelude::*, error::HttpError, http::TransportResponse};

const MAX_TEXT_MESSAGE_CHARS: usize = 512;

/// Parses a 2xx body into JSON.
///
/// `204` and blank bodies without a JSON content type become [`Value::Null`]. A body that
/// declares JSON must parse, blank or not.
pub(crate) fn parse_success(response: &TransportResponse) -> Result<Value> {
	if response.status == StatusCode::NO_CONTENT {
		return Ok(Value::Null);
	}
	if response.declares_json() {
		let de = &mut serde_json::Deserializer::from_slice(&response.body);

		return serde_path_to_error::deserialize(de).map_err(|source| Error::MalformedResponse {
			source,
			status: response.status.as_u16(),
		});
	}
	if is_blank(response) {
		return Ok(Value::Null);
	}

	Ok(serde_json::from_slice(&response.body)
		.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned())))
}

/// Deserializes a 2xx body into `T`; `204` and undeclared blank bodies deserialize from `null`.
pub(crate) fn parse_typed<T>(response: &TransportResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status.as_u16();
	let no_body = response.status == StatusCode::NO_CONTENT
		|| (!response.declares_json() && is_blank(response));
	let parsed = if no_body {
		serde_path_to_error::deserialize(Value::Null)
	} else {
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&response.body))
	};

	parsed.map_err(|source| Error::MalformedResponse { source, status })
}

/// Builds the error for a non-2xx response.
pub(crate) fn http_error(response: &TransportResponse) -> HttpError {
	let (message, code) = failure_details(response);

	HttpError { status: response.status.as_u16(), message, code }
}

/// Extracts a human-readable message and optional machine code from an error body.
///
/// Non-JSON bodies are tolerated: the trimmed text is used, then the canonical reason phrase.
pub(crate) fn failure_details(response: &TransportResponse) -> (String, Option<String>) {
	if let Ok(json) = serde_json::from_slice::<Value>(&response.body) {
		let message = json_message(&json);
		let code = json_code(&json);

		if let Some(message) = message {
			return (message, code);
		}
		if let Some(text) = json.as_str().and_then(non_blank) {
			return (truncate(text), code);
		}

		return (reason_phrase(response.status), code);
	}

	let text = String::from_utf8_lossy(&response.body);

	match non_blank(&text) {
		Some(text) => (truncate(text), None),
		None => (reason_phrase(response.status), None),
	}
}

fn json_message(json: &Value) -> Option<String> {
	let field = |key: &str| json.get(key).and_then(Value::as_str).and_then(non_blank);

	field("message")
		.or_else(|| match json.get("error") {
			Some(Value::String(text)) => non_blank(text),
			Some(error @ Value::Object(_)) =>
				error.get("message").and_then(Value::as_str).and_then(non_blank),
			_ => None,
		})
		.or_else(|| field("detail"))
		.or_else(|| field("error_description"))
		.map(ToOwned::to_owned)
}

fn json_code(json: &Value) -> Option<String> {
	let scalar = |value: &Value| match value {
		Value::String(text) => non_blank(text).map(ToOwned::to_owned),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	};

	json.get("code")
		.and_then(scalar)
		.or_else(|| json.get("error_code").and_then(scalar))
		.or_else(|| json.get("error").and_then(|error| error.get("code")).and_then(scalar))
}

fn is_blank(response: &TransportResponse) -> bool {
	response.body.iter().all(|byte| byte.is_ascii_whitespace())
}

fn non_blank(text: &str) -> Option<&str> {
	let trimmed = text.trim();

	if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn truncate(text: &str) -> String {
	text.chars().take(MAX_TEXT_MESSAGE_CHARS).collect()
}

fn reason_phrase(status: StatusCode) -> String {
	format!("HTTP {} {}", status.as_u16(), status.canonical_reason().unwrap_or("Unknown Status"))
}
