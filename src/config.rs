//! Pipeline configuration: where the API lives, how CSRF tokens are exchanged, and how long a
//! single exchange may take.

pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, error::ConfigError, retry::CsrfRetryPolicy};

/// Immutable, validated configuration shared by every pipeline component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Path of the CSRF token endpoint.
	#[serde(default = "defaults::csrf_token_path")]
	pub csrf_token_path: String,
	/// Header carrying the CSRF token on mutating calls.
	#[serde(default = "defaults::csrf_header")]
	pub csrf_header: String,
	/// JSON field of the token endpoint body holding the token.
	#[serde(default = "defaults::csrf_response_field")]
	pub csrf_response_field: String,
	/// Deadline for a single HTTP exchange.
	#[serde(rename = "timeout_ms", with = "duration_ms", default = "defaults::timeout")]
	pub timeout: StdDuration,
	/// Which `403` responses count as CSRF rejections.
	#[serde(default)]
	pub retry_policy: CsrfRetryPolicy,
}
impl PipelineConfig {
	/// Default CSRF token endpoint path.
	pub const DEFAULT_CSRF_TOKEN_PATH: &str = "/api/csrf-token";
	/// Default CSRF header name.
	pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";
	/// Default JSON field holding the CSRF token.
	pub const DEFAULT_CSRF_RESPONSE_FIELD: &str = "csrf_token";
	/// Default per-exchange deadline.
	pub const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Creates a new builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> PipelineConfigBuilder {
		PipelineConfigBuilder::new(base_url)
	}

	/// Parses a JSON document and validates the result.
	pub fn from_json(raw: &str) -> Result<Self, PipelineConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(de)
			.map_err(|source| PipelineConfigError::Parse { source })?;

		config.validate()?;

		Ok(config)
	}

	/// Resolves a request path (or a same-origin absolute URL) against [`Self::base_url`].
	///
	/// Relative paths are appended to the base URL's path, so a base of
	/// `https://app.example.com/v1` maps `/orders` to `https://app.example.com/v1/orders`.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		if let Ok(absolute) = Url::parse(path) {
			return if absolute.origin() == self.base_url.origin() {
				Ok(absolute)
			} else {
				Err(ConfigError::ForeignOrigin { url: absolute.to_string() })
			};
		}

		let base = self.base_url.as_str().trim_end_matches('/');
		let joined = if path.starts_with('/') {
			format!("{base}{path}")
		} else {
			format!("{base}/{path}")
		};

		Url::parse(&joined).map_err(|source| ConfigError::InvalidPath { path: path.into(), source })
	}

	/// Parsed CSRF header name.
	pub fn csrf_header_name(&self) -> Result<HeaderName, ConfigError> {
		HeaderName::from_str(&self.csrf_header)
			.map_err(|_| ConfigError::InvalidHeaderName { name: self.csrf_header.clone() })
	}
}

mod defaults {
	// self
	use crate::{_prelude::*, config::PipelineConfig};

	pub(super) fn csrf_token_path() -> String {
		PipelineConfig::DEFAULT_CSRF_TOKEN_PATH.into()
	}

	pub(super) fn csrf_header() -> String {
		PipelineConfig::DEFAULT_CSRF_HEADER.into()
	}

	pub(super) fn csrf_response_field() -> String {
		PipelineConfig::DEFAULT_CSRF_RESPONSE_FIELD.into()
	}

	pub(super) fn timeout() -> StdDuration {
		PipelineConfig::DEFAULT_TIMEOUT
	}
}

mod duration_ms {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(value: &StdDuration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<StdDuration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(StdDuration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config(base: &str) -> PipelineConfig {
		PipelineConfig::builder(Url::parse(base).expect("Test base URL should parse."))
			.build()
			.expect("Test config should be valid.")
	}

	#[test]
	fn resolve_appends_to_base_path() {
		let config = config("https://app.example.com/v1/");

		assert_eq!(
			config.resolve("/orders").expect("Path should resolve.").as_str(),
			"https://app.example.com/v1/orders"
		);
		assert_eq!(
			config.resolve("orders?page=2").expect("Path should resolve.").as_str(),
			"https://app.example.com/v1/orders?page=2"
		);
	}

	#[test]
	fn resolve_rejects_foreign_origins() {
		let config = config("https://app.example.com");

		assert!(config.resolve("https://app.example.com/api/me").is_ok());
		assert!(matches!(
			config.resolve("https://evil.example.net/api/me"),
			Err(ConfigError::ForeignOrigin { .. })
		));
	}

	#[test]
	fn json_config_fills_defaults() {
		let config = PipelineConfig::from_json(r#"{ "base_url": "https://app.example.com" }"#)
			.expect("Minimal JSON config should parse.");

		assert_eq!(config.csrf_token_path, "/api/csrf-token");
		assert_eq!(config.csrf_header, "X-CSRF-Token");
		assert_eq!(config.csrf_response_field, "csrf_token");
		assert_eq!(config.timeout, StdDuration::from_secs(30));
		assert_eq!(config.csrf_header_name().expect("Default header should parse."), "x-csrf-token");
	}

	#[test]
	fn json_config_reports_failing_path_and_validates() {
		let err = PipelineConfig::from_json(
			r#"{ "base_url": "https://app.example.com", "timeout_ms": "soon" }"#,
		)
		.expect_err("A string timeout should be rejected.");

		match err {
			PipelineConfigError::Parse { source } => assert_eq!(source.path().to_string(), "timeout_ms"),
			other => panic!("Unexpected error variant: {other:?}."),
		}

		let err = PipelineConfig::from_json(
			r#"{ "base_url": "https://app.example.com", "timeout_ms": 0 }"#,
		)
		.expect_err("A zero timeout should be rejected.");

		assert!(matches!(err, PipelineConfigError::ZeroTimeout));
	}
}
