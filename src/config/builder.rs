//! Validating builder for [`PipelineConfig`] and the errors it reports.

// self
use crate::{_prelude::*, config::PipelineConfig, retry::CsrfRetryPolicy};

/// Errors raised while constructing or validating a [`PipelineConfig`].
#[derive(Debug, ThisError)]
pub enum PipelineConfigError {
	/// Configuration document could not be parsed.
	#[error("Pipeline configuration is malformed.")]
	Parse {
		/// Structured parsing failure, including the failing field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Base URL must use HTTP or HTTPS.
	#[error("The base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL cannot carry paths (e.g. `mailto:`).
	#[error("The base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// CSRF token path must be absolute.
	#[error("The CSRF token path must start with `/`: {path}.")]
	RelativeTokenPath {
		/// Path that failed validation.
		path: String,
	},
	/// CSRF header name is not a valid HTTP header name.
	#[error("The CSRF header name is invalid: {name}.")]
	InvalidHeaderName {
		/// Header name that failed validation.
		name: String,
	},
	/// CSRF response field must be non-empty.
	#[error("The CSRF response field must not be empty.")]
	EmptyResponseField,
	/// Timeouts must be positive.
	#[error("The request timeout must be greater than zero.")]
	ZeroTimeout,
}

/// Builder for [`PipelineConfig`] values.
#[derive(Debug)]
pub struct PipelineConfigBuilder {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Path of the CSRF token endpoint.
	pub csrf_token_path: String,
	/// Header carrying the CSRF token.
	pub csrf_header: String,
	/// JSON field of the token endpoint body holding the token.
	pub csrf_response_field: String,
	/// Deadline for a single HTTP exchange.
	pub timeout: StdDuration,
	/// Which `403` responses count as CSRF rejections.
	pub retry_policy: CsrfRetryPolicy,
}
impl PipelineConfigBuilder {
	/// Creates a new builder seeded with defaults and the provided base URL.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			csrf_token_path: PipelineConfig::DEFAULT_CSRF_TOKEN_PATH.into(),
			csrf_header: PipelineConfig::DEFAULT_CSRF_HEADER.into(),
			csrf_response_field: PipelineConfig::DEFAULT_CSRF_RESPONSE_FIELD.into(),
			timeout: PipelineConfig::DEFAULT_TIMEOUT,
			retry_policy: CsrfRetryPolicy::default(),
		}
	}

	/// Overrides the CSRF token endpoint path.
	pub fn csrf_token_path(mut self, path: impl Into<String>) -> Self {
		self.csrf_token_path = path.into();

		self
	}

	/// Overrides the CSRF header name.
	pub fn csrf_header(mut self, name: impl Into<String>) -> Self {
		self.csrf_header = name.into();

		self
	}

	/// Overrides the JSON field holding the CSRF token.
	pub fn csrf_response_field(mut self, field: impl Into<String>) -> Self {
		self.csrf_response_field = field.into();

		self
	}

	/// Overrides the per-exchange deadline.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the CSRF retry policy.
	pub fn retry_policy(mut self, policy: CsrfRetryPolicy) -> Self {
		self.retry_policy = policy;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<PipelineConfig, PipelineConfigError> {
		let config = PipelineConfig {
			base_url: self.base_url,
			csrf_token_path: self.csrf_token_path,
			csrf_header: self.csrf_header,
			csrf_response_field: self.csrf_response_field,
			timeout: self.timeout,
			retry_policy: self.retry_policy,
		};

		config.validate()?;

		Ok(config)
	}
}

impl PipelineConfig {
	/// Validates invariants for the config.
	pub(crate) fn validate(&self) -> Result<(), PipelineConfigError> {
		validate_base_url(&self.base_url)?;

		if !self.csrf_token_path.starts_with('/') {
			return Err(PipelineConfigError::RelativeTokenPath {
				path: self.csrf_token_path.clone(),
			});
		}
		if HeaderName::from_str(&self.csrf_header).is_err() {
			return Err(PipelineConfigError::InvalidHeaderName { name: self.csrf_header.clone() });
		}
		if self.csrf_response_field.trim().is_empty() {
			return Err(PipelineConfigError::EmptyResponseField);
		}
		if self.timeout.is_zero() {
			return Err(PipelineConfigError::ZeroTimeout);
		}

		Ok(())
	}
}

fn validate_base_url(url: &Url) -> Result<(), PipelineConfigError> {
	if !matches!(url.scheme(), "http" | "https") {
		return Err(PipelineConfigError::UnsupportedScheme { url: url.to_string() });
	}
	if url.cannot_be_a_base() {
		return Err(PipelineConfigError::CannotBeABase { url: url.to_string() });
	}

	Ok(())
}
