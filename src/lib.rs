//! Client-side API request pipeline: bearer authentication on every call, deduplicated CSRF
//! tokens on state-changing calls, a single stale-token retry, and one normalized error contract.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod csrf;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod obs;
pub mod retry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		auth::{StaticTokenSource, TokenSource},
		client::ApiClient,
		config::PipelineConfig,
		error::TransportError,
		http::{HttpTransport, TransportFuture, TransportRequest, TransportResponse},
	};

	/// Base URL used by scripted pipelines; never contacted.
	pub const SCRIPTED_BASE_URL: &str = "https://app.example.com";

	/// One queued outcome for [`ScriptedTransport`].
	#[derive(Debug)]
	pub enum ScriptedReply {
		/// Respond with the given status, content type, and body.
		Respond {
			/// HTTP status code.
			status: u16,
			/// Optional `Content-Type` header value.
			content_type: Option<&'static str>,
			/// Raw body bytes.
			body: Vec<u8>,
		},
		/// Fail with a transport timeout.
		Timeout,
		/// Fail with a network error carrying the message.
		Network(&'static str),
		/// Never answer, ignoring the request deadline.
		Stall,
	}
	impl ScriptedReply {
		/// JSON response with the provided status.
		pub fn json(status: u16, body: serde_json::Value) -> Self {
			Self::Respond {
				status,
				content_type: Some("application/json"),
				body: body.to_string().into_bytes(),
			}
		}

		/// Plain-text response with the provided status.
		pub fn text(status: u16, body: &str) -> Self {
			Self::Respond { status, content_type: Some("text/plain"), body: body.as_bytes().to_vec() }
		}

		/// Token-endpoint success carrying `csrf_token`.
		pub fn csrf(value: &str) -> Self {
			Self::json(200, serde_json::json!({ "csrf_token": value }))
		}
	}

	#[derive(Debug)]
	struct NetworkFailure(&'static str);
	impl Display for NetworkFailure {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.write_str(self.0)
		}
	}
	impl StdError for NetworkFailure {}

	/// In-memory transport that replays queued replies per path and records every request.
	///
	/// Paths without a queued reply answer `404` so a missing script shows up as an assertion
	/// failure instead of a hang.
	#[derive(Clone, Debug, Default)]
	pub struct ScriptedTransport {
		replies: Arc<Mutex<HashMap<String, VecDeque<ScriptedReply>>>>,
		recorded: Arc<Mutex<Vec<TransportRequest>>>,
	}
	impl ScriptedTransport {
		/// Queues a reply for the given path; replies are consumed in FIFO order.
		pub fn push(&self, path: &str, reply: ScriptedReply) -> &Self {
			self.replies.lock().entry(path.to_owned()).or_default().push_back(reply);

			self
		}

		/// Returns a snapshot of every request executed so far.
		pub fn requests(&self) -> Vec<TransportRequest> {
			self.recorded.lock().clone()
		}

		/// Returns the requests executed against the given path.
		pub fn requests_to(&self, path: &str) -> Vec<TransportRequest> {
			self.recorded.lock().iter().filter(|req| req.url.path() == path).cloned().collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let path = request.url.path().to_owned();
				let timeout = request.timeout;

				self.recorded.lock().push(request);

				let reply = self.replies.lock().get_mut(&path).and_then(VecDeque::pop_front);

				match reply {
					Some(ScriptedReply::Respond { status, content_type, body }) => {
						let mut headers = HeaderMap::new();

						if let Some(content_type) = content_type {
							headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
						}

						Ok(TransportResponse {
							status: StatusCode::from_u16(status)
								.expect("Scripted status codes must be valid."),
							headers,
							body,
						})
					},
					Some(ScriptedReply::Timeout) => Err(TransportError::Timeout { after: timeout }),
					Some(ScriptedReply::Stall) => std::future::pending().await,
					Some(ScriptedReply::Network(message)) =>
						Err(TransportError::network(NetworkFailure(message))),
					None => Ok(TransportResponse {
						status: StatusCode::NOT_FOUND,
						headers: HeaderMap::new(),
						body: Vec::new(),
					}),
				}
			})
		}
	}

	/// Builds a pipeline config rooted at [`SCRIPTED_BASE_URL`].
	pub fn scripted_config() -> PipelineConfig {
		PipelineConfig::builder(
			Url::parse(SCRIPTED_BASE_URL).expect("Scripted base URL must parse."),
		)
		.build()
		.expect("Scripted pipeline config must be valid.")
	}

	/// Constructs an [`ApiClient`] over a fresh [`ScriptedTransport`] with the given bearer token.
	pub fn build_scripted_client(bearer: Option<&str>) -> (ApiClient, ScriptedTransport) {
		let transport = ScriptedTransport::default();
		let token_source: Arc<dyn TokenSource> = Arc::new(StaticTokenSource::new(bearer));
		let client =
			ApiClient::with_transport(scripted_config(), token_source, Arc::new(transport.clone()))
				.expect("Scripted client must build.");

		(client, transport)
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, HashSet},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use ::http::{
		HeaderMap, HeaderValue, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName},
	};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use serde_json;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
