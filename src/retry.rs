//! The pipeline's single retry policy: recover from a stale CSRF token, exactly once.
//!
//! A mutating call walks this state machine:
//!
//! ```text
//! START -> DISPATCH -> SUCCESS
//!                   -> CSRF_REJECTED -> INVALIDATE -> REFETCH_TOKEN -> DISPATCH_RETRY -> SUCCESS | FAILURE
//!                   -> FAILURE
//! ```
//!
//! DISPATCH happens at most twice per call. Any failure other than a CSRF rejection on the
//! first attempt, and any failure at all on the second attempt, is surfaced. A second attempt
//! that the policy again classifies as a CSRF rejection becomes [`Error::CsrfRejected`]; every
//! other failure, including a `403` the policy does not recognize, is surfaced unchanged.

// self
use crate::{
	_prelude::*,
	csrf::CsrfTokenCache,
	dispatch::{RequestDescriptor, RequestDispatcher},
	error::HttpError,
	obs::{self, PipelineMetrics},
};

/// Decides which `403` responses on mutating calls are CSRF rejections.
///
/// By default every `403` on a mutating call is treated as a stale token. Endpoints known to
/// answer `403` for authorization reasons belong in [`exempt_paths`](Self::exempt_paths), and a
/// server that tags CSRF failures with a distinct body code can be matched precisely via
/// [`rejection_code`](Self::rejection_code).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfRetryPolicy {
	/// URL paths whose `403` responses are never retried.
	#[serde(default)]
	pub exempt_paths: HashSet<String>,
	/// When set, only a `403` whose body code equals this value is retried.
	#[serde(default)]
	pub rejection_code: Option<String>,
}
impl CsrfRetryPolicy {
	/// Marks a path as emitting `403` for non-CSRF reasons.
	pub fn exempt(mut self, path: impl Into<String>) -> Self {
		self.exempt_paths.insert(path.into());

		self
	}

	/// Requires the body code of a `403` to equal `code` before retrying.
	pub fn with_rejection_code(mut self, code: impl Into<String>) -> Self {
		self.rejection_code = Some(code.into());

		self
	}

	/// Returns `true` when `err`, received from `url`, signals a stale CSRF token.
	pub fn is_csrf_rejection(&self, url: &Url, err: &Error) -> bool {
		match err {
			Error::Http(http) => self.rejects(url, http),
			_ => false,
		}
	}

	fn rejects(&self, url: &Url, http: &HttpError) -> bool {
		if http.status != StatusCode::FORBIDDEN.as_u16() || self.exempt_paths.contains(url.path()) {
			return false;
		}

		match &self.rejection_code {
			Some(expected) => http.code.as_deref() == Some(expected.as_str()),
			None => true,
		}
	}
}

/// States of one logical call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
	/// Call accepted.
	Start,
	/// First exchange in flight.
	Dispatch,
	/// First exchange was rejected as a stale CSRF token.
	CsrfRejected,
	/// Cached token dropped.
	Invalidate,
	/// Fresh token being fetched.
	RefetchToken,
	/// Second and final exchange in flight.
	DispatchRetry,
	/// Terminal: call succeeded.
	Success,
	/// Terminal: call failed.
	Failure,
}
impl CallState {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallState::Start => "start",
			CallState::Dispatch => "dispatch",
			CallState::CsrfRejected => "csrf_rejected",
			CallState::Invalidate => "invalidate",
			CallState::RefetchToken => "refetch_token",
			CallState::DispatchRetry => "dispatch_retry",
			CallState::Success => "success",
			CallState::Failure => "failure",
		}
	}

	/// Returns `true` for `Success` and `Failure`.
	pub const fn is_terminal(self) -> bool {
		matches!(self, CallState::Success | CallState::Failure)
	}
}
impl Display for CallState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Wraps mutating calls with the stale-token retry.
#[derive(Debug)]
pub struct RetryCoordinator {
	dispatcher: Arc<RequestDispatcher>,
	csrf: Arc<CsrfTokenCache>,
	policy: CsrfRetryPolicy,
	metrics: Arc<PipelineMetrics>,
}
impl RetryCoordinator {
	/// Creates a coordinator over the shared dispatcher and cache.
	pub fn new(
		dispatcher: Arc<RequestDispatcher>,
		csrf: Arc<CsrfTokenCache>,
		policy: CsrfRetryPolicy,
		metrics: Arc<PipelineMetrics>,
	) -> Self {
		Self { dispatcher, csrf, policy, metrics }
	}

	/// Runs a mutating call, retrying once on a CSRF rejection.
	///
	/// GET descriptors are dispatched once without any retry; they are normally routed straight
	/// to the dispatcher and never reach this type.
	pub async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Value> {
		self.run(descriptor, || self.dispatcher.dispatch(descriptor)).await.0
	}

	/// Typed variant of [`execute`](Self::execute).
	pub async fn execute_as<T>(&self, descriptor: &RequestDescriptor) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.run(descriptor, || self.dispatcher.dispatch_as(descriptor)).await.0
	}

	async fn run<T, F, Fut>(
		&self,
		descriptor: &RequestDescriptor,
		attempt: F,
	) -> (Result<T>, CallTrace)
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut trace = CallTrace::default();

		trace.advance(CallState::Dispatch);

		let err = match attempt().await {
			Ok(value) => {
				trace.advance(CallState::Success);

				return (Ok(value), trace);
			},
			Err(err)
				if descriptor.method.is_mutating()
					&& self.policy.is_csrf_rejection(&descriptor.url, &err) =>
				err,
			Err(err) => {
				trace.advance(CallState::Failure);

				return (Err(err), trace);
			},
		};

		trace.advance(CallState::CsrfRejected);
		obs::csrf_rejected(&descriptor.url, &err);

		self.csrf.invalidate();
		trace.advance(CallState::Invalidate);
		trace.advance(CallState::RefetchToken);

		if let Err(fetch_err) = self.csrf.get().await {
			trace.advance(CallState::Failure);

			return (Err(fetch_err.into()), trace);
		}

		self.metrics.record_csrf_retry();
		trace.advance(CallState::DispatchRetry);

		match attempt().await {
			Ok(value) => {
				trace.advance(CallState::Success);

				(Ok(value), trace)
			},
			Err(Error::Http(http)) if self.policy.rejects(&descriptor.url, &http) => {
				trace.advance(CallState::Failure);

				(Err(Error::CsrfRejected(http)), trace)
			},
			Err(err) => {
				trace.advance(CallState::Failure);

				(Err(err), trace)
			},
		}
	}
}

/// Ordered record of the states one call visited.
#[derive(Debug)]
struct CallTrace(Vec<CallState>);
impl CallTrace {
	fn advance(&mut self, next: CallState) {
		let from = self.current();

		debug_assert!(!from.is_terminal(), "A finished call must not change state.");

		obs::transition(from.as_str(), next.as_str());
		self.0.push(next);
	}

	fn current(&self) -> CallState {
		self.0.last().copied().unwrap_or(CallState::Start)
	}

	#[cfg(test)]
	fn dispatches(&self) -> usize {
		self.0
			.iter()
			.filter(|state| matches!(state, CallState::Dispatch | CallState::DispatchRetry))
			.count()
	}
}
impl Default for CallTrace {
	fn default() -> Self {
		Self(vec![CallState::Start])
	}
}
