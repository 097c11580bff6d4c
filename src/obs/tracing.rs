// self
use crate::{_prelude::*, auth::TokenSourceError, obs::CallKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by pipeline operations.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("guarded_request.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs that the identity layer could not produce a bearer token.
pub(crate) fn auth_unavailable(err: &TokenSourceError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		reason = %err.reason,
		"bearer token unavailable; sending request without Authorization"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = err;
}

/// Logs a failed CSRF warm-up; the cache refetches on the next mutating call.
pub(crate) fn warm_up_failed(err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, "CSRF token warm-up failed");
	#[cfg(not(feature = "tracing"))]
	let _ = err;
}

/// Logs a mutating call rejected for a stale CSRF token.
pub(crate) fn csrf_rejected(url: &Url, err: &Error) {
	#[cfg(feature = "tracing")]
	tracing::debug!(url = %url, error = %err, "CSRF token rejected; refreshing once");
	#[cfg(not(feature = "tracing"))]
	let _ = (url, err);
}

/// Logs that a cached CSRF token was dropped, with how long it had been in use.
pub(crate) fn csrf_invalidated(age: time::Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(age_ms = age.whole_milliseconds() as i64, "cached CSRF token invalidated");
	#[cfg(not(feature = "tracing"))]
	let _ = age;
}

/// Logs a retry-coordinator state transition.
pub(crate) fn transition(from: &'static str, to: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(from, to, "call state transition");
	#[cfg(not(feature = "tracing"))]
	let _ = (from, to);
}
