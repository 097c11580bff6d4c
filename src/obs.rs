//! Observability helpers for pipeline calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `guarded_request.call` with
//!   the `call` (operation) and `stage` (call site) fields, plus `warn`/`debug` events for degraded
//!   auth, failed cache warm-ups, and retry transitions.
//! - Enable `metrics` to increment the `guarded_request_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`.
//!
//! [`PipelineMetrics`] counters are always available regardless of features.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Pipeline operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Read-only call that bypasses CSRF.
	Read,
	/// Mutating call guarded by the CSRF retry policy.
	Mutation,
	/// CSRF token fetch.
	CsrfFetch,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Read => "read",
			CallKind::Mutation => "mutation",
			CallKind::CsrfFetch => "csrf_fetch",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a pipeline operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
