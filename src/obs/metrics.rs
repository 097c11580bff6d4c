// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{CallKind, CallOutcome};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"guarded_request_call_total",
			"call" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Thread-safe counters for one pipeline instance.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
	dispatches: AtomicU64,
	csrf_fetches: AtomicU64,
	csrf_invalidations: AtomicU64,
	csrf_retries: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl PipelineMetrics {
	/// Returns the number of HTTP exchanges issued against API endpoints.
	pub fn dispatches(&self) -> u64 {
		self.dispatches.load(Ordering::Relaxed)
	}

	/// Returns the number of network fetches issued against the CSRF token endpoint.
	pub fn csrf_fetches(&self) -> u64 {
		self.csrf_fetches.load(Ordering::Relaxed)
	}

	/// Returns the number of CSRF cache invalidations.
	pub fn csrf_invalidations(&self) -> u64 {
		self.csrf_invalidations.load(Ordering::Relaxed)
	}

	/// Returns the number of retries triggered by a CSRF rejection.
	pub fn csrf_retries(&self) -> u64 {
		self.csrf_retries.load(Ordering::Relaxed)
	}

	/// Returns the number of logical calls that succeeded.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of logical calls that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_dispatch(&self) {
		self.dispatches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_csrf_fetch(&self) {
		self.csrf_fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_csrf_invalidation(&self) {
		self.csrf_invalidations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_csrf_retry(&self) {
		self.csrf_retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome<T, E>(&self, kind: CallKind, result: &Result<T, E>) {
		match result {
			Ok(_) => {
				self.success.fetch_add(1, Ordering::Relaxed);
				record_call_outcome(kind, CallOutcome::Success);
			},
			Err(_) => {
				self.failure.fetch_add(1, Ordering::Relaxed);
				record_call_outcome(kind, CallOutcome::Failure);
			},
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_call_outcome_noop_without_metrics() {
		record_call_outcome(CallKind::Mutation, CallOutcome::Failure);
	}

	#[test]
	fn outcomes_split_into_success_and_failure() {
		let metrics = PipelineMetrics::default();

		metrics.record_outcome::<(), ()>(CallKind::Read, &Ok(()));
		metrics.record_outcome::<(), ()>(CallKind::Read, &Err(()));
		metrics.record_outcome::<(), ()>(CallKind::Mutation, &Err(()));

		assert_eq!(metrics.successes(), 1);
		assert_eq!(metrics.failures(), 2);
	}
}
