//! CSRF token lifecycle: fetch once, cache, invalidate, and deduplicate concurrent fetches.
//!
//! [`CsrfTokenCache`] is an explicit, constructible context object: every pipeline (and every
//! test) owns its own instance. The cache holds at most one value and at most one in-flight
//! fetch. Concurrent callers that arrive while a fetch is underway attach to the same shared
//! future instead of issuing their own request, so a burst of mutating calls costs exactly one
//! round trip to the token endpoint.
//!
//! Each fetch is tagged with a generation id. [`CsrfTokenCache::invalidate`] clears the slot
//! synchronously; a fetch that settles afterwards is still handed to the callers that were
//! already waiting on it but never repopulates the cache. When every waiter of a pending fetch
//! is dropped before it settles, the pending marker is cleared as well, so a cancelled caller
//! cannot leave a stalled fetch behind for later callers.

pub mod fetch;

pub use fetch::*;

// crates.io
use futures_util::{
	FutureExt,
	future::{BoxFuture, Shared},
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::CsrfFetchError,
	obs::{self, CallKind, CallOutcome, CallSpan, PipelineMetrics, record_call_outcome},
};

/// Result shared by every waiter of one fetch.
pub type SharedCsrfResult = Result<CsrfToken, Arc<CsrfFetchError>>;

type SharedFetch = Shared<BoxFuture<'static, SharedCsrfResult>>;

/// Server-issued CSRF token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken {
	value: TokenSecret,
	fetched_at: OffsetDateTime,
}
impl CsrfToken {
	/// Wraps a freshly fetched token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self { value: TokenSecret::new(value), fetched_at: OffsetDateTime::now_utc() }
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn value(&self) -> &str {
		self.value.expose()
	}

	/// Instant the token was received.
	pub fn fetched_at(&self) -> OffsetDateTime {
		self.fetched_at
	}

	/// Time elapsed since the token was received.
	pub fn age(&self) -> time::Duration {
		OffsetDateTime::now_utc() - self.fetched_at
	}

	pub(crate) fn secret(&self) -> &TokenSecret {
		&self.value
	}
}

/// Deduplicating, invalidatable cache for a single CSRF token.
pub struct CsrfTokenCache {
	provider: Arc<dyn CsrfTokenProvider>,
	metrics: Arc<PipelineMetrics>,
	state: Mutex<CacheState>,
}
impl CsrfTokenCache {
	/// Creates an empty cache that obtains tokens from `provider`.
	pub fn new(provider: Arc<dyn CsrfTokenProvider>) -> Self {
		Self::with_metrics(provider, Default::default())
	}

	/// Creates an empty cache that reports fetches and invalidations to `metrics`.
	pub fn with_metrics(provider: Arc<dyn CsrfTokenProvider>, metrics: Arc<PipelineMetrics>) -> Self {
		Self { provider, metrics, state: Mutex::new(CacheState::default()) }
	}

	/// Returns the cached token, joining or starting a fetch when the cache is empty.
	///
	/// A failed fetch clears the pending marker and is returned to every waiter; the next call
	/// starts a new fetch. No retry happens at this layer.
	pub async fn get(&self) -> SharedCsrfResult {
		let (id, fetch) = {
			let mut guard = self.state.lock();
			let state = &mut *guard;

			match &mut state.slot {
				Slot::Ready(token) => return Ok(token.clone()),
				Slot::Pending { id, fetch, waiters } => {
					*waiters += 1;

					(*id, fetch.clone())
				},
				Slot::Empty => {
					state.next_id += 1;

					let id = state.next_id;
					let fetch = self.start_fetch();

					state.slot = Slot::Pending { id, fetch: fetch.clone(), waiters: 1 };

					(id, fetch)
				},
			}
		};
		let mut waiter = Waiter { cache: self, id, settled: false };
		let result = fetch.await;

		waiter.settle(&result);

		result
	}

	/// Clears the cached value and any pending marker. Idempotent.
	pub fn invalidate(&self) {
		let previous = std::mem::take(&mut self.state.lock().slot);

		if let Slot::Ready(token) = &previous {
			obs::csrf_invalidated(token.age());
		}

		self.metrics.record_csrf_invalidation();
	}

	/// Alias of [`invalidate`](Self::invalidate) for resetting between tests or sessions.
	pub fn reset(&self) {
		self.invalidate();
	}

	/// Returns the cached token without fetching.
	pub fn peek(&self) -> Option<CsrfToken> {
		match &self.state.lock().slot {
			Slot::Ready(token) => Some(token.clone()),
			Slot::Pending { .. } | Slot::Empty => None,
		}
	}

	/// Returns `true` while a fetch is in flight.
	pub fn is_fetching(&self) -> bool {
		matches!(self.state.lock().slot, Slot::Pending { .. })
	}

	fn start_fetch(&self) -> SharedFetch {
		const KIND: CallKind = CallKind::CsrfFetch;

		let span = CallSpan::new(KIND, "csrf_cache_fetch");
		let fetch = self.provider.fetch();

		self.metrics.record_csrf_fetch();
		record_call_outcome(KIND, CallOutcome::Attempt);

		span.instrument(async move {
			let result = fetch.await.map_err(Arc::new);

			match &result {
				Ok(_) => record_call_outcome(KIND, CallOutcome::Success),
				Err(_) => record_call_outcome(KIND, CallOutcome::Failure),
			}

			result
		})
		.boxed()
		.shared()
	}
}
impl Debug for CsrfTokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = match &self.state.lock().slot {
			Slot::Empty => "empty",
			Slot::Pending { .. } => "pending",
			Slot::Ready(_) => "ready",
		};

		f.debug_struct("CsrfTokenCache").field("state", &state).finish()
	}
}

#[derive(Default)]
struct CacheState {
	next_id: u64,
	slot: Slot,
}

#[derive(Default)]
enum Slot {
	#[default]
	Empty,
	Pending {
		id: u64,
		fetch: SharedFetch,
		waiters: usize,
	},
	Ready(CsrfToken),
}

/// Tracks one caller waiting on a pending fetch; clears the marker if the last waiter leaves
/// before the fetch settles.
struct Waiter<'a> {
	cache: &'a CsrfTokenCache,
	id: u64,
	settled: bool,
}
impl Waiter<'_> {
	fn settle(&mut self, result: &SharedCsrfResult) {
		self.settled = true;

		let mut state = self.cache.state.lock();

		if matches!(state.slot, Slot::Pending { id, .. } if id == self.id) {
			state.slot = match result {
				Ok(token) => Slot::Ready(token.clone()),
				Err(_) => Slot::Empty,
			};
		}
	}
}
impl Drop for Waiter<'_> {
	fn drop(&mut self) {
		if self.settled {
			return;
		}

		let mut state = self.cache.state.lock();

		if let Slot::Pending { id, waiters, .. } = &mut state.slot
			&& *id == self.id
		{
			*waiters = waiters.saturating_sub(1);

			if *waiters == 0 {
				state.slot = Slot::Empty;
			}
		}
	}
}
