//! Contract for the identity layer that hands out short-lived bearer tokens.

// self
use crate::{_prelude::*, auth::TokenSecret, obs};

/// Boxed future returned by [`TokenSource::token`].
pub type TokenFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Option<TokenSecret>, TokenSourceError>> + 'a + Send>>;

/// Async capability returning the current bearer token.
///
/// `Ok(None)` means the user is signed out. An `Err` means the identity layer could not answer;
/// the pipeline logs it and sends the request without `Authorization`, leaving the verdict to
/// the server.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Resolves the bearer token to attach to the next request.
	fn token(&self) -> TokenFuture<'_>;
}

/// Failure reported by a [`TokenSource`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Bearer token is unavailable: {reason}.")]
pub struct TokenSourceError {
	/// Identity-layer supplied reason string.
	pub reason: String,
}
impl TokenSourceError {
	/// Creates a new error with the provided reason.
	pub fn new(reason: impl Into<String>) -> Self {
		Self { reason: reason.into() }
	}
}

/// Token source backed by an in-memory value the host application swaps on sign-in/out.
#[derive(Debug, Default)]
pub struct StaticTokenSource(RwLock<Option<TokenSecret>>);
impl StaticTokenSource {
	/// Creates a source that returns `token` (blank values count as signed out).
	pub fn new(token: Option<&str>) -> Self {
		Self(RwLock::new(token.and_then(TokenSecret::non_blank)))
	}

	/// Creates a source with no token.
	pub fn signed_out() -> Self {
		Self::default()
	}

	/// Replaces the current token.
	pub fn set(&self, token: impl Into<String>) {
		*self.0.write() = TokenSecret::non_blank(token);
	}

	/// Forgets the current token.
	pub fn clear(&self) {
		*self.0.write() = None;
	}
}
impl TokenSource for StaticTokenSource {
	fn token(&self) -> TokenFuture<'_> {
		let current = self.0.read().clone();

		Box::pin(async move { Ok(current) })
	}
}

/// Asks `source` for a bearer token, treating failures as "no token".
pub(crate) async fn resolve_bearer(source: &dyn TokenSource) -> Option<TokenSecret> {
	match source.token().await {
		Ok(token) => token.filter(|secret| !secret.expose().trim().is_empty()),
		Err(err) => {
			obs::auth_unavailable(&err);

			None
		},
	}
}
