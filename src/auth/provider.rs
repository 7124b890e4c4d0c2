//! Token provider contract consumed by the authenticating decorator.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`TokenProvider::refresh_token`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Source of the current access token and the means to replace it.
///
/// The provider owns all token state. Callers ask for the current value every time they need
/// it, so a refresh is picked up without any caching on their side. Implementations must make
/// both methods safe to call concurrently; concurrent refreshes should converge on a single
/// round trip where possible.
pub trait TokenProvider
where
	Self: Send + Sync,
{
	/// Returns the full `Authorization` header value (for example `bearer eyJ…`).
	///
	/// Must not block on I/O and has no side effects.
	fn access_token(&self) -> TokenSecret;

	/// Replaces the current token. After `Ok(())`, [`TokenProvider::access_token`] returns the
	/// new value; errors are surfaced to the caller unchanged.
	fn refresh_token(&self) -> RefreshFuture<'_>;
}
impl<P> TokenProvider for Arc<P>
where
	P: ?Sized + TokenProvider,
{
	fn access_token(&self) -> TokenSecret {
		(**self).access_token()
	}

	fn refresh_token(&self) -> RefreshFuture<'_> {
		(**self).refresh_token()
	}
}

/// Provider with a fixed header value that cannot be refreshed.
///
/// Useful for tokens minted out of band (CI credentials, short-lived scripts). Every refresh
/// attempt fails with [`Error::InvalidGrant`], so a rejected token surfaces to the caller.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider(TokenSecret);
impl StaticTokenProvider {
	/// Creates a provider that always returns `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(TokenSecret::new(value))
	}
}
impl TokenProvider for StaticTokenProvider {
	fn access_token(&self) -> TokenSecret {
		self.0.clone()
	}

	fn refresh_token(&self) -> RefreshFuture<'_> {
		Box::pin(async {
			Err(Error::InvalidGrant { reason: "Static access tokens cannot be refreshed".into() })
		})
	}
}
