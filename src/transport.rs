//! Bearer-token injection with a single refresh-and-replay on an invalid token.
//!
//! [`AuthTransport`] decorates an inner [`Transport`]. Every call:
//!
//! 1. buffers the request body so it can be sent twice;
//! 2. forwards refresh-grant calls (see [`is_refresh_grant`]) untouched and exactly once;
//! 3. otherwise sets `Authorization` to the provider's current value and sends;
//! 4. on [`Error::InvalidAuthToken`] refreshes through the provider, restores the body, re-sets
//!    the header, and sends one more time, returning that result whatever it is.
//!
//! Nothing is cached between calls; the provider is asked for the token at the moment of use.

// self
use crate::{
	_prelude::*,
	auth::TokenProvider,
	http::{Body, Request, Response, Transport, TransportFuture},
	obs::{self, SendKind, SendOutcome, TransportSpan},
};

const TOKEN_ENDPOINT_MARKER: &str = "/oauth/token";
const REFRESH_GRANT_MARKER: &[u8] = b"grant_type=refresh_token";

/// Returns `true` when `request` is itself a refresh-token grant.
///
/// All three must hold: the URL contains `/oauth/token`, the method is `POST`, and `body`
/// contains `grant_type=refresh_token`. Such requests never get an `Authorization` header from
/// the decorator and are never retried.
pub fn is_refresh_grant(request: &Request, body: &[u8]) -> bool {
	is_token_endpoint(&request.url)
		&& request.method == Method::POST
		&& contains(body, REFRESH_GRANT_MARKER)
}

pub(crate) fn is_token_endpoint(url: &Url) -> bool {
	url.as_str().contains(TOKEN_ENDPOINT_MARKER)
}

/// Produces [`AuthTransport`]s that share one token provider.
///
/// Useful when the inner transport is only known later, or when several inner transports
/// should authenticate with the same session.
#[derive(Clone)]
pub struct AuthLayer {
	provider: Arc<dyn TokenProvider>,
}
impl AuthLayer {
	/// Creates a layer backed by `provider`.
	pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
		Self { provider }
	}

	/// Binds the layer's provider to `inner`.
	pub fn wrap<T>(&self, inner: T) -> AuthTransport<T>
	where
		T: Transport,
	{
		AuthTransport::new(self.provider.clone(), inner)
	}
}
impl Debug for AuthLayer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AuthLayer(..)")
	}
}

/// Transport decorator that authenticates requests and replays them once after a refresh.
///
/// The decorator is itself a [`Transport`], so it can be wrapped by further decorators.
pub struct AuthTransport<T> {
	inner: T,
	provider: Arc<dyn TokenProvider>,
}
impl<T> AuthTransport<T>
where
	T: Transport,
{
	/// Binds `provider` to `inner`.
	pub fn new(provider: Arc<dyn TokenProvider>, inner: T) -> Self {
		Self { inner, provider }
	}

	/// Rebinds the decorator to a different inner transport, dropping the previous one.
	pub fn wrap<U>(self, inner: U) -> AuthTransport<U>
	where
		U: Transport,
	{
		AuthTransport { inner, provider: self.provider }
	}

	/// Returns the decorated transport.
	pub fn inner(&self) -> &T {
		&self.inner
	}

	/// Returns the token provider.
	pub fn provider(&self) -> &Arc<dyn TokenProvider> {
		&self.provider
	}

	async fn authenticate(&self, request: &mut Request) -> Result<Response> {
		let buffered = match request.take_body() {
			Some(body) => Some(body.collect().await.map_err(|source| Error::BodyRead { source })?),
			None => None,
		};

		restore_body(request, buffered.as_ref());

		if is_refresh_grant(request, buffered.as_deref().unwrap_or_default()) {
			#[cfg(feature = "tracing")]
			tracing::debug!(url = %request.url, "Forwarding refresh grant without a bearer token.");

			return self.send_once(SendKind::RefreshExempt, request).await;
		}

		self.attach_token(request)?;

		let first = self.send_once(SendKind::Authenticated, request).await;

		if !matches!(&first, Err(e) if e.is_invalid_auth_token()) {
			return first;
		}

		#[cfg(feature = "tracing")]
		tracing::debug!("Access token rejected; refreshing.");

		self.provider.refresh_token().await?;
		restore_body(request, buffered.as_ref());
		self.attach_token(request)?;

		#[cfg(feature = "tracing")]
		tracing::debug!(url = %request.url, "Replaying request with the refreshed token.");

		self.send_once(SendKind::Replay, request).await
	}

	fn attach_token(&self, request: &mut Request) -> Result<()> {
		let value = self.provider.access_token().to_header_value()?;

		request.headers.insert(AUTHORIZATION, value);

		Ok(())
	}

	async fn send_once(&self, kind: SendKind, request: &mut Request) -> Result<Response> {
		obs::record_send_outcome(kind, SendOutcome::Attempt);

		let result = self.inner.send(request).await;

		obs::record_send_outcome(kind, SendOutcome::of(&result));

		result
	}
}
impl<T> Transport for AuthTransport<T>
where
	T: Transport,
{
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
		let span = TransportSpan::send(&request.method, "send");

		Box::pin(span.instrument(self.authenticate(request)))
	}
}
impl<T> Clone for AuthTransport<T>
where
	T: Clone,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone(), provider: self.provider.clone() }
	}
}
impl<T> Debug for AuthTransport<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthTransport").field("inner", &self.inner).finish_non_exhaustive()
	}
}

fn restore_body(request: &mut Request, buffered: Option<&Bytes>) {
	if let Some(bytes) = buffered {
		request.body = Some(Body::from(bytes.clone()));
	}
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
	haystack.windows(needle.len()).any(|window| window == needle)
}
