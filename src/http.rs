//! Request/response model and the [`Transport`] contract every sender implements.
//!
//! A [`Request`] owns an optional [`Body`] that may be a one-shot stream. Transports consume the
//! body with [`Request::take_body`] when they send, so a request cannot be replayed unless
//! somebody buffered the bytes first. [`crate::transport::AuthTransport`] does exactly that.

pub mod classify;
#[cfg(feature = "reqwest")] pub mod client;

pub use classify::*;
#[cfg(feature = "reqwest")] pub use client::*;

// std
use std::{borrow::Cow, io};
// crates.io
use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
use oauth2::http::header::AsHeaderName;
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, auth::TokenProvider, error::ConfigError, transport::AuthTransport};

/// Boxed one-shot byte stream carried by streaming bodies.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Response>> + 'a + Send>>;

/// Anything that can deliver a [`Request`] and classify its outcome.
///
/// Implementations must report an access token rejected by the remote side as
/// [`Error::InvalidAuthToken`]; decorators decide whether to retry based on that variant alone.
/// The request is borrowed mutably: senders consume its body and decorators may rewrite its
/// headers in place.
pub trait Transport
where
	Self: Send + Sync,
{
	/// Sends the request and returns the response or a classified error.
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a>;
}
impl<T> Transport for Arc<T>
where
	T: ?Sized + Transport,
{
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
		(**self).send(request)
	}
}
impl<T> Transport for Box<T>
where
	T: ?Sized + Transport,
{
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
		(**self).send(request)
	}
}

/// Fluent helpers for building decorator chains.
pub trait TransportExt
where
	Self: Sized + Transport,
{
	/// Decorates `self` with bearer-token injection and refresh-and-replay.
	fn with_auth(self, provider: Arc<dyn TokenProvider>) -> AuthTransport<Self> {
		AuthTransport::new(provider, self)
	}
}
impl<T> TransportExt for T where T: Transport {}

/// Request payload that is either already in memory or a stream readable at most once.
pub struct Body(BodyKind);
enum BodyKind {
	Full(Bytes),
	Stream(BodyStream),
}
impl Body {
	/// Wraps a one-shot stream of chunks.
	pub fn from_stream<S>(stream: S) -> Self
	where
		S: 'static + Send + Stream<Item = io::Result<Bytes>>,
	{
		Self(BodyKind::Stream(Box::pin(stream)))
	}

	/// Returns the bytes when the body is buffered, or `None` for a stream.
	pub fn as_bytes(&self) -> Option<&Bytes> {
		match &self.0 {
			BodyKind::Full(bytes) => Some(bytes),
			BodyKind::Stream(_) => None,
		}
	}

	/// Returns `true` when the body is held in memory.
	pub fn is_buffered(&self) -> bool {
		matches!(self.0, BodyKind::Full(_))
	}

	/// Consumes the body and returns all of its bytes.
	///
	/// Stream chunks are concatenated in order; the first chunk error aborts the read.
	pub async fn collect(self) -> io::Result<Bytes> {
		match self.0 {
			BodyKind::Full(bytes) => Ok(bytes),
			BodyKind::Stream(mut stream) => {
				let mut buf = BytesMut::new();

				while let Some(chunk) = stream.next().await {
					buf.extend_from_slice(&chunk?);
				}

				Ok(buf.freeze())
			},
		}
	}
}
impl From<Bytes> for Body {
	fn from(bytes: Bytes) -> Self {
		Self(BodyKind::Full(bytes))
	}
}
impl From<Vec<u8>> for Body {
	fn from(bytes: Vec<u8>) -> Self {
		Self(BodyKind::Full(bytes.into()))
	}
}
impl From<String> for Body {
	fn from(text: String) -> Self {
		Self(BodyKind::Full(text.into()))
	}
}
impl From<&'static str> for Body {
	fn from(text: &'static str) -> Self {
		Self(BodyKind::Full(Bytes::from_static(text.as_bytes())))
	}
}
impl Debug for Body {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.0 {
			BodyKind::Full(bytes) => f.debug_tuple("Body::Full").field(&bytes.len()).finish(),
			BodyKind::Stream(_) => f.write_str("Body::Stream(..)"),
		}
	}
}

/// Outgoing HTTP request.
#[derive(Debug)]
pub struct Request {
	/// HTTP method.
	pub method: Method,
	/// Target URL.
	pub url: Url,
	/// Header map; keys are unique.
	pub headers: HeaderMap,
	/// Optional payload; taken by the transport that sends it.
	pub body: Option<Body>,
}
impl Request {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Sets a header, replacing any previous value.
	pub fn with_header(mut self, name: HeaderName, value: &str) -> Result<Self> {
		let value = HeaderValue::from_str(value).map_err(ConfigError::from)?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Attaches a body.
	pub fn with_body(mut self, body: impl Into<Body>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Returns the value of a header, if present.
	pub fn header<K>(&self, name: K) -> Option<&HeaderValue>
	where
		K: AsHeaderName,
	{
		self.headers.get(name)
	}

	/// Removes and returns the body so it can be consumed.
	pub fn take_body(&mut self) -> Option<Body> {
		self.body.take()
	}
}

/// Fully-read HTTP response.
#[derive(Clone, Debug)]
pub struct Response {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response payload.
	pub body: Bytes,
}
impl Response {
	/// Creates an empty response with the provided status.
	pub fn new(status: StatusCode) -> Self {
		Self { status, headers: HeaderMap::new(), body: Bytes::new() }
	}

	/// Replaces the payload.
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();

		self
	}

	/// Adds a header, replacing any previous value.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns the payload as text, replacing invalid UTF-8 sequences.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}

	/// Parses the payload as JSON, reporting the path of the first mismatch.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
	}
}
