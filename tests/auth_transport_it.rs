// std
use std::{
	io,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use bytes::Bytes;
use futures_util::stream;
use oauth2::http::{Method, StatusCode, header::AUTHORIZATION};
use parking_lot::Mutex;
// self
use oauth2_auth_transport::{
	auth::{RefreshFuture, TokenProvider, TokenSecret},
	error::{Error, Result},
	http::{Body, Request, Response, Transport, TransportExt, TransportFuture},
	transport::AuthLayer,
	url::Url,
};

/// Records what reached the wire and answers from a script.
struct RecordingTransport {
	script: Mutex<Vec<Result<Response>>>,
	seen: Mutex<Vec<(Option<String>, Option<Bytes>)>>,
}
impl RecordingTransport {
	fn new(mut script: Vec<Result<Response>>) -> Arc<Self> {
		script.reverse();

		Arc::new(Self { script: Mutex::new(script), seen: Mutex::default() })
	}

	fn seen(&self) -> Vec<(Option<String>, Option<Bytes>)> {
		self.seen.lock().clone()
	}
}
impl Transport for RecordingTransport {
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
		Box::pin(async move {
			let body = match request.take_body() {
				Some(body) =>
					Some(body.collect().await.map_err(|source| Error::BodyRead { source })?),
				None => None,
			};
			let authorization = request
				.header(AUTHORIZATION)
				.and_then(|value| value.to_str().ok())
				.map(str::to_owned);

			self.seen.lock().push((authorization, body));

			self.script.lock().pop().unwrap_or_else(|| Ok(Response::new(StatusCode::OK)))
		})
	}
}

/// Serves `bearer v<N>` and bumps `N` on every refresh, optionally failing instead.
#[derive(Default)]
struct CountingProvider {
	version: AtomicUsize,
	refreshes: AtomicUsize,
	fail_with: Mutex<Option<Error>>,
}
impl TokenProvider for CountingProvider {
	fn access_token(&self) -> TokenSecret {
		TokenSecret::new(format!("bearer v{}", self.version.load(Ordering::SeqCst)))
	}

	fn refresh_token(&self) -> RefreshFuture<'_> {
		Box::pin(async move {
			self.refreshes.fetch_add(1, Ordering::SeqCst);

			if let Some(err) = self.fail_with.lock().take() {
				return Err(err);
			}

			self.version.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

fn url(value: &str) -> Url {
	Url::parse(value).expect("URL fixture should parse.")
}

fn invalid_token() -> Error {
	Error::InvalidAuthToken { reason: "Invalid auth token".into() }
}

#[tokio::test]
async fn valid_token_sends_once() {
	let inner = RecordingTransport::new(vec![Ok(Response::new(StatusCode::OK))]);
	let provider = Arc::new(CountingProvider::default());
	let auth = inner.clone().with_auth(provider.clone());
	let mut request = Request::get(url("https://api.example.com/v3/apps"));
	let response = auth.send(&mut request).await.expect("Valid tokens should pass.");

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(inner.seen(), vec![(Some("bearer v0".into()), None)]);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_streamed_body_replayed() {
	let inner =
		RecordingTransport::new(vec![Err(invalid_token()), Ok(Response::new(StatusCode::CREATED))]);
	let provider = Arc::new(CountingProvider::default());
	let auth = AuthLayer::new(provider.clone()).wrap(inner.clone());
	let mut request = Request::post(url("https://api.example.com/v3/apps")).with_body(
		Body::from_stream(stream::iter([
			Ok(Bytes::from_static(b"{\"name\":")),
			Ok(Bytes::from_static(b"\"my-app\"}")),
		])),
	);
	let response = auth.send(&mut request).await.expect("The replay should succeed.");
	let body = Bytes::from_static(b"{\"name\":\"my-app\"}");

	assert_eq!(response.status, StatusCode::CREATED);
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(
		inner.seen(),
		vec![(Some("bearer v0".into()), Some(body.clone())), (Some("bearer v1".into()), Some(body))]
	);
}

#[tokio::test]
async fn refresh_grant_passes_through_untouched() {
	let inner = RecordingTransport::new(vec![Err(invalid_token())]);
	let provider = Arc::new(CountingProvider::default());
	let auth = inner.clone().with_auth(provider.clone());
	let mut request = Request::post(url("https://uaa.example.com/oauth/token"))
		.with_body("grant_type=refresh_token&refresh_token=r1");
	let err = auth.send(&mut request).await.expect_err("Exempt calls are not retried.");

	assert!(err.is_invalid_auth_token());
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
	assert_eq!(
		inner.seen(),
		vec![(None, Some(Bytes::from_static(b"grant_type=refresh_token&refresh_token=r1")))]
	);
}

#[tokio::test]
async fn failed_refresh_stops_before_the_second_send() {
	let inner = RecordingTransport::new(vec![Err(invalid_token())]);
	let provider = Arc::new(CountingProvider::default());

	*provider.fail_with.lock() = Some(Error::InvalidGrant { reason: "revoked".into() });

	let auth = inner.clone().with_auth(provider.clone());
	let mut request = Request::get(url("https://api.example.com/v3/apps"));
	let err = auth.send(&mut request).await.expect_err("Refresh failures are fatal.");

	assert!(matches!(err, Error::InvalidGrant { .. }));
	assert_eq!(inner.seen().len(), 1);
}

#[tokio::test]
async fn broken_body_never_reaches_the_wire() {
	let inner = RecordingTransport::new(vec![]);
	let provider = Arc::new(CountingProvider::default());
	let auth = inner.clone().with_auth(provider.clone());
	let mut request = Request::new(Method::PUT, url("https://api.example.com/v3/apps/1")).with_body(
		Body::from_stream(stream::iter([
			Ok(Bytes::from_static(b"partial")),
			Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated upload")),
		])),
	);
	let err = auth.send(&mut request).await.expect_err("Body read failures are fatal.");

	assert!(matches!(err, Error::BodyRead { .. }));
	assert!(inner.seen().is_empty());
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_rejection_is_final() {
	let inner = RecordingTransport::new(vec![Err(invalid_token()), Err(invalid_token())]);
	let provider = Arc::new(CountingProvider::default());
	let auth = inner.clone().with_auth(provider.clone());
	let mut request = Request::new(Method::DELETE, url("https://api.example.com/v3/apps/1"));
	let err = auth.send(&mut request).await.expect_err("No second refresh is attempted.");

	assert!(err.is_invalid_auth_token());
	assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(inner.seen().len(), 2);
}
