//! reqwest-backed [`Transport`] used as the default inner transport.

// std
use std::ops::Deref;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError, TransportError},
	http::{
		DefaultErrorClassifier, ErrorClassifier, Request, Response, Transport, TransportFuture,
		classify_response,
	},
};

/// Thin wrapper around [`ReqwestClient`] that classifies failed responses.
///
/// Statuses of 400 and above become [`Error`] values through the configured
/// [`ErrorClassifier`]; everything else is returned as a [`Response`]. Redirect, TLS, and
/// timeout behavior are whatever the wrapped client is configured with.
#[derive(Clone)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	classifier: Arc<dyn ErrorClassifier>,
}
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, classifier: Arc::new(DefaultErrorClassifier) }
	}

	/// Replaces the classifier used for failed responses.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}
}
impl Default for ReqwestTransport {
	fn default() -> Self {
		Self::with_client(ReqwestClient::default())
	}
}
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
impl Debug for ReqwestTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestTransport(..)")
	}
}
impl Transport for ReqwestTransport {
	fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
		Box::pin(async move {
			let body = match request.take_body() {
				Some(body) =>
					Some(body.collect().await.map_err(|source| Error::BodyRead { source })?),
				None => None,
			};
			let mut builder = self
				.client
				.request(request.method.clone(), request.url.clone())
				.headers(request.headers.clone());

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(map_reqwest_error)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(map_reqwest_error)?;
			let response = Response { status, headers, body };

			if status.is_client_error() || status.is_server_error() {
				return Err(classify_response(self.classifier.as_ref(), &response));
			}

			Ok(response)
		})
	}
}

fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Upstream {
			message: "Request timed out".into(),
			status: err.status().map(|code| code.as_u16()),
			retry_after: None,
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::_preludet::url;

	#[tokio::test]
	async fn forwards_headers_and_body_and_returns_success() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/v2/service_bindings")
					.header("authorization", "bearer token-1")
					.body("x=1");
				then.status(201).body("{\"metadata\":{}}");
			})
			.await;
		let transport = ReqwestTransport::default();
		let mut request = Request::post(url(&server.url("/v2/service_bindings")))
			.with_header(AUTHORIZATION, "bearer token-1")
			.expect("Header fixture should be valid.")
			.with_body("x=1");
		let response = transport.send(&mut request).await.expect("Mock should accept the request.");

		mock.assert_async().await;

		assert_eq!(response.status, StatusCode::CREATED);
		assert_eq!(response.text(), "{\"metadata\":{}}");
		assert!(request.body.is_none(), "Sending must consume the request body.");
	}

	#[tokio::test]
	async fn classifies_invalid_token_rejections() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.method(GET).path("/v2/apps");
				then.status(401)
					.header("content-type", "application/json")
					.body("{\"error\":\"invalid_token\",\"error_description\":\"Token expired\"}");
			})
			.await;

		let transport = ReqwestTransport::default();
		let mut request = Request::get(url(&server.url("/v2/apps")));
		let err = transport.send(&mut request).await.expect_err("401 should be an error.");

		assert!(err.is_invalid_auth_token(), "Unexpected error variant: {err:?}.");
	}

	#[tokio::test]
	async fn unreachable_hosts_surface_as_transport_errors() {
		let transport = ReqwestTransport::default();
		let mut request = Request::get(url("http://127.0.0.1:9/unreachable"));
		let err = transport.send(&mut request).await.expect_err("Port 9 should refuse.");

		assert!(matches!(err, Error::Transport(_) | Error::Transient(_)));
	}
}
