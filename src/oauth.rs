//! Refresh-token grants executed by the `oauth2` crate over any [`Transport`].
//!
//! [`TransportHttpClient`] adapts a crate [`Transport`] to [`oauth2::AsyncHttpClient`], so the
//! grant request travels through the same decorator chain as every other call. When that chain
//! contains an [`crate::transport::AuthTransport`], the refresh-grant exemption keeps the call
//! free of the bearer token being replaced.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpRequest,
	HttpResponse, RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	error::{ConfigError, TransientError},
	http::{self, Body, ErrorClassifier, ErrorContext, Request, Response, Transport},
	refresh::{ClientAuthMethod, RefreshConfig},
};

type RefreshClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type HttpFuture<'c> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'c + Send>>;

/// Status details of the most recent response seen by a [`TransportHttpClient`].
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// [`AsyncHttpClient`] that sends `oauth2` requests through a crate [`Transport`].
pub struct TransportHttpClient {
	transport: Arc<dyn Transport>,
	last_response: Mutex<Option<ResponseMetadata>>,
}
impl TransportHttpClient {
	/// Wraps `transport`.
	pub fn new(transport: Arc<dyn Transport>) -> Self {
		Self { transport, last_response: Mutex::default() }
	}

	/// Returns and clears the metadata captured from the last successful send.
	pub fn take_metadata(&self) -> Option<ResponseMetadata> {
		self.last_response.lock().take()
	}
}
impl<'c> AsyncHttpClient<'c> for TransportHttpClient {
	type Error = Error;
	type Future = HttpFuture<'c>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.last_response.lock().take();

			let mut request = into_request(request)?;
			let response = self.transport.send(&mut request).await?;

			*self.last_response.lock() = Some(ResponseMetadata {
				status: Some(response.status.as_u16()),
				retry_after: http::classify::parse_retry_after(&response.headers),
			});

			Ok(into_http_response(response))
		})
	}
}
impl Debug for TransportHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TransportHttpClient(..)")
	}
}

/// Exchanges `refresh_token` at the configured token endpoint.
///
/// The returned record carries a refresh token only if the endpoint rotated it.
pub async fn exchange_refresh_token(
	config: &RefreshConfig,
	transport: Arc<dyn Transport>,
	classifier: &dyn ErrorClassifier,
	refresh_token: &TokenSecret,
) -> Result<TokenRecord> {
	let client = build_client(config)?;
	let http_client = TransportHttpClient::new(transport);
	let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
	let response = client
		.exchange_refresh_token(&refresh_secret)
		.request_async(&http_client)
		.await
		.map_err(|e| map_request_error(classifier, http_client.take_metadata(), e))?;

	map_token_response(response)
}

fn build_client(config: &RefreshConfig) -> Result<RefreshClient> {
	let token_url = TokenUrl::new(config.token_endpoint.to_string())
		.map_err(|source| ConfigError::InvalidUrl { source })?;
	let mut client =
		BasicClient::new(ClientId::new(config.client_id.clone())).set_token_uri(token_url);

	if let Some(secret) = &config.client_secret {
		client = client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
	}
	if config.auth_method == ClientAuthMethod::ClientSecretPost {
		client = client.set_auth_type(AuthType::RequestBody);
	}

	Ok(client)
}

fn into_request(request: HttpRequest) -> Result<Request> {
	let (parts, body) = request.into_parts();
	let url =
		Url::parse(&parts.uri.to_string()).map_err(|source| ConfigError::InvalidUrl { source })?;

	Ok(Request {
		method: parts.method,
		url,
		headers: parts.headers,
		body: (!body.is_empty()).then(|| Body::from(body)),
	})
}

fn into_http_response(response: Response) -> HttpResponse {
	let mut http_response = HttpResponse::new(response.body.to_vec());

	*http_response.status_mut() = response.status;
	*http_response.headers_mut() = response.headers;

	http_response
}

fn map_token_response(response: BasicTokenResponse) -> Result<TokenRecord> {
	let mut builder = TokenRecord::builder()
		.access_token(response.access_token().secret().to_owned())
		.token_type(response.token_type().as_ref().to_ascii_lowercase())
		.issued_at(OffsetDateTime::now_utc());

	if let Some(expires_in) = response.expires_in() {
		let secs =
			i64::try_from(expires_in.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		builder = builder.expires_in(Duration::seconds(secs));
	}
	if let Some(refresh) = response.refresh_token() {
		builder = builder.refresh_token(refresh.secret().to_owned());
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn map_request_error(
	classifier: &dyn ErrorClassifier,
	meta: Option<ResponseMetadata>,
	err: RequestTokenError<Error, BasicErrorResponse>,
) -> Error {
	match err {
		RequestTokenError::Request(e) => e,
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(classifier, meta, &response),
		RequestTokenError::Parse(source, _body) =>
			TransientError::TokenResponseParse { source }.into(),
		RequestTokenError::Other(message) => TransientError::Upstream {
			message: format!("Token endpoint returned an unexpected response: {message}"),
			status: meta.as_ref().and_then(|meta| meta.status),
			retry_after: meta.and_then(|meta| meta.retry_after),
		}
		.into(),
	}
}

fn map_server_response_error(
	classifier: &dyn ErrorClassifier,
	meta: Option<ResponseMetadata>,
	response: &BasicErrorResponse,
) -> Error {
	let mut ctx = ErrorContext::new().with_error_code(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}

	let retry_after = match meta {
		Some(ResponseMetadata { status, retry_after }) => {
			if let Some(status) = status {
				ctx = ctx.with_http_status(status);
			}

			retry_after
		},
		None => None,
	};

	http::classify_context(classifier, &ctx, retry_after)
}
