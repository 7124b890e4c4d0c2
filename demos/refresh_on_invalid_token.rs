//! Demonstrates a reqwest transport decorated with bearer-token injection: the first call is
//! rejected with `invalid_token`, the provider refreshes against the token endpoint, and the
//! request is replayed once with the new token.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use oauth2_auth_transport::{
	auth::{TokenProvider, TokenRecord},
	http::{ReqwestTransport, Request, Transport, TransportExt},
	refresh::{RefreshConfig, RefreshingTokenProvider},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let stale_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/apps").header("authorization", "bearer demo-expired");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_token\",\"error_description\":\"Invalid access token\"}");
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("grant_type=refresh_token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-fresh\",\"token_type\":\"bearer\",\"refresh_token\":\"demo-refresh-2\",\"expires_in\":599}",
			);
		})
		.await;
	let fresh_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/apps").header("authorization", "bearer demo-fresh");
			then.status(200).body("{\"total_results\":0,\"resources\":[]}");
		})
		.await;
	let config = RefreshConfig::builder(Url::parse(&server.url("/oauth/token"))?)
		.client_id("cf")
		.build()?;
	let record = TokenRecord::builder()
		.access_token("demo-expired")
		.refresh_token("demo-refresh-1")
		.build()?;
	let provider = Arc::new(RefreshingTokenProvider::new(
		config,
		Arc::new(ReqwestTransport::default()),
		record,
	));
	let client = ReqwestTransport::default().with_auth(provider.clone());
	let mut request = Request::get(Url::parse(&server.url("/v2/apps"))?);
	let response = client.send(&mut request).await?;

	println!("Status after replay: {}.", response.status);
	println!("Body: {}.", response.text());
	println!("Provider now serves a refreshed token: {}.", provider.access_token());

	stale_mock.assert_async().await;
	token_mock.assert_async().await;
	fresh_mock.assert_async().await;

	Ok(())
}
