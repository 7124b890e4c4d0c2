#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
// self
use oauth2_auth_transport::{
	auth::{SessionId, StaticTokenProvider, TokenProvider, TokenRecord},
	error::Error,
	http::{ReqwestTransport, Request, Transport, TransportExt},
	refresh::{RefreshConfig, RefreshingTokenProvider},
	store::{MemoryStore, TokenStore},
	transport::AuthLayer,
	url::Url,
};

const EXPIRED_BODY: &str =
	r#"{"error":"invalid_token","error_description":"Invalid access token: expired"}"#;
const ROTATED_BODY: &str = r#"{"access_token":"access-new","token_type":"bearer","refresh_token":"refresh-new","expires_in":599}"#;
// base64("cf:shh")
const CLIENT_BASIC: &str = "Basic Y2Y6c2ho";

fn url(server: &MockServer, path: &str) -> Url {
	Url::parse(&server.url(path)).expect("Mock server URL should parse.")
}

fn config(server: &MockServer) -> RefreshConfig {
	RefreshConfig::builder(url(server, "/oauth/token"))
		.client_id("cf")
		.client_secret("shh")
		.build()
		.expect("Loopback token endpoints should be accepted.")
}

fn record(access: &str, refresh: &str) -> TokenRecord {
	TokenRecord::builder()
		.access_token(access)
		.refresh_token(refresh)
		.build()
		.expect("Token record fixture should build successfully.")
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(POST).path("/v2/apps").header("authorization", "bearer access-old");
			then.status(401).header("content-type", "application/json").body(EXPIRED_BODY);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("authorization", CLIENT_BASIC)
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=refresh-old");
			then.status(200).header("content-type", "application/json").body(ROTATED_BODY);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v2/apps")
				.header("authorization", "bearer access-new")
				.body("{\"name\":\"my-app\"}");
			then.status(201).body("{\"metadata\":{\"guid\":\"1\"}}");
		})
		.await;
	let provider = Arc::new(RefreshingTokenProvider::new(
		config(&server),
		Arc::new(ReqwestTransport::default()),
		record("access-old", "refresh-old"),
	));
	let client = ReqwestTransport::default().with_auth(provider.clone());
	let mut request = Request::post(url(&server, "/v2/apps")).with_body("{\"name\":\"my-app\"}");
	let response = client.send(&mut request).await.expect("Replay with a new token should succeed.");

	stale.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
	fresh.assert_calls_async(1).await;

	assert_eq!(response.status.as_u16(), 201);
	assert_eq!(provider.access_token().expose(), "bearer access-new");
	assert_eq!(provider.metrics().successes(), 1);
}

#[tokio::test]
async fn revoked_refresh_token_fails_without_replay() {
	let server = MockServer::start_async().await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/apps");
			then.status(401).header("content-type", "application/json").body(EXPIRED_BODY);
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(401)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#);
		})
		.await;
	let provider = Arc::new(RefreshingTokenProvider::new(
		config(&server),
		Arc::new(ReqwestTransport::default()),
		record("access-old", "refresh-old"),
	));
	let client = ReqwestTransport::default().with_auth(provider.clone());
	let mut request = Request::get(url(&server, "/v2/apps"));
	let err = client.send(&mut request).await.expect_err("A revoked grant ends the call.");

	api.assert_calls_async(1).await;
	token.assert_calls_async(1).await;

	assert!(matches!(err, Error::InvalidGrant { ref reason } if reason == "Refresh token revoked"));
	assert_eq!(provider.access_token().expose(), "bearer access-old");
	assert_eq!(provider.metrics().failures(), 1);
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh() {
	let server = MockServer::start_async().await;
	let stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/apps").header("authorization", "bearer access-old");
			then.status(401)
				.header("content-type", "application/json")
				.body(EXPIRED_BODY)
				.delay(std::time::Duration::from_millis(20));
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(ROTATED_BODY)
				.delay(std::time::Duration::from_millis(100));
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/v2/apps").header("authorization", "bearer access-new");
			then.status(200).body("{\"resources\":[]}");
		})
		.await;
	let provider = Arc::new(RefreshingTokenProvider::new(
		config(&server),
		Arc::new(ReqwestTransport::default()),
		record("access-old", "refresh-old"),
	));
	let client = ReqwestTransport::default().with_auth(provider.clone());
	let mut first = Request::get(url(&server, "/v2/apps"));
	let mut second = Request::get(url(&server, "/v2/apps"));
	let (first, second) = tokio::join!(client.send(&mut first), client.send(&mut second));

	first.expect("First caller should recover.");
	second.expect("Second caller should recover.");
	stale.assert_calls_async(2).await;
	token.assert_calls_async(1).await;
	fresh.assert_calls_async(2).await;

	assert_eq!(provider.metrics().coalesced(), 1);
}

#[tokio::test]
async fn refresh_through_a_decorated_chain_keeps_client_credentials() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("authorization", CLIENT_BASIC)
				.body_includes("grant_type=refresh_token");
			then.status(200).header("content-type", "application/json").body(ROTATED_BODY);
		})
		.await;
	let chain = AuthLayer::new(Arc::new(StaticTokenProvider::new("bearer must-not-leak")))
		.wrap(ReqwestTransport::default());
	let provider = RefreshingTokenProvider::new(
		config(&server),
		Arc::new(chain),
		record("access-old", "refresh-old"),
	);

	provider.refresh_token().await.expect("The refresh grant should bypass bearer injection.");
	token.assert_calls_async(1).await;

	assert_eq!(provider.access_token().expose(), "bearer access-new");
}

#[tokio::test]
async fn rotations_are_shared_through_the_store() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").body_includes("refresh_token=refresh-old");
			then.status(200).header("content-type", "application/json").body(ROTATED_BODY);
		})
		.await;
	let store = Arc::new(MemoryStore::default());
	let session = SessionId::new("api.example.com").expect("Session fixture should be valid.");

	store
		.save(&session, record("access-old", "refresh-old"))
		.await
		.expect("Seeding the store should succeed.");

	let provider = RefreshingTokenProvider::from_store(
		config(&server),
		Arc::new(ReqwestTransport::default()),
		store.clone(),
		session.clone(),
	)
	.await
	.expect("The stored session should load.");

	provider.refresh_token().await.expect("Refresh should succeed.");
	token.assert_calls_async(1).await;

	let stored = store
		.fetch(&session)
		.await
		.expect("Token store fetch should succeed.")
		.expect("Record should remain present after refresh.");

	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(stored.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-new"));
}
