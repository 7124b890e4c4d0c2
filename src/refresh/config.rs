//! Token endpoint settings used by [`super::RefreshingTokenProvider`].

// crates.io
use url::Host;
// self
use crate::{_prelude::*, auth::TokenSecret, transport};

/// Errors produced by [`RefreshConfigBuilder::build`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshConfigError {
	/// The client identifier was empty.
	#[error("A client identifier is required.")]
	MissingClientId,
	/// Tokens would travel in clear text to a remote host.
	#[error("The token endpoint must use HTTPS unless it is a loopback address: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// How the client authenticates itself to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Refresh grant settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
	/// Token endpoint receiving `grant_type=refresh_token` calls.
	pub token_endpoint: Url,
	/// OAuth client identifier.
	pub client_id: String,
	/// Client secret; public clients (such as CLIs) often have none.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Client authentication mode.
	#[serde(default)]
	pub auth_method: ClientAuthMethod,
}
impl RefreshConfig {
	/// Starts a builder for `token_endpoint`.
	pub fn builder(token_endpoint: Url) -> RefreshConfigBuilder {
		RefreshConfigBuilder {
			token_endpoint,
			client_id: String::new(),
			client_secret: None,
			auth_method: ClientAuthMethod::default(),
		}
	}

	/// Returns `true` when grants sent to this endpoint pass through an
	/// [`crate::transport::AuthTransport`] untouched.
	///
	/// Only endpoints whose URL contains `/oauth/token` qualify. For any other endpoint a
	/// decorated transport would replace the client credentials with the bearer token, so the
	/// provider must be given the undecorated transport.
	pub fn is_exempt_from_auth(&self) -> bool {
		transport::is_token_endpoint(&self.token_endpoint)
	}

	/// Re-runs builder validation, e.g. after deserializing from a config file.
	pub fn validate(&self) -> Result<(), RefreshConfigError> {
		if self.client_id.is_empty() {
			return Err(RefreshConfigError::MissingClientId);
		}

		validate_endpoint(&self.token_endpoint)
	}
}

/// Builder for [`RefreshConfig`].
#[derive(Clone, Debug)]
pub struct RefreshConfigBuilder {
	token_endpoint: Url,
	client_id: String,
	client_secret: Option<TokenSecret>,
	auth_method: ClientAuthMethod,
}
impl RefreshConfigBuilder {
	/// Sets the client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = client_id.into();

		self
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Overrides the client authentication mode.
	pub fn auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.auth_method = method;

		self
	}

	/// Validates the settings and produces a [`RefreshConfig`].
	pub fn build(self) -> Result<RefreshConfig, RefreshConfigError> {
		let config = RefreshConfig {
			token_endpoint: self.token_endpoint,
			client_id: self.client_id,
			client_secret: self.client_secret,
			auth_method: self.auth_method,
		};

		config.validate()?;

		Ok(config)
	}
}

fn validate_endpoint(url: &Url) -> Result<(), RefreshConfigError> {
	let loopback = match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	};

	if url.scheme() == "https" || loopback {
		Ok(())
	} else {
		Err(RefreshConfigError::InsecureEndpoint { url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::url;

	#[test]
	fn builder_requires_client_id() {
		let err = RefreshConfig::builder(url("https://login.example.com/oauth/token"))
			.build()
			.expect_err("Empty client identifiers should be rejected.");

		assert_eq!(err, RefreshConfigError::MissingClientId);
	}

	#[test]
	fn only_oauth_token_paths_are_exempt_from_auth() {
		let exempt = RefreshConfig::builder(url("https://login.example.com/oauth/token"))
			.client_id("cf")
			.build()
			.expect("Refresh config fixture should be valid.");
		let decorated = RefreshConfig::builder(url("https://idp.example.com/connect/token"))
			.client_id("cf")
			.build()
			.expect("Refresh config fixture should be valid.");

		assert!(exempt.is_exempt_from_auth());
		assert!(!decorated.is_exempt_from_auth());
	}

	#[test]
	fn builder_enforces_https_for_remote_hosts() {
		let err = RefreshConfig::builder(url("http://login.example.com/oauth/token"))
			.client_id("cf")
			.build()
			.expect_err("Plain HTTP to a remote host should be rejected.");

		assert!(matches!(err, RefreshConfigError::InsecureEndpoint { .. }));

		for endpoint in [
			"http://127.0.0.1:8080/oauth/token",
			"http://localhost/oauth/token",
			"http://[::1]:9000/oauth/token",
		] {
			RefreshConfig::builder(url(endpoint))
				.client_id("cf")
				.build()
				.expect("Loopback endpoints should be accepted over HTTP.");
		}
	}

	#[test]
	fn config_deserializes_with_defaults() {
		let config: RefreshConfig = serde_json::from_str(
			r#"{"token_endpoint":"https://login.example.com/oauth/token","client_id":"cf"}"#,
		)
		.expect("Minimal configuration should deserialize.");

		assert_eq!(config.auth_method, ClientAuthMethod::ClientSecretBasic);
		assert!(config.client_secret.is_none());
		assert!(config.validate().is_ok());

		let post: ClientAuthMethod = serde_json::from_str("\"client_secret_post\"")
			.expect("Auth methods should use snake_case names.");

		assert_eq!(post, ClientAuthMethod::ClientSecretPost);
	}
}
