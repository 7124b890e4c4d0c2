//! Crate-level error types shared by transports, token providers, and stores.

// std
use std::io;
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by transports and token providers.
///
/// The variant is the classification: [`Error::InvalidAuthToken`] is the only outcome the
/// authenticating decorator reacts to, everything else passes through untouched.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The request body stream failed while it was being buffered.
	#[error("Failed to read the request body.")]
	BodyRead {
		/// Underlying stream failure.
		#[source]
		source: io::Error,
	},
	/// The remote side rejected the presented access token.
	#[error("Access token was rejected: {reason}.")]
	InvalidAuthToken {
		/// Remote- or transport-supplied reason string.
		reason: String,
	},
	/// The request was unauthorized for a reason other than an invalid access token.
	#[error("Request is unauthorized: {reason}.")]
	Unauthorized {
		/// Remote- or transport-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., an expired or revoked refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or transport-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or transport-supplied reason string.
		reason: String,
	},
	/// Token lacks the scopes the remote side requires.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or transport-supplied reason string.
		reason: String,
	},
	/// Remote side rejected the request with a client error.
	#[error("Request was rejected with HTTP {status}: {reason}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Remote- or transport-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the error is the invalid-auth-token classification.
	pub fn is_invalid_auth_token(&self) -> bool {
		matches!(self, Self::InvalidAuthToken { .. })
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A header value (usually a provider-supplied token) contains forbidden characters.
	#[error("Header value contains characters that cannot be sent.")]
	InvalidHeaderValue(#[from] oauth2::http::header::InvalidHeaderValue),
	/// A URL could not be parsed or converted.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Refresh configuration failed validation.
	#[error(transparent)]
	Refresh(#[from] crate::refresh::RefreshConfigError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// The current token record has no refresh token to exchange.
	#[error("Current token record is missing a refresh token.")]
	MissingRefreshToken,
	/// The store holds no record for the requested session.
	#[error("No token record is stored for session `{session}`.")]
	MissingTokenRecord {
		/// Session identifier that was looked up.
		session: String,
	},
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry later).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned a temporary failure or timed out.
	#[error("Upstream is temporarily unavailable: {message}.")]
	Upstream {
		/// Remote- or transport-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
	},
}

/// Transport-level failures.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
