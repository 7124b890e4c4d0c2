//! Token record held by refreshing providers and persisted by stores.

// self
use crate::{_prelude::*, auth::secret::TokenSecret};

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Access/refresh token pair as issued by the token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the token endpoint (`bearer`), used as the header prefix.
	pub token_type: String,
	/// Refresh token secret, if one was issued.
	pub refresh_token: Option<TokenSecret>,
	/// Issued-at instant.
	pub issued_at: OffsetDateTime,
	/// Expiry instant, when the token endpoint reported one.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Full `Authorization` header value: `"<token_type> <access_token>"`.
	///
	/// An empty token type yields the bare access token.
	pub fn authorization_value(&self) -> TokenSecret {
		if self.token_type.is_empty() {
			self.access_token.clone()
		} else {
			TokenSecret::new(format!("{} {}", self.token_type, self.access_token.expose()))
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug)]
pub struct TokenRecordBuilder {
	access_token: Option<TokenSecret>,
	token_type: String,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	const DEFAULT_TOKEN_TYPE: &'static str = "bearer";

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the token type (defaults to `bearer`); pass an empty string for bare tokens.
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = token_type.into();

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = self.expires_at.or_else(|| self.expires_in.map(|delta| issued_at + delta));

		Ok(TokenRecord {
			access_token,
			token_type: self.token_type,
			refresh_token: self.refresh_token,
			issued_at,
			expires_at,
		})
	}
}
impl Default for TokenRecordBuilder {
	fn default() -> Self {
		Self {
			access_token: None,
			token_type: Self::DEFAULT_TOKEN_TYPE.into(),
			refresh_token: None,
			issued_at: None,
			expires_at: None,
			expires_in: None,
		}
	}
}
