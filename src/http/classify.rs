//! Typed classification of failed responses.
//!
//! Transports turn every non-success response into an [`Error`] variant here, so callers (and
//! the authenticating decorator in particular) never inspect status codes or bodies themselves.

// crates.io
use oauth2::http::header::RETRY_AFTER;
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::TransientError,
	http::Response,
};

const REJECTED_FALLBACK_STATUS: u16 = 400;

/// Hook that maps the details of a failed response onto an [`ErrorKind`].
///
/// Implementors are required to be `Send + Sync` and see only crate-owned data, so they stay
/// independent of whichever HTTP client produced the response.
pub trait ErrorClassifier: Send + Sync {
	/// Classifies the failure described by `ctx`.
	fn classify(&self, ctx: &ErrorContext) -> ErrorKind;
}

/// Canonical failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
	/// The presented access token was rejected; the only refreshable condition.
	InvalidAuthToken,
	/// Unauthorized for any other reason.
	Unauthorized,
	/// The grant (refresh token, code) was rejected.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// The token does not cover the required scopes.
	InsufficientScope,
	/// Failure is temporary and may succeed later.
	Transient,
	/// Any other client error.
	Rejected,
}

/// Context passed to classifiers.
///
/// Holds primitive data only (status code, structured error fields, body preview) so classifiers
/// never depend on a particular HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
	/// HTTP status code, when available.
	pub http_status: Option<u16>,
	/// Structured error code (`error`, `error_code`, or the first `errors[].title`).
	pub error_code: Option<String>,
	/// Structured description (`error_description`, `description`, or `errors[].detail`).
	pub error_description: Option<String>,
	/// Preview of the response body.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure() -> Self {
		Self { network_error: true, ..Self::default() }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the structured error code.
	pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
		self.error_code = Some(code.into());

		self
	}

	/// Adds the structured error description.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a bounded length.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Picks the most descriptive human-readable reason available.
	pub fn reason(&self) -> String {
		self.error_description
			.as_deref()
			.or(self.error_code.as_deref())
			.or(self.body_preview.as_deref().filter(|body| !body.trim().is_empty()))
			.map(str::to_owned)
			.or_else(|| {
				self.http_status
					.and_then(|code| StatusCode::from_u16(code).ok())
					.and_then(|status| status.canonical_reason())
					.map(str::to_owned)
			})
			.unwrap_or_else(|| "unknown failure".into())
	}
}

/// Default classifier.
///
/// Structured error fields win, then body text hints, then the HTTP status code. An
/// `invalid_token` hint only counts for a 401 or a status-less payload. Network failures are always
/// transient.
#[derive(Debug, Default)]
pub struct DefaultErrorClassifier;
impl Display for DefaultErrorClassifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-error-classifier")
	}
}
impl ErrorClassifier for DefaultErrorClassifier {
	fn classify(&self, ctx: &ErrorContext) -> ErrorKind {
		if ctx.network_error {
			return ErrorKind::Transient;
		}

		let hinted = ctx
			.error_code
			.as_deref()
			.and_then(match_exact_value)
			.or_else(|| ctx.error_description.as_deref().and_then(match_exact_value))
			.or_else(|| classify_text(ctx.error_description.as_deref()))
			.or_else(|| classify_text(ctx.body_preview.as_deref()));

		match hinted {
			// Only a 401 (or a status-less OAuth payload) may trigger a refresh and replay.
			Some(ErrorKind::InvalidAuthToken)
				if ctx.http_status.is_some_and(|status| status != 401) =>
				classify_status(ctx.http_status),
			Some(kind) => kind,
			None => classify_status(ctx.http_status),
		}
	}
}

/// Converts a failed response into the matching [`Error`] variant.
pub fn classify_response(classifier: &dyn ErrorClassifier, response: &Response) -> Error {
	let status = response.status.as_u16();
	let mut ctx = ErrorContext::new().with_http_status(status).with_body_preview(response.text());

	if let Ok(body) = serde_json::from_slice::<ErrorBody>(&response.body) {
		if let Some(code) = body.code() {
			ctx = ctx.with_error_code(code);
		}
		if let Some(description) = body.description() {
			ctx = ctx.with_error_description(description);
		}
	}

	classify_context(classifier, &ctx, parse_retry_after(&response.headers))
}

/// Classifies `ctx` and builds the matching [`Error`] variant.
///
/// Used directly when no [`Response`] exists, e.g. for OAuth error payloads already parsed by the
/// `oauth2` crate.
pub fn classify_context(
	classifier: &dyn ErrorClassifier,
	ctx: &ErrorContext,
	retry_after: Option<Duration>,
) -> Error {
	let reason = ctx.reason();

	match classifier.classify(ctx) {
		ErrorKind::InvalidAuthToken => Error::InvalidAuthToken { reason },
		ErrorKind::Unauthorized => Error::Unauthorized { reason },
		ErrorKind::InvalidGrant => Error::InvalidGrant { reason },
		ErrorKind::InvalidClient => Error::InvalidClient { reason },
		ErrorKind::InsufficientScope => Error::InsufficientScope { reason },
		ErrorKind::Transient =>
			TransientError::Upstream { message: reason, status: ctx.http_status, retry_after }.into(),
		ErrorKind::Rejected =>
			Error::Rejected { status: ctx.http_status.unwrap_or(REJECTED_FALLBACK_STATUS), reason },
	}
}

/// Error payload shapes: OAuth (`error`), Cloud Controller v2 (`error_code`), and
/// Cloud Controller v3 (`errors[]`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
	error: Option<String>,
	error_description: Option<String>,
	error_code: Option<String>,
	description: Option<String>,
	errors: Vec<ErrorEntry>,
}
impl ErrorBody {
	fn code(&self) -> Option<String> {
		self.error
			.clone()
			.or_else(|| self.error_code.clone())
			.or_else(|| self.errors.first().and_then(|entry| entry.title.clone()))
	}

	fn description(&self) -> Option<String> {
		self.error_description
			.clone()
			.or_else(|| self.description.clone())
			.or_else(|| self.errors.first().and_then(|entry| entry.detail.clone()))
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorEntry {
	title: Option<String>,
	detail: Option<String>,
}

/// Parses a `Retry-After` header given as delta-seconds or an RFC 2822 date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).ok()?));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn match_exact_value(value: &str) -> Option<ErrorKind> {
	let value = value.trim();

	if value.eq_ignore_ascii_case("invalid_token") || value.eq_ignore_ascii_case("cf-invalidauthtoken")
	{
		Some(ErrorKind::InvalidAuthToken)
	} else if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied")
	{
		Some(ErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope")
		|| value.eq_ignore_ascii_case("insufficient_scope")
	{
		Some(ErrorKind::InsufficientScope)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ErrorKind::Transient)
	} else {
		None
	}
}

fn classify_text(text: Option<&str>) -> Option<ErrorKind> {
	let lowered = text?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_token") || text.contains("cf-invalidauthtoken") =>
			Some(ErrorKind::InvalidAuthToken),
		text if text.contains("invalid_grant") => Some(ErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") => Some(ErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ErrorKind {
	match status {
		Some(401) => ErrorKind::Unauthorized,
		Some(429) => ErrorKind::Transient,
		Some(code) if code >= 500 => ErrorKind::Transient,
		Some(code) if code >= 400 => ErrorKind::Rejected,
		_ => ErrorKind::Transient,
	}
}
