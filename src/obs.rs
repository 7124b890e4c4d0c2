//! Optional observability for decorated sends and token refreshes.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to wrap every decorated send in an `oauth2_auth_transport.send` span (fields
//!   `method` and `stage`) and every provider refresh in an `oauth2_auth_transport.refresh` span.
//! - Enable `metrics` to increment `oauth2_auth_transport_send_total` (labels `kind` + `outcome`)
//!   and `oauth2_auth_transport_refresh_total` (label `outcome`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Which leg of the decorator issued a send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendKind {
	/// First send carrying the provider's current token.
	Authenticated,
	/// Refresh-grant call forwarded without an `Authorization` header.
	RefreshExempt,
	/// Second send after a successful refresh.
	Replay,
}
impl SendKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SendKind::Authenticated => "authenticated",
			SendKind::RefreshExempt => "refresh_exempt",
			SendKind::Replay => "replay",
		}
	}
}
impl Display for SendKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendOutcome {
	/// The inner transport was invoked.
	Attempt,
	/// The inner transport returned a response.
	Success,
	/// The inner transport rejected the access token.
	InvalidToken,
	/// Any other failure.
	Failure,
}
impl SendOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SendOutcome::Attempt => "attempt",
			SendOutcome::Success => "success",
			SendOutcome::InvalidToken => "invalid_token",
			SendOutcome::Failure => "failure",
		}
	}

	/// Classifies the result of an inner send.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => SendOutcome::Success,
			Err(e) if e.is_invalid_auth_token() => SendOutcome::InvalidToken,
			Err(_) => SendOutcome::Failure,
		}
	}
}
impl Display for SendOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each provider refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefreshOutcome {
	/// A refresh was requested.
	Attempt,
	/// The token endpoint issued a new token.
	Success,
	/// Another caller refreshed while this one waited; no round trip happened.
	Coalesced,
	/// The refresh failed and the error was returned to the caller.
	Failure,
}
impl RefreshOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RefreshOutcome::Attempt => "attempt",
			RefreshOutcome::Success => "success",
			RefreshOutcome::Coalesced => "coalesced",
			RefreshOutcome::Failure => "failure",
		}
	}
}
impl Display for RefreshOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
