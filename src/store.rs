//! Token persistence shared by refreshing providers across processes.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenRecord, TokenSecret},
};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for token records keyed by session.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the record for `session`.
	fn save<'a>(&'a self, session: &'a SessionId, record: TokenRecord) -> StoreFuture<'a, ()>;

	/// Fetches the record for `session`, if present.
	fn fetch<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Atomically replaces the record if its refresh token still equals `expected_refresh`.
	fn compare_and_swap_refresh<'a>(
		&'a self,
		session: &'a SessionId,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but another writer already rotated its refresh secret.
	RefreshMismatch,
	/// No record exists for the session.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Snapshot could not be encoded or decoded.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

fn refresh_matches(current: Option<&TokenSecret>, expected: Option<&str>) -> bool {
	match (current.map(TokenSecret::expose), expected) {
		(None, None) => true,
		(Some(cur), Some(exp)) => cur == exp,
		_ => false,
	}
}

/// Applies a compare-and-swap to an in-memory map, returning the outcome.
fn swap_in_map(
	map: &mut HashMap<SessionId, TokenRecord>,
	session: &SessionId,
	expected_refresh: Option<&str>,
	replacement: TokenRecord,
) -> CompareAndSwapOutcome {
	match map.get_mut(session) {
		Some(existing) if refresh_matches(existing.refresh_token.as_ref(), expected_refresh) => {
			*existing = replacement;

			CompareAndSwapOutcome::Updated
		},
		Some(_) => CompareAndSwapOutcome::RefreshMismatch,
		None => CompareAndSwapOutcome::Missing,
	}
}
