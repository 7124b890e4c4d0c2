//! Thread-safe in-memory [`TokenStore`] for single-process use and tests.

// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenRecord},
	store::{self, CompareAndSwapOutcome, StoreFuture, TokenStore},
};

/// Storage backend that keeps records in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<HashMap<SessionId, TokenRecord>>>);
impl MemoryStore {
	/// Returns the number of stored sessions.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no session is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStore for MemoryStore {
	fn save<'a>(&'a self, session: &'a SessionId, record: TokenRecord) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().insert(session.clone(), record);

			Ok(())
		})
	}

	fn fetch<'a>(&'a self, session: &'a SessionId) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.0.read().get(session).cloned()) })
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		session: &'a SessionId,
		expected_refresh: Option<&'a str>,
		replacement: TokenRecord,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			Ok(store::swap_in_map(&mut self.0.write(), session, expected_refresh, replacement))
		})
	}
}
