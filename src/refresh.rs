//! Token provider that renews access tokens with `grant_type=refresh_token`.
//!
//! [`RefreshingTokenProvider`] keeps the live [`TokenRecord`] in memory, serves its header value
//! without I/O, and on [`TokenProvider::refresh_token`] runs a single guarded exchange:
//! concurrent callers wait on one singleflight lock and those that arrive while a refresh is in
//! flight reuse its result instead of spending the refresh token twice. When a [`TokenStore`] is
//! attached, rotations are persisted through `compare_and_swap_refresh`, so separate processes
//! sharing a store converge on the same token.

mod config;
mod metrics;

pub use config::*;
pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{RefreshFuture, SessionId, TokenProvider, TokenRecord, TokenSecret},
	error::ConfigError,
	http::{DefaultErrorClassifier, ErrorClassifier, Transport},
	oauth,
	obs::{self, RefreshOutcome, TransportSpan},
	store::{CompareAndSwapOutcome, TokenStore},
};

/// [`TokenProvider`] backed by an OAuth token endpoint.
///
/// The token endpoint is reached through its own [`Transport`], usually the undecorated client.
/// An [`crate::transport::AuthTransport`] may be passed only when
/// [`RefreshConfig::is_exempt_from_auth`] holds; otherwise the decorator overwrites the client
/// credentials on the grant request.
pub struct RefreshingTokenProvider {
	config: RefreshConfig,
	transport: Arc<dyn Transport>,
	classifier: Arc<dyn ErrorClassifier>,
	record: RwLock<TokenRecord>,
	generation: AtomicU64,
	singleflight: AsyncMutex<()>,
	store: Option<StoreBinding>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshingTokenProvider {
	/// Creates a provider that starts from `record`.
	pub fn new(config: RefreshConfig, transport: Arc<dyn Transport>, record: TokenRecord) -> Self {
		Self {
			config,
			transport,
			classifier: Arc::new(DefaultErrorClassifier),
			record: RwLock::new(record),
			generation: AtomicU64::new(0),
			singleflight: AsyncMutex::new(()),
			store: None,
			metrics: Arc::default(),
		}
	}

	/// Loads the initial record for `session` from `store` and keeps persisting rotations there.
	pub async fn from_store(
		config: RefreshConfig,
		transport: Arc<dyn Transport>,
		store: Arc<dyn TokenStore>,
		session: SessionId,
	) -> Result<Self> {
		let record = store
			.fetch(&session)
			.await?
			.ok_or_else(|| ConfigError::MissingTokenRecord { session: session.to_string() })?;

		Ok(Self::new(config, transport, record).with_store(store, session))
	}

	/// Persists every rotation to `store` under `session`.
	pub fn with_store(mut self, store: Arc<dyn TokenStore>, session: SessionId) -> Self {
		self.store = Some(StoreBinding { store, session });

		self
	}

	/// Overrides the classifier applied to OAuth error payloads from the token endpoint.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Returns a copy of the live token record.
	pub fn current_record(&self) -> TokenRecord {
		self.record.read().clone()
	}

	async fn refresh(&self) -> Result<()> {
		let span = TransportSpan::refresh("refresh_token");

		self.metrics.record_attempt();
		obs::record_refresh_outcome(RefreshOutcome::Attempt);

		let result = span.instrument(self.refresh_once()).await;
		let outcome = match &result {
			Ok(outcome) => *outcome,
			Err(_) => RefreshOutcome::Failure,
		};

		match outcome {
			RefreshOutcome::Success => self.metrics.record_success(),
			RefreshOutcome::Coalesced => self.metrics.record_coalesced(),
			_ => self.metrics.record_failure(),
		}

		obs::record_refresh_outcome(outcome);

		result.map(|_| ())
	}

	async fn refresh_once(&self) -> Result<RefreshOutcome> {
		let observed = self.generation.load(Ordering::Acquire);
		let _singleflight = self.singleflight.lock().await;

		if self.generation.load(Ordering::Acquire) != observed {
			#[cfg(feature = "tracing")]
			tracing::debug!("Token was refreshed by a concurrent caller.");

			return Ok(RefreshOutcome::Coalesced);
		}

		let expected_refresh =
			self.record.read().refresh_token.clone().ok_or(ConfigError::MissingRefreshToken)?;
		let mut updated = oauth::exchange_refresh_token(
			&self.config,
			self.transport.clone(),
			self.classifier.as_ref(),
			&expected_refresh,
		)
		.await?;

		if updated.refresh_token.is_none() {
			updated.refresh_token = Some(expected_refresh.clone());
		}

		let (updated, persisted) = match &self.store {
			Some(binding) => match binding.persist(&expected_refresh, updated.clone()).await {
				Ok(stored) => (stored, Ok(())),
				// The endpoint already rotated the grant, so the new record is the only usable one.
				Err(e) => {
					#[cfg(feature = "tracing")]
					tracing::warn!(
						error = %e,
						"Rotated token could not be persisted; keeping it in memory only."
					);

					(updated, Err(e))
				},
			},
			None => (updated, Ok(())),
		};

		self.adopt(updated);
		persisted?;

		Ok(RefreshOutcome::Success)
	}

	fn adopt(&self, record: TokenRecord) {
		*self.record.write() = record;
		self.generation.fetch_add(1, Ordering::AcqRel);
	}
}
impl TokenProvider for RefreshingTokenProvider {
	fn access_token(&self) -> TokenSecret {
		self.record.read().authorization_value()
	}

	fn refresh_token(&self) -> RefreshFuture<'_> {
		Box::pin(self.refresh())
	}
}
impl Debug for RefreshingTokenProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshingTokenProvider")
			.field("config", &self.config)
			.field("record", &*self.record.read())
			.field("generation", &self.generation.load(Ordering::Relaxed))
			.field("session", &self.store.as_ref().map(|binding| &binding.session))
			.finish_non_exhaustive()
	}
}

struct StoreBinding {
	store: Arc<dyn TokenStore>,
	session: SessionId,
}
impl StoreBinding {
	/// Writes `updated` unless another process rotated first, in which case its record wins.
	async fn persist(&self, expected: &TokenSecret, updated: TokenRecord) -> Result<TokenRecord> {
		let outcome = self
			.store
			.compare_and_swap_refresh(&self.session, Some(expected.expose()), updated.clone())
			.await?;

		match outcome {
			CompareAndSwapOutcome::Updated => Ok(updated),
			CompareAndSwapOutcome::Missing => {
				self.store.save(&self.session, updated.clone()).await?;

				Ok(updated)
			},
			CompareAndSwapOutcome::RefreshMismatch => match self.store.fetch(&self.session).await? {
				Some(existing) => Ok(existing),
				None => {
					self.store.save(&self.session, updated.clone()).await?;

					Ok(updated)
				},
			},
		}
	}
}
