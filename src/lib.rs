//! Authenticating HTTP transport decorator. Attaches bearer tokens to outgoing requests,
//! refreshes the token when the remote side rejects it, and replays the request exactly once.
//!
//! The crate is organized around the [`http::Transport`] trait. [`transport::AuthTransport`]
//! decorates any inner transport with token injection and the refresh-and-replay policy, while
//! [`refresh::RefreshingTokenProvider`] supplies tokens and performs `refresh_token` grants over
//! a transport of its own.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod refresh;
pub mod store;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fakes for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{RefreshFuture, TokenProvider, TokenSecret},
		http::{Request, Response, Transport, TransportFuture},
	};

	/// Snapshot of a request as the inner transport observed it.
	#[derive(Clone, Debug)]
	pub struct SeenRequest {
		/// HTTP method of the request.
		pub method: Method,
		/// Target URL.
		pub url: Url,
		/// `Authorization` header value, if one was attached.
		pub authorization: Option<String>,
		/// Body bytes consumed by the send, if the request carried a body.
		pub body: Option<Bytes>,
	}

	/// Inner transport that replays scripted outcomes and records every request it sees.
	///
	/// Once the script runs dry it answers `200 OK`.
	#[derive(Default)]
	pub struct ScriptedTransport {
		outcomes: Mutex<Vec<Result<Response>>>,
		seen: Mutex<Vec<SeenRequest>>,
	}
	impl ScriptedTransport {
		/// Creates a transport that returns the provided outcomes in order.
		pub fn new(outcomes: impl IntoIterator<Item = Result<Response>>) -> Self {
			let mut outcomes = outcomes.into_iter().collect::<Vec<_>>();

			outcomes.reverse();

			Self { outcomes: Mutex::new(outcomes), seen: Mutex::default() }
		}

		/// Returns every request observed so far.
		pub fn seen(&self) -> Vec<SeenRequest> {
			self.seen.lock().clone()
		}

		/// Returns the number of `send` calls observed so far.
		pub fn calls(&self) -> usize {
			self.seen.lock().len()
		}
	}
	impl Transport for ScriptedTransport {
		fn send<'a>(&'a self, request: &'a mut Request) -> TransportFuture<'a> {
			Box::pin(async move {
				let body = match request.take_body() {
					Some(body) =>
						Some(body.collect().await.map_err(|source| Error::BodyRead { source })?),
					None => None,
				};
				let authorization = request
					.header(AUTHORIZATION)
					.map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

				self.seen.lock().push(SeenRequest {
					method: request.method.clone(),
					url: request.url.clone(),
					authorization,
					body,
				});

				self.outcomes.lock().pop().unwrap_or_else(|| Ok(Response::new(StatusCode::OK)))
			})
		}
	}

	/// Token provider whose refresh rotates through scripted outcomes.
	///
	/// A successful refresh swaps in the next token from the rotation list.
	pub struct ScriptedTokenProvider {
		current: RwLock<String>,
		rotations: Mutex<Vec<String>>,
		refresh_outcomes: Mutex<Vec<Result<()>>>,
		refreshes: Mutex<usize>,
	}
	impl ScriptedTokenProvider {
		/// Creates a provider that starts with `initial` and rotates through `rotations`.
		pub fn new(initial: &str, rotations: impl IntoIterator<Item = &'static str>) -> Self {
			let mut rotations = rotations.into_iter().map(str::to_owned).collect::<Vec<_>>();

			rotations.reverse();

			Self {
				current: RwLock::new(initial.to_owned()),
				rotations: Mutex::new(rotations),
				refresh_outcomes: Mutex::default(),
				refreshes: Mutex::new(0),
			}
		}

		/// Makes the next refresh calls return the provided outcomes in order.
		pub fn with_refresh_outcomes(self, outcomes: impl IntoIterator<Item = Result<()>>) -> Self {
			let mut outcomes = outcomes.into_iter().collect::<Vec<_>>();

			outcomes.reverse();

			*self.refresh_outcomes.lock() = outcomes;

			self
		}

		/// Returns the number of refresh calls observed so far.
		pub fn refreshes(&self) -> usize {
			*self.refreshes.lock()
		}
	}
	impl TokenProvider for ScriptedTokenProvider {
		fn access_token(&self) -> TokenSecret {
			TokenSecret::new(self.current.read().clone())
		}

		fn refresh_token(&self) -> RefreshFuture<'_> {
			Box::pin(async move {
				*self.refreshes.lock() += 1;

				self.refresh_outcomes.lock().pop().unwrap_or(Ok(()))?;

				if let Some(next) = self.rotations.lock().pop() {
					*self.current.write() = next;
				}

				Ok(())
			})
		}
	}

	/// Builds a `401 invalid_token` failure as the inner transport would classify it.
	pub fn invalid_token() -> Error {
		Error::InvalidAuthToken { reason: "Invalid auth token: token expired".into() }
	}

	/// Parses a URL fixture.
	pub fn url(value: &str) -> Url {
		Url::parse(value).expect("URL fixture should parse.")
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use bytes::Bytes;
	pub use oauth2::http::{
		HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header::AUTHORIZATION,
	};
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
