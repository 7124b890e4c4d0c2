// self
use crate::_prelude::*;

/// Resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type Instrumented<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type Instrumented<F> = F;

/// Span wrapped around a decorated send or a provider refresh.
#[derive(Clone, Debug)]
pub struct TransportSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl TransportSpan {
	/// Creates an `oauth2_auth_transport.send` span for one request.
	pub fn send(method: &Method, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("oauth2_auth_transport.send", method = method.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, stage);

			Self {}
		}
	}

	/// Creates an `oauth2_auth_transport.refresh` span for one provider refresh.
	pub fn refresh(stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_auth_transport.refresh", stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_output_through() {
		let span = TransportSpan::send(&Method::POST, "instrument_passes_output_through");

		assert_eq!(span.instrument(async { 42 }).await, 42);
		assert_eq!(TransportSpan::refresh("noop").instrument(async { "ok" }).await, "ok");
	}
}
