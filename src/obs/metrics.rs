// self
use crate::obs::{RefreshOutcome, SendKind, SendOutcome};

/// Records a send outcome via the global metrics recorder (when enabled).
pub fn record_send_outcome(kind: SendKind, outcome: SendOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_auth_transport_send_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a provider refresh outcome via the global metrics recorder (when enabled).
pub fn record_refresh_outcome(outcome: RefreshOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_auth_transport_refresh_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}
