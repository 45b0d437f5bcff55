//! Error taxonomy for gateway calls and payment submission.

use http::StatusCode;

/// Errors raised by a single request to the payment gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    UpstreamUnavailable {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to decode response: {context}: {source}")]
    Protocol {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Boxed error produced by a caller-supplied billable-transaction lookup.
pub type LocalDataSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::submitter::PaymentSubmitter::submit_payment`].
///
/// Each gateway-side variant maps one-to-one onto a [`GatewayError`] kind, so the
/// failure that exhausted the retry budget reaches the caller with its kind intact.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway transport failure: {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Payment gateway unavailable: {context} returned {status}: {body}")]
    UpstreamUnavailable {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Payment gateway protocol error: {context}: {source}")]
    Protocol {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to retrieve billable transactions: {0}")]
    LocalData(#[source] LocalDataSource),
    #[error("Unexpected number of payments: {expected} billable != {actual} recorded")]
    ReconciliationMismatch { expected: usize, actual: usize },
    #[error("Payment submission cancelled")]
    Cancelled,
    #[error("Invalid payment gateway URL: {context}: {source}")]
    InvalidUrl {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
}

impl PaymentError {
    /// Short stable label of the error kind, used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::Transport { .. } => "transport",
            PaymentError::UpstreamUnavailable { .. } => "upstream_unavailable",
            PaymentError::Protocol { .. } => "protocol",
            PaymentError::LocalData(_) => "local_data",
            PaymentError::ReconciliationMismatch { .. } => "reconciliation_mismatch",
            PaymentError::Cancelled => "cancelled",
            PaymentError::InvalidUrl { .. } => "invalid_url",
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::UrlParse { context, source } => PaymentError::InvalidUrl { context, source },
            GatewayError::Transport { context, source } => PaymentError::Transport { context, source },
            GatewayError::UpstreamUnavailable {
                context,
                status,
                body,
            } => PaymentError::UpstreamUnavailable {
                context,
                status,
                body,
            },
            GatewayError::Protocol { context, source } => PaymentError::Protocol { context, source },
        }
    }
}
