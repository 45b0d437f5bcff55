//! HTTP access to the external payment gateway.
//!
//! [`PaymentGateway`] is the transport seam used by the submitter. [`PaymentGatewayClient`]
//! implements it over `reqwest`, talking to two endpoints relative to the gateway base URL:
//!
//! - `POST /payments` with a JSON [`PaymentRequest`] body. `204 No Content` is the only
//!   unambiguous success; any other status is reported as [`CreatePaymentOutcome::Ambiguous`].
//! - `GET /payments` answering `200 OK` with the gateway's full list of [`PaymentRecord`].
//!
//! Every request carries `Authorization: Bearer {token}`.
//!
//! ## Example
//!
//! ```rust
//! use ride_payment_gateway::gateway::PaymentGatewayClient;
//!
//! let gateway = PaymentGatewayClient::try_from("http://localhost:12345")
//!     .unwrap()
//!     .with_token("secret");
//! assert_eq!(gateway.payments_url().as_str(), "http://localhost:12345/payments");
//! ```
//!
//! The underlying [`reqwest::Client`] owns the connection pool. Build it once per process
//! (see [`crate::config::HttpPoolConfig::build_client`]) and hand it to every gateway client
//! with [`PaymentGatewayClient::with_client`].

use http::StatusCode;
use reqwest::Client;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Span, instrument};
use url::Url;

use crate::error::GatewayError;
use crate::types::{CreatePaymentOutcome, PaymentRecord, PaymentRequest};

/// Longest slice of an error response body kept for diagnostics.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Asynchronous interface to a payment gateway.
pub trait PaymentGateway {
    /// Sends `POST /payments`. The response body is drained and discarded.
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<CreatePaymentOutcome, GatewayError>> + Send;

    /// Sends `GET /payments` and decodes the gateway's payment ledger.
    fn list_payments(
        &self,
    ) -> impl Future<Output = Result<Vec<PaymentRecord>, GatewayError>> + Send;
}

impl<T: PaymentGateway + Send + Sync> PaymentGateway for Arc<T> {
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<CreatePaymentOutcome, GatewayError>> + Send {
        self.as_ref().create_payment(request)
    }

    fn list_payments(
        &self,
    ) -> impl Future<Output = Result<Vec<PaymentRecord>, GatewayError>> + Send {
        self.as_ref().list_payments()
    }
}

/// A client for a remote payment gateway.
#[derive(Clone)]
pub struct PaymentGatewayClient {
    /// Base URL of the gateway, always ending with `/`
    base_url: Url,
    /// Full URL of `POST /payments` and `GET /payments`
    payments_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Bearer credential sent with every request
    token: String,
    /// Optional per-request timeout
    timeout: Option<Duration>,
}

impl PaymentGatewayClient {
    /// Constructs a new client from a base URL, with an empty token and a fresh
    /// connection pool.
    ///
    /// The private pool suits tests and one-off tools only. Long-running callers should
    /// build one `reqwest::Client` per process and attach it with
    /// [`PaymentGatewayClient::with_client`], so concurrent submissions reuse connections.
    pub fn try_new(base_url: Url) -> Result<Self, GatewayError> {
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let payments_url =
            base_url
                .join("./payments")
                .map_err(|e| GatewayError::UrlParse {
                    context: "Failed to construct ./payments URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            payments_url,
            client: Client::new(),
            token: String::new(),
            timeout: None,
        })
    }

    /// Returns the base URL used by this client.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./payments` URL relative to [`PaymentGatewayClient::base_url`].
    pub fn payments_url(&self) -> &Url {
        &self.payments_url
    }

    /// Returns the configured timeout, if any.
    pub fn timeout(&self) -> &Option<Duration> {
        &self.timeout
    }

    /// Sets the bearer token for all future requests.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        let mut this = self.clone();
        this.token = token.into();
        this
    }

    /// Uses `client` (and its connection pool) for all future requests.
    pub fn with_client(&self, client: Client) -> Self {
        let mut this = self.clone();
        this.client = client;
        this
    }

    /// Sets a timeout for all future requests.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut this = self.clone();
        this.timeout = Some(timeout);
        this
    }

    /// Sends a `POST /payments` request to the gateway.
    #[instrument(
        name = "payment_gateway.create_payment",
        skip_all,
        fields(
            amount = request.amount,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty
        )
    )]
    pub async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<CreatePaymentOutcome, GatewayError> {
        let context = "POST /payments";
        let mut req = self
            .client
            .post(self.payments_url.clone())
            .bearer_auth(&self.token)
            .json(request);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let result = match req.send().await {
            Ok(http_response) => {
                let status = http_response.status();
                // Drained so the connection can go back to the pool.
                if let Err(e) = http_response.bytes().await {
                    tracing::debug!(error = %e, "Failed to drain {context} response body");
                }
                Ok(CreatePaymentOutcome::from_status(status))
            }
            Err(e) => Err(GatewayError::Transport { context, source: e }),
        };

        record_result_on_span(&result);

        result
    }

    /// Sends a `GET /payments` request to the gateway.
    #[instrument(
        name = "payment_gateway.list_payments",
        skip_all,
        fields(
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty
        )
    )]
    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>, GatewayError> {
        let context = "GET /payments";
        let mut req = self
            .client
            .get(self.payments_url.clone())
            .bearer_auth(&self.token);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let result = self.decode_payments(context, req).await;

        record_result_on_span(&result);

        result
    }

    async fn decode_payments(
        &self,
        context: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<Vec<PaymentRecord>, GatewayError> {
        let http_response = req
            .send()
            .await
            .map_err(|e| GatewayError::Transport { context, source: e })?;

        let status = http_response.status();
        if status != StatusCode::OK {
            let body = http_response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamUnavailable {
                context,
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = http_response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport { context, source: e })?;
        // A `null` ledger is an empty one.
        serde_json::from_slice::<Option<Vec<PaymentRecord>>>(&bytes)
            .map(Option::unwrap_or_default)
            .map_err(|e| GatewayError::Protocol { context, source: e })
    }
}

impl PaymentGateway for PaymentGatewayClient {
    fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> impl Future<Output = Result<CreatePaymentOutcome, GatewayError>> + Send {
        PaymentGatewayClient::create_payment(self, request)
    }

    fn list_payments(
        &self,
    ) -> impl Future<Output = Result<Vec<PaymentRecord>, GatewayError>> + Send {
        PaymentGatewayClient::list_payments(self)
    }
}

impl Debug for PaymentGatewayClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGatewayClient")
            .field("base_url", &self.base_url.as_str())
            .field("payments_url", &self.payments_url.as_str())
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Converts a string URL into a `PaymentGatewayClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for PaymentGatewayClient {
    type Error = GatewayError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| GatewayError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        PaymentGatewayClient::try_new(url)
    }
}

/// Converts a String URL into a `PaymentGatewayClient`.
impl TryFrom<String> for PaymentGatewayClient {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PaymentGatewayClient::try_from(value.as_str())
    }
}

/// Records the outcome of a request on the current span, including status and errors.
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::WARN, error = %err, "Request to payment gateway failed");
        }
    }
}
