//! Payment submission with ledger reconciliation and bounded retry.
//!
//! One attempt runs the following protocol:
//!
//! 1. `POST /payments` with the amount. A `204 No Content` answer ends the attempt successfully.
//! 2. Any other answer is ambiguous: the payment may have been recorded anyway. The gateway
//!    ledger is fetched with `GET /payments`, the caller's billable transactions are loaded,
//!    and the two counts are compared (see [`crate::reconcile`]).
//!
//! [`PaymentSubmitter::submit_payment`] wraps attempts in an [`ExponentialBackoff`] schedule.
//! Every error kind is retried the same way; once the budget is spent the last error is
//! returned unchanged. A [`CancellationToken`] aborts an in-flight attempt or a pending sleep.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};
use std::fmt::{Debug, Formatter};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::backoff::ExponentialBackoff;
use crate::error::PaymentError;
use crate::gateway::PaymentGateway;
use crate::ledger::BillableTransactions;
use crate::reconcile::reconcile;
use crate::types::{CreatePaymentOutcome, PaymentRequest};

/// Submits payments to one gateway.
///
/// Holds no per-call state and can be shared or cloned freely across tasks.
#[derive(Clone)]
pub struct PaymentSubmitter<G> {
    gateway: G,
    backoff: ExponentialBackoff,
    attempts_counter: Counter<u64>,
}

impl<G> PaymentSubmitter<G> {
    /// Creates a submitter using the default backoff policy.
    ///
    /// The attempt counter binds to the global OpenTelemetry meter provider installed at
    /// this point, so install telemetry first.
    pub fn new(gateway: G) -> Self {
        let meter = opentelemetry::global::meter(env!("CARGO_PKG_NAME"));
        Self {
            gateway,
            backoff: ExponentialBackoff::default(),
            attempts_counter: attempts_counter(&meter),
        }
    }

    /// Records attempts on `meter` rather than the global meter provider.
    pub fn with_meter(mut self, meter: &Meter) -> Self {
        self.attempts_counter = attempts_counter(meter);
        self
    }

    pub fn with_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }
}

impl<G: PaymentGateway + Sync> PaymentSubmitter<G> {
    /// Records one payment of `amount`, retrying transient failures.
    ///
    /// `billable` is consulted only when the gateway does not answer `204`, at most once
    /// per attempt. Returns [`PaymentError::Cancelled`] as soon as `cancel` fires; no new
    /// request is started after that.
    #[instrument(name = "payment_gateway.submit", skip_all, fields(amount = amount))]
    pub async fn submit_payment<B>(
        &self,
        amount: u64,
        billable: &B,
        cancel: &CancellationToken,
    ) -> Result<(), PaymentError>
    where
        B: BillableTransactions + Sync,
    {
        let request = PaymentRequest::new(amount);
        let mut backoff = self.backoff.start();
        loop {
            let attempt = backoff.attempts() + 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PaymentError::Cancelled),
                result = self.attempt(&request, billable) => result,
            };
            self.record_attempt(&result);

            let err = match result {
                Ok(()) => {
                    tracing::info!(attempt, "Payment recorded by gateway");
                    return Ok(());
                }
                Err(PaymentError::Cancelled) => return Err(PaymentError::Cancelled),
                Err(err) => err,
            };

            let Some(delay) = backoff.next_delay() else {
                tracing::error!(attempts = attempt, error = %err, "Payment submission failed");
                return Err(err);
            };
            tracing::warn!(
                attempt,
                error = %err,
                retry_in_ms = delay.as_millis() as u64,
                "Payment attempt failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PaymentError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Runs a single attempt: create the payment, then reconcile if the answer was ambiguous.
    pub async fn attempt<B>(&self, request: &PaymentRequest, billable: &B) -> Result<(), PaymentError>
    where
        B: BillableTransactions + Sync,
    {
        match self.gateway.create_payment(request).await? {
            CreatePaymentOutcome::Accepted => return Ok(()),
            CreatePaymentOutcome::Ambiguous { status } => {
                tracing::debug!(%status, "Ambiguous gateway answer, checking payment ledger");
            }
        }

        let records = self.gateway.list_payments().await?;
        let transactions = billable
            .ordered_by_creation_asc()
            .await
            .map_err(PaymentError::LocalData)?;

        let result = reconcile(&transactions, &records);
        match &result {
            Ok(()) => tracing::info!(
                count = records.len(),
                "Payment ledger matches billable transactions"
            ),
            Err(err) => tracing::warn!(error = %err, "Payment ledger diverges from billable transactions"),
        }
        result
    }

    fn record_attempt(&self, result: &Result<(), PaymentError>) {
        let outcome = match result {
            Ok(()) => "success",
            Err(err) => err.kind(),
        };
        self.attempts_counter
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

fn attempts_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter("payment_gateway.attempts")
        .with_description("Payment submission attempts by outcome")
        .build()
}

impl<G: Debug> Debug for PaymentSubmitter<G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSubmitter")
            .field("gateway", &self.gateway)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Submits one payment through `gateway` with the default backoff policy.
pub async fn submit_payment<G, B>(
    gateway: G,
    amount: u64,
    billable: &B,
    cancel: &CancellationToken,
) -> Result<(), PaymentError>
where
    G: PaymentGateway + Sync,
    B: BillableTransactions + Sync,
{
    PaymentSubmitter::new(gateway)
        .submit_payment(amount, billable, cancel)
        .await
}
