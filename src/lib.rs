//! Payment submission against an external, occasionally unreliable payment gateway.
//!
//! A ride-booking backend charges each completed ride through a remote gateway. The gateway
//! confirms a payment with `204 No Content`, but failures are ambiguous: a request that
//! errored may still have been recorded. This crate submits the payment and, whenever the
//! answer is not a clean `204`, cross-checks the gateway's ledger against the caller's
//! billable rides. The whole exchange runs under a bounded exponential backoff.
//!
//! # Modules
//!
//! - [`submitter`]: [`PaymentSubmitter`](submitter::PaymentSubmitter), the attempt protocol and retry loop.
//! - [`gateway`]: The [`PaymentGateway`](gateway::PaymentGateway) seam and its `reqwest` client.
//! - [`ledger`]: The [`BillableTransactions`](ledger::BillableTransactions) callback seam and a file-backed ride ledger.
//! - [`reconcile`]: Cardinality comparison between billable rides and recorded payments.
//! - [`backoff`]: Exponential retry schedule.
//! - [`types`]: Gateway wire types.
//! - [`error`]: Error taxonomy.
//! - [`config`]: JSON/env configuration and the shared HTTP pool.
//! - [`util`]: Signal-driven cancellation and telemetry setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use ride_payment_gateway::config::HttpPoolConfig;
//! use ride_payment_gateway::gateway::PaymentGatewayClient;
//! use ride_payment_gateway::submitter::PaymentSubmitter;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // One pool per process, shared by every gateway client.
//! let http = HttpPoolConfig::default().build_client()?;
//! let gateway = PaymentGatewayClient::try_from("http://localhost:12345")?
//!     .with_client(http)
//!     .with_token("secret");
//! let submitter = PaymentSubmitter::new(gateway);
//! let rides = || async { Ok::<_, std::io::Error>(vec!["ride-1", "ride-2"]) };
//! submitter
//!     .submit_payment(600, &rides, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod reconcile;
pub mod submitter;
pub mod types;
pub mod util;
