//! Process-level helpers used by the `ride-payment-submitter` binary.
//!
//! - [`sig_down`] - Cancels in-flight submissions on SIGTERM / SIGINT
//! - [`telemetry`] - `tracing` subscriber and optional OpenTelemetry export

pub mod sig_down;
pub mod telemetry;

pub use sig_down::*;
pub use telemetry::*;
