//! `ride-payment-submitter`: charge one ride payment from the command line.
//!
//! Submits `--amount` to the configured payment gateway. If the gateway does not confirm
//! the payment outright, its ledger is reconciled against the rides in `--rides`.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` selects the JSON configuration file
//! - `PAYMENT_GATEWAY_URL`, `PAYMENT_GATEWAY_TOKEN`, `PAYMENT_GATEWAY_TIMEOUT_MS` fill in missing settings
//! - `RUST_LOG` controls log verbosity, `OTEL_*` variables enable OpenTelemetry export

use clap::Parser;
use dotenvy::dotenv;

use ride_payment_gateway::config::{CliArgs, Config};
use ride_payment_gateway::ledger::JsonRideLedger;
use ride_payment_gateway::submitter::PaymentSubmitter;
use ride_payment_gateway::util::{SigDown, Telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();

    let _telemetry = Telemetry::init()?;

    let cli_args = CliArgs::parse();
    let config = Config::load_from_path(&cli_args.config)?;

    let http = config.pool().build_client()?;
    let gateway = config.gateway_client(http)?;
    let submitter = PaymentSubmitter::new(gateway).with_backoff(config.backoff());

    let mut ledger = JsonRideLedger::new(cli_args.rides);
    if let Some(user_id) = cli_args.user_id {
        ledger = ledger.for_user(user_id);
    }

    let sig_down = SigDown::try_new()?;
    let cancel = sig_down.submission_token();

    tracing::info!(
        gateway = %config.gateway_url(),
        amount = cli_args.amount,
        rides = %ledger.path().display(),
        "Submitting payment"
    );
    let result = submitter
        .submit_payment(cli_args.amount, &ledger, &cancel)
        .await;
    sig_down.shutdown().await;

    match result {
        Ok(()) => {
            tracing::info!(amount = cli_args.amount, "Payment submitted");
            Ok(())
        }
        Err(err) => {
            tracing::error!(kind = err.kind(), error = %err, "Payment submission failed");
            Err(err.into())
        }
    }
}
