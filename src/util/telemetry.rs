//! Logging and OpenTelemetry export for the submitter binary.
//!
//! Logs always go to stderr through `tracing-subscriber`, filtered by `RUST_LOG`
//! (default `info`). When any `OTEL_EXPORTER_OTLP_*` variable is set, spans and metrics
//! (including the `payment_gateway.attempts` counter) are exported over OTLP as well.

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider, Temporality},
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};
use std::env;
use std::time::Duration;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// OTLP transport selected by `OTEL_EXPORTER_OTLP_PROTOCOL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtlpProtocol {
    HttpProtobuf,
    Grpc,
}

impl OtlpProtocol {
    /// Returns the protocol to export with, or `None` when OTLP is not configured.
    fn from_env() -> Option<Self> {
        let configured = ["OTEL_EXPORTER_OTLP_ENDPOINT", "OTEL_EXPORTER_OTLP_HEADERS", "OTEL_EXPORTER_OTLP_PROTOCOL"]
            .iter()
            .any(|key| env::var(key).is_ok());
        if !configured {
            return None;
        }
        match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => Some(OtlpProtocol::Grpc),
            _ => Some(OtlpProtocol::HttpProtobuf),
        }
    }
}

fn resource() -> Resource {
    let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
    Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .with_schema_url(
            [
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn build_tracer_provider(protocol: OtlpProtocol) -> Result<SdkTracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match protocol {
        OtlpProtocol::HttpProtobuf => exporter.with_http().build(),
        OtlpProtocol::Grpc => exporter.with_tonic().build(),
    }?;
    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

fn build_meter_provider(protocol: OtlpProtocol) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder();
    let exporter = match protocol {
        OtlpProtocol::HttpProtobuf => exporter
            .with_http()
            .with_temporality(Temporality::default())
            .build(),
        OtlpProtocol::Grpc => exporter
            .with_tonic()
            .with_temporality(Temporality::default())
            .build(),
    }?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(30))
        .build();
    let provider = SdkMeterProvider::builder()
        .with_resource(resource())
        .with_reader(reader)
        .build();
    global::set_meter_provider(provider.clone());
    Ok(provider)
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
}

/// Installed telemetry providers; flushed and shut down on drop.
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    /// Installs the global `tracing` subscriber. Call once, before building submitters.
    pub fn init() -> Result<Self, TelemetryError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let protocol = OtlpProtocol::from_env();
        let (tracer_provider, meter_provider) = match protocol {
            Some(protocol) => (
                Some(build_tracer_provider(protocol)?),
                Some(build_meter_provider(protocol)?),
            ),
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(meter_provider.clone().map(MetricsLayer::new))
            .with(
                tracer_provider
                    .as_ref()
                    .map(|provider| OpenTelemetryLayer::new(provider.tracer("ride-payment-gateway"))),
            )
            .init();

        match protocol {
            Some(protocol) => tracing::info!(?protocol, "OpenTelemetry export enabled"),
            None => tracing::debug!("OpenTelemetry export disabled"),
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.take() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
        if let Some(meter_provider) = self.meter_provider.take() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}
