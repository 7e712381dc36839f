use anyhow::{anyhow, Result};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::env;
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level for this crate's own targets when `RUST_LOG` is not set.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// `RUST_LOG`, when set, replaces the verbosity-derived directive entirely.
fn build_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::WARN.into());
    match rust_log.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => builder.parse_lossy(directives),
        None => builder.parse_lossy(format!(
            "{}={}",
            env!("CARGO_PKG_NAME"),
            level_for_verbosity(verbose)
        )),
    }
}

fn otlp_endpoint() -> Option<String> {
    env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
        .ok()
        .or_else(|| env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok())
        .filter(|e| !e.trim().is_empty())
}

fn build_provider() -> Result<SdkTracerProvider> {
    // The blocking client has to be created off the async runtime.
    let http_client = std::thread::spawn(|| reqwest::blocking::Client::builder().build())
        .join()
        .map_err(|_| anyhow!("HTTP client thread panicked"))??;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_http_client(http_client)
        .with_protocol(Protocol::HttpBinary)
        .with_timeout(std::time::Duration::from_secs(3))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build())
}

/// Install the global subscriber: formatted logs on stderr, plus span export
/// over OTLP/HTTP when an OTLP endpoint is configured in the environment.
///
/// The returned provider must be flushed before the process exits.
pub fn init_telemetry(verbose: u8) -> Result<Option<SdkTracerProvider>> {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(verbose, rust_log.as_deref());
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let provider = match otlp_endpoint() {
        Some(_) => Some(build_provider()?),
        None => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|p| OpenTelemetryLayer::new(p.tracer(env!("CARGO_PKG_NAME"))));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    if provider.is_some() {
        tracing::debug!(endpoint = ?otlp_endpoint(), "exporting spans over OTLP");
    }
    Ok(provider)
}
