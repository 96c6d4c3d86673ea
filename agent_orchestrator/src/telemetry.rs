//! Logging initialization driven by the `[logging]` settings section, with
//! conditional OpenTelemetry export.

use crate::settings::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

#[cfg(feature = "with-observability")]
use {
    opentelemetry::{global as otel_global, sdk::Resource},
    opentelemetry_otlp::{self as otlp, WithExportConfig},
    tracing_opentelemetry,
};

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// the `format` setting picks the console encoding. With the
/// `with-observability` feature and a configured endpoint, spans are also
/// exported over OTLP under the configured service name.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    #[cfg(feature = "with-observability")]
    if let Some(endpoint) = config.otlp_endpoint.as_deref() {
        return init_with_otlp(config, endpoint, filter);
    }

    if config.format == "json" {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false));
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        tracing::subscriber::set_global_default(subscriber)?;
    }

    tracing::info!(level = %config.level, format = %config.format, "logging initialized");
    Ok(())
}

#[cfg(feature = "with-observability")]
fn init_with_otlp(config: &LoggingConfig, endpoint: &str, filter: EnvFilter) -> Result<()> {
    let tracer = otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp::new_exporter().tonic().with_endpoint(endpoint))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(Resource::new(
            vec![opentelemetry::KeyValue::new(
                "service.name",
                config.service_name.clone(),
            )],
        )))
        .install_batch(opentelemetry::runtime::Tokio)?;

    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    if config.format == "json" {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .with(telemetry);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(telemetry);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    otel_global::set_text_map_propagator(
        opentelemetry::sdk::propagation::TraceContextPropagator::new(),
    );

    tracing::info!(
        service = %config.service_name,
        endpoint,
        "logging initialized with OTLP export"
    );
    Ok(())
}
