use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::Layered, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
/// Logs go to stderr so stdout stays free for command output.
///
/// Also adds an OpenTelemetry layer that exports traces if a global tracer provider
/// has been initialized (e.g. via [`crate::TelemetryGuard::init`]).
pub fn setup_logging(environment: Environment) {
    init_subscriber(environment, tracing_opentelemetry::layer());
}

pub(crate) fn init_subscriber<L>(environment: Environment, otel_layer: L)
where
    L: Layer<Layered<EnvFilter, Registry>> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer);

    match environment {
        Environment::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        Environment::Development => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}
