//! Subscriber setup for the server binary.
use anyhow::Context;
use tracing::Subscriber;
use tracing::subscriber::set_global_default;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// The verbosity of the logs emitted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Honour `RUST_LOG`, falling back to the given default directives when it's not set.
    FromEnv { default_directives: &'static str },
    /// Log everything at `debug` level or above, regardless of `RUST_LOG`.
    Debug,
}

/// Compose a `tracing` subscriber that writes human-readable log lines to `sink`.
pub fn get_subscriber<Sink>(level: LogLevel, sink: Sink) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = match level {
        LogLevel::FromEnv { default_directives } => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        LogLevel::Debug => EnvFilter::new("debug"),
    };
    let formatting_layer = fmt::layer().with_target(true).with_writer(sink);
    Registry::default().with(env_filter).with(formatting_layer)
}

/// Register a subscriber as the global default to process span data.
///
/// It should only be called once!
pub fn init_telemetry(subscriber: impl Subscriber + Send + Sync) -> Result<(), anyhow::Error> {
    set_global_default(subscriber).context("Failed to set a `tracing` global subscriber")
}
