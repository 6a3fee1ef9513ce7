//! Logging setup for binaries and hosts embedding the client.
//!
//! Library code only emits `tracing` events. Call [`init`] once at startup
//! to print them:
//!
//! ```ignore
//! use quire_client::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init(TelemetryConfig::from_env("quire"));
//! tracing::info!("ready");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Name logged once at startup.
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds). `RUST_LOG`
    /// takes precedence when set.
    pub console_level: Level,
}

impl TelemetryConfig {
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
        }
    }

    /// Same, with an explicit level such as one picked by a `-v` flag.
    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }
}

/// Install a compact console subscriber.
///
/// Logs go to stderr so command output on stdout stays clean. Calling this
/// twice is harmless: the second call leaves the first subscriber in place.
pub fn init(config: TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
    {
        tracing::debug!(service = %config.service_name, "tracing initialized");
    }
}
