//! Logging setup for applications and tests embedding leasepool
//!
//! The library itself only emits `tracing` events and spans; nothing is
//! printed unless the host installs a subscriber. [`init`] installs one:
//! - Pretty console output for development, JSON lines for log shippers
//! - Filtering via `RUST_LOG`, falling back to the configured default
//! - Optional span open/close events for timing pool operations

use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close (for timing checkouts and transactions)
    pub enable_spans: bool,

    /// Default log level filter, used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            include_location: cfg!(debug_assertions),
            enable_spans: cfg!(debug_assertions),
            default_filter: "info,leasepool=debug,leasepool_core=debug".to_string(),
        }
    }
}

impl LoggingConfig {
    /// JSON output, pool events at info and above
    pub fn production() -> Self {
        Self {
            json: true,
            include_location: false,
            enable_spans: false,
            default_filter: "warn,leasepool=info,leasepool_core=info".to_string(),
        }
    }

    /// Pretty console output, verbose
    pub fn development() -> Self {
        Self::default()
    }

    /// Console output with locations, everything at debug
    pub fn testing() -> Self {
        Self {
            json: false,
            include_location: true,
            enable_spans: true,
            default_filter: "debug".to_string(),
        }
    }
}

/// Install a global subscriber built from `config`
///
/// Fails if a global subscriber is already installed.
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    // RUST_LOG takes precedence over the default filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW fires once per span; ENTER would fire on every re-poll of an
    // awaited checkout
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = if config.json {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::info!(
        json = config.json,
        filter = %config.default_filter,
        "logging initialized"
    );
    Ok(())
}

/// Initialize logging for the current build profile
pub fn init_default() -> anyhow::Result<()> {
    let config = if cfg!(debug_assertions) {
        LoggingConfig::development()
    } else {
        LoggingConfig::production()
    };
    init(config)
}
