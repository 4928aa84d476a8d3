//! Subscriber installation for hosts that embed a canvas.
//!
//! Every Trellis crate logs through the `tracing` facade and never installs a
//! subscriber itself. Hosts that have no subscriber of their own can call
//! [`init_tracing`] once at startup:
//!
//! ```no_run
//! use trellis_services::tracing_setup::{TracingConfig, TracingFormat, init_tracing};
//! use tracing::Level;
//!
//! init_tracing(
//!     &TracingConfig::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact),
//! )
//! .expect("no other subscriber installed");
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level when it parses.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trellis_core::{ErrorCode, codes};

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable multi-line output (default).
    #[default]
    Pretty,
    /// Single-line output.
    Compact,
    /// JSON lines for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// What [`init_tracing`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level used when neither `RUST_LOG` nor `filter` is usable.
    pub level: Level,
    /// Output format.
    pub format: TracingFormat,
    /// Target-specific directives, e.g. `"trellis_graph=debug,trellis_events=warn"`.
    pub filter: Option<String>,
    /// Whether span enter/exit is logged.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Sets the fallback level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets explicit filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    /// The filter [`init_tracing`] would install.
    ///
    /// Precedence: `RUST_LOG`, then `filter`, then `level`. Directives that
    /// fail to parse fall through to the next source.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| match &self.filter {
                Some(filter) => EnvFilter::try_new(filter),
                None => EnvFilter::try_new(self.level.as_str()),
            })
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Why [`init_tracing`] did not install a subscriber.
#[derive(Debug, Error)]
pub enum TracingInitError {
    /// A global subscriber is already set, by this crate or another.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

impl ErrorCode for TracingInitError {
    fn code(&self) -> &'static str {
        match self {
            TracingInitError::AlreadyInstalled => codes::INVALID_ARGUMENT,
        }
    }
}

/// Installs a global `tracing-subscriber` registry with an [`EnvFilter`] and
/// a formatting layer.
///
/// # Errors
///
/// Returns [`TracingInitError::AlreadyInstalled`] if a global subscriber is
/// already set. The existing subscriber stays in place.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracingInitError> {
    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let installed = match config.format {
        TracingFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_span_events(span_events))
            .try_init(),
        TracingFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_span_events(span_events))
            .try_init(),
        TracingFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_span_events(span_events))
            .try_init(),
    };
    installed.map_err(|_| TracingInitError::AlreadyInstalled)?;
    tracing::info!(level = %config.level, format = ?config.format, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = TracingConfig::default()
            .with_level(Level::DEBUG)
            .with_format(TracingFormat::Json)
            .with_filter("trellis_graph=trace")
            .with_span_events(true);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, TracingFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("trellis_graph=trace"));
        assert!(config.span_events);
    }

    #[test]
    fn second_install_reports_already_installed() {
        let config = TracingConfig::default().with_format(TracingFormat::Compact);
        // The first call may already lose to another test in this binary.
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, TracingInitError::AlreadyInstalled));
    }
}
