//! Logging - stderr `tracing` subscriber for hosts and the demo
//!
//! `RUST_LOG` wins when set; otherwise pairing events log at `info` and
//! everything else at `warn`.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,beepair=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `BEEPAIR_LOG_JSON=1` selects JSON lines.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("BEEPAIR_LOG_JSON").ok().as_deref())
    }

    fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("1") | Some("true") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

pub fn init_logging() {
    init_logging_as(LogFormat::from_env());
}

/// Install the subscriber once; later calls are no-ops.
pub fn init_logging_as(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
}
