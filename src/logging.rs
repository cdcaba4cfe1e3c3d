//! Process-wide `tracing` subscriber.
//!
//! Log lines go to stderr so CLI output on stdout stays clean. `RUST_LOG`
//! takes precedence over `[logging].level`:
//!
//! ```bash
//! RUST_LOG=pdf_chat=debug pdfchat serve
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Install the subscriber. Only the first call takes effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // A test harness may already have installed a global subscriber.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig {
            level: "not a valid = directive [".to_string(),
        };
        init(&config);
        init(&LoggingConfig::default());
        tracing::info!("logging initialised");
    }
}
