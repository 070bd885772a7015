//! Logging setup for the `depot` binary
//!
//! stdout carries command output only; every log line goes to stderr.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter override read before `RUST_LOG`
pub const LOG_ENV: &str = "DEPOT_LOG";

/// Sync and realtime crates log at debug when verbose; the HTTP and
/// websocket stacks underneath stay at info.
const VERBOSE_DIRECTIVES: &str = "info,depot_core=debug,depot_realtime=debug,depot_cli=debug,\
depot_config=debug,hyper=info,reqwest=info,tungstenite=info,tokio_tungstenite=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// Filter directives: `DEPOT_LOG`, then `RUST_LOG`, then the built-in level.
pub fn filter_directives(verbose: bool, depot_log: Option<&str>, rust_log: Option<&str>) -> String {
    [depot_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if verbose {
                VERBOSE_DIRECTIVES.to_string()
            } else {
                "info".to_string()
            }
        })
}

fn env_filter(verbose: bool) -> EnvFilter {
    let depot_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(verbose, depot_log.as_deref(), rust_log.as_deref());

    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter '{}': {}", directives, e);
        EnvFilter::new("info")
    })
}

/// Install the global subscriber.
///
/// Returns false when one was already installed.
pub fn init_tracing(verbose: bool, format: LogFormat) -> bool {
    let filter = env_filter(verbose);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init()
            .is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directives(false, None, None), "info");
        assert!(filter_directives(true, None, None).contains("depot_core=debug"));
        assert_eq!(filter_directives(true, None, Some("warn")), "warn");
        assert_eq!(
            filter_directives(false, Some("depot_realtime=trace"), Some("warn")),
            "depot_realtime=trace"
        );
        assert_eq!(filter_directives(false, Some("  "), Some("error")), "error");
    }

    #[test]
    fn test_verbose_directives_parse() {
        assert!(EnvFilter::try_new(VERBOSE_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_format_from_flag() {
        assert_eq!(LogFormat::from_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_flag(false), LogFormat::default());
    }

    #[test]
    fn test_second_init_is_refused() {
        init_tracing(false, LogFormat::Compact);
        assert!(!init_tracing(true, LogFormat::Json));
    }
}
