//! Tracing/logging initialization.

use shopcast_core::LogFormat;
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `level`; an unparsable `level` falls back to
/// `info`. Returns `false` when a global subscriber was already installed.
pub fn init(level: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // Logs go to stderr so stdout stays clean for command output.
    match format {
        LogFormat::Json => builder.json().with_writer(std::io::stderr).try_init().is_ok(),
        LogFormat::Pretty => builder.with_writer(std::io::stderr).try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialization_is_a_no_op() {
        let _ = init("debug", LogFormat::Pretty);
        assert!(!init("info", LogFormat::Json));
    }
}
