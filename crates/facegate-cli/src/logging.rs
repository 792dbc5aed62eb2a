use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingSection};

/// Install the global subscriber. Logs go to stderr so the console owns stdout.
///
/// `RUST_LOG` takes precedence over the configured level; `--verbose` raises
/// the configured level to `debug` (or `trace` when repeated).
pub fn init(logging: &LoggingSection, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
