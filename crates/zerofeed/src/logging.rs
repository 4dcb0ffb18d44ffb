//! Process-wide logging sinks.
//!
//! Two layers: a stderr layer whose verbosity follows `-v` (0 silent, 1
//! lifecycle and problems, 2 everything), and a run log file that always
//! records at debug level. Per-feed log files are separate; see
//! `zerofeed_convert::logging`.

use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// The run-wide log file, next to the state file.
const LOG_FILE: &str = "zerofeed.log";

pub fn init(verbosity: u8) {
    let stderr_level = match verbosity {
        0 => LevelFilter::OFF,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let file_layer = File::options()
        .create(true)
        .append(true)
        .open(LOG_FILE)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
        });

    use tracing_subscriber::Layer;
    let _ = tracing_subscriber::registry()
        .with(stderr_layer.with_filter(stderr_level))
        .with(file_layer.map(|layer| layer.with_filter(LevelFilter::DEBUG)))
        .try_init();
}
