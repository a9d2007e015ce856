// Logging setup: status lines on the console, optional detail file

use crate::config::AppConfig;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Builds the detail layer writing to `path` (DEBUG and above, no ANSI)
pub fn file_layer<S>(path: &Path) -> std::io::Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let log_file = File::create(path)?;

    Ok(fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG))
}

/// Initializes logging. The console layer is always installed; the log
/// file is only written when configured, and failing to create it falls
/// back to console only.
pub fn init_logging(config: &AppConfig) {
    let console_layer = fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(false)
        .with_filter(LevelFilter::INFO);

    let (detail_layer, file_error) = match config.log_file.as_deref().map(Path::new) {
        Some(path) => match file_layer(path) {
            Ok(layer) => (Some(layer), None),
            Err(e) => (None, Some((path.display().to_string(), e))),
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(detail_layer)
        .init();

    if let Some((path, e)) = file_error {
        warn!("Could not create log file {}: {}. Logging to console only.", path, e);
    }
}
