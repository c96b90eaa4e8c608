// External crates
use console_subscriber::ConsoleLayer;
use std::panic;
use std::path::Path;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

/// Install the global subscriber.
///
/// Human readable output goes to stderr, stdout carries the metric
/// snapshots. With `log_dir` set, JSON logs are also written to a daily
/// rolling file; keep the returned guard alive so they get flushed.
/// `TOKIO_CONSOLE` in the environment attaches the tokio-console layer.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let console_enabled = std::env::var("TOKIO_CONSOLE").is_ok();

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if console_enabled {
        for directive in ["tokio=trace", "runtime=trace"] {
            if let Ok(directive) = directive.parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (json_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = rolling::daily(dir, "weblog.log");
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(non_blocking_writer)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(false)
                .with_timer(fmt::time::UtcTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = console_enabled.then(|| ConsoleLayer::builder().spawn());

    let subscriber = Registry::default()
        .with(console_layer)
        .with(filter)
        .with(stderr_layer)
        .with(json_layer)
        .with(ErrorLayer::default());

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global tracing subscriber: {e}");
    }

    guard
}

pub fn init_panic_handler() {
    panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("Unknown panic");

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "Application panicked!"
        );
    }));
}
