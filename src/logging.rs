//! Tracing setup: rolling file output plus an ANSI console layer.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependencies that are chatty at the service's own level
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "hyper=warn", "axum::rejection=debug"];

/// Filter directives used when `RUST_LOG` is unset
fn default_directives(config: &AppConfig) -> String {
    let mut directives = vec![
        config.log_level.clone(),
        format!("twin_ledger={}", config.log_level),
    ];
    directives.extend(QUIET_TARGETS.iter().map(|d| d.to_string()));
    directives.join(",")
}

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Install the global subscriber. Keep the guard alive for the process lifetime.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    // Console output stays human readable in both modes; only the file
    // switches to JSON.
    let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    }

    guard
}
