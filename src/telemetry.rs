//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! - LOG_LEVEL controls the filter (e.g. "debug" or directives like
//!   "info,gradebridge=debug,autosave=trace,paginate=debug").
//! - LOG_FORMAT selects "pretty" (default) or "json" structured logs.
//!
//! Targets in use: gradebridge, autosave, backup, paginate, render.
//! Student answers and images are never logged; only sizes, keys and counts.

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info,gradebridge=debug,autosave=debug,tower_http=info,axum=info";

#[derive(Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

fn log_format(raw: Option<&str>) -> LogFormat {
    match raw.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// LOG_LEVEL when it parses, otherwise the default directives.
fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let format = log_format(std::env::var("LOG_FORMAT").ok().as_deref());
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
    tracing::debug!(target: "gradebridge", ?format, "Tracing initialised");
}
