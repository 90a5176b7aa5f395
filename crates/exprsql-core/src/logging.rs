//! Logging integration for exprsql.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-compilation spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing a subscriber twice is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one statement compilation.
///
/// # Examples
///
/// ```
/// use exprsql_core::logging::compile_span;
///
/// let span = compile_span("select", "User");
/// let _guard = span.enter();
/// tracing::debug!("walking predicate");
/// ```
pub fn compile_span(kind: &str, entity: &str) -> tracing::Span {
    tracing::debug_span!("compile", kind = kind, entity = entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let mut settings = Settings::default();
        settings.log_level = "not a [valid filter".to_string();
        setup_logging(&settings);
        setup_logging(&settings);
    }

    #[test]
    fn test_compile_span_enter() {
        let span = compile_span("update", "Order");
        let _guard = span.enter();
    }
}
