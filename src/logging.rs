//! Logging configuration using tracing
//!
//! Structured logging to stderr with support for the RUST_LOG environment
//! variable. Bot output goes to stdout, so supervisor logs never mix with it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber
///
/// Sets up structured logging with:
/// - Filtering via RUST_LOG environment variable (defaults to "warn")
/// - Compact output to stderr
///
/// # Example RUST_LOG values
/// - `RUST_LOG=info` - Show starts, stops and restarts
/// - `RUST_LOG=botfleet=debug` - Include every state transition
/// - `RUST_LOG=botfleet::fleet::supervisor=trace` - Also trace kill requests
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init() -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::FleetError::Other(format!("Failed to initialize tracing: {}", e)))?;

    Ok(())
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_helper() {
        // Should never panic
        init_test();
        init_test();
    }

    #[test]
    fn test_logging_macros() {
        init_test();

        tracing::debug!("This is a debug message");
        tracing::info!(bot = "bot-1", pid = 4242, "Structured supervisor event");
    }
}
