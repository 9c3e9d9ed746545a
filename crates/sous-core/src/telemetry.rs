//! Logging setup for processes embedding the Sous core.

use tracing_subscriber::EnvFilter;

use crate::error::{Result, SousError};

/// Build the log filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a global fmt subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .try_init()
        .map_err(|e| SousError::Telemetry(e.to_string()))?;
    tracing::info!(level = %level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        // The first call may or may not win depending on test ordering.
        let _ = init_logging("debug");
        let second = init_logging("debug");
        assert!(matches!(second, Err(SousError::Telemetry(_))));
    }

    #[test]
    fn test_env_filter_accepts_level() {
        let filter = env_filter("warn");
        assert!(!filter.to_string().is_empty());
    }
}
