//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `filter`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref(), filter))
        .try_init()
        .is_ok()
}

/// Filter from `rust_log` when it is set and valid, else from `configured`.
pub fn env_filter(rust_log: Option<&str>, configured: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(configured))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing("debug");
        assert!(!init_tracing("info"));
    }

    #[test]
    fn test_rust_log_wins_over_configured() {
        assert_eq!(env_filter(Some("warn"), "debug").to_string(), "warn");
        assert_eq!(env_filter(None, "debug").to_string(), "debug");
        assert_eq!(env_filter(Some("  "), "debug").to_string(), "debug");
    }
}
