//! Shared logging initialization for kolet.
//!
//! Logs go to stderr. Stdout carries the reboot record and must stay clean.
//! Under systemd, stderr ends up in the journal.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(value: Option<&str>) -> tracing::Level {
    match value.unwrap_or("info").to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `KOLET_LOG`.
///
/// `verbose` forces at least debug output. Safe to call multiple times;
/// only the first call installs the subscriber.
pub fn init(verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let env_level = std::env::var("KOLET_LOG").ok();
    let mut level = parse_level(env_level.as_deref());
    if verbose && level < tracing::Level::DEBUG {
        level = tracing::Level::DEBUG;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    let _ = INIT.set(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_defaults_to_info() {
        assert_eq!(parse_level(None), tracing::Level::INFO);
        assert_eq!(parse_level(Some("bogus")), tracing::Level::INFO);
    }

    #[test]
    fn parse_level_is_case_insensitive() {
        assert_eq!(parse_level(Some("DEBUG")), tracing::Level::DEBUG);
        assert_eq!(parse_level(Some("Warn")), tracing::Level::WARN);
    }
}
