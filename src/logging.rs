//! Tracing subscriber setup shared by all binaries.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Parse a user supplied level name, falling back to INFO.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to this crate and
/// HTTP/GUI dependencies are capped at warn. Safe to call more than once.
pub fn init_logging(level: &str) {
    let level = parse_level(level);

    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let mut filter = EnvFilter::default().add_directive(level.into());
            for noisy in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "eframe=warn", "egui_glow=warn", "winit=warn"] {
                if let Ok(directive) = noisy.parse() {
                    filter = filter.add_directive(directive);
                }
            }
            filter
        });

        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .init();

        tracing::debug!(level = %level, "Logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_known_names() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level(" error "), Level::ERROR);
    }

    #[test]
    fn test_parse_level_unknown_defaults_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }
}
