//! Tracing initialisation for the `curricula` binary.
//!
//! Filtering comes from `CURRICULA_LOG`, then `RUST_LOG`, then
//! [`default_directives`]. Logs go to stderr; stdout carries command output.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG: &str = "CURRICULA_LOG";

/// Crates whose events follow the requested level. Everything else is held
/// at `warn`.
const OWN_TARGETS: &[&str] = &["curricula_core", "curricula"];

/// Filter used when neither `CURRICULA_LOG` nor `RUST_LOG` is set.
pub fn default_directives(level: Level) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Later calls are no-ops.
///
/// JSON output keeps event targets so runs can be filtered per module
/// (`curricula_core::controller`, `curricula_core::obs`) downstream.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(env_filter(level));
    let result = if json {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    result.ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_own_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,curricula_core=DEBUG,curricula=DEBUG"
        );
        EnvFilter::try_new(default_directives(Level::INFO)).expect("directives parse");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}
