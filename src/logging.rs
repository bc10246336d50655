//! Logging initialization for the analyst engine.
//!
//! The engine is a headless pipeline with no terminal display to protect,
//! so there is a single stderr-based initializer — the TUI file-vs-stderr
//! split this module previously needed does not apply here.

use tracing_subscriber::EnvFilter;

/// Initializes structured logging to stderr.
///
/// Honors `RUST_LOG` if set, otherwise defaults to `info` level. Events are
/// tagged with their originating module path (`with_target(true)`), so
/// `RUST_LOG` can target a single stage by module, e.g.
/// `RUST_LOG=analyst_engine::pipeline::generate_sql=debug`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_does_not_panic() {
        // The global subscriber can only be set once per process; just
        // confirm the call itself doesn't panic on construction.
        let _ = std::panic::catch_unwind(init_logging);
    }
}
