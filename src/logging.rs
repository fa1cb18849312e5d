/// Structured logging for the forecast service
///
/// Library code logs through `tracing` macros with station/source fields.
/// The binary installs a `fmt` subscriber filtered by `RUST_LOG`, falling
/// back to the given default directive.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "stormtide_service=info";

/// Installs the global subscriber. Returns `false` if one was already set
/// (e.g. by an earlier call in the same test binary).
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing(DEFAULT_DIRECTIVE);
        assert!(!init_tracing(DEFAULT_DIRECTIVE));
    }
}
