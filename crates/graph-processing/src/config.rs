//! Engine-wide configuration, threaded through a [`crate::registry::Registry`] and
//! defaulted at every call site that doesn't override it.

use std::time::Duration;

/// Defaults for [`crate::registry::Registry::run`] and the other entry points that take
/// an optional superstep/timeout budget.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// The superstep budget handed to `run` when the caller doesn't pick one.
    pub max_supersteps: u64,
    /// The wall-clock budget handed to `run` when the caller doesn't pick one.
    pub timeout: Duration,
    /// Whether a superstep's compute and advance phases fan out across the `parallel`
    /// Cargo feature's thread pool. Ignored (always sequential) if that feature is not
    /// compiled in. Forcing this to `false` is mainly useful for deterministic
    /// single-threaded tests even when the feature is enabled.
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_supersteps: 1000,
            timeout: Duration::from_secs(60),
            parallel: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interface() {
        let config = EngineConfig::default();
        assert_eq!(config.max_supersteps, 1000);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.parallel);
    }
}
