//! Engine tuning knobs.

use serde::{Deserialize, Serialize};

/// Configuration for an [`OpEnvironment`](crate::env::OpEnvironment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Whether ranked candidate lists are memoized per (target, argument
    /// type signature).
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Maximum depth of recursive sub-resolution before binding fails
    /// closed.
    #[serde(default = "default_max_recursion_depth")]
    pub max_recursion_depth: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_recursion_depth() -> usize {
    16
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_cache_enabled(),
            max_recursion_depth: default_max_recursion_depth(),
        }
    }
}
