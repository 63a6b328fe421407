//! Host runtime configuration.

use otter_bridge_gc::GcConfig;

/// Host runtime configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Collector settings.
    pub gc: GcConfig,

    /// Longest string the runtime will create, in UTF-16 code units.
    /// Default: 2^30 - 2
    pub max_string_length: usize,

    /// Name of the `globalThis` property installed on every global.
    /// Default: "globalThis"
    pub global_this_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            gc: GcConfig::default(),
            max_string_length: (1 << 30) - 2,
            global_this_name: "globalThis".to_string(),
        }
    }
}

impl HostConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collector settings.
    pub fn gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }

    /// Set the maximum string length.
    pub fn max_string_length(mut self, len: usize) -> Self {
        self.max_string_length = len;
        self
    }
}
