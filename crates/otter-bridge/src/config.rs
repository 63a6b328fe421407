//! Bridge configuration.

use otter_host::IterKind;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Script module holding the bridge classes.
    /// Default: "otter"
    pub module_name: String,

    /// Script global bound to the host global during `execute`.
    /// Default: "window"
    pub window_name: String,

    /// Script global listing names to export to the host after `execute`.
    /// Default: "__js__"
    pub export_list_name: String,

    /// Factory function a component module must define.
    /// Default: "NSGetFactory"
    pub factory_name: String,

    /// Frames kept in formatted tracebacks. `None` keeps all.
    pub traceback_limit: Option<usize>,

    /// Run a host collection at the end of `cleanup`.
    /// Default: true
    pub cleanup_runs_gc: bool,

    /// What iterating a script mapping from the host yields.
    /// Default: entries
    pub mapping_iteration: IterKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            module_name: "otter".to_string(),
            window_name: "window".to_string(),
            export_list_name: "__js__".to_string(),
            factory_name: "NSGetFactory".to_string(),
            traceback_limit: None,
            cleanup_runs_gc: true,
            mapping_iteration: IterKind::Entries,
        }
    }
}

impl BridgeConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bridge module name.
    pub fn module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Set the script global bound to the host global.
    pub fn window_name(mut self, name: impl Into<String>) -> Self {
        self.window_name = name.into();
        self
    }

    /// Set the export list global.
    pub fn export_list_name(mut self, name: impl Into<String>) -> Self {
        self.export_list_name = name.into();
        self
    }

    /// Set the component factory name.
    pub fn factory_name(mut self, name: impl Into<String>) -> Self {
        self.factory_name = name.into();
        self
    }

    /// Limit formatted tracebacks to the innermost `limit` frames.
    pub fn traceback_limit(mut self, limit: usize) -> Self {
        self.traceback_limit = Some(limit);
        self
    }

    /// Enable or disable the collection at the end of `cleanup`.
    pub fn cleanup_runs_gc(mut self, enabled: bool) -> Self {
        self.cleanup_runs_gc = enabled;
        self
    }

    /// Set what iterating a script mapping yields.
    pub fn mapping_iteration(mut self, kind: IterKind) -> Self {
        self.mapping_iteration = kind;
        self
    }
}
