//! Script runtime configuration.

/// Script runtime configuration.
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Name of the module code runs in when no module is given.
    /// Default: "__main__"
    pub main_module: String,

    /// Frames kept when rendering a traceback. `None` keeps all.
    pub traceback_limit: Option<usize>,

    /// Nested call depth before `RecursionError`.
    /// Default: 1000
    pub recursion_limit: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            main_module: "__main__".to_string(),
            traceback_limit: None,
            recursion_limit: 1000,
        }
    }
}

impl ScriptConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the main module name.
    pub fn main_module(mut self, name: impl Into<String>) -> Self {
        self.main_module = name.into();
        self
    }

    /// Limit rendered traceback frames.
    pub fn traceback_limit(mut self, limit: usize) -> Self {
        self.traceback_limit = Some(limit);
        self
    }

    /// Set the recursion limit.
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}
