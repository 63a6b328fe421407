//! Source lines for tracebacks and warnings

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Per-file source lines. Sources registered by the evaluator are served
/// from memory; other names are read from disk on first use.
#[derive(Default)]
pub struct LineCache {
    files: RefCell<FxHashMap<String, Rc<Vec<String>>>>,
}

impl LineCache {
    /// Remember the source of `filename`.
    pub fn register(&self, filename: &str, source: &str) {
        let lines = source.lines().map(str::to_string).collect();
        self.files
            .borrow_mut()
            .insert(filename.to_string(), Rc::new(lines));
    }

    /// Line `lineno` (1-based) of `filename`, without its line ending.
    pub fn getline(&self, filename: &str, lineno: usize) -> Option<String> {
        if lineno == 0 {
            return None;
        }
        let lines = self.lines(filename)?;
        lines.get(lineno - 1).cloned()
    }

    fn lines(&self, filename: &str) -> Option<Rc<Vec<String>>> {
        if let Some(lines) = self.files.borrow().get(filename) {
            return Some(lines.clone());
        }
        // Pseudo file names such as "<string>" are never on disk.
        if filename.starts_with('<') {
            return None;
        }
        let source = std::fs::read_to_string(filename).ok()?;
        self.register(filename, &source);
        self.files.borrow().get(filename).cloned()
    }

    /// Forget one file.
    pub fn forget(&self, filename: &str) {
        self.files.borrow_mut().remove(filename);
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.files.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_lines() {
        let cache = LineCache::default();
        cache.register("<test>", "a = 1\nb = 2\n");
        assert_eq!(cache.getline("<test>", 2).as_deref(), Some("b = 2"));
        assert_eq!(cache.getline("<test>", 3), None);
        assert_eq!(cache.getline("<test>", 0), None);
        cache.forget("<test>");
        assert_eq!(cache.getline("<test>", 1), None);
    }
}
