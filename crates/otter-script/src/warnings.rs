//! Warnings
//!
//! `warn` resolves the location of the innermost executing frame, looks up
//! its source line and hands a [`WarningRecord`] to the installed sink. The
//! default sink logs through `tracing`.

use std::rc::Rc;

use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::object::Obj;
use crate::protocol::class_name;

/// A warning ready for display.
#[derive(Clone, Debug)]
pub struct WarningRecord {
    /// Warning text
    pub message: String,
    /// Warning class
    pub category: Obj,
    /// File the warning was issued from
    pub filename: String,
    /// Line the warning was issued from
    pub lineno: usize,
    /// Source line, when available
    pub line: Option<String>,
}

impl WarningRecord {
    /// `file:line: Category: message`, followed by the indented source line.
    pub fn format(&self) -> String {
        let mut out = format!(
            "{}:{}: {}: {}\n",
            self.filename,
            self.lineno,
            class_name(&self.category),
            self.message
        );
        if let Some(line) = &self.line {
            out.push_str("  ");
            out.push_str(line.trim());
            out.push('\n');
        }
        out
    }
}

/// Receiver of issued warnings.
pub type WarningSink = Rc<dyn Fn(&Interp, &WarningRecord)>;

impl Interp {
    /// Install a warning sink, returning the previous one.
    pub fn set_warning_sink(&self, sink: Option<WarningSink>) -> Option<WarningSink> {
        self.warning_sink.replace(sink)
    }

    /// Issue a warning of `category` at the current location.
    pub fn warn(&self, message: &str, category: &Obj) -> ScriptResult<()> {
        if category.as_class().is_none() || !self.is_subclass(category, &self.types().warning) {
            return Err(ScriptError::type_error(format!(
                "category must be a Warning subclass, not '{}'",
                self.type_name(category)
            )));
        }
        let (filename, lineno) = self
            .current_location()
            .unwrap_or_else(|| ("sys".to_string(), 1));
        let line = self.linecache.getline(&filename, lineno);
        let record = WarningRecord {
            message: message.to_string(),
            category: category.clone(),
            filename,
            lineno,
            line,
        };
        let sink = self.warning_sink.borrow().clone();
        match sink {
            Some(sink) => sink(self, &record),
            None => tracing::warn!(target: "otter_script::warnings", "{}", record.format().trim_end()),
        }
        Ok(())
    }
}

/// The `warnings` module.
pub(crate) fn install(interp: &Interp) {
    let module = interp.module_or_new("warnings");
    let warn = interp.function("warn", |interp, args, kwargs| {
        let mut message = args.first().cloned();
        let mut category = args.get(1).cloned();
        for (name, value) in kwargs {
            match name.as_str() {
                "message" => message = Some(value.clone()),
                "category" => category = Some(value.clone()),
                "stacklevel" => {}
                other => {
                    return Err(ScriptError::type_error(format!(
                        "warn() got an unexpected keyword argument '{}'",
                        other
                    )));
                }
            }
        }
        let Some(message) = message else {
            return Err(ScriptError::type_error(
                "warn() missing required argument 'message' (pos 1)",
            ));
        };
        let (text, category) = if message.as_exception().is_some() {
            (interp.str_of(&message)?, interp.type_of(&message))
        } else {
            let category = match category {
                Some(c) if !c.is_none() => c,
                _ => interp.types().user_warning.clone(),
            };
            (interp.str_of(&message)?, category)
        };
        interp.warn(&text, &category)?;
        Ok(interp.none())
    });
    interp.setattr(&module, "warn", warn).ok();
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_warning_reaches_sink() {
        let interp = Interp::new();
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink_seen = seen.clone();
        interp.set_warning_sink(Some(Rc::new(move |_: &Interp, record: &WarningRecord| {
            sink_seen.borrow_mut().push(record.format());
        })));
        interp.linecache().register("w.py", "x = 1\n");
        {
            let _frame = interp.push_frame("w.py");
            interp.set_line(1);
            interp.warn("careful", &interp.types().user_warning).unwrap();
        }
        assert_eq!(seen.borrow().as_slice(), ["w.py:1: UserWarning: careful\n  x = 1\n"]);
    }

    #[test]
    fn test_category_must_be_warning() {
        let interp = Interp::new();
        let err = interp.warn("x", &interp.types().type_error).unwrap_err();
        assert!(matches!(err, ScriptError::TypeError(_)));
    }
}
