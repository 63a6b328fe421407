//! Exception objects: materialization, matching, chaining and tracebacks

use crate::error::{RaisedException, ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::object::{Frame, Obj, Payload};

/// `module.Name` of an exception class; bare for builtins and the main
/// module.
pub fn exception_name(class: &Obj, main_module: &str) -> String {
    match class.as_class() {
        Some(c) if c.module == "builtins" || c.module == main_module => c.name.clone(),
        Some(c) => format!("{}.{}", c.module, c.name),
        None => "Exception".to_string(),
    }
}

/// Traceback frames of an exception, outermost first.
pub fn traceback(exc: &Obj) -> Vec<Frame> {
    exc.as_exception()
        .map(|e| e.traceback.borrow().clone())
        .unwrap_or_default()
}

impl Interp {
    /// Exception object carried by `err`, materializing a builtin kind.
    pub fn exception_object(&self, err: &ScriptError) -> Obj {
        if let ScriptError::Raised(raised) = err {
            return raised.exception.clone();
        }
        let class = err
            .builtin_name()
            .and_then(|name| self.types().exception_class(name))
            .unwrap_or(&self.types().runtime_error)
            .clone();
        let args = match err {
            ScriptError::StopIteration | ScriptError::MemoryError => Vec::new(),
            ScriptError::SyntaxError(info) => {
                let location = self.tuple(vec![
                    self.str(info.filename.as_str()),
                    self.int(info.lineno as i64),
                    self.int(info.offset as i64),
                    info.text.as_ref().map(|t| self.str(t.as_str())).unwrap_or_else(|| self.none()),
                ]);
                vec![self.str(info.message.as_str()), location]
            }
            other => vec![self.str(other.message())],
        };
        let exc = self.new_exception(&class, args);
        if let (ScriptError::SyntaxError(info), Some(data)) = (err, exc.as_exception()) {
            let mut dict = data.dict.borrow_mut();
            dict.insert("msg".into(), self.str(info.message.as_str()));
            dict.insert("filename".into(), self.str(info.filename.as_str()));
            dict.insert("lineno".into(), self.int(info.lineno as i64));
            dict.insert("offset".into(), self.int(info.offset as i64));
            dict.insert(
                "text".into(),
                info.text.as_ref().map(|t| self.str(t.as_str())).unwrap_or_else(|| self.none()),
            );
        }
        exc
    }

    /// Turn `err` into [`ScriptError::Raised`].
    pub fn materialize(&self, err: ScriptError) -> ScriptError {
        match err {
            ScriptError::Raised(_) => err,
            other => self.raise(self.exception_object(&other)),
        }
    }

    /// Raise an exception instance. Classes are instantiated first.
    pub fn raise(&self, exc: Obj) -> ScriptError {
        let summary = self.exception_summary(&exc);
        ScriptError::Raised(Box::new(RaisedException { exception: exc, summary }))
    }

    /// Raise `class(*args)`.
    pub fn raise_new(&self, class: &Obj, args: Vec<Obj>) -> ScriptError {
        self.raise(self.new_exception(class, args))
    }

    /// `KeyError(key)`
    pub fn key_error(&self, key: &Obj) -> ScriptError {
        self.raise_new(&self.types().key_error, vec![key.clone()])
    }

    /// Coerce the operand of `raise` into an exception instance.
    pub fn to_exception(&self, value: &Obj) -> ScriptResult<Obj> {
        if value.as_exception().is_some() {
            return Ok(value.clone());
        }
        if value.as_class().is_some() && self.is_subclass(value, &self.types().base_exception) {
            let exc = self.call(value, &[], &[])?;
            if exc.as_exception().is_some() {
                return Ok(exc);
            }
        }
        Err(ScriptError::type_error(
            "exceptions must derive from BaseException",
        ))
    }

    /// `raise exc from cause`; a `None` cause suppresses the context.
    pub fn raise_from(&self, exc: &Obj, cause: &Obj) -> ScriptResult<ScriptError> {
        let exc = self.to_exception(exc)?;
        let cause = if cause.is_none() { None } else { Some(self.to_exception(cause)?) };
        if let Some(data) = exc.as_exception() {
            *data.cause.borrow_mut() = cause;
            data.suppress_context.set(true);
        }
        Ok(self.raise(exc))
    }

    /// Whether `err` is an instance of exception `class`.
    pub fn error_matches(&self, err: &ScriptError, class: &Obj) -> bool {
        match err {
            ScriptError::Raised(raised) => self.is_instance(&raised.exception, class),
            other => other
                .builtin_name()
                .and_then(|name| self.types().exception_class(name))
                .is_some_and(|c| self.is_subclass(c, class)),
        }
    }

    /// `AttributeError` check used by attribute fallback paths.
    pub fn is_attribute_error(&self, err: &ScriptError) -> bool {
        match err {
            ScriptError::AttributeError(_) => true,
            ScriptError::Raised(_) => self.error_matches(err, &self.types().attribute_error),
            _ => false,
        }
    }

    /// Class of the exception `err` carries.
    pub fn error_class(&self, err: &ScriptError) -> Obj {
        match err {
            ScriptError::Raised(raised) => self.type_of(&raised.exception),
            other => other
                .builtin_name()
                .and_then(|name| self.types().exception_class(name))
                .unwrap_or(&self.types().runtime_error)
                .clone(),
        }
    }

    /// Record a frame on the way out; frames are prepended so the
    /// outermost ends up first.
    pub fn add_traceback(&self, err: ScriptError, frame: Frame) -> ScriptError {
        let err = self.materialize(err);
        if let ScriptError::Raised(raised) = &err {
            if let Some(data) = raised.exception.as_exception() {
                data.traceback.borrow_mut().insert(0, frame);
            }
        }
        err
    }

    /// Set `__context__` on the exception `err` carries.
    pub fn set_context(&self, err: ScriptError, context: &Obj) -> ScriptError {
        let err = self.materialize(err);
        if let ScriptError::Raised(raised) = &err {
            if let Some(data) = raised.exception.as_exception() {
                if !raised.exception.is(context) && data.context.borrow().is_none() {
                    *data.context.borrow_mut() = Some(context.clone());
                }
            }
        }
        err
    }

    /// `str(exc)` for exception instances.
    pub fn exception_str(&self, exc: &Obj) -> ScriptResult<String> {
        let Some(data) = exc.as_exception() else {
            return self.str_of(exc);
        };
        if self.is_subclass(&data.class, &self.types().syntax_error) {
            let attrs = data.dict.borrow();
            if let (Some(msg), Some(filename), Some(lineno)) =
                (attrs.get("msg"), attrs.get("filename"), attrs.get("lineno"))
            {
                return Ok(format!(
                    "{} ({}, line {})",
                    msg.as_str().unwrap_or_default(),
                    filename.as_str().unwrap_or_default(),
                    lineno.as_int().unwrap_or_default()
                ));
            }
        }
        let args = data.args.borrow().clone();
        match args.len() {
            0 => Ok(String::new()),
            1 if self.is_subclass(&data.class, &self.types().key_error) => self.repr(&args[0]),
            1 => self.str_of(&args[0]),
            _ => self.repr(&self.tuple(args)),
        }
    }

    /// `Name: message`, or `Name` alone for an empty message.
    pub fn exception_summary(&self, exc: &Obj) -> String {
        let name = exception_name(&self.type_of(exc), &self.config().main_module);
        let message = self
            .str_of(exc)
            .unwrap_or_else(|_| "<exception str() failed>".to_string());
        if message.is_empty() {
            name
        } else {
            format!("{}: {}", name, message)
        }
    }

    pub(crate) fn exception_attr(&self, exc: &Obj, name: &str) -> Option<Obj> {
        let data = exc.as_exception()?;
        let chained = |slot: &std::cell::RefCell<Option<Obj>>| {
            Some(slot.borrow().clone().unwrap_or_else(|| self.none()))
        };
        match name {
            "args" => Some(self.tuple(data.args.borrow().clone())),
            "__cause__" => chained(&data.cause),
            "__context__" => chained(&data.context),
            "__suppress_context__" => Some(self.bool(data.suppress_context.get())),
            "__traceback__" => Some(self.none()),
            "__dict__" => self.vars(exc).ok(),
            _ => data.dict.borrow().get(name).cloned(),
        }
    }

    pub(crate) fn store_exception_attr(
        &self,
        exc: &Obj,
        name: &str,
        value: Option<&Obj>,
    ) -> ScriptResult<bool> {
        let Some(data) = exc.as_exception() else {
            return Ok(false);
        };
        if !matches!(name, "args" | "__cause__" | "__context__" | "__suppress_context__") {
            return Ok(false);
        }
        let Some(value) = value else {
            return Err(ScriptError::type_error(format!("can't delete {} attribute", name)));
        };
        let chained = |what: &str| -> ScriptResult<Option<Obj>> {
            if value.is_none() {
                Ok(None)
            } else if value.as_exception().is_some() {
                Ok(Some(value.clone()))
            } else {
                Err(ScriptError::type_error(format!(
                    "exception {} must be None or derive from BaseException",
                    what
                )))
            }
        };
        match name {
            "args" => *data.args.borrow_mut() = self.iterate(value)?,
            "__cause__" => {
                *data.cause.borrow_mut() = chained("cause")?;
                data.suppress_context.set(true);
            }
            "__context__" => *data.context.borrow_mut() = chained("context")?,
            _ => data.suppress_context.set(self.truthy(value)?),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_builtin_kind() {
        let interp = Interp::new();
        let err = interp.materialize(ScriptError::value_error("bad value"));
        let ScriptError::Raised(raised) = &err else {
            panic!("expected a raised exception");
        };
        assert_eq!(raised.summary, "ValueError: bad value");
        assert!(interp.error_matches(&err, &interp.types().exception));
        assert!(!interp.error_matches(&err, &interp.types().type_error));
    }

    #[test]
    fn test_key_error_str_is_repr() {
        let interp = Interp::new();
        let err = interp.key_error(&interp.str("x"));
        assert_eq!(err.to_string(), "KeyError: 'x'");
        let plain = interp.materialize(ScriptError::key_error("y"));
        assert_eq!(plain.to_string(), "KeyError: 'y'");
    }

    #[test]
    fn test_exception_name_qualification() {
        let interp = Interp::new();
        let class = interp
            .new_class("Boom", "pkg.mod", vec![interp.types().exception.clone()], Default::default())
            .unwrap();
        assert_eq!(exception_name(&class, "__main__"), "pkg.mod.Boom");
        assert_eq!(exception_name(&interp.types().type_error, "__main__"), "TypeError");
    }

    #[test]
    fn test_traceback_prepends_outer_frames() {
        let interp = Interp::new();
        let frame = |line| Frame {
            filename: "f.py".into(),
            lineno: line,
            colno: 0,
            name: "<module>".into(),
            line: None,
        };
        let err = interp.add_traceback(ScriptError::type_error("x"), frame(2));
        let err = interp.add_traceback(err, frame(1));
        let lines: Vec<usize> = traceback(&interp.exception_object(&err)).iter().map(|f| f.lineno).collect();
        assert_eq!(lines, vec![1, 2]);
    }
}
