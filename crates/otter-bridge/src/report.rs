//! Error and warning bridge
//!
//! Failures cross the boundary exactly once, here. A host error reaching
//! script code becomes a `JSError` (or re-raises the script exception it
//! was made from); a script exception reaching host code becomes a host
//! error object carrying the exception's location, chained cause and
//! context, and a formatted traceback in `stack`.
//!
//! Uncaught failures at the outermost entry points and every script warning
//! are handed to a [`ReportSink`]; the default sink logs through `tracing`.

use std::rc::Rc;

use otter_host::{HostError, HostResult, ObjectRef, PropertyAttributes, PropertyKey, PropertySlot, Value};
use otter_script::{
    AttrMap, Frame, Interp, Obj, ScriptError, ScriptResult, WarningRecord, exception_name, traceback,
};
use rustc_hash::FxHashSet;

use crate::error::BridgeError;
use crate::host_proxy::HostProxy;
use crate::script_proxy::ScriptProxy;
use crate::state::BridgeState;

/// Hidden property linking a host error object to its script exception.
const SCRIPT_EXCEPTION_KEY: &str = "scriptException";

/// Exception attribute holding the host value a `JSError` was raised for.
const HOST_ERROR_ATTR: &str = "error";

const CAUSE_SEPARATOR: &str = "\nThe above exception was the direct cause of the following exception:\n\n";
const CONTEXT_SEPARATOR: &str = "\nDuring handling of the above exception, another exception occurred:\n\n";

/// An uncaught error at a bridge entry point.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Error name, `module.Name` for script exceptions outside the main module
    pub name: String,
    /// Error message
    pub message: String,
    /// File the error was raised in
    pub file_name: Option<String>,
    /// 1-based line
    pub line_number: Option<usize>,
    /// 1-based column
    pub column_number: Option<usize>,
    /// Offending source line
    pub source_line: Option<String>,
    /// Formatted traceback, ending with `Name: message`
    pub text: String,
    /// The host-side error object
    pub object: Value,
}

/// A script warning.
#[derive(Debug, Clone)]
pub struct WarningReport {
    /// Warning text
    pub message: String,
    /// Warning category name
    pub category: String,
    /// File the warning was issued from
    pub file_name: String,
    /// 1-based line
    pub line_number: usize,
    /// Source line, when available
    pub source_line: Option<String>,
    /// `file:line: Category: message` plus the indented source line
    pub text: String,
    /// The host-side warning object
    pub object: Value,
}

/// Receiver of bridge diagnostics.
pub trait ReportSink {
    /// An uncaught error left a bridge entry point.
    fn error(&self, report: &ErrorReport);

    /// A script warning was issued.
    fn warning(&self, report: &WarningReport);
}

/// Logs reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn error(&self, report: &ErrorReport) {
        tracing::error!(target: "otter_bridge", name = %report.name, "{}", report.text.trim_end());
    }

    fn warning(&self, report: &WarningReport) {
        tracing::warn!(target: "otter_bridge", category = %report.category, "{}", report.text.trim_end());
    }
}

/// Script classes raised by the bridge.
pub(crate) struct ErrorClasses {
    /// Base of the bridge exceptions
    pub(crate) error: Obj,
    /// A host error surfaced in script code
    pub(crate) js_error: Obj,
    /// Internal bridge failure
    pub(crate) xpcom_error: Obj,
    /// A host warning surfaced in script code
    pub(crate) js_warning: Obj,
}

impl ErrorClasses {
    pub(crate) fn install(interp: &Interp, module: &Obj, module_name: &str) -> ScriptResult<Self> {
        let types = interp.types();
        let error = interp.new_class("Error", module_name, vec![types.exception.clone()], AttrMap::default())?;
        let js_error = interp.new_class("JSError", module_name, vec![error.clone()], AttrMap::default())?;
        let xpcom_error = interp.new_class("XPCOMError", module_name, vec![error.clone()], AttrMap::default())?;
        let js_warning = interp.new_class("JSWarning", module_name, vec![types.warning.clone()], AttrMap::default())?;
        if let Some(dict) = interp.module_dict(module) {
            for (name, class) in [
                ("Error", &error),
                ("JSError", &js_error),
                ("XPCOMError", &xpcom_error),
                ("JSWarning", &js_warning),
            ] {
                interp.dict_set_str(&dict, name, class.clone());
            }
        }
        Ok(Self {
            error,
            js_error,
            xpcom_error,
            js_warning,
        })
    }
}

/// Convert host failures into script exceptions.
pub(crate) trait HostResultExt<T> {
    fn into_script(self, state: &BridgeState) -> ScriptResult<T>;
}

impl<T> HostResultExt<T> for HostResult<T> {
    fn into_script(self, state: &BridgeState) -> ScriptResult<T> {
        self.map_err(|e| state.host_error_to_script(e))
    }
}

/// Convert script failures into host errors.
pub(crate) trait ScriptResultExt<T> {
    fn into_host(self, state: &BridgeState) -> HostResult<T>;
}

impl<T> ScriptResultExt<T> for ScriptResult<T> {
    fn into_host(self, state: &BridgeState) -> HostResult<T> {
        self.map_err(|e| state.script_error_to_host(e))
    }
}

/// Where an exception was raised.
#[derive(Default)]
struct Location {
    file_name: Option<String>,
    line_number: Option<usize>,
    column_number: Option<usize>,
    source_line: Option<String>,
}

impl BridgeState {
    /// `JSError(message)`
    pub(crate) fn js_error(&self, message: &str) -> ScriptError {
        self.interp.raise_new(&self.errors.js_error, vec![self.interp.str(message)])
    }

    /// `XPCOMError(message)`
    pub(crate) fn xpcom_error(&self, message: &str) -> ScriptError {
        self.interp.raise_new(&self.errors.xpcom_error, vec![self.interp.str(message)])
    }

    pub(crate) fn host_error_to_script(&self, err: HostError) -> ScriptError {
        match err {
            HostError::OutOfMemory => ScriptError::MemoryError,
            HostError::Exception(thrown) => {
                if let Some(exc) = self.thrown_script_exception(&thrown.value) {
                    return self.interp.raise(exc);
                }
                let exc = self
                    .interp
                    .new_exception(&self.errors.js_error, vec![self.interp.str(thrown.message.as_str())]);
                if matches!(thrown.value, Value::Object(_)) {
                    if let (Ok(wrapped), Some(data)) = (self.to_script(&thrown.value), exc.as_exception()) {
                        data.dict.borrow_mut().insert(HOST_ERROR_ATTR.to_string(), wrapped);
                    }
                }
                self.interp.raise(exc)
            }
            other => self.js_error(&other.to_string()),
        }
    }

    /// The script exception a host error object was made from.
    fn thrown_script_exception(&self, value: &Value) -> Option<Obj> {
        let o = value.as_object()?;
        let slot = self.cx.get_own_property(o, &PropertyKey::string(SCRIPT_EXCEPTION_KEY)).ok()??;
        let PropertySlot::Data { value: Value::Object(p), .. } = slot else {
            return None;
        };
        let proxy = self.cx.native_data_as::<HostProxy>(p)?;
        proxy.target().filter(|exc| exc.as_exception().is_some())
    }

    pub(crate) fn script_error_to_host(&self, err: ScriptError) -> HostError {
        if matches!(err, ScriptError::MemoryError) {
            return HostError::OutOfMemory;
        }
        let exc = self.interp.exception_object(&err);
        if let Some(original) = self.original_host_error(&exc) {
            return self.cx.throw(original);
        }
        let error = self.wrap_error_for_host(&exc);
        self.cx.throw(Value::Object(error))
    }

    /// The host value a `JSError` was raised for.
    fn original_host_error(&self, exc: &Obj) -> Option<Value> {
        if !self.interp.is_instance(exc, &self.errors.js_error) {
            return None;
        }
        let wrapped = exc.as_exception()?.dict.borrow().get(HOST_ERROR_ATTR).cloned()?;
        wrapped.native_data::<ScriptProxy>()?.host_value().ok()
    }

    /// Host error object for a script exception.
    pub(crate) fn wrap_error_for_host(&self, exc: &Obj) -> ObjectRef {
        let mut seen = FxHashSet::default();
        self.wrap_error_chain(exc, &mut seen)
    }

    fn wrap_error_chain(&self, exc: &Obj, seen: &mut FxHashSet<usize>) -> ObjectRef {
        seen.insert(exc.id());
        let cx = &*self.cx;
        let name = exception_name(&self.interp.type_of(exc), &self.interp.config().main_module);
        let message = self.interp.exception_str(exc).unwrap_or_default();
        let error = cx.new_error(&name, &message);

        let location = self.location(exc);
        let hidden = PropertyAttributes::HIDDEN;
        if let Some(file) = &location.file_name {
            cx.define_property(error, "fileName", Value::string(file), hidden);
        }
        if let Some(line) = location.line_number {
            cx.define_property(error, "lineNumber", Value::number(line as f64), hidden);
        }
        if let Some(col) = location.column_number {
            cx.define_property(error, "columnNumber", Value::number(col as f64), hidden);
        }
        if let Some(source) = &location.source_line {
            cx.define_property(error, "sourceLine", Value::string(source), hidden);
        }
        cx.define_property(error, "stack", Value::string(&self.format_report(exc)), hidden);

        if let Some(data) = exc.as_exception() {
            let cause = data.cause.borrow().clone();
            if let Some(cause) = cause.filter(|c| !seen.contains(&c.id())) {
                let wrapped = self.wrap_error_chain(&cause, seen);
                cx.define_property(error, "cause", Value::Object(wrapped), hidden);
            }
            let context = data.context.borrow().clone();
            if let Some(context) = context.filter(|c| !data.suppress_context.get() && !seen.contains(&c.id())) {
                let wrapped = self.wrap_error_chain(&context, seen);
                cx.define_property(error, "context", Value::Object(wrapped), hidden);
            }
        }
        if let Ok(proxy) = self.host_proxy_for(exc) {
            cx.define_property(error, SCRIPT_EXCEPTION_KEY, Value::Object(proxy), hidden);
        }
        error
    }

    fn syntax_attr(&self, exc: &Obj, name: &str) -> Option<Obj> {
        if !self.interp.is_instance(exc, &self.interp.types().syntax_error) {
            return None;
        }
        exc.as_exception()?.dict.borrow().get(name).cloned()
    }

    fn location(&self, exc: &Obj) -> Location {
        if let Some(filename) = self.syntax_attr(exc, "filename") {
            let number = |name| {
                self.syntax_attr(exc, name)
                    .and_then(|v| v.as_int())
                    .and_then(|n| usize::try_from(n).ok())
            };
            return Location {
                file_name: filename.as_str().map(str::to_string),
                line_number: number("lineno"),
                column_number: number("offset"),
                source_line: self
                    .syntax_attr(exc, "text")
                    .and_then(|t| t.as_str().map(|s| s.trim_end().to_string())),
            };
        }
        match traceback(exc).pop() {
            Some(frame) => Location {
                file_name: Some(frame.filename),
                line_number: Some(frame.lineno),
                column_number: Some(frame.colno),
                source_line: frame.line,
            },
            None => Location::default(),
        }
    }

    /// Traceback text for an exception and its chain, oldest first.
    pub(crate) fn format_report(&self, exc: &Obj) -> String {
        let mut out = String::new();
        let mut seen = FxHashSet::default();
        self.format_chain(exc, &mut out, &mut seen);
        out
    }

    fn format_chain(&self, exc: &Obj, out: &mut String, seen: &mut FxHashSet<usize>) {
        if !seen.insert(exc.id()) {
            return;
        }
        if let Some(data) = exc.as_exception() {
            let cause = data.cause.borrow().clone();
            let context = data.context.borrow().clone();
            if let Some(cause) = cause.filter(|c| !seen.contains(&c.id())) {
                self.format_chain(&cause, out, seen);
                out.push_str(CAUSE_SEPARATOR);
            } else if let Some(context) =
                context.filter(|c| !data.suppress_context.get() && !seen.contains(&c.id()))
            {
                self.format_chain(&context, out, seen);
                out.push_str(CONTEXT_SEPARATOR);
            }
        }
        self.format_single(exc, out);
    }

    fn format_single(&self, exc: &Obj, out: &mut String) {
        let frames = traceback(exc);
        if !frames.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            let skip = self
                .config
                .traceback_limit
                .map_or(0, |limit| frames.len().saturating_sub(limit));
            for frame in &frames[skip..] {
                format_frame(frame, out);
            }
        }
        let name = exception_name(&self.interp.type_of(exc), &self.interp.config().main_module);
        if let Some(filename) = self.syntax_attr(exc, "filename") {
            let lineno = self.syntax_attr(exc, "lineno").and_then(|v| v.as_int()).unwrap_or(0);
            out.push_str(&format!(
                "  File \"{}\", line {}\n",
                filename.as_str().unwrap_or_default(),
                lineno
            ));
            if let Some(text) = self.syntax_attr(exc, "text").and_then(|t| t.as_str().map(str::to_string)) {
                let trimmed = text.trim_start();
                let indent = text.len() - trimmed.len();
                let offset = self.syntax_attr(exc, "offset").and_then(|v| v.as_int()).unwrap_or(1);
                let caret = usize::try_from(offset).unwrap_or(1).saturating_sub(1).saturating_sub(indent);
                out.push_str(&format!("    {}\n", trimmed.trim_end()));
                out.push_str(&format!("    {}^\n", " ".repeat(caret)));
            }
            let msg = self
                .syntax_attr(exc, "msg")
                .and_then(|m| m.as_str().map(str::to_string))
                .unwrap_or_default();
            out.push_str(&format!("{}: {}\n", name, msg));
            return;
        }
        match self.interp.exception_str(exc) {
            Ok(message) if !message.is_empty() => out.push_str(&format!("{}: {}\n", name, message)),
            _ => out.push_str(&format!("{}\n", name)),
        }
    }

    /// Host object describing a script warning.
    pub(crate) fn wrap_warning_for_host(&self, record: &WarningRecord) -> ObjectRef {
        let cx = &*self.cx;
        let warning = cx.new_object();
        let category = exception_name(&record.category, &self.interp.config().main_module);
        let data = PropertyAttributes::DATA;
        cx.define_property(warning, "message", Value::string(&record.message), data);
        cx.define_property(warning, "category", Value::string(&category), data);
        cx.define_property(warning, "fileName", Value::string(&record.filename), data);
        cx.define_property(warning, "lineNumber", Value::number(record.lineno as f64), data);
        let source = match &record.line {
            Some(line) => Value::string(line.trim()),
            None => Value::Null,
        };
        cx.define_property(warning, "sourceLine", source, data);
        cx.define_property(warning, "text", Value::string(&record.format()), data);
        warning
    }

    fn sink(&self) -> Rc<dyn ReportSink> {
        self.sink.borrow().clone().unwrap_or_else(|| Rc::new(TracingSink))
    }

    /// Hand a warning to the report sink.
    pub(crate) fn report_warning(&self, record: &WarningRecord) {
        let object = {
            let _entry = self.enter_from_script();
            Value::Object(self.wrap_warning_for_host(record))
        };
        let report = WarningReport {
            message: record.message.clone(),
            category: exception_name(&record.category, &self.interp.config().main_module),
            file_name: record.filename.clone(),
            line_number: record.lineno,
            source_line: record.line.as_ref().map(|l| l.trim().to_string()),
            text: record.format(),
            object,
        };
        self.sink().warning(&report);
    }

    /// Hand an uncaught error to the report sink.
    pub(crate) fn report_error(&self, err: &BridgeError) {
        let report = match err {
            BridgeError::Script(e) => self.script_error_report(e),
            BridgeError::Host(e) => self.host_error_report(e),
            other => ErrorReport {
                name: "Error".to_string(),
                message: other.to_string(),
                file_name: None,
                line_number: None,
                column_number: None,
                source_line: None,
                text: format!("{}\n", other),
                object: Value::Undefined,
            },
        };
        self.sink().error(&report);
    }

    fn script_error_report(&self, err: &ScriptError) -> ErrorReport {
        let exc = self.interp.exception_object(err);
        let location = self.location(&exc);
        ErrorReport {
            name: exception_name(&self.interp.type_of(&exc), &self.interp.config().main_module),
            message: self.interp.exception_str(&exc).unwrap_or_default(),
            file_name: location.file_name,
            line_number: location.line_number,
            column_number: location.column_number,
            source_line: location.source_line,
            text: self.format_report(&exc),
            object: Value::Object(self.wrap_error_for_host(&exc)),
        }
    }

    fn host_error_report(&self, err: &HostError) -> ErrorReport {
        let object = match err {
            HostError::Exception(thrown) => thrown.value.clone(),
            HostError::TypeError(m)
            | HostError::ReferenceError(m)
            | HostError::RangeError(m)
            | HostError::InternalError(m) => Value::Object(self.cx.new_error(err.class_name(), m)),
            HostError::OutOfMemory => Value::Object(self.cx.new_error("InternalError", "out of memory")),
        };
        let (name, message) = match object.as_object() {
            Some(o) => self.cx.error_name_and_message(o),
            None => (err.class_name().to_string(), self.cx.display(&object)),
        };
        let text = if message.is_empty() {
            format!("{}\n", name)
        } else {
            format!("{}: {}\n", name, message)
        };
        ErrorReport {
            name,
            message,
            file_name: None,
            line_number: None,
            column_number: None,
            source_line: None,
            text,
            object,
        }
    }
}

fn format_frame(frame: &Frame, out: &mut String) {
    out.push_str(&format!(
        "  File \"{}\", line {}, in {}\n",
        frame.filename, frame.lineno, frame.name
    ));
    if let Some(line) = &frame.line {
        out.push_str(&format!("    {}\n", line.trim()));
    }
}
