//! `repr()` and `str()`

use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::number::float_repr;
use crate::object::{FunctionKind, Obj, Payload};
use crate::protocol::qualified_class_name;

/// Quote a string the way `repr` does.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn quote_bytes(b: &[u8]) -> String {
    let quote = if b.contains(&b'\'') && !b.contains(&b'"') { b'"' } else { b'\'' };
    let mut out = String::from("b");
    out.push(quote as char);
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push(quote as char);
    out
}

impl Interp {
    /// Render a container, substituting `placeholder` when it is already
    /// being rendered further up the stack.
    fn guarded(
        &self,
        obj: &Obj,
        placeholder: &str,
        render: impl FnOnce() -> ScriptResult<String>,
    ) -> ScriptResult<String> {
        if self.repr_stack.borrow().contains(&obj.id()) {
            return Ok(placeholder.to_string());
        }
        self.repr_stack.borrow_mut().push(obj.id());
        let result = render();
        self.repr_stack.borrow_mut().pop();
        result
    }

    fn join_reprs<'a>(&self, items: impl IntoIterator<Item = &'a Obj>) -> ScriptResult<String> {
        let parts = items
            .into_iter()
            .map(|item| self.repr(item))
            .collect::<ScriptResult<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    fn default_repr(&self, obj: &Obj) -> String {
        format!(
            "<{} object at {:#x}>",
            qualified_class_name(&self.type_of(obj)),
            obj.id()
        )
    }

    fn user_text(&self, obj: &Obj, method: &str) -> ScriptResult<Option<String>> {
        let class = self.type_of(obj);
        let Some(m) = self.lookup_type_attr(&class, method) else {
            return Ok(None);
        };
        let bound = self.bound_method(m, obj.clone());
        let result = self.call(&bound, &[], &[])?;
        match result.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(ScriptError::type_error(format!(
                "{}() returned non-string (type {})",
                method,
                self.type_name(&result)
            ))),
        }
    }

    /// `repr(obj)`
    pub fn repr(&self, obj: &Obj) -> ScriptResult<String> {
        Ok(match obj.payload() {
            Payload::None => "None".to_string(),
            Payload::NotImplemented => "NotImplemented".to_string(),
            Payload::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Payload::Int(i) => i.to_string(),
            Payload::Long(i) => i.to_string(),
            Payload::Float(f) => float_repr(*f),
            Payload::Str(s) => quote_str(s),
            Payload::Bytes(b) => quote_bytes(b),
            Payload::List(items) => {
                let items = items.borrow().clone();
                self.guarded(obj, "[...]", || Ok(format!("[{}]", self.join_reprs(&items)?)))?
            }
            Payload::Tuple(items) => match items.len() {
                1 => format!("({},)", self.repr(&items[0])?),
                _ => self.guarded(obj, "(...)", || Ok(format!("({})", self.join_reprs(items)?)))?,
            },
            Payload::Dict(map) => {
                let pairs: Vec<(Obj, Obj)> = map.borrow().values().cloned().collect();
                self.guarded(obj, "{...}", || {
                    let parts = pairs
                        .iter()
                        .map(|(k, v)| Ok(format!("{}: {}", self.repr(k)?, self.repr(v)?)))
                        .collect::<ScriptResult<Vec<_>>>()?;
                    Ok(format!("{{{}}}", parts.join(", ")))
                })?
            }
            Payload::Set(map) => {
                let items: Vec<Obj> = map.borrow().values().cloned().collect();
                if items.is_empty() {
                    "set()".to_string()
                } else {
                    self.guarded(obj, "{...}", || Ok(format!("{{{}}}", self.join_reprs(&items)?)))?
                }
            }
            Payload::FrozenSet(map) => {
                if map.is_empty() {
                    "frozenset()".to_string()
                } else {
                    format!("frozenset({{{}}})", self.join_reprs(map.values())?)
                }
            }
            Payload::Slice(start, stop, step) => format!(
                "slice({}, {}, {})",
                self.repr(start)?,
                self.repr(stop)?,
                self.repr(step)?
            ),
            Payload::Function(f) => match f.kind {
                FunctionKind::Builtin => format!("<built-in function {}>", f.name),
                FunctionKind::Lambda => format!("<function {} at {:#x}>", f.name, obj.id()),
            },
            Payload::BoundMethod(func, receiver) => {
                let name = match func.payload() {
                    Payload::Function(f) => f.name.clone(),
                    _ => "?".to_string(),
                };
                format!("<bound method {} of {}>", name, self.repr(receiver)?)
            }
            Payload::Class(_) => format!("<class '{}'>", qualified_class_name(obj)),
            Payload::Instance(_) => match self.user_text(obj, "__repr__")? {
                Some(s) => s,
                None => self.default_repr(obj),
            },
            Payload::Iterator(it) => format!("<{} object at {:#x}>", it.name, obj.id()),
            Payload::Exception(e) => match self.user_text(obj, "__repr__")? {
                Some(s) => s,
                None => {
                    let args = e.args.borrow().clone();
                    let name = crate::protocol::class_name(&e.class);
                    match args.len() {
                        1 => format!("{}({})", name, self.repr(&args[0])?),
                        _ => format!("{}({})", name, self.join_reprs(&args)?),
                    }
                }
            },
            Payload::Module(m) => format!("<module '{}'>", m.name),
            Payload::Native(cell) => match cell.data.repr(self, obj) {
                Some(s) => s?,
                None => self.default_repr(obj),
            },
        })
    }

    /// `str(obj)`
    pub fn str_of(&self, obj: &Obj) -> ScriptResult<String> {
        match obj.payload() {
            Payload::Str(s) => Ok(s.clone()),
            Payload::Exception(_) => match self.user_text(obj, "__str__")? {
                Some(s) => Ok(s),
                None => self.exception_str(obj),
            },
            Payload::Instance(_) => match self.user_text(obj, "__str__")? {
                Some(s) => Ok(s),
                None => self.repr(obj),
            },
            Payload::Native(cell) => match cell.data.str(self, obj) {
                Some(s) => s,
                None => self.repr(obj),
            },
            _ => self.repr(obj),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_str_picks_quote() {
        assert_eq!(quote_str("abc"), "'abc'");
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
        assert_eq!(quote_str("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn test_quote_bytes() {
        assert_eq!(quote_bytes(b"ab\x00"), "b'ab\\x00'");
    }

    #[test]
    fn test_recursive_list_repr() {
        let interp = Interp::new();
        let list = interp.list(vec![interp.int(1)]);
        list.as_list().unwrap().borrow_mut().push(list.clone());
        assert_eq!(interp.repr(&list).unwrap(), "[1, [...]]");
        list.as_list().unwrap().borrow_mut().clear();
    }
}
