//! Tree-walking executor

use std::path::Path;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::ast::{Arg, CmpOp, Expr, LambdaDef, Literal, Stmt, StmtKind, UnaryOp};
use super::parser::{parse_expression, parse_module};
use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::object::{BuiltinFn, Frame, Kwargs, Obj};

/// Lambda parameters bound for one call, chained to the defining scope.
struct Scope {
    vars: FxHashMap<String, Obj>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Obj> {
        match self.vars.get(name) {
            Some(v) => Some(v.clone()),
            None => self.parent.as_ref()?.lookup(name),
        }
    }
}

/// What an expression evaluates against.
struct Context {
    globals: Obj,
    scope: Option<Rc<Scope>>,
    filename: Rc<str>,
}

impl Interp {
    /// Execute `source` with `globals` as the module namespace.
    ///
    /// The source is registered with the line cache under `filename` so
    /// traceback and warning lines resolve. Every error leaving a statement
    /// carries a frame for that statement.
    pub fn exec_source(&self, source: &str, filename: &str, globals: &Obj) -> ScriptResult<()> {
        if globals.as_dict().is_none() {
            return Err(ScriptError::type_error(format!(
                "globals must be a dict, not {}",
                self.type_name(globals)
            )));
        }
        let _gil = self.gil();
        self.linecache.register(filename, source);
        let body = parse_module(source, filename)?;
        tracing::trace!(filename, statements = body.len(), "exec");

        let _frame = self.push_frame(filename);
        let context = Context {
            globals: globals.clone(),
            scope: None,
            filename: Rc::from(filename),
        };
        for stmt in &body {
            self.set_line(stmt.line);
            if let Err(err) = self.exec_stmt(&context, stmt) {
                let frame = self.source_frame(filename, stmt.line, stmt.col, "<module>");
                return Err(self.add_traceback(err, frame));
            }
        }
        Ok(())
    }

    /// Evaluate a single expression against `globals`.
    pub fn eval_expr(&self, source: &str, globals: &Obj) -> ScriptResult<Obj> {
        let _gil = self.gil();
        let expr = parse_expression(source, "<string>")?;
        let context = Context {
            globals: globals.clone(),
            scope: None,
            filename: Rc::from("<string>"),
        };
        self.eval(&context, &expr)
    }

    /// Compile and run the file at `path` as a new module called `name`.
    ///
    /// The module is registered before its body runs and removed again if
    /// the body fails.
    pub fn import_file(&self, path: &Path, name: &str) -> ScriptResult<Obj> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::import_error(format!("cannot read {}: {}", path.display(), e))
        })?;
        let filename = path.to_string_lossy().into_owned();
        let module = self.new_module(name);
        let Some(globals) = self.module_dict(&module) else {
            return Err(ScriptError::runtime_error("module without a namespace"));
        };
        self.dict_set_str(&globals, "__file__", self.str(filename.as_str()));
        self.add_module(name, module.clone());
        tracing::debug!(name, path = %filename, "import file");
        if let Err(err) = self.exec_source(&source, &filename, &globals) {
            self.remove_module(name);
            return Err(err);
        }
        Ok(module)
    }

    /// A registered module by dotted name.
    pub fn import_module(&self, name: &str) -> ScriptResult<Obj> {
        self.module(name)
            .ok_or_else(|| ScriptError::import_error(format!("No module named '{}'", name)))
    }

    fn source_frame(&self, filename: &str, lineno: usize, colno: usize, name: &str) -> Frame {
        Frame {
            filename: filename.to_string(),
            lineno,
            colno,
            name: name.to_string(),
            line: self.linecache.getline(filename, lineno).map(|l| l.trim().to_string()),
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn exec_stmt(&self, cx: &Context, stmt: &Stmt) -> ScriptResult<()> {
        match &stmt.kind {
            StmtKind::Pass | StmtKind::Global(_) => Ok(()),
            StmtKind::Expr(expr) => self.eval(cx, expr).map(drop),
            StmtKind::Assign(targets, value) => {
                let value = self.eval(cx, value)?;
                for target in targets {
                    self.assign(cx, target, value.clone())?;
                }
                Ok(())
            }
            StmtKind::AugAssign(target, op, value) => match target {
                Expr::Name(name) => {
                    let current = self.lookup_name(cx, name)?;
                    let rhs = self.eval(cx, value)?;
                    let updated = self.inplace_op(&current, &rhs, *op)?;
                    self.dict_set_str(&cx.globals, name, updated);
                    Ok(())
                }
                Expr::Attribute(obj, name) => {
                    let obj = self.eval(cx, obj)?;
                    let current = self.getattr(&obj, name)?;
                    let rhs = self.eval(cx, value)?;
                    let updated = self.inplace_op(&current, &rhs, *op)?;
                    self.setattr(&obj, name, updated)
                }
                Expr::Subscript(obj, index) => {
                    let obj = self.eval(cx, obj)?;
                    let index = self.eval(cx, index)?;
                    let current = self.getitem(&obj, &index)?;
                    let rhs = self.eval(cx, value)?;
                    let updated = self.inplace_op(&current, &rhs, *op)?;
                    self.setitem(&obj, &index, updated)
                }
                _ => Err(ScriptError::type_error("illegal augmented assignment target")),
            },
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(cx, target)?;
                }
                Ok(())
            }
            StmtKind::Raise(None, _) => {
                Err(ScriptError::runtime_error("No active exception to reraise"))
            }
            StmtKind::Raise(Some(exc), cause) => {
                let exc = self.eval(cx, exc)?;
                match cause {
                    Some(cause) => {
                        let cause = self.eval(cx, cause)?;
                        Err(self.raise_from(&exc, &cause)?)
                    }
                    None => Err(self.raise(self.to_exception(&exc)?)),
                }
            }
            StmtKind::Assert(test, message) => {
                let value = self.eval(cx, test)?;
                if self.truthy(&value)? {
                    return Ok(());
                }
                let args = match message {
                    Some(m) => vec![self.eval(cx, m)?],
                    None => Vec::new(),
                };
                Err(self.raise_new(&self.types().assertion_error, args))
            }
            StmtKind::Import(names) => {
                for (module, alias) in names {
                    match alias {
                        Some(alias) => {
                            let m = self.import_module(module)?;
                            self.dict_set_str(&cx.globals, alias, m);
                        }
                        None => {
                            self.import_module(module)?;
                            let top = module.split('.').next().unwrap_or(module);
                            let m = self.import_module(top)?;
                            self.dict_set_str(&cx.globals, top, m);
                        }
                    }
                }
                Ok(())
            }
            StmtKind::FromImport(module, names) => {
                let m = self.import_module(module)?;
                for (name, alias) in names {
                    let value = match self.getattr(&m, name) {
                        Ok(v) => v,
                        Err(e) if self.is_attribute_error(&e) => {
                            return Err(ScriptError::import_error(format!(
                                "cannot import name '{}' from '{}'",
                                name, module
                            )));
                        }
                        Err(e) => return Err(e),
                    };
                    self.dict_set_str(&cx.globals, alias.as_deref().unwrap_or(name), value);
                }
                Ok(())
            }
        }
    }

    fn assign(&self, cx: &Context, target: &Expr, value: Obj) -> ScriptResult<()> {
        match target {
            Expr::Name(name) => {
                self.dict_set_str(&cx.globals, name, value);
                Ok(())
            }
            Expr::Attribute(obj, name) => {
                let obj = self.eval(cx, obj)?;
                self.setattr(&obj, name, value)
            }
            Expr::Subscript(obj, index) => {
                let obj = self.eval(cx, obj)?;
                let index = self.eval(cx, index)?;
                self.setitem(&obj, &index, value)
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                let items = self.iterate(&value)?;
                if items.len() < targets.len() {
                    return Err(ScriptError::value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(ScriptError::value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(cx, target, item)?;
                }
                Ok(())
            }
            _ => Err(ScriptError::type_error("cannot assign to expression")),
        }
    }

    fn delete(&self, cx: &Context, target: &Expr) -> ScriptResult<()> {
        match target {
            Expr::Name(name) => match self.dict_del_str(&cx.globals, name) {
                Some(_) => Ok(()),
                None => Err(ScriptError::name_error(format!("name '{}' is not defined", name))),
            },
            Expr::Attribute(obj, name) => {
                let obj = self.eval(cx, obj)?;
                self.delattr(&obj, name)
            }
            Expr::Subscript(obj, index) => {
                let obj = self.eval(cx, obj)?;
                let index = self.eval(cx, index)?;
                self.delitem(&obj, &index)
            }
            Expr::Tuple(targets) | Expr::List(targets) => {
                for target in targets {
                    self.delete(cx, target)?;
                }
                Ok(())
            }
            _ => Err(ScriptError::type_error("cannot delete expression")),
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn lookup_name(&self, cx: &Context, name: &str) -> ScriptResult<Obj> {
        if let Some(v) = cx.scope.as_ref().and_then(|s| s.lookup(name)) {
            return Ok(v);
        }
        if let Some(v) = self.dict_get_str(&cx.globals, name) {
            return Ok(v);
        }
        self.module_dict(self.builtins())
            .and_then(|b| self.dict_get_str(&b, name))
            .ok_or_else(|| ScriptError::name_error(format!("name '{}' is not defined", name)))
    }

    fn literal(&self, literal: &Literal) -> Obj {
        match literal {
            Literal::None => self.none(),
            Literal::Bool(b) => self.bool(*b),
            Literal::Int(i) => self.int(*i),
            Literal::Long(i) => self.long(i.clone()),
            Literal::Float(f) => self.float(*f),
            Literal::Str(s) => self.str(s.as_str()),
            Literal::Bytes(b) => self.bytes(b.clone()),
        }
    }

    fn eval_all(&self, cx: &Context, exprs: &[Expr]) -> ScriptResult<Vec<Obj>> {
        exprs.iter().map(|e| self.eval(cx, e)).collect()
    }

    fn eval(&self, cx: &Context, expr: &Expr) -> ScriptResult<Obj> {
        match expr {
            Expr::Literal(literal) => Ok(self.literal(literal)),
            Expr::Name(name) => self.lookup_name(cx, name),
            Expr::List(items) => Ok(self.list(self.eval_all(cx, items)?)),
            Expr::Tuple(items) => Ok(self.tuple(self.eval_all(cx, items)?)),
            Expr::Set(items) => self.set(self.eval_all(cx, items)?),
            Expr::Dict(pairs) => {
                let pairs = pairs
                    .iter()
                    .map(|(k, v)| Ok((self.eval(cx, k)?, self.eval(cx, v)?)))
                    .collect::<ScriptResult<Vec<_>>>()?;
                self.dict_from(pairs)
            }
            Expr::Attribute(obj, name) => {
                let obj = self.eval(cx, obj)?;
                self.getattr(&obj, name)
            }
            Expr::Subscript(obj, index) => {
                let obj = self.eval(cx, obj)?;
                let index = self.eval(cx, index)?;
                self.getitem(&obj, &index)
            }
            Expr::Slice(start, stop, step) => {
                let part = |e: &Option<Box<Expr>>| match e {
                    Some(e) => self.eval(cx, e),
                    None => Ok(self.none()),
                };
                let (start, stop, step) = (part(start)?, part(stop)?, part(step)?);
                Ok(self.slice(start, stop, step))
            }
            Expr::Call(func, args) => {
                let func = self.eval(cx, func)?;
                self.eval_call(cx, &func, args)
            }
            Expr::Unary(UnaryOp::Not, operand) => {
                let value = self.eval(cx, operand)?;
                Ok(self.bool(!self.truthy(&value)?))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(cx, operand)?;
                let symbol = match op {
                    UnaryOp::Neg => '-',
                    UnaryOp::Pos => '+',
                    _ => '~',
                };
                self.unary_op(symbol, &value)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(cx, left)?;
                let right = self.eval(cx, right)?;
                self.binary_op(&left, &right, *op)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(cx, first)?;
                let mut result = self.bool(true);
                for (op, right) in rest {
                    let right = self.eval(cx, right)?;
                    result = self.compare_one(*op, &left, &right)?;
                    if !self.truthy(&result)? {
                        return Ok(result);
                    }
                    left = right;
                }
                Ok(result)
            }
            Expr::And(left, right) => {
                let left = self.eval(cx, left)?;
                if !self.truthy(&left)? {
                    return Ok(left);
                }
                self.eval(cx, right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(cx, left)?;
                if self.truthy(&left)? {
                    return Ok(left);
                }
                self.eval(cx, right)
            }
            Expr::IfElse(cond, body, orelse) => {
                let cond = self.eval(cx, cond)?;
                if self.truthy(&cond)? {
                    self.eval(cx, body)
                } else {
                    self.eval(cx, orelse)
                }
            }
            Expr::Lambda(def) => self.make_lambda(cx, def),
        }
    }

    fn compare_one(&self, op: CmpOp, left: &Obj, right: &Obj) -> ScriptResult<Obj> {
        Ok(match op {
            CmpOp::Rich(op) => return self.richcompare(left, right, op),
            CmpOp::In => self.bool(self.contains(right, left)?),
            CmpOp::NotIn => self.bool(!self.contains(right, left)?),
            CmpOp::Is => self.bool(left.is(right)),
            CmpOp::IsNot => self.bool(!left.is(right)),
        })
    }

    fn eval_call(&self, cx: &Context, func: &Obj, args: &[Arg]) -> ScriptResult<Obj> {
        let mut positional: SmallVec<[Obj; 4]> = SmallVec::new();
        let mut keywords: Vec<(String, Obj)> = Vec::new();
        let add_keyword = |keywords: &mut Vec<(String, Obj)>, name: String, value: Obj| {
            if keywords.iter().any(|(k, _)| *k == name) {
                return Err(ScriptError::type_error(format!(
                    "got multiple values for keyword argument '{}'",
                    name
                )));
            }
            keywords.push((name, value));
            Ok(())
        };
        for arg in args {
            match arg {
                Arg::Positional(e) => positional.push(self.eval(cx, e)?),
                Arg::Star(e) => {
                    let value = self.eval(cx, e)?;
                    positional.extend(self.iterate(&value)?);
                }
                Arg::Keyword(name, e) => {
                    let value = self.eval(cx, e)?;
                    add_keyword(&mut keywords, name.clone(), value)?;
                }
                Arg::DoubleStar(e) => {
                    let mapping = self.eval(cx, e)?;
                    for key in self.iterate(&mapping)? {
                        let Some(name) = key.as_str() else {
                            return Err(ScriptError::type_error("keywords must be strings"));
                        };
                        let value = self.getitem(&mapping, &key)?;
                        add_keyword(&mut keywords, name.to_string(), value)?;
                    }
                }
            }
        }
        self.call(func, &positional, &keywords)
    }

    fn make_lambda(&self, cx: &Context, def: &Rc<LambdaDef>) -> ScriptResult<Obj> {
        let defaults = def
            .params
            .iter()
            .filter_map(|p| p.default.as_ref())
            .map(|e| self.eval(cx, e))
            .collect::<ScriptResult<Vec<_>>>()?;
        let module = self
            .dict_get_str(&cx.globals, "__name__")
            .and_then(|n| n.as_str().map(str::to_string));
        let def = def.clone();
        let globals = cx.globals.clone();
        let parent = cx.scope.clone();
        let filename = cx.filename.clone();
        let call: BuiltinFn = Rc::new(move |interp: &Interp, args: &[Obj], kwargs: &Kwargs| {
            let _frame = interp.push_frame(&filename);
            interp.set_line(def.line);
            let body = || {
                let vars = bind_arguments(interp, &def, &defaults, args, kwargs)?;
                let context = Context {
                    globals: globals.clone(),
                    scope: Some(Rc::new(Scope { vars, parent: parent.clone() })),
                    filename: filename.clone(),
                };
                interp.eval(&context, &def.body)
            };
            body().map_err(|err| {
                let frame = interp.source_frame(&filename, def.line, 0, "<lambda>");
                interp.add_traceback(err, frame)
            })
        });
        Ok(self.lambda(module, call))
    }
}

fn bind_arguments(
    interp: &Interp,
    def: &LambdaDef,
    defaults: &[Obj],
    args: &[Obj],
    kwargs: &Kwargs,
) -> ScriptResult<FxHashMap<String, Obj>> {
    let params = &def.params;
    let mut vars = FxHashMap::default();
    if args.len() > params.len() && def.varargs.is_none() {
        return Err(ScriptError::type_error(format!(
            "<lambda>() takes {} positional argument{} but {} were given",
            params.len(),
            if params.len() == 1 { "" } else { "s" },
            args.len()
        )));
    }
    for (param, arg) in params.iter().zip(args) {
        vars.insert(param.name.clone(), arg.clone());
    }
    if let Some(name) = &def.varargs {
        let extra = args.get(params.len()..).unwrap_or_default().to_vec();
        vars.insert(name.clone(), interp.tuple(extra));
    }
    let extra_kwargs = interp.dict();
    for (name, value) in kwargs {
        if params.iter().any(|p| p.name == *name) {
            if vars.contains_key(name) {
                return Err(ScriptError::type_error(format!(
                    "<lambda>() got multiple values for argument '{}'",
                    name
                )));
            }
            vars.insert(name.clone(), value.clone());
        } else if def.kwargs.is_some() {
            interp.dict_set_str(&extra_kwargs, name, value.clone());
        } else {
            return Err(ScriptError::type_error(format!(
                "<lambda>() got an unexpected keyword argument '{}'",
                name
            )));
        }
    }
    if let Some(name) = &def.kwargs {
        vars.insert(name.clone(), extra_kwargs);
    }
    let first_default = params.len() - defaults.len();
    let mut missing = Vec::new();
    for (i, param) in params.iter().enumerate() {
        if vars.contains_key(&param.name) {
            continue;
        }
        match i.checked_sub(first_default).and_then(|d| defaults.get(d)) {
            Some(default) => {
                vars.insert(param.name.clone(), default.clone());
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        return Err(ScriptError::type_error(format!(
            "<lambda>() missing {} required positional argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            missing.join(" and ")
        )));
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exceptions::traceback;

    fn run(interp: &Interp, source: &str) -> ScriptResult<Obj> {
        let globals = interp.dict();
        interp.exec_source(source, "<test>", &globals)?;
        Ok(globals)
    }

    #[test]
    fn test_assignment_and_arithmetic() {
        let interp = Interp::new();
        let globals = run(&interp, "a, b = 2, 3\nc = a * b + 1\nc += 2\n").unwrap();
        assert_eq!(interp.dict_get_str(&globals, "c").and_then(|c| c.as_int()), Some(9));
    }

    #[test]
    fn test_lambda_defaults_and_closure() {
        let interp = Interp::new();
        let globals = run(&interp, "k = 10\nadd = lambda x, y=1: lambda z: x + y + z + k\nr = add(1)(2)\n").unwrap();
        assert_eq!(interp.dict_get_str(&globals, "r").and_then(|r| r.as_int()), Some(14));
    }

    #[test]
    fn test_name_error_carries_frame() {
        let interp = Interp::new();
        let err = run(&interp, "x = 1\ny = missing\n").unwrap_err();
        let exc = interp.exception_object(&err);
        assert_eq!(interp.exception_summary(&exc), "NameError: name 'missing' is not defined");
        let frames = traceback(&exc);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].lineno, 2);
        assert_eq!(frames[0].line.as_deref(), Some("y = missing"));
    }

    #[test]
    fn test_lambda_frame_is_innermost() {
        let interp = Interp::new();
        let err = run(&interp, "f = lambda: 1 / 0\nf()\n").unwrap_err();
        let frames = traceback(&interp.exception_object(&err));
        let names: Vec<&str> = frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["<module>", "<lambda>"]);
    }

    #[test]
    fn test_unpack_mismatch() {
        let interp = Interp::new();
        let err = run(&interp, "a, b = [1]\n").unwrap_err();
        assert!(err.to_string().contains("not enough values to unpack (expected 2, got 1)"));
    }

    #[test]
    fn test_lambda_arity() {
        let interp = Interp::new();
        let err = run(&interp, "f = lambda a, b: a\nf(1)\n").unwrap_err();
        assert!(err.to_string().contains("missing 1 required positional argument: 'b'"));
    }
}
