//! The `builtins` module, builtin constructors and builtin type methods

use std::cell::RefCell;
use std::io::Write;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed};

use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::number::Number;
use crate::object::{AttrMap, DictMap, Kwargs, Obj, Payload, SetMap};
use crate::ops::{BinaryOp, CompareOp};

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// `name() takes exactly N argument(s) (M given)`
pub(crate) fn expect_args(name: &str, args: &[Obj], n: usize) -> ScriptResult<()> {
    if args.len() != n {
        return Err(ScriptError::type_error(format!(
            "{}() takes exactly {} argument{} ({} given)",
            name,
            n,
            plural(n),
            args.len()
        )));
    }
    Ok(())
}

fn expect_range(name: &str, args: &[Obj], min: usize, max: usize) -> ScriptResult<()> {
    if args.len() < min {
        return Err(ScriptError::type_error(format!(
            "{} expected at least {} argument{}, got {}",
            name,
            min,
            plural(min),
            args.len()
        )));
    }
    if args.len() > max {
        return Err(ScriptError::type_error(format!(
            "{} expected at most {} argument{}, got {}",
            name,
            max,
            plural(max),
            args.len()
        )));
    }
    Ok(())
}

fn no_kwargs(name: &str, kwargs: &Kwargs) -> ScriptResult<()> {
    if !kwargs.is_empty() {
        return Err(ScriptError::type_error(format!(
            "{}() takes no keyword arguments",
            name
        )));
    }
    Ok(())
}

fn kwarg<'a>(kwargs: &'a Kwargs, name: &str) -> Option<&'a Obj> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn attr_name<'a>(interp: &Interp, obj: &'a Obj) -> ScriptResult<&'a str> {
    obj.as_str().ok_or_else(|| {
        ScriptError::type_error(format!(
            "attribute name must be string, not '{}'",
            interp.type_name(obj)
        ))
    })
}

fn text_arg<'a>(interp: &Interp, obj: &'a Obj) -> ScriptResult<&'a str> {
    obj.as_str().ok_or_else(|| {
        ScriptError::type_error(format!("must be str, not {}", interp.type_name(obj)))
    })
}

fn receiver<'a>(name: &str, args: &'a [Obj]) -> ScriptResult<(&'a Obj, &'a [Obj])> {
    args.split_first()
        .ok_or_else(|| ScriptError::type_error(format!("descriptor '{}' needs an argument", name)))
}

fn descriptor_error(interp: &Interp, name: &str, owner: &str, this: &Obj) -> ScriptError {
    ScriptError::type_error(format!(
        "descriptor '{}' requires a '{}' object but received a '{}'",
        name,
        owner,
        interp.type_name(this)
    ))
}

fn index_arg(interp: &Interp, obj: &Obj) -> ScriptResult<isize> {
    interp.index_value(obj)?.ok_or_else(|| {
        ScriptError::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            interp.type_name(obj)
        ))
    })
}

/// Stable merge sort with a fallible less-than.
fn merge_sort<T: Clone>(
    items: Vec<T>,
    less: &mut dyn FnMut(&T, &T) -> ScriptResult<bool>,
) -> ScriptResult<Vec<T>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, less)?;
    let right = merge_sort(right, less)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if less(&right[j], &left[i])? {
            out.push(right[j].clone());
            j += 1;
        } else {
            out.push(left[i].clone());
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    Ok(out)
}

/// `sorted(items, key=key, reverse=reverse)`
pub(crate) fn sort_objects(
    interp: &Interp,
    items: Vec<Obj>,
    key: Option<&Obj>,
    reverse: bool,
) -> ScriptResult<Vec<Obj>> {
    let keyed = items
        .into_iter()
        .map(|item| {
            let k = match key {
                Some(f) if !f.is_none() => interp.call(f, std::slice::from_ref(&item), &[])?,
                _ => item.clone(),
            };
            Ok((k, item))
        })
        .collect::<ScriptResult<Vec<_>>>()?;
    let sorted = merge_sort(keyed, &mut |a: &(Obj, Obj), b: &(Obj, Obj)| {
        if reverse {
            interp.compare(&b.0, &a.0, CompareOp::Lt)
        } else {
            interp.compare(&a.0, &b.0, CompareOp::Lt)
        }
    })?;
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

/// Merge a mapping or an iterable of pairs into `target`.
pub(crate) fn dict_update(interp: &Interp, target: &Obj, source: &Obj) -> ScriptResult<()> {
    if let Some(map) = source.as_dict() {
        let pairs: Vec<(Obj, Obj)> = map.borrow().values().cloned().collect();
        for (k, v) in pairs {
            interp.setitem(target, &k, v)?;
        }
        return Ok(());
    }
    if interp.hasattr(source, "keys")? {
        let keys = interp.call_method(source, "keys", &[])?;
        for k in interp.iterate(&keys)? {
            let v = interp.getitem(source, &k)?;
            interp.setitem(target, &k, v)?;
        }
        return Ok(());
    }
    for (i, item) in interp.iterate(source)?.into_iter().enumerate() {
        let pair = interp.iterate(&item).map_err(|_| {
            ScriptError::type_error(format!(
                "cannot convert dictionary update sequence element #{} to a sequence",
                i
            ))
        })?;
        if pair.len() != 2 {
            return Err(ScriptError::value_error(format!(
                "dictionary update sequence element #{} has length {}; 2 is required",
                i,
                pair.len()
            )));
        }
        interp.setitem(target, &pair[0], pair[1].clone())?;
    }
    Ok(())
}

fn parse_int(text: &str, base: u32) -> Option<BigInt> {
    let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.to_string()),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned).to_string()),
    };
    let digits = match base {
        16 => digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(&digits).to_string(),
        8 => digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")).unwrap_or(&digits).to_string(),
        2 => digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")).unwrap_or(&digits).to_string(),
        _ => digits,
    };
    if digits.is_empty() {
        return None;
    }
    let value = BigInt::parse_bytes(digits.as_bytes(), base)?;
    Some(if negative { -value } else { value })
}

fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim().to_ascii_lowercase();
    match t.trim_start_matches(['+', '-']) {
        "inf" | "infinity" => Some(if t.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY }),
        "nan" => Some(f64::NAN),
        _ => t.replace('_', "").parse().ok(),
    }
}

fn decode_utf8(interp: &Interp, bytes: &[u8]) -> ScriptResult<Obj> {
    String::from_utf8(bytes.to_vec())
        .map(|s| interp.str(s))
        .map_err(|e| ScriptError::value_error(format!("'utf-8' codec can't decode bytes: {}", e)))
}

// ---------------------------------------------------------------------------
// Builtin constructors
// ---------------------------------------------------------------------------

pub(crate) fn ctor_int(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("int", kwargs)?;
    expect_range("int", args, 0, 2)?;
    let Some(value) = args.first() else {
        return Ok(interp.int(0));
    };
    if let Some(base) = args.get(1) {
        let base = index_arg(interp, base)?;
        if !(2..=36).contains(&base) {
            return Err(ScriptError::value_error("int() base must be >= 2 and <= 36"));
        }
        let Some(text) = value.as_str() else {
            return Err(ScriptError::type_error("int() can't convert non-string with explicit base"));
        };
        return parse_int(text, base as u32).map(|i| interp.long(i)).ok_or_else(|| {
            ScriptError::value_error(format!(
                "invalid literal for int() with base {}: {}",
                base,
                crate::repr::quote_str(text)
            ))
        });
    }
    match value.payload() {
        Payload::Int(i) => Ok(interp.int(*i)),
        Payload::Bool(b) => Ok(interp.int(*b as i64)),
        Payload::Long(_) => Ok(value.clone()),
        Payload::Float(f) => {
            if f.is_nan() {
                return Err(ScriptError::value_error("cannot convert float NaN to integer"));
            }
            if f.is_infinite() {
                return Err(ScriptError::overflow_error("cannot convert float infinity to integer"));
            }
            BigInt::from_f64(f.trunc())
                .map(|i| interp.long(i))
                .ok_or_else(|| ScriptError::overflow_error("cannot convert float infinity to integer"))
        }
        Payload::Str(s) => parse_int(s, 10).map(|i| interp.long(i)).ok_or_else(|| {
            ScriptError::value_error(format!(
                "invalid literal for int() with base 10: {}",
                crate::repr::quote_str(s)
            ))
        }),
        _ => match interp.lookup_type_attr(&interp.type_of(value), "__int__") {
            Some(m) => interp.call(&interp.bound_method(m, value.clone()), &[], &[]),
            None => Err(ScriptError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                interp.type_name(value)
            ))),
        },
    }
}

pub(crate) fn ctor_bool(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("bool", kwargs)?;
    expect_range("bool", args, 0, 1)?;
    match args.first() {
        Some(v) => Ok(interp.bool(interp.truthy(v)?)),
        None => Ok(interp.bool(false)),
    }
}

pub(crate) fn ctor_type(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("type", kwargs)?;
    match args {
        [obj] => Ok(interp.type_of(obj)),
        [name, bases, dict] => {
            let name = name
                .as_str()
                .ok_or_else(|| ScriptError::type_error("type.__new__() argument 1 must be str"))?;
            let bases = bases
                .as_tuple()
                .ok_or_else(|| ScriptError::type_error("type.__new__() argument 2 must be tuple"))?
                .to_vec();
            let Some(map) = dict.as_dict() else {
                return Err(ScriptError::type_error("type.__new__() argument 3 must be dict"));
            };
            let mut attrs = AttrMap::default();
            for (k, v) in map.borrow().values() {
                let Some(key) = k.as_str() else {
                    return Err(ScriptError::type_error("type.__new__() attribute names must be strings"));
                };
                attrs.insert(key.to_string(), v.clone());
            }
            let module = attrs
                .shift_remove("__module__")
                .and_then(|m| m.as_str().map(str::to_string))
                .unwrap_or_else(|| interp.config().main_module.clone());
            interp.new_class(name, &module, bases, attrs)
        }
        _ => Err(ScriptError::type_error("type() takes 1 or 3 arguments")),
    }
}

pub(crate) fn ctor_float(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("float", kwargs)?;
    expect_range("float", args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(interp.float(0.0));
    };
    if let Some(n) = Number::of(value) {
        return Ok(interp.float(n.to_f64()?));
    }
    match value.payload() {
        Payload::Str(s) => parse_float(s).map(|f| interp.float(f)).ok_or_else(|| {
            ScriptError::value_error(format!(
                "could not convert string to float: {}",
                crate::repr::quote_str(s)
            ))
        }),
        _ => Err(ScriptError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            interp.type_name(value)
        ))),
    }
}

pub(crate) fn ctor_str(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("str", kwargs)?;
    expect_range("str", args, 0, 2)?;
    match args {
        [] => Ok(interp.str("")),
        [value] => Ok(interp.str(interp.str_of(value)?)),
        [value, ..] => match value.payload() {
            Payload::Bytes(b) => decode_utf8(interp, b),
            _ => Err(ScriptError::type_error("decoding str is not supported")),
        },
    }
}

pub(crate) fn ctor_bytes(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("bytes", kwargs)?;
    expect_range("bytes", args, 0, 2)?;
    let Some(value) = args.first() else {
        return Ok(interp.bytes(Vec::new()));
    };
    match value.payload() {
        Payload::Str(s) if args.len() == 2 => Ok(interp.bytes(s.as_bytes().to_vec())),
        Payload::Str(_) => Err(ScriptError::type_error("string argument without an encoding")),
        Payload::Bytes(b) => Ok(interp.bytes(b.clone())),
        Payload::Int(n) => {
            let n = usize::try_from(*n).map_err(|_| ScriptError::value_error("negative count"))?;
            Ok(interp.bytes(vec![0; n]))
        }
        _ => {
            let mut out = Vec::new();
            for item in interp.iterate(value)? {
                match item.as_int().and_then(|i| u8::try_from(i).ok()) {
                    Some(b) => out.push(b),
                    None => return Err(ScriptError::value_error("bytes must be in range(0, 256)")),
                }
            }
            Ok(interp.bytes(out))
        }
    }
}

pub(crate) fn ctor_list(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("list", kwargs)?;
    expect_range("list", args, 0, 1)?;
    match args.first() {
        Some(it) => Ok(interp.list(interp.iterate(it)?)),
        None => Ok(interp.list(Vec::new())),
    }
}

pub(crate) fn ctor_tuple(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("tuple", kwargs)?;
    expect_range("tuple", args, 0, 1)?;
    match args.first() {
        Some(it) if it.as_tuple().is_some() => Ok(it.clone()),
        Some(it) => Ok(interp.tuple(interp.iterate(it)?)),
        None => Ok(interp.tuple(Vec::new())),
    }
}

pub(crate) fn ctor_dict(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    expect_range("dict", args, 0, 1)?;
    let dict = interp.dict();
    if let Some(source) = args.first() {
        dict_update(interp, &dict, source)?;
    }
    for (k, v) in kwargs {
        interp.dict_set_str(&dict, k, v.clone());
    }
    Ok(dict)
}

pub(crate) fn ctor_set(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("set", kwargs)?;
    expect_range("set", args, 0, 1)?;
    match args.first() {
        Some(it) => interp.set(interp.iterate(it)?),
        None => interp.set(Vec::new()),
    }
}

pub(crate) fn ctor_frozenset(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("frozenset", kwargs)?;
    expect_range("frozenset", args, 0, 1)?;
    match args.first() {
        Some(it) => interp.frozenset(interp.iterate(it)?),
        None => interp.frozenset(Vec::new()),
    }
}

pub(crate) fn ctor_slice(interp: &Interp, args: &[Obj], kwargs: &Kwargs) -> ScriptResult<Obj> {
    no_kwargs("slice", kwargs)?;
    expect_range("slice", args, 1, 3)?;
    let none = interp.none();
    let (start, stop, step) = match args {
        [stop] => (none.clone(), stop.clone(), none),
        [start, stop] => (start.clone(), stop.clone(), none),
        [start, stop, step, ..] => (start.clone(), stop.clone(), step.clone()),
        [] => return Err(ScriptError::type_error("slice expected at least 1 argument, got 0")),
    };
    Ok(interp.slice(start, stop, step))
}

// ---------------------------------------------------------------------------
// Module functions
// ---------------------------------------------------------------------------

fn extremum(interp: &Interp, name: &str, args: &[Obj], kwargs: &Kwargs, op: CompareOp) -> ScriptResult<Obj> {
    let items = match args {
        [] => return Err(ScriptError::type_error(format!("{} expected at least 1 argument, got 0", name))),
        [iterable] => interp.iterate(iterable)?,
        many => many.to_vec(),
    };
    let key = kwarg(kwargs, "key").filter(|k| !k.is_none());
    let mut best: Option<(Obj, Obj)> = None;
    for item in items {
        let k = match key {
            Some(f) => interp.call(f, std::slice::from_ref(&item), &[])?,
            None => item.clone(),
        };
        best = match best {
            Some((bk, bv)) if !interp.compare(&k, &bk, op)? => Some((bk, bv)),
            _ => Some((k, item)),
        };
    }
    match (best, kwarg(kwargs, "default")) {
        (Some((_, v)), _) => Ok(v),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(ScriptError::value_error(format!("{}() arg is an empty sequence", name))),
    }
}

fn define(
    interp: &Interp,
    dict: &Obj,
    name: &str,
    f: impl Fn(&Interp, &[Obj], &Kwargs) -> ScriptResult<Obj> + 'static,
) {
    interp.dict_set_str(dict, name, interp.function(name, f));
}

fn install_functions(interp: &Interp, dict: &Obj) {
    define(interp, dict, "len", |interp, args, _| {
        expect_args("len", args, 1)?;
        Ok(interp.int(interp.len(&args[0])? as i64))
    });
    define(interp, dict, "iter", |interp, args, _| {
        expect_args("iter", args, 1)?;
        interp.iter(&args[0])
    });
    define(interp, dict, "next", |interp, args, _| {
        expect_range("next", args, 1, 2)?;
        match (interp.next(&args[0])?, args.get(1)) {
            (Some(v), _) => Ok(v),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(ScriptError::StopIteration),
        }
    });
    define(interp, dict, "isinstance", |interp, args, _| {
        expect_args("isinstance", args, 2)?;
        Ok(interp.bool(interp.isinstance(&args[0], &args[1])?))
    });
    define(interp, dict, "issubclass", |interp, args, _| {
        expect_args("issubclass", args, 2)?;
        if args[0].as_class().is_none() {
            return Err(ScriptError::type_error("issubclass() arg 1 must be a class"));
        }
        Ok(interp.bool(interp.issubclass(&args[0], &args[1])?))
    });
    define(interp, dict, "repr", |interp, args, _| {
        expect_args("repr", args, 1)?;
        Ok(interp.str(interp.repr(&args[0])?))
    });
    define(interp, dict, "dir", |interp, args, _| {
        expect_args("dir", args, 1)?;
        let names = interp.dir(&args[0])?;
        Ok(interp.list(names.into_iter().map(|n| interp.str(n)).collect()))
    });
    define(interp, dict, "vars", |interp, args, _| {
        expect_args("vars", args, 1)?;
        interp.vars(&args[0])
    });
    define(interp, dict, "hasattr", |interp, args, _| {
        expect_args("hasattr", args, 2)?;
        Ok(interp.bool(interp.hasattr(&args[0], attr_name(interp, &args[1])?)?))
    });
    define(interp, dict, "getattr", |interp, args, _| {
        expect_range("getattr", args, 2, 3)?;
        match (interp.getattr(&args[0], attr_name(interp, &args[1])?), args.get(2)) {
            (Err(e), Some(default)) if interp.is_attribute_error(&e) => Ok(default.clone()),
            (result, _) => result,
        }
    });
    define(interp, dict, "setattr", |interp, args, _| {
        expect_args("setattr", args, 3)?;
        interp.setattr(&args[0], attr_name(interp, &args[1])?, args[2].clone())?;
        Ok(interp.none())
    });
    define(interp, dict, "delattr", |interp, args, _| {
        expect_args("delattr", args, 2)?;
        interp.delattr(&args[0], attr_name(interp, &args[1])?)?;
        Ok(interp.none())
    });
    define(interp, dict, "id", |interp, args, _| {
        expect_args("id", args, 1)?;
        Ok(interp.int(args[0].id() as i64))
    });
    define(interp, dict, "hash", |interp, args, _| {
        expect_args("hash", args, 1)?;
        Ok(interp.int(interp.hash(&args[0])?))
    });
    define(interp, dict, "callable", |interp, args, _| {
        expect_args("callable", args, 1)?;
        Ok(interp.bool(interp.is_callable(&args[0])))
    });
    define(interp, dict, "print", |interp, args, kwargs| {
        let sep = match kwarg(kwargs, "sep") {
            Some(s) if !s.is_none() => interp.str_of(s)?,
            _ => " ".to_string(),
        };
        let end = match kwarg(kwargs, "end") {
            Some(s) if !s.is_none() => interp.str_of(s)?,
            _ => "\n".to_string(),
        };
        let parts = args.iter().map(|a| interp.str_of(a)).collect::<ScriptResult<Vec<_>>>()?;
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{}{}", parts.join(&sep), end)
            .map_err(|e| ScriptError::runtime_error(e.to_string()))?;
        Ok(interp.none())
    });
    define(interp, dict, "abs", |interp, args, _| {
        expect_args("abs", args, 1)?;
        match Number::of(&args[0]) {
            Some(Number::Int(i)) => Ok(match i.checked_abs() {
                Some(a) => interp.int(a),
                None => interp.long(BigInt::from(i).abs()),
            }),
            Some(Number::Long(i)) => Ok(interp.long(i.abs())),
            Some(Number::Float(f)) => Ok(interp.float(f.abs())),
            None => match interp.lookup_type_attr(&interp.type_of(&args[0]), "__abs__") {
                Some(m) => interp.call(&interp.bound_method(m, args[0].clone()), &[], &[]),
                None => Err(ScriptError::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    interp.type_name(&args[0])
                ))),
            },
        }
    });
    define(interp, dict, "min", |interp, args, kwargs| extremum(interp, "min", args, kwargs, CompareOp::Lt));
    define(interp, dict, "max", |interp, args, kwargs| extremum(interp, "max", args, kwargs, CompareOp::Gt));
    define(interp, dict, "sum", |interp, args, _| {
        expect_range("sum", args, 1, 2)?;
        let mut total = args.get(1).cloned().unwrap_or_else(|| interp.int(0));
        for item in interp.iterate(&args[0])? {
            total = interp.binary_op(&total, &item, BinaryOp::Add)?;
        }
        Ok(total)
    });
    define(interp, dict, "sorted", |interp, args, kwargs| {
        expect_args("sorted", args, 1)?;
        let reverse = match kwarg(kwargs, "reverse") {
            Some(r) => interp.truthy(r)?,
            None => false,
        };
        let items = interp.iterate(&args[0])?;
        Ok(interp.list(sort_objects(interp, items, kwarg(kwargs, "key"), reverse)?))
    });
    define(interp, dict, "range", |interp, args, _| {
        expect_range("range", args, 1, 3)?;
        let ints = args.iter().map(|a| index_arg(interp, a)).collect::<ScriptResult<Vec<_>>>()?;
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step, ..] => (*start, *stop, *step),
            [] => return Err(ScriptError::type_error("range expected at least 1 argument, got 0")),
        };
        if step == 0 {
            return Err(ScriptError::value_error("range() arg 3 must not be zero"));
        }
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(interp.int(i as i64));
            i += step;
        }
        Ok(interp.list(out))
    });
    define(interp, dict, "enumerate", |interp, args, kwargs| {
        expect_range("enumerate", args, 1, 2)?;
        let start = args.get(1).or_else(|| kwarg(kwargs, "start"));
        let mut index = match start {
            Some(s) => index_arg(interp, s)? as i64,
            None => 0,
        };
        let inner = interp.iter(&args[0])?;
        Ok(interp.iterator(
            "enumerate",
            Box::new(move |interp: &Interp| {
                let Some(item) = interp.next(&inner)? else {
                    return Ok(None);
                };
                let pair = interp.tuple(vec![interp.int(index), item]);
                index += 1;
                Ok(Some(pair))
            }),
        ))
    });
    define(interp, dict, "zip", |interp, args, _| {
        let iters = args.iter().map(|a| interp.iter(a)).collect::<ScriptResult<Vec<_>>>()?;
        Ok(interp.iterator(
            "zip",
            Box::new(move |interp: &Interp| {
                if iters.is_empty() {
                    return Ok(None);
                }
                let mut row = Vec::with_capacity(iters.len());
                for it in &iters {
                    match interp.next(it)? {
                        Some(v) => row.push(v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(interp.tuple(row)))
            }),
        ))
    });
    define(interp, dict, "reversed", |interp, args, _| {
        expect_args("reversed", args, 1)?;
        let mut items = interp.iterate(&args[0])?;
        items.reverse();
        let mut items = items.into_iter();
        Ok(interp.iterator("reversed", Box::new(move |_: &Interp| Ok(items.next()))))
    });
    define(interp, dict, "any", |interp, args, _| {
        expect_args("any", args, 1)?;
        for item in interp.iterate(&args[0])? {
            if interp.truthy(&item)? {
                return Ok(interp.bool(true));
            }
        }
        Ok(interp.bool(false))
    });
    define(interp, dict, "all", |interp, args, _| {
        expect_args("all", args, 1)?;
        for item in interp.iterate(&args[0])? {
            if !interp.truthy(&item)? {
                return Ok(interp.bool(false));
            }
        }
        Ok(interp.bool(true))
    });
}

// ---------------------------------------------------------------------------
// Methods of builtin types
// ---------------------------------------------------------------------------

fn list_of<'a>(interp: &Interp, name: &str, this: &'a Obj) -> ScriptResult<&'a RefCell<Vec<Obj>>> {
    this.as_list().ok_or_else(|| descriptor_error(interp, name, "list", this))
}

fn dict_of<'a>(interp: &Interp, name: &str, this: &'a Obj) -> ScriptResult<&'a RefCell<DictMap>> {
    this.as_dict().ok_or_else(|| descriptor_error(interp, name, "dict", this))
}

fn set_snapshot(interp: &Interp, name: &str, this: &Obj) -> ScriptResult<SetMap> {
    match this.payload() {
        Payload::Set(map) => Ok(map.borrow().clone()),
        Payload::FrozenSet(map) => Ok(map.clone()),
        _ => Err(descriptor_error(interp, name, "set", this)),
    }
}

fn with_set_payload(this: &Obj, map: SetMap) -> Obj {
    match this.payload() {
        Payload::FrozenSet(_) => Obj::new(Payload::FrozenSet(map)),
        _ => Obj::new(Payload::Set(RefCell::new(map))),
    }
}

fn str_of_this<'a>(interp: &Interp, name: &str, this: &'a Obj) -> ScriptResult<&'a str> {
    this.as_str().ok_or_else(|| descriptor_error(interp, name, "str", this))
}

fn install_list_methods(interp: &Interp) {
    let list = interp.types().list.clone();
    interp.add_method(&list, "append", |interp, args, _| {
        let (this, rest) = receiver("append", args)?;
        expect_args("append", rest, 1)?;
        list_of(interp, "append", this)?.borrow_mut().push(rest[0].clone());
        Ok(interp.none())
    });
    interp.add_method(&list, "extend", |interp, args, _| {
        let (this, rest) = receiver("extend", args)?;
        expect_args("extend", rest, 1)?;
        let items = interp.iterate(&rest[0])?;
        list_of(interp, "extend", this)?.borrow_mut().extend(items);
        Ok(interp.none())
    });
    interp.add_method(&list, "insert", |interp, args, _| {
        let (this, rest) = receiver("insert", args)?;
        expect_args("insert", rest, 2)?;
        let items = list_of(interp, "insert", this)?;
        let len = items.borrow().len() as isize;
        let i = index_arg(interp, &rest[0])?;
        let i = if i < 0 { (i + len).max(0) } else { i.min(len) };
        items.borrow_mut().insert(i as usize, rest[1].clone());
        Ok(interp.none())
    });
    interp.add_method(&list, "pop", |interp, args, _| {
        let (this, rest) = receiver("pop", args)?;
        expect_range("pop", rest, 0, 1)?;
        let items = list_of(interp, "pop", this)?;
        let len = items.borrow().len() as isize;
        if len == 0 {
            return Err(ScriptError::index_error("pop from empty list"));
        }
        let i = match rest.first() {
            Some(i) => index_arg(interp, i)?,
            None => -1,
        };
        let j = if i < 0 { i + len } else { i };
        if j < 0 || j >= len {
            return Err(ScriptError::index_error("pop index out of range"));
        }
        Ok(items.borrow_mut().remove(j as usize))
    });
    interp.add_method(&list, "remove", |interp, args, _| {
        let (this, rest) = receiver("remove", args)?;
        expect_args("remove", rest, 1)?;
        let items = list_of(interp, "remove", this)?;
        let snapshot = items.borrow().clone();
        for (i, item) in snapshot.iter().enumerate() {
            if interp.eq(item, &rest[0])? {
                items.borrow_mut().remove(i);
                return Ok(interp.none());
            }
        }
        Err(ScriptError::value_error("list.remove(x): x not in list"))
    });
    interp.add_method(&list, "index", |interp, args, _| {
        let (this, rest) = receiver("index", args)?;
        expect_args("index", rest, 1)?;
        let snapshot = list_of(interp, "index", this)?.borrow().clone();
        for (i, item) in snapshot.iter().enumerate() {
            if interp.eq(item, &rest[0])? {
                return Ok(interp.int(i as i64));
            }
        }
        Err(ScriptError::value_error(format!("{} is not in list", interp.repr(&rest[0])?)))
    });
    interp.add_method(&list, "count", |interp, args, _| {
        let (this, rest) = receiver("count", args)?;
        expect_args("count", rest, 1)?;
        let snapshot = list_of(interp, "count", this)?.borrow().clone();
        let mut n = 0;
        for item in &snapshot {
            if interp.eq(item, &rest[0])? {
                n += 1;
            }
        }
        Ok(interp.int(n))
    });
    interp.add_method(&list, "reverse", |interp, args, _| {
        let (this, _) = receiver("reverse", args)?;
        list_of(interp, "reverse", this)?.borrow_mut().reverse();
        Ok(interp.none())
    });
    interp.add_method(&list, "sort", |interp, args, kwargs| {
        let (this, rest) = receiver("sort", args)?;
        expect_args("sort", rest, 0)?;
        let items = list_of(interp, "sort", this)?;
        let reverse = match kwarg(kwargs, "reverse") {
            Some(r) => interp.truthy(r)?,
            None => false,
        };
        let snapshot = items.borrow().clone();
        let sorted = sort_objects(interp, snapshot, kwarg(kwargs, "key"), reverse)?;
        *items.borrow_mut() = sorted;
        Ok(interp.none())
    });
    interp.add_method(&list, "copy", |interp, args, _| {
        let (this, _) = receiver("copy", args)?;
        Ok(interp.list(list_of(interp, "copy", this)?.borrow().clone()))
    });
    interp.add_method(&list, "clear", |interp, args, _| {
        let (this, _) = receiver("clear", args)?;
        list_of(interp, "clear", this)?.borrow_mut().clear();
        Ok(interp.none())
    });

    let tuple = interp.types().tuple.clone();
    interp.add_method(&tuple, "index", |interp, args, _| {
        let (this, rest) = receiver("index", args)?;
        expect_args("index", rest, 1)?;
        let items = this.as_tuple().ok_or_else(|| descriptor_error(interp, "index", "tuple", this))?;
        for (i, item) in items.iter().enumerate() {
            if interp.eq(item, &rest[0])? {
                return Ok(interp.int(i as i64));
            }
        }
        Err(ScriptError::value_error("tuple.index(x): x not in tuple"))
    });
    interp.add_method(&tuple, "count", |interp, args, _| {
        let (this, rest) = receiver("count", args)?;
        expect_args("count", rest, 1)?;
        let items = this.as_tuple().ok_or_else(|| descriptor_error(interp, "count", "tuple", this))?;
        let mut n = 0;
        for item in items {
            if interp.eq(item, &rest[0])? {
                n += 1;
            }
        }
        Ok(interp.int(n))
    });
}

fn install_dict_methods(interp: &Interp) {
    let dict = interp.types().dict.clone();
    interp.add_method(&dict, "get", |interp, args, _| {
        let (this, rest) = receiver("get", args)?;
        expect_range("get", rest, 1, 2)?;
        let map = dict_of(interp, "get", this)?;
        let hk = interp.hash_key(&rest[0])?;
        let found = map.borrow().get(&hk).map(|(_, v)| v.clone());
        Ok(found.unwrap_or_else(|| rest.get(1).cloned().unwrap_or_else(|| interp.none())))
    });
    interp.add_method(&dict, "keys", |interp, args, _| {
        let (this, _) = receiver("keys", args)?;
        let keys = dict_of(interp, "keys", this)?.borrow().values().map(|(k, _)| k.clone()).collect();
        Ok(interp.list(keys))
    });
    interp.add_method(&dict, "values", |interp, args, _| {
        let (this, _) = receiver("values", args)?;
        let values = dict_of(interp, "values", this)?.borrow().values().map(|(_, v)| v.clone()).collect();
        Ok(interp.list(values))
    });
    interp.add_method(&dict, "items", |interp, args, _| {
        let (this, _) = receiver("items", args)?;
        let pairs: Vec<(Obj, Obj)> = dict_of(interp, "items", this)?.borrow().values().cloned().collect();
        Ok(interp.list(pairs.into_iter().map(|(k, v)| interp.tuple(vec![k, v])).collect()))
    });
    interp.add_method(&dict, "pop", |interp, args, _| {
        let (this, rest) = receiver("pop", args)?;
        expect_range("pop", rest, 1, 2)?;
        let map = dict_of(interp, "pop", this)?;
        let hk = interp.hash_key(&rest[0])?;
        let removed = map.borrow_mut().shift_remove(&hk);
        match (removed, rest.get(1)) {
            (Some((_, v)), _) => Ok(v),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(interp.key_error(&rest[0])),
        }
    });
    interp.add_method(&dict, "setdefault", |interp, args, _| {
        let (this, rest) = receiver("setdefault", args)?;
        expect_range("setdefault", rest, 1, 2)?;
        let map = dict_of(interp, "setdefault", this)?;
        let hk = interp.hash_key(&rest[0])?;
        let default = rest.get(1).cloned().unwrap_or_else(|| interp.none());
        let value = map
            .borrow_mut()
            .entry(hk)
            .or_insert_with(|| (rest[0].clone(), default))
            .1
            .clone();
        Ok(value)
    });
    interp.add_method(&dict, "update", |interp, args, kwargs| {
        let (this, rest) = receiver("update", args)?;
        expect_range("update", rest, 0, 1)?;
        dict_of(interp, "update", this)?;
        if let Some(source) = rest.first() {
            dict_update(interp, this, source)?;
        }
        for (k, v) in kwargs {
            interp.dict_set_str(this, k, v.clone());
        }
        Ok(interp.none())
    });
    interp.add_method(&dict, "copy", |interp, args, _| {
        let (this, _) = receiver("copy", args)?;
        let map = dict_of(interp, "copy", this)?.borrow().clone();
        Ok(Obj::new(Payload::Dict(RefCell::new(map))))
    });
    interp.add_method(&dict, "clear", |interp, args, _| {
        let (this, _) = receiver("clear", args)?;
        dict_of(interp, "clear", this)?.borrow_mut().clear();
        Ok(interp.none())
    });
}

fn install_set_methods(interp: &Interp) {
    let set = interp.types().set.clone();
    let frozenset = interp.types().frozenset.clone();

    interp.add_method(&set, "add", |interp, args, _| {
        let (this, rest) = receiver("add", args)?;
        expect_args("add", rest, 1)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "add", "set", this));
        };
        let hk = interp.hash_key(&rest[0])?;
        map.borrow_mut().entry(hk).or_insert_with(|| rest[0].clone());
        Ok(interp.none())
    });
    interp.add_method(&set, "discard", |interp, args, _| {
        let (this, rest) = receiver("discard", args)?;
        expect_args("discard", rest, 1)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "discard", "set", this));
        };
        let hk = interp.hash_key(&rest[0])?;
        map.borrow_mut().shift_remove(&hk);
        Ok(interp.none())
    });
    interp.add_method(&set, "remove", |interp, args, _| {
        let (this, rest) = receiver("remove", args)?;
        expect_args("remove", rest, 1)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "remove", "set", this));
        };
        let hk = interp.hash_key(&rest[0])?;
        let removed = map.borrow_mut().shift_remove(&hk);
        match removed {
            Some(_) => Ok(interp.none()),
            None => Err(interp.key_error(&rest[0])),
        }
    });
    interp.add_method(&set, "pop", |interp, args, _| {
        let (this, _) = receiver("pop", args)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "pop", "set", this));
        };
        let popped = map.borrow_mut().shift_remove_index(0);
        popped
            .map(|(_, v)| v)
            .ok_or_else(|| ScriptError::key_error("pop from an empty set"))
    });
    interp.add_method(&set, "update", |interp, args, _| {
        let (this, rest) = receiver("update", args)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "update", "set", this));
        };
        for other in rest {
            for item in interp.iterate(other)? {
                let hk = interp.hash_key(&item)?;
                map.borrow_mut().entry(hk).or_insert(item);
            }
        }
        Ok(interp.none())
    });
    interp.add_method(&set, "clear", |interp, args, _| {
        let (this, _) = receiver("clear", args)?;
        let Payload::Set(map) = this.payload() else {
            return Err(descriptor_error(interp, "clear", "set", this));
        };
        map.borrow_mut().clear();
        Ok(interp.none())
    });

    for class in [&set, &frozenset] {
        interp.add_method(class, "copy", |interp, args, _| {
            let (this, _) = receiver("copy", args)?;
            Ok(with_set_payload(this, set_snapshot(interp, "copy", this)?))
        });
        interp.add_method(class, "union", |interp, args, _| {
            let (this, rest) = receiver("union", args)?;
            let mut map = set_snapshot(interp, "union", this)?;
            for other in rest {
                for item in interp.iterate(other)? {
                    let hk = interp.hash_key(&item)?;
                    map.entry(hk).or_insert(item);
                }
            }
            Ok(with_set_payload(this, map))
        });
        interp.add_method(class, "intersection", |interp, args, _| {
            let (this, rest) = receiver("intersection", args)?;
            let mut map = set_snapshot(interp, "intersection", this)?;
            for other in rest {
                let keep = interp.set(interp.iterate(other)?)?;
                let Payload::Set(keep) = keep.payload() else {
                    continue;
                };
                let keep = keep.borrow();
                map.retain(|k, _| keep.contains_key(k));
            }
            Ok(with_set_payload(this, map))
        });
        interp.add_method(class, "difference", |interp, args, _| {
            let (this, rest) = receiver("difference", args)?;
            let mut map = set_snapshot(interp, "difference", this)?;
            for other in rest {
                for item in interp.iterate(other)? {
                    map.shift_remove(&interp.hash_key(&item)?);
                }
            }
            Ok(with_set_payload(this, map))
        });
        interp.add_method(class, "symmetric_difference", |interp, args, _| {
            let (this, rest) = receiver("symmetric_difference", args)?;
            expect_args("symmetric_difference", rest, 1)?;
            let mut map = set_snapshot(interp, "symmetric_difference", this)?;
            let other = interp.set(interp.iterate(&rest[0])?)?;
            if let Payload::Set(other) = other.payload() {
                for (k, v) in other.borrow().iter() {
                    if map.shift_remove(k).is_none() {
                        map.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(with_set_payload(this, map))
        });
        interp.add_method(class, "issubset", |interp, args, _| {
            let (this, rest) = receiver("issubset", args)?;
            expect_args("issubset", rest, 1)?;
            let other = interp.set(interp.iterate(&rest[0])?)?;
            interp.richcompare(this, &other, CompareOp::Le)
        });
        interp.add_method(class, "issuperset", |interp, args, _| {
            let (this, rest) = receiver("issuperset", args)?;
            expect_args("issuperset", rest, 1)?;
            let other = interp.set(interp.iterate(&rest[0])?)?;
            interp.richcompare(this, &other, CompareOp::Ge)
        });
        interp.add_method(class, "isdisjoint", |interp, args, _| {
            let (this, rest) = receiver("isdisjoint", args)?;
            expect_args("isdisjoint", rest, 1)?;
            let map = set_snapshot(interp, "isdisjoint", this)?;
            for item in interp.iterate(&rest[0])? {
                if map.contains_key(&interp.hash_key(&item)?) {
                    return Ok(interp.bool(false));
                }
            }
            Ok(interp.bool(true))
        });
    }
}

fn install_str_methods(interp: &Interp) {
    let str_ = interp.types().str_.clone();
    interp.add_method(&str_, "join", |interp, args, _| {
        let (this, rest) = receiver("join", args)?;
        expect_args("join", rest, 1)?;
        let sep = str_of_this(interp, "join", this)?;
        let mut parts = Vec::new();
        for (i, item) in interp.iterate(&rest[0])?.iter().enumerate() {
            match item.as_str() {
                Some(s) => parts.push(s.to_string()),
                None => {
                    return Err(ScriptError::type_error(format!(
                        "sequence item {}: expected str instance, {} found",
                        i,
                        interp.type_name(item)
                    )));
                }
            }
        }
        Ok(interp.str(parts.join(sep)))
    });
    interp.add_method(&str_, "split", |interp, args, _| {
        let (this, rest) = receiver("split", args)?;
        expect_range("split", rest, 0, 2)?;
        let s = str_of_this(interp, "split", this)?;
        let limit = match rest.get(1) {
            Some(n) => index_arg(interp, n)?,
            None => -1,
        };
        let parts: Vec<String> = match rest.first().filter(|sep| !sep.is_none()) {
            Some(sep) => {
                let sep = text_arg(interp, sep)?;
                if sep.is_empty() {
                    return Err(ScriptError::value_error("empty separator"));
                }
                if limit < 0 {
                    s.split(sep).map(str::to_string).collect()
                } else {
                    s.splitn(limit as usize + 1, sep).map(str::to_string).collect()
                }
            }
            None => {
                let words: Vec<&str> = s.split_whitespace().collect();
                if limit < 0 || words.len() <= limit as usize {
                    words.into_iter().map(str::to_string).collect()
                } else {
                    let mut out: Vec<String> = words[..limit as usize].iter().map(|w| w.to_string()).collect();
                    let mut tail = s.trim_start();
                    for _ in 0..limit {
                        tail = tail.trim_start();
                        let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
                        tail = &tail[end..];
                    }
                    out.push(tail.trim_start().to_string());
                    out
                }
            }
        };
        Ok(interp.list(parts.into_iter().map(|p| interp.str(p)).collect()))
    });
    for (name, which) in [("strip", 0u8), ("lstrip", 1), ("rstrip", 2)] {
        interp.add_method(&str_, name, move |interp, args, _| {
            let (this, rest) = receiver(name, args)?;
            expect_range(name, rest, 0, 1)?;
            let s = str_of_this(interp, name, this)?;
            let chars: Option<Vec<char>> = match rest.first().filter(|c| !c.is_none()) {
                Some(c) => Some(text_arg(interp, c)?.chars().collect()),
                None => None,
            };
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match which {
                0 => s.trim_matches(matcher),
                1 => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            };
            Ok(interp.str(out))
        });
    }
    interp.add_method(&str_, "upper", |interp, args, _| {
        let (this, _) = receiver("upper", args)?;
        Ok(interp.str(str_of_this(interp, "upper", this)?.to_uppercase()))
    });
    interp.add_method(&str_, "lower", |interp, args, _| {
        let (this, _) = receiver("lower", args)?;
        Ok(interp.str(str_of_this(interp, "lower", this)?.to_lowercase()))
    });
    interp.add_method(&str_, "startswith", |interp, args, _| {
        let (this, rest) = receiver("startswith", args)?;
        expect_args("startswith", rest, 1)?;
        let s = str_of_this(interp, "startswith", this)?;
        Ok(interp.bool(s.starts_with(text_arg(interp, &rest[0])?)))
    });
    interp.add_method(&str_, "endswith", |interp, args, _| {
        let (this, rest) = receiver("endswith", args)?;
        expect_args("endswith", rest, 1)?;
        let s = str_of_this(interp, "endswith", this)?;
        Ok(interp.bool(s.ends_with(text_arg(interp, &rest[0])?)))
    });
    interp.add_method(&str_, "replace", |interp, args, _| {
        let (this, rest) = receiver("replace", args)?;
        expect_args("replace", rest, 2)?;
        let s = str_of_this(interp, "replace", this)?;
        Ok(interp.str(s.replace(text_arg(interp, &rest[0])?, text_arg(interp, &rest[1])?)))
    });
    interp.add_method(&str_, "find", |interp, args, _| {
        let (this, rest) = receiver("find", args)?;
        expect_args("find", rest, 1)?;
        let s = str_of_this(interp, "find", this)?;
        let found = s
            .find(text_arg(interp, &rest[0])?)
            .map(|byte| s[..byte].chars().count() as i64)
            .unwrap_or(-1);
        Ok(interp.int(found))
    });
    interp.add_method(&str_, "count", |interp, args, _| {
        let (this, rest) = receiver("count", args)?;
        expect_args("count", rest, 1)?;
        let s = str_of_this(interp, "count", this)?;
        let needle = text_arg(interp, &rest[0])?;
        let n = if needle.is_empty() { s.chars().count() + 1 } else { s.matches(needle).count() };
        Ok(interp.int(n as i64))
    });
    interp.add_method(&str_, "encode", |interp, args, _| {
        let (this, _) = receiver("encode", args)?;
        Ok(interp.bytes(str_of_this(interp, "encode", this)?.as_bytes().to_vec()))
    });

    let bytes = interp.types().bytes.clone();
    interp.add_method(&bytes, "decode", |interp, args, _| {
        let (this, _) = receiver("decode", args)?;
        match this.payload() {
            Payload::Bytes(b) => decode_utf8(interp, b),
            _ => Err(descriptor_error(interp, "decode", "bytes", this)),
        }
    });
}

fn install_type_methods(interp: &Interp) {
    let type_ = interp.types().type_.clone();
    interp.add_method(&type_, "mro", |interp, args, _| {
        let (this, _) = receiver("mro", args)?;
        if this.as_class().is_none() {
            return Err(descriptor_error(interp, "mro", "type", this));
        }
        Ok(interp.list(interp.mro(this)))
    });
    let int = interp.types().int.clone();
    interp.add_method(&int, "bit_length", |interp, args, _| {
        let (this, _) = receiver("bit_length", args)?;
        let bits = match Number::of(this) {
            Some(Number::Int(i)) => 64 - i.unsigned_abs().leading_zeros() as u64,
            Some(Number::Long(i)) => i.bits(),
            _ => return Err(descriptor_error(interp, "bit_length", "int", this)),
        };
        Ok(interp.int(bits as i64))
    });
    let float = interp.types().float.clone();
    interp.add_method(&float, "is_integer", |interp, args, _| {
        let (this, _) = receiver("is_integer", args)?;
        match this.as_float() {
            Some(f) => Ok(interp.bool(f.is_finite() && f.fract() == 0.0)),
            None => Err(descriptor_error(interp, "is_integer", "float", this)),
        }
    });
}

/// Populate the `builtins` module and the builtin type dicts.
pub(crate) fn install(interp: &Interp) {
    let Some(dict) = interp.module_dict(interp.builtins()) else {
        return;
    };
    interp.dict_set_str(&dict, "__name__", interp.str("builtins"));

    let hidden = ["NoneType", "NotImplementedType", "function", "builtin_function_or_method", "method", "iterator", "generator", "module"];
    for class in interp.types().all() {
        let name = crate::protocol::class_name(class);
        if !hidden.contains(&name.as_str()) {
            interp.dict_set_str(&dict, &name, class.clone());
        }
    }
    interp.dict_set_str(&dict, "None", interp.none());
    interp.dict_set_str(&dict, "True", interp.bool(true));
    interp.dict_set_str(&dict, "False", interp.bool(false));
    interp.dict_set_str(&dict, "NotImplemented", interp.not_implemented());

    install_functions(interp, &dict);
    install_list_methods(interp);
    install_dict_methods(interp);
    install_set_methods(interp);
    install_str_methods(interp);
    install_type_methods(interp);
    crate::warnings::install(interp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_bases() {
        assert_eq!(parse_int(" 42 ", 10), Some(BigInt::from(42)));
        assert_eq!(parse_int("-0x1f", 16), Some(BigInt::from(-31)));
        assert_eq!(parse_int("1_000", 10), Some(BigInt::from(1000)));
        assert_eq!(parse_int("abc", 10), None);
        assert_eq!(parse_int("", 10), None);
    }

    #[test]
    fn test_parse_float_specials() {
        assert_eq!(parse_float("1.5"), Some(1.5));
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert!(parse_float("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_float("x"), None);
    }

    #[test]
    fn test_merge_sort_is_stable() {
        let items = vec![(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')];
        let sorted = merge_sort(items, &mut |a: &(i32, char), b: &(i32, char)| Ok(a.0 < b.0)).unwrap();
        assert_eq!(sorted, vec![(0, 'b'), (0, 'd'), (1, 'a'), (1, 'c')]);
    }

    #[test]
    fn test_expect_args_message() {
        let err = expect_args("get", &[], 1).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: get() takes exactly 1 argument (0 given)");
    }
}
