//! Numeric tower: machine ints, big ints and floats

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::error::{ScriptError, ScriptResult};
use crate::interp::Interp;
use crate::object::{Obj, Payload};
use crate::ops::BinaryOp;

/// A numeric operand
#[derive(Clone, Debug)]
pub enum Number {
    /// Machine-word int (bools included)
    Int(i64),
    /// Big int
    Long(BigInt),
    /// Float
    Float(f64),
}

impl Number {
    /// Numeric view of an object.
    pub fn of(obj: &Obj) -> Option<Self> {
        match obj.payload() {
            Payload::Bool(b) => Some(Self::Int(*b as i64)),
            Payload::Int(i) => Some(Self::Int(*i)),
            Payload::Long(i) => Some(Self::Long(i.clone())),
            Payload::Float(f) => Some(Self::Float(*f)),
            _ => None,
        }
    }

    fn big(&self) -> Option<BigInt> {
        match self {
            Self::Int(i) => Some(BigInt::from(*i)),
            Self::Long(i) => Some(i.clone()),
            Self::Float(_) => None,
        }
    }

    /// Float conversion; big ints beyond the float range overflow.
    pub fn to_f64(&self) -> ScriptResult<f64> {
        match self {
            Self::Int(i) => Ok(*i as f64),
            Self::Long(i) => long_to_f64(i),
            Self::Float(f) => Ok(*f),
        }
    }
}

/// Big int to float, failing on overflow.
pub fn long_to_f64(i: &BigInt) -> ScriptResult<f64> {
    match i.to_f64() {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(ScriptError::overflow_error("int too large to convert to float")),
    }
}

/// Compare two numbers; `None` when a NaN is involved.
pub fn compare(a: &Number, b: &Number) -> ScriptResult<Option<Ordering>> {
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(y)),
        (Number::Float(_), _) | (_, Number::Float(_)) => {
            // Big ints beyond the float range still order against floats
            if let (Number::Long(big), Number::Float(f)) | (Number::Float(f), Number::Long(big)) = (a, b) {
                if big.to_f64().is_none_or(|x| x.is_infinite()) && f.is_finite() {
                    let ord = if big.is_positive() { Ordering::Greater } else { Ordering::Less };
                    return Ok(Some(if matches!(a, Number::Long(_)) { ord } else { ord.reverse() }));
                }
            }
            a.to_f64()?.partial_cmp(&b.to_f64()?)
        }
        _ => match (a.big(), b.big()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => None,
        },
    })
}

fn floor_div_i64(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_div_big(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    if !(a % b).is_zero() && (a.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

fn floor_mod_big(a: &BigInt, b: &BigInt) -> BigInt {
    a - floor_div_big(a, b) * b
}

fn float_op(interp: &Interp, op: BinaryOp, x: f64, y: f64) -> ScriptResult<Option<Obj>> {
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::TrueDiv => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivisionError("float division by zero".into()));
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivisionError("float floor division by zero".into()));
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(ScriptError::ZeroDivisionError("float modulo".into()));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(ScriptError::ZeroDivisionError(
                    "0.0 cannot be raised to a negative power".into(),
                ));
            }
            x.powf(y)
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => return Ok(None),
    };
    Ok(Some(interp.float(result)))
}

fn small_int_op(interp: &Interp, op: BinaryOp, x: i64, y: i64) -> ScriptResult<Option<Obj>> {
    let fast = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        BinaryOp::And => Some(x & y),
        BinaryOp::Or => Some(x | y),
        BinaryOp::Xor => Some(x ^ y),
        BinaryOp::FloorDiv if y != 0 => floor_div_i64(x, y),
        BinaryOp::Mod if y != 0 => floor_div_i64(x, y).and_then(|q| q.checked_mul(y)).and_then(|p| x.checked_sub(p)),
        _ => None,
    };
    match fast {
        Some(i) => Ok(Some(interp.int(i))),
        None => big_int_op(interp, op, &BigInt::from(x), &BigInt::from(y)),
    }
}

fn big_int_op(interp: &Interp, op: BinaryOp, x: &BigInt, y: &BigInt) -> ScriptResult<Option<Obj>> {
    let zero_div = || ScriptError::ZeroDivisionError("integer division or modulo by zero".into());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::And => x & y,
        BinaryOp::Or => x | y,
        BinaryOp::Xor => x ^ y,
        BinaryOp::FloorDiv => {
            if y.is_zero() {
                return Err(zero_div());
            }
            floor_div_big(x, y)
        }
        BinaryOp::Mod => {
            if y.is_zero() {
                return Err(zero_div());
            }
            floor_mod_big(x, y)
        }
        BinaryOp::TrueDiv => {
            if y.is_zero() {
                return Err(ScriptError::ZeroDivisionError("division by zero".into()));
            }
            return Ok(Some(interp.float(long_to_f64(x)? / long_to_f64(y)?)));
        }
        BinaryOp::Pow => {
            if y.is_negative() {
                if x.is_zero() {
                    return Err(ScriptError::ZeroDivisionError(
                        "0.0 cannot be raised to a negative power".into(),
                    ));
                }
                return float_op(interp, op, long_to_f64(x)?, long_to_f64(y)?);
            }
            let exp = y
                .to_u32()
                .ok_or_else(|| ScriptError::overflow_error("exponent too large"))?;
            x.pow(exp)
        }
    };
    Ok(Some(interp.long(result)))
}

/// Numeric binary operation. `Ok(None)` when the operands are not both
/// numbers or the operator does not apply.
pub fn binary(interp: &Interp, op: BinaryOp, a: &Obj, b: &Obj) -> ScriptResult<Option<Obj>> {
    let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) else {
        return Ok(None);
    };
    // bool & bool stays bool
    if let (Payload::Bool(p), Payload::Bool(q)) = (a.payload(), b.payload()) {
        match op {
            BinaryOp::And => return Ok(Some(interp.bool(*p & *q))),
            BinaryOp::Or => return Ok(Some(interp.bool(*p | *q))),
            BinaryOp::Xor => return Ok(Some(interp.bool(*p ^ *q))),
            _ => {}
        }
    }
    match (&x, &y) {
        (Number::Float(_), _) | (_, Number::Float(_)) => float_op(interp, op, x.to_f64()?, y.to_f64()?),
        (Number::Int(i), Number::Int(j)) => match op {
            BinaryOp::TrueDiv => {
                if *j == 0 {
                    return Err(ScriptError::ZeroDivisionError("division by zero".into()));
                }
                Ok(Some(interp.float(*i as f64 / *j as f64)))
            }
            BinaryOp::Pow => big_int_op(interp, op, &BigInt::from(*i), &BigInt::from(*j)),
            _ => small_int_op(interp, op, *i, *j),
        },
        _ => match (x.big(), y.big()) {
            (Some(i), Some(j)) => big_int_op(interp, op, &i, &j),
            _ => Ok(None),
        },
    }
}

/// Render a float the way `repr` does.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let rendered = format!("{:e}", f);
        return match rendered.split_once('e') {
            Some((mantissa, exp)) => {
                let (sign, digits) = match exp.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exp),
                };
                format!("{}e{}{:0>2}", mantissa, sign, digits)
            }
            None => rendered,
        };
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(1.5), "1.5");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div_i64(-7, 2), Some(-4));
        assert_eq!(floor_div_i64(7, 2), Some(3));
        assert_eq!(floor_div_i64(i64::MIN, -1), None);
        assert_eq!(floor_div_big(&BigInt::from(-7), &BigInt::from(2)), BigInt::from(-4));
        assert_eq!(floor_mod_big(&BigInt::from(-7), &BigInt::from(2)), BigInt::from(1));
    }

    #[test]
    fn test_compare_mixed() {
        let ord = compare(&Number::Int(1), &Number::Float(1.5)).unwrap();
        assert_eq!(ord, Some(Ordering::Less));
        assert_eq!(compare(&Number::Float(f64::NAN), &Number::Int(1)).unwrap(), None);
        let huge = Number::Long(BigInt::from(10).pow(400));
        assert_eq!(compare(&huge, &Number::Float(1e300)).unwrap(), Some(Ordering::Greater));
    }
}
