//! Operators: arithmetic, comparison, membership, truthiness, iteration.

use std::cmp::Ordering;

use indexmap::IndexSet;

use crate::runtime::exceptions::{self, raise};
use crate::runtime::format;
use crate::runtime::interp::Vm;
use crate::runtime::value::{HashKey, Value};
use crate::runtime::VmResult;
use crate::syntax::{BinOperator, CmpOperator, UnaryOperator};

/// Upper bound on the length of a sequence built by repetition.
pub const MAX_REPEAT_LEN: usize = 1 << 28;

enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

/// Truth value of `value`.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::None => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(items) => !items.borrow().is_empty(),
        Value::Tuple(items) => !items.is_empty(),
        Value::Dict(dict) => !dict.borrow().is_empty(),
        Value::Set(set) => !set.borrow().is_empty(),
        Value::Range(r) => !r.is_empty(),
        Value::Object(obj) => obj.len().map_or_else(|| obj.truthy(), |n| n > 0),
        Value::Wrapper(w) => truthy(w.inner()),
        _ => true,
    }
}

/// Nesting depth at which structural comparison gives up.
const MAX_COMPARE_DEPTH: usize = 256;

/// `a == b`.
pub fn equals(a: &Value, b: &Value) -> bool {
    equals_at(a, b, 0)
}

fn equals_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_COMPARE_DEPTH {
        return a.is(b);
    }
    let equals = |x: &Value, y: &Value| equals_at(x, y, depth + 1);
    let seq_equals = |x: &[Value], y: &[Value]| {
        x.len() == y.len() && x.iter().zip(y).all(|(a, b)| equals_at(a, b, depth + 1))
    };
    match (a, b) {
        (Value::Wrapper(w), other) | (other, Value::Wrapper(w)) => equals(w.inner(), other),
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            std::ptr::eq(x.as_ptr(), y.as_ptr()) || seq_equals(&x.borrow(), &y.borrow())
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_equals(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| equals(v, other)))
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().all(|k| y.contains(k))
        }
        (Value::Range(x), Value::Range(y)) => {
            x.len() == y.len()
                && (x.is_empty() || (x.start == y.start && (x.len() == 1 || x.step == y.step)))
        }
        (Value::Class(x), Value::Class(y)) => x == y,
        (Value::Slice(x), Value::Slice(y)) => x == y,
        (Value::Object(x), other) => x.equals(other) || a.is(b),
        (other, Value::Object(y)) => y.equals(other),
        _ => match (num(a), num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => to_f64(&x) == to_f64(&y),
            _ => a.is(b),
        },
    }
}

fn to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(f) => *f,
    }
}

fn unorderable<T>(op: CmpOperator, a: &Value, b: &Value) -> VmResult<T> {
    raise(
        &exceptions::TYPE_ERROR,
        format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ),
    )
}

fn apply_ordering(op: CmpOperator, ordering: Option<Ordering>) -> bool {
    match ordering {
        None => false,
        Some(ord) => match op {
            CmpOperator::Lt => ord == Ordering::Less,
            CmpOperator::LtE => ord != Ordering::Greater,
            CmpOperator::Gt => ord == Ordering::Greater,
            CmpOperator::GtE => ord != Ordering::Less,
            _ => false,
        },
    }
}

/// Rich comparison `a <op> b` for the ordering operators.
pub fn order(op: CmpOperator, a: &Value, b: &Value) -> VmResult<bool> {
    order_at(op, a, b, 0)
}

fn order_at(op: CmpOperator, a: &Value, b: &Value, depth: usize) -> VmResult<bool> {
    if depth > MAX_COMPARE_DEPTH {
        return raise(
            &exceptions::RECURSION_ERROR,
            "maximum recursion depth exceeded in comparison",
        );
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(apply_ordering(op, Some(x.cmp(y)))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            order_sequences(op, &x, &y, depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => order_sequences(op, x, y, depth),
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let subset = x.iter().all(|k| y.contains(k));
            let superset = y.iter().all(|k| x.contains(k));
            Ok(match op {
                CmpOperator::Lt => subset && x.len() < y.len(),
                CmpOperator::LtE => subset,
                CmpOperator::Gt => superset && x.len() > y.len(),
                CmpOperator::GtE => superset,
                _ => false,
            })
        }
        (Value::Object(x), other) => match x.compare(other) {
            Some(ord) => Ok(apply_ordering(op, Some(ord))),
            None => unorderable(op, a, b),
        },
        (other, Value::Object(y)) => match y.compare(other) {
            Some(ord) => Ok(apply_ordering(op, Some(ord.reverse()))),
            None => unorderable(op, a, b),
        },
        _ => match (num(a), num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(apply_ordering(op, Some(x.cmp(&y)))),
            (Some(x), Some(y)) => Ok(apply_ordering(op, to_f64(&x).partial_cmp(&to_f64(&y)))),
            _ => unorderable(op, a, b),
        },
    }
}

fn order_sequences(op: CmpOperator, x: &[Value], y: &[Value], depth: usize) -> VmResult<bool> {
    for (a, b) in x.iter().zip(y) {
        if !equals_at(a, b, depth + 1) {
            return order_at(op, a, b, depth + 1);
        }
    }
    Ok(apply_ordering(op, Some(x.len().cmp(&y.len()))))
}

/// Evaluate one comparison operator.
pub fn compare(vm: &mut Vm, op: CmpOperator, a: &Value, b: &Value) -> VmResult<bool> {
    match op {
        CmpOperator::Eq => Ok(equals(a, b)),
        CmpOperator::NotEq => Ok(!equals(a, b)),
        CmpOperator::Is => Ok(a.is(b)),
        CmpOperator::IsNot => Ok(!a.is(b)),
        CmpOperator::In => contains(vm, b, a),
        CmpOperator::NotIn => contains(vm, b, a).map(|found| !found),
        _ => order(op, a, b),
    }
}

/// `item in container`.
pub fn contains(vm: &mut Vm, container: &Value, item: &Value) -> VmResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(&**needle)),
            other => raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ),
            ),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| equals(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| equals(v, item))),
        Value::Dict(dict) => {
            let key = HashKey::new(item.clone())?;
            Ok(dict.borrow().contains_key(&key))
        }
        Value::Set(set) => {
            let key = HashKey::new(item.clone())?;
            Ok(set.borrow().contains(&key))
        }
        Value::Range(r) => Ok(match item {
            Value::Float(f) if f.fract() == 0.0 => r.contains(*f as i64),
            other => other.as_int().is_some_and(|i| r.contains(i)),
        }),
        Value::Iterator(state) => Ok(state.borrow().items.iter().any(|v| equals(v, item))),
        Value::Wrapper(w) => contains(vm, w.inner(), item),
        Value::Object(_) => Ok(iterate(vm, container)?.iter().any(|v| equals(v, item))),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("argument of type '{}' is not iterable", other.type_name()),
        ),
    }
}

/// Materialise the items produced by iterating `value`.
pub fn iterate(vm: &mut Vm, value: &Value) -> VmResult<Vec<Value>> {
    match value {
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.to_vec()),
        Value::Dict(dict) => Ok(dict.borrow().keys().map(|k| k.value().clone()).collect()),
        Value::Set(set) => Ok(set.borrow().iter().map(|k| k.value().clone()).collect()),
        Value::Range(r) => Ok(r.iter().map(Value::Int).collect()),
        Value::Iterator(state) => Ok(state.borrow_mut().items.drain(..).collect()),
        Value::Object(obj) => obj.iter(vm),
        Value::Wrapper(w) => w.iterate(vm),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("'{}' object is not iterable", other.type_name()),
        ),
    }
}

/// `len(value)`.
pub fn len(value: &Value) -> VmResult<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(dict) => Ok(dict.borrow().len()),
        Value::Set(set) => Ok(set.borrow().len()),
        Value::Range(r) => Ok(r.len()),
        Value::Object(obj) => obj.len().map_or_else(
            || {
                raise(
                    &exceptions::TYPE_ERROR,
                    format!("object of type '{}' has no len()", value.type_name()),
                )
            },
            Ok,
        ),
        Value::Wrapper(w) => len(w.inner()),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("object of type '{}' has no len()", other.type_name()),
        ),
    }
}

/// Unary operator.
pub fn unary(op: UnaryOperator, value: &Value) -> VmResult<Value> {
    match (op, num(value)) {
        (UnaryOperator::Not, _) => Ok(Value::Bool(!truthy(value))),
        (UnaryOperator::UAdd, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOperator::UAdd, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (UnaryOperator::USub, Some(Num::Int(i))) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| exceptions::fault(&exceptions::OVERFLOW_ERROR, "integer overflow")),
        (UnaryOperator::USub, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOperator::Invert, Some(Num::Int(i))) => Ok(Value::Int(!i)),
        _ => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "bad operand type for unary {}: '{}'",
                op.symbol().trim(),
                value.type_name()
            ),
        ),
    }
}

fn unsupported<T>(op: BinOperator, a: &Value, b: &Value) -> VmResult<T> {
    raise(
        &exceptions::TYPE_ERROR,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ),
    )
}

fn overflow<T>() -> VmResult<T> {
    raise(&exceptions::OVERFLOW_ERROR, "integer overflow")
}

/// Binary operator.
pub fn binary(vm: &mut Vm, op: BinOperator, a: &Value, b: &Value) -> VmResult<Value> {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        match op {
            BinOperator::BitAnd => return Ok(Value::Bool(*x & *y)),
            BinOperator::BitOr => return Ok(Value::Bool(*x | *y)),
            BinOperator::BitXor => return Ok(Value::Bool(*x ^ *y)),
            _ => {}
        }
    }
    match (num(a), num(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => return int_op(op, x, y, a, b),
        (Some(x), Some(y)) => return float_op(op, to_f64(&x), to_f64(&y), a, b),
        _ => {}
    }

    match (op, a, b) {
        (BinOperator::Add, Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::from(s))
        }
        (BinOperator::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOperator::Add, Value::Tuple(x), Value::Tuple(y)) => {
            Ok(Value::tuple(x.iter().chain(y.iter()).cloned().collect()))
        }
        (BinOperator::Mult, seq, count) | (BinOperator::Mult, count, seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                && matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            repeat(seq, count.as_int().unwrap_or(0))
        }
        (BinOperator::Mod, Value::Str(template), args) => {
            format::percent_format(template, args).map(Value::from)
        }
        (BinOperator::BitOr, Value::Set(x), Value::Set(y)) => {
            let mut out = x.borrow().clone();
            out.extend(y.borrow().iter().cloned());
            Ok(Value::set(out))
        }
        (BinOperator::BitAnd, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            Ok(Value::set(
                x.borrow().iter().filter(|k| y.contains(*k)).cloned().collect(),
            ))
        }
        (BinOperator::Sub, Value::Set(x), Value::Set(y)) => {
            let y = y.borrow();
            Ok(Value::set(
                x.borrow().iter().filter(|k| !y.contains(*k)).cloned().collect(),
            ))
        }
        (BinOperator::BitXor, Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let out: IndexSet<HashKey> = x
                .iter()
                .filter(|k| !y.contains(*k))
                .chain(y.iter().filter(|k| !x.contains(*k)))
                .cloned()
                .collect();
            Ok(Value::set(out))
        }
        (BinOperator::BitOr, Value::Dict(x), Value::Dict(y)) => {
            let mut out = x.borrow().clone();
            for (k, v) in y.borrow().iter() {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::dict(out))
        }
        (_, Value::Object(obj), other) => match obj.binary_op(vm, op, other, false)? {
            Some(result) => Ok(result),
            None => match other {
                Value::Object(rhs) => rhs
                    .binary_op(vm, op, a, true)?
                    .map_or_else(|| unsupported(op, a, b), Ok),
                _ => unsupported(op, a, b),
            },
        },
        (_, other, Value::Object(obj)) => obj
            .binary_op(vm, op, other, true)?
            .map_or_else(|| unsupported(op, a, b), Ok),
        _ => unsupported(op, a, b),
    }
}

/// Augmented assignment; lists, sets and dicts are updated in place.
pub fn inplace(vm: &mut Vm, op: BinOperator, a: &Value, b: &Value) -> VmResult<Value> {
    match (op, a) {
        (BinOperator::Add, Value::List(items)) if !matches!(b, Value::Str(_)) => {
            let extra = iterate(vm, b)?;
            items.borrow_mut().extend(extra);
            Ok(a.clone())
        }
        (BinOperator::BitOr, Value::Set(set)) if matches!(b, Value::Set(_)) => {
            let extra = iterate(vm, b)?;
            let mut set = set.borrow_mut();
            for item in extra {
                set.insert(HashKey::new(item)?);
            }
            Ok(a.clone())
        }
        (BinOperator::BitOr, Value::Dict(dict)) => match b {
            Value::Dict(other) => {
                let other = other.borrow().clone();
                dict.borrow_mut().extend(other);
                Ok(a.clone())
            }
            _ => unsupported(op, a, b),
        },
        _ => binary(vm, op, a, b),
    }
}

fn repeat(seq: &Value, count: i64) -> VmResult<Value> {
    let count = count.max(0) as usize;
    let unit = len(seq)?;
    if unit.saturating_mul(count) > MAX_REPEAT_LEN {
        return raise(&exceptions::OVERFLOW_ERROR, "repeated sequence is too long");
    }
    Ok(match seq {
        Value::Str(s) => Value::from(s.repeat(count)),
        Value::List(items) => {
            let items = items.borrow();
            Value::list(items.iter().cloned().cycle().take(items.len() * count).collect())
        }
        Value::Tuple(items) => {
            Value::tuple(items.iter().cloned().cycle().take(items.len() * count).collect())
        }
        _ => seq.clone(),
    })
}

/// Floor division and modulo with Python's sign rules.
pub fn int_divmod(x: i64, y: i64) -> VmResult<(i64, i64)> {
    if y == 0 {
        return raise(
            &exceptions::ZERO_DIVISION_ERROR,
            "integer division or modulo by zero",
        );
    }
    let Some(q) = x.checked_div(y) else {
        return overflow();
    };
    let r = x - q * y;
    if r != 0 && ((r < 0) != (y < 0)) {
        Ok((q - 1, r + y))
    } else {
        Ok((q, r))
    }
}

fn int_op(op: BinOperator, x: i64, y: i64, a: &Value, b: &Value) -> VmResult<Value> {
    let checked = |v: Option<i64>| v.map(Value::Int).map_or_else(overflow, Ok);
    match op {
        BinOperator::Add => checked(x.checked_add(y)),
        BinOperator::Sub => checked(x.checked_sub(y)),
        BinOperator::Mult => checked(x.checked_mul(y)),
        BinOperator::Div => {
            if y == 0 {
                raise(&exceptions::ZERO_DIVISION_ERROR, "division by zero")
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        }
        BinOperator::FloorDiv => int_divmod(x, y).map(|(q, _)| Value::Int(q)),
        BinOperator::Mod => {
            if y == 0 {
                raise(&exceptions::ZERO_DIVISION_ERROR, "integer modulo by zero")
            } else {
                int_divmod(x, y).map(|(_, r)| Value::Int(r))
            }
        }
        BinOperator::Pow => {
            if y < 0 {
                if x == 0 {
                    return raise(
                        &exceptions::ZERO_DIVISION_ERROR,
                        "0.0 cannot be raised to a negative power",
                    );
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exponent = u32::try_from(y).map_err(|_| {
                exceptions::fault(&exceptions::OVERFLOW_ERROR, "integer overflow")
            })?;
            checked(x.checked_pow(exponent))
        }
        BinOperator::LShift | BinOperator::RShift => {
            if y < 0 {
                return raise(&exceptions::VALUE_ERROR, "negative shift count");
            }
            if op == BinOperator::RShift {
                return Ok(Value::Int(if y >= 64 { x >> 63 } else { x >> y }));
            }
            if x == 0 {
                return Ok(Value::Int(0));
            }
            if y >= 64 {
                return overflow();
            }
            let shifted = (x as i128) << y;
            checked(i64::try_from(shifted).ok())
        }
        BinOperator::BitAnd => Ok(Value::Int(x & y)),
        BinOperator::BitOr => Ok(Value::Int(x | y)),
        BinOperator::BitXor => Ok(Value::Int(x ^ y)),
        BinOperator::MatMult => unsupported(op, a, b),
    }
}

fn float_op(op: BinOperator, x: f64, y: f64, a: &Value, b: &Value) -> VmResult<Value> {
    let result = match op {
        BinOperator::Add => x + y,
        BinOperator::Sub => x - y,
        BinOperator::Mult => x * y,
        BinOperator::Div => {
            if y == 0.0 {
                return raise(&exceptions::ZERO_DIVISION_ERROR, "float division by zero");
            }
            x / y
        }
        BinOperator::FloorDiv => {
            if y == 0.0 {
                return raise(
                    &exceptions::ZERO_DIVISION_ERROR,
                    "float floor division by zero",
                );
            }
            (x / y).floor()
        }
        BinOperator::Mod => {
            if y == 0.0 {
                return raise(&exceptions::ZERO_DIVISION_ERROR, "float modulo");
            }
            float_mod(x, y)
        }
        BinOperator::Pow => {
            if x == 0.0 && y < 0.0 {
                return raise(
                    &exceptions::ZERO_DIVISION_ERROR,
                    "0.0 cannot be raised to a negative power",
                );
            }
            if x < 0.0 && y.fract() != 0.0 {
                return raise(&exceptions::VALUE_ERROR, "math domain error");
            }
            let result = x.powf(y);
            if result.is_infinite() && x.is_finite() && y.is_finite() {
                return raise(&exceptions::OVERFLOW_ERROR, "Numerical result out of range");
            }
            result
        }
        _ => return unsupported(op, a, b),
    };
    Ok(Value::Float(result))
}

/// Python float modulo: the result takes the sign of the divisor.
pub fn float_mod(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 && ((r < 0.0) != (y < 0.0)) {
        r + y
    } else {
        r
    }
}

/// Stable merge sort driven by the fallible `<` comparison.
pub fn sort_values(
    vm: &mut Vm,
    items: Vec<Value>,
    keys: Option<Vec<Value>>,
    reverse: bool,
) -> VmResult<Vec<Value>> {
    let keys = keys.unwrap_or_else(|| items.clone());
    let mut pairs: Vec<(Value, Value)> = keys.into_iter().zip(items).collect();
    if reverse {
        pairs.reverse();
    }
    let sorted = merge_sort(vm, pairs)?;
    let mut out: Vec<Value> = sorted.into_iter().map(|(_, v)| v).collect();
    if reverse {
        out.reverse();
    }
    Ok(out)
}

fn merge_sort(vm: &mut Vm, mut pairs: Vec<(Value, Value)>) -> VmResult<Vec<(Value, Value)>> {
    if pairs.len() <= 1 {
        return Ok(pairs);
    }
    let right = pairs.split_off(pairs.len() / 2);
    let left = merge_sort(vm, pairs)?;
    let right = merge_sort(vm, right)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(vm, CmpOperator::Lt, &r.0, &l.0)?,
            _ => break,
        };
        if take_right {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm {
        Vm::default()
    }

    #[test]
    fn test_int_arithmetic() {
        let mut vm = vm();
        let r = binary(&mut vm, BinOperator::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(r, Value::Int(-4));
        let r = binary(&mut vm, BinOperator::Mod, &Value::Int(-7), &Value::Int(2)).unwrap();
        assert_eq!(r, Value::Int(1));
        let r = binary(&mut vm, BinOperator::Div, &Value::Int(7), &Value::Int(2)).unwrap();
        assert_eq!(r, Value::Float(3.5));
        let r = binary(&mut vm, BinOperator::Pow, &Value::Int(2), &Value::Int(-1)).unwrap();
        assert_eq!(r, Value::Float(0.5));
    }

    #[test]
    fn test_overflow_and_zero_division() {
        let mut vm = vm();
        let err = binary(&mut vm, BinOperator::Mult, &Value::Int(i64::MAX), &Value::Int(2));
        assert!(err.unwrap_err().as_exception().unwrap().is_instance(&exceptions::OVERFLOW_ERROR));
        let err = binary(&mut vm, BinOperator::Div, &Value::Int(1), &Value::Int(0));
        let fault = err.unwrap_err();
        let exc = fault.as_exception().unwrap();
        assert!(exc.is_instance(&exceptions::ZERO_DIVISION_ERROR));
        assert_eq!(exc.message(), "division by zero");
    }

    #[test]
    fn test_mixed_numeric_equality() {
        assert!(equals(&Value::Int(1), &Value::Float(1.0)));
        assert!(equals(&Value::Bool(true), &Value::Int(1)));
        assert!(!equals(&Value::from("1"), &Value::Int(1)));
        assert!(equals(
            &Value::list(vec![Value::Int(1), Value::from("a")]),
            &Value::list(vec![Value::Float(1.0), Value::from("a")])
        ));
    }

    #[test]
    fn test_sequence_ordering() {
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert!(order(CmpOperator::Lt, &a, &b).unwrap());
        assert!(order(CmpOperator::Lt, &Value::from("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_repeat_and_concat() {
        let mut vm = vm();
        let r = binary(&mut vm, BinOperator::Mult, &Value::from("ab"), &Value::Int(3)).unwrap();
        assert_eq!(r, Value::from("ababab"));
        let r = binary(&mut vm, BinOperator::Mult, &Value::Int(2), &Value::list(vec![Value::Int(0)]))
            .unwrap();
        assert_eq!(r, Value::list(vec![Value::Int(0), Value::Int(0)]));
        assert!(binary(&mut vm, BinOperator::Mult, &Value::from("a"), &Value::Int(i64::MAX)).is_err());
        assert!(binary(&mut vm, BinOperator::Add, &Value::from("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_sort_is_stable() {
        let mut vm = vm();
        let items = vec![Value::from("b1"), Value::from("a"), Value::from("b2")];
        let keys = vec![Value::Int(1), Value::Int(0), Value::Int(1)];
        let sorted = sort_values(&mut vm, items.clone(), Some(keys.clone()), false).unwrap();
        assert_eq!(sorted, vec![Value::from("a"), Value::from("b1"), Value::from("b2")]);
        let sorted = sort_values(&mut vm, items, Some(keys), true).unwrap();
        assert_eq!(sorted, vec![Value::from("b1"), Value::from("b2"), Value::from("a")]);
    }

    #[test]
    fn test_membership() {
        let mut vm = vm();
        assert!(contains(&mut vm, &Value::from("hello"), &Value::from("ell")).unwrap());
        assert!(contains(&mut vm, &Value::from("hello"), &Value::Int(1)).is_err());
        let d = Value::dict_from([("k", Value::None)]);
        assert!(contains(&mut vm, &d, &Value::from("k")).unwrap());
        assert!(contains(&mut vm, &d, &Value::list(vec![])).is_err());
    }
}
