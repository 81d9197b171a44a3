//! The global functions, type objects and exception classes every guest
//! program can name.

use std::num::IntErrorKind;

use indexmap::IndexSet;

use crate::runtime::class::{self, Class};
use crate::runtime::exceptions::{self, raise, Exception};
use crate::runtime::format;
use crate::runtime::interp::Vm;
use crate::runtime::methods;
use crate::runtime::ops;
use crate::runtime::value::{Bindings, Builtin, CallArgs, Dict, HashKey, Range, Value};
use crate::runtime::VmResult;
use crate::syntax::{BinOperator, CmpOperator};

/// Build the builtins namespace.
pub fn namespace() -> Bindings {
    let mut names = Bindings::new();
    let functions: [(&'static str, fn(&mut Vm, CallArgs) -> VmResult<Value>); 24] = [
        ("abs", builtin_abs),
        ("all", builtin_all),
        ("any", builtin_any),
        ("chr", builtin_chr),
        ("divmod", builtin_divmod),
        ("enumerate", builtin_enumerate),
        ("filter", builtin_filter),
        ("format", builtin_format),
        ("isinstance", builtin_isinstance),
        ("iter", builtin_iter),
        ("len", builtin_len),
        ("map", builtin_map),
        ("max", builtin_max),
        ("min", builtin_min),
        ("next", builtin_next),
        ("ord", builtin_ord),
        ("pow", builtin_pow),
        ("repr", builtin_repr),
        ("reversed", builtin_reversed),
        ("round", builtin_round),
        ("sorted", builtin_sorted),
        ("sum", builtin_sum),
        ("zip", builtin_zip),
        ("ascii", builtin_ascii),
    ];
    for (name, func) in functions {
        names.insert(name.to_string(), Builtin::function(name, func));
    }
    let types: [&Class; 9] = [
        &class::BOOL,
        &class::DICT,
        &class::FLOAT,
        &class::INT,
        &class::LIST,
        &class::RANGE,
        &class::SET,
        &class::STR,
        &class::TUPLE,
    ];
    for class in types {
        names.insert(class.name().to_string(), Value::Class(class.clone()));
    }
    for class in exceptions::all() {
        names.insert(class.name().to_string(), Value::Class(class));
    }
    names
}

fn required(value: Option<Value>) -> Value {
    value.unwrap_or(Value::None)
}

fn index_arg(value: &Value) -> VmResult<i64> {
    value.as_int().map_or_else(
        || {
            raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "'{}' object cannot be interpreted as an integer",
                    value.type_name()
                ),
            )
        },
        Ok,
    )
}

// -- type constructors ---------------------------------------------------

pub fn int_new(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value, base] = args.bind("int", ["x", "base"], 0)?;
    let Some(value) = value else {
        return Ok(Value::Int(0));
    };
    if let Some(base) = base {
        let base = index_arg(&base)?;
        if base != 0 && !(2..=36).contains(&base) {
            return raise(&exceptions::VALUE_ERROR, "int() base must be >= 2 and <= 36, or 0");
        }
        return match &value {
            Value::Str(s) => parse_int(s, base as u32).map(Value::Int),
            _ => raise(
                &exceptions::TYPE_ERROR,
                "int() can't convert non-string with explicit base",
            ),
        };
    }
    match &value {
        Value::Int(_) | Value::Bool(_) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Str(s) => parse_int(s, 10).map(Value::Int),
        Value::Wrapper(w) => int_new(vm, CallArgs::new(vec![w.inner().clone()])),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

/// Truncate toward zero, refusing values no `int` can hold.
pub(crate) fn float_to_int(f: f64) -> VmResult<i64> {
    if f.is_nan() {
        return raise(&exceptions::VALUE_ERROR, "cannot convert float NaN to integer");
    }
    if f.is_infinite() {
        return raise(
            &exceptions::OVERFLOW_ERROR,
            "cannot convert float infinity to integer",
        );
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return raise(&exceptions::OVERFLOW_ERROR, "int too large to convert");
    }
    Ok(truncated as i64)
}

/// Strip `_` separators, which are only legal between two digits.
fn strip_separators(digits: &str) -> Option<String> {
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    Some(digits.replace('_', ""))
}

fn parse_int(text: &str, base: u32) -> VmResult<i64> {
    let invalid = || {
        exceptions::fault(
            &exceptions::VALUE_ERROR,
            format!(
                "invalid literal for int() with base {base}: {}",
                format::str_repr(text)
            ),
        )
    };
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = unsigned.to_ascii_lowercase();
    let prefixed = |prefix: &str, radix: u32| {
        (base == 0 || base == radix)
            .then(|| lower.strip_prefix(prefix))
            .flatten()
            .map(|rest| (rest.trim_start_matches('_').to_string(), radix))
    };
    let (digits, radix) = prefixed("0x", 16)
        .or_else(|| prefixed("0o", 8))
        .or_else(|| prefixed("0b", 2))
        .unwrap_or_else(|| (lower.clone(), if base == 0 { 10 } else { base }));
    if base == 0
        && radix == 10
        && digits.starts_with('0')
        && digits.chars().any(|c| c != '0' && c != '_')
    {
        return Err(invalid());
    }
    let digits = strip_separators(&digits).ok_or_else(invalid)?;
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let signed = if negative {
        format!("-{digits}")
    } else {
        digits
    };
    i64::from_str_radix(&signed, radix).map_err(|err| match err.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            exceptions::fault(&exceptions::OVERFLOW_ERROR, "int too large to convert")
        }
        _ => invalid(),
    })
}

pub fn bool_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("bool", ["x"], 0)?;
    Ok(Value::Bool(value.is_some_and(|v| ops::truthy(&v))))
}

pub fn float_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("float", ["x"], 0)?;
    match value.unwrap_or(Value::Float(0.0)) {
        Value::Float(f) => Ok(Value::Float(f)),
        Value::Int(i) => Ok(Value::Float(i as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(b)))),
        Value::Str(s) => parse_float(&s).map(Value::Float),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ),
        ),
    }
}

fn parse_float(text: &str) -> VmResult<f64> {
    let trimmed = text.trim();
    let cleaned = if trimmed.contains('_') {
        let ok = trimmed
            .char_indices()
            .filter(|(_, c)| *c == '_')
            .all(|(i, _)| {
                let before = trimmed[..i].chars().next_back();
                let after = trimmed[i + 1..].chars().next();
                before.is_some_and(|c| c.is_ascii_digit())
                    && after.is_some_and(|c| c.is_ascii_digit())
            });
        ok.then(|| trimmed.replace('_', ""))
    } else {
        Some(trimmed.to_string())
    };
    cleaned
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| {
            exceptions::fault(
                &exceptions::VALUE_ERROR,
                format!(
                    "could not convert string to float: {}",
                    format::str_repr(text)
                ),
            )
        })
}

pub fn str_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("str", ["object"], 0)?;
    Ok(value.map_or_else(|| Value::from(""), |v| Value::from(format::to_str(&v))))
}

pub fn list_new(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("list", ["iterable"], 0)?;
    match iterable {
        Some(iterable) => Ok(Value::list(ops::iterate(vm, &iterable)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

pub fn tuple_new(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("tuple", ["iterable"], 0)?;
    match iterable {
        Some(Value::Tuple(items)) => Ok(Value::Tuple(items)),
        Some(iterable) => Ok(Value::tuple(ops::iterate(vm, &iterable)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

pub fn set_new(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("set", ["iterable"], 0)?;
    let items = match iterable {
        Some(iterable) => ops::iterate(vm, &iterable)?
            .into_iter()
            .map(HashKey::new)
            .collect::<VmResult<IndexSet<_>>>()?,
        None => IndexSet::new(),
    };
    Ok(Value::set(items))
}

pub fn dict_new(vm: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    if args.positional.len() > 1 {
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "dict expected at most 1 argument, got {}",
                args.positional.len()
            ),
        );
    }
    let mut dict: Dict = match args.positional.pop() {
        Some(source) => methods::pairs_of(vm, &source)?.into_iter().collect(),
        None => Dict::new(),
    };
    for (key, value) in args.keywords {
        dict.insert(HashKey::from(key.as_str()), value);
    }
    Ok(Value::dict(dict))
}

pub fn dict_fromkeys(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable, value] = args.bind("fromkeys", ["iterable", "value"], 1)?;
    let value = value.unwrap_or(Value::None);
    let mut dict = Dict::new();
    for key in ops::iterate(vm, &required(iterable))? {
        dict.insert(HashKey::new(key)?, value.clone());
    }
    Ok(Value::dict(dict))
}

pub fn range_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    if !args.keywords.is_empty() {
        return raise(&exceptions::TYPE_ERROR, "range() takes no keyword arguments");
    }
    let bounds = args
        .positional
        .iter()
        .map(index_arg)
        .collect::<VmResult<Vec<_>>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        [] => return raise(&exceptions::TYPE_ERROR, "range expected at least 1 argument, got 0"),
        more => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("range expected at most 3 arguments, got {}", more.len()),
            )
        }
    };
    if step == 0 {
        return raise(&exceptions::VALUE_ERROR, "range() arg 3 must not be zero");
    }
    Ok(Value::Range(Range { start, stop, step }))
}

// -- functions -----------------------------------------------------------

fn builtin_abs(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("abs", ["x"], 1)?;
    match required(value) {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        v @ (Value::Int(_) | Value::Bool(_)) => v
            .as_int()
            .and_then(i64::checked_abs)
            .map(Value::Int)
            .ok_or_else(|| exceptions::fault(&exceptions::OVERFLOW_ERROR, "integer overflow")),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("bad operand type for abs(): '{}'", other.type_name()),
        ),
    }
}

fn builtin_all(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("all", ["iterable"], 1)?;
    let items = ops::iterate(vm, &required(iterable))?;
    Ok(Value::Bool(items.iter().all(ops::truthy)))
}

fn builtin_any(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("any", ["iterable"], 1)?;
    let items = ops::iterate(vm, &required(iterable))?;
    Ok(Value::Bool(items.iter().any(ops::truthy)))
}

fn builtin_ascii(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("ascii", ["obj"], 1)?;
    Ok(Value::from(format::ascii(&required(value))))
}

fn builtin_chr(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [code] = args.bind("chr", ["i"], 1)?;
    let code = index_arg(&required(code))?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| {
            exceptions::fault(&exceptions::VALUE_ERROR, "chr() arg not in range(0x110000)")
        })
}

fn builtin_ord(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [text] = args.bind("ord", ["c"], 1)?;
    match required(text) {
        Value::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
                _ => raise(
                    &exceptions::TYPE_ERROR,
                    format!(
                        "ord() expected a character, but string of length {} found",
                        s.chars().count()
                    ),
                ),
            }
        }
        other => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "ord() expected string of length 1, but {} found",
                other.type_name()
            ),
        ),
    }
}

fn builtin_divmod(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [a, b] = args.bind("divmod", ["x", "y"], 2)?;
    let (a, b) = (required(a), required(b));
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        let (q, r) = ops::int_divmod(x, y)?;
        return Ok(Value::tuple(vec![Value::Int(q), Value::Int(r)]));
    }
    match (a.as_float(), b.as_float()) {
        (Some(_), Some(y)) if y == 0.0 => raise(&exceptions::ZERO_DIVISION_ERROR, "float divmod()"),
        (Some(x), Some(y)) => {
            let r = ops::float_mod(x, y);
            let q = ((x - r) / y).round();
            Ok(Value::tuple(vec![Value::Float(q), Value::Float(r)]))
        }
        _ => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "unsupported operand type(s) for divmod(): '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ),
        ),
    }
}

fn builtin_enumerate(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable, start] = args.bind("enumerate", ["iterable", "start"], 1)?;
    let start = match start {
        Some(start) => index_arg(&start)?,
        None => 0,
    };
    let items = ops::iterate(vm, &required(iterable))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = start.checked_add(i as i64).ok_or_else(|| {
            exceptions::fault(&exceptions::OVERFLOW_ERROR, "integer overflow")
        })?;
        out.push(Value::tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::iterator(&class::ENUMERATE, out))
}

fn builtin_filter(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [func, iterable] = args.bind("filter", ["function", "iterable"], 2)?;
    let func = required(func);
    let mut out = Vec::new();
    for item in ops::iterate(vm, &required(iterable))? {
        let keep = if func.is_none() {
            ops::truthy(&item)
        } else {
            ops::truthy(&vm.call(&func, CallArgs::new(vec![item.clone()]))?)
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::iterator(&class::FILTER, out))
}

fn builtin_map(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    if !args.keywords.is_empty() {
        return raise(&exceptions::TYPE_ERROR, "map() takes no keyword arguments");
    }
    let mut positional = args.positional.into_iter();
    let Some(func) = positional.next() else {
        return raise(&exceptions::TYPE_ERROR, "map() must have at least two arguments.");
    };
    let columns = positional
        .map(|iterable| ops::iterate(vm, &iterable))
        .collect::<VmResult<Vec<_>>>()?;
    if columns.is_empty() {
        return raise(&exceptions::TYPE_ERROR, "map() must have at least two arguments.");
    }
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let call_args = columns.iter().map(|column| column[row].clone()).collect();
        out.push(vm.call(&func, CallArgs::new(call_args))?);
    }
    Ok(Value::iterator(&class::MAP, out))
}

fn builtin_zip(vm: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let strict = args.take_keyword("strict").is_some_and(|s| ops::truthy(&s));
    if let Some((name, _)) = args.keywords.first() {
        return raise(
            &exceptions::TYPE_ERROR,
            format!("zip() got an unexpected keyword argument '{name}'"),
        );
    }
    let columns = args
        .positional
        .iter()
        .map(|iterable| ops::iterate(vm, iterable))
        .collect::<VmResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    if strict && columns.iter().any(|c| c.len() != rows) {
        return raise(&exceptions::VALUE_ERROR, "zip() arguments have different lengths");
    }
    let out = (0..rows)
        .map(|row| Value::tuple(columns.iter().map(|c| c[row].clone()).collect()))
        .collect::<Vec<_>>();
    Ok(Value::iterator(&class::ZIP, out))
}

fn builtin_format(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value, spec] = args.bind("format", ["value", "format_spec"], 1)?;
    let spec = match spec {
        None => String::new(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "format() argument 2 must be str, not {}",
                    other.type_name()
                ),
            )
        }
    };
    format::format_value(&required(value), &spec).map(Value::from)
}

fn class_matches(value: &Value, classinfo: &Value) -> VmResult<bool> {
    match classinfo {
        Value::Class(class) => Ok(value.class().is_subclass_of(class)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if class_matches(value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Wrapper(w) => class_matches(value, w.inner()),
        _ => raise(
            &exceptions::TYPE_ERROR,
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        ),
    }
}

fn builtin_isinstance(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value, classinfo] = args.bind("isinstance", ["obj", "class_or_tuple"], 2)?;
    class_matches(&required(value), &required(classinfo)).map(Value::Bool)
}

fn builtin_iter(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable] = args.bind("iter", ["object"], 1)?;
    match required(iterable) {
        iterator @ Value::Iterator(_) => Ok(iterator),
        other => Ok(Value::iterator(
            &class::LIST_ITERATOR,
            ops::iterate(vm, &other)?,
        )),
    }
}

fn builtin_next(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterator, default] = args.bind("next", ["iterator", "default"], 1)?;
    let iterator = required(iterator);
    let iterator = match &iterator {
        Value::Wrapper(w) => w.inner().clone(),
        _ => iterator,
    };
    match &iterator {
        Value::Iterator(state) => {
            let next = state.borrow_mut().items.pop_front();
            match (next, default) {
                (Some(item), _) | (None, Some(item)) => Ok(item),
                (None, None) => {
                    Err(Exception::with_args(&exceptions::STOP_ITERATION, Vec::new()).into())
                }
            }
        }
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("'{}' object is not an iterator", other.type_name()),
        ),
    }
}

fn builtin_len(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("len", ["obj"], 1)?;
    let len = ops::len(&required(value))?;
    i64::try_from(len).map(Value::Int).or_else(|_| {
        raise(
            &exceptions::OVERFLOW_ERROR,
            "Python int too large to convert to C ssize_t",
        )
    })
}

fn extreme(vm: &mut Vm, mut args: CallArgs, name: &str, op: CmpOperator) -> VmResult<Value> {
    let key = args.take_keyword("key").filter(|k| !k.is_none());
    let default = args.take_keyword("default");
    if let Some((keyword, _)) = args.keywords.first() {
        return raise(
            &exceptions::TYPE_ERROR,
            format!("'{keyword}' is an invalid keyword argument for {name}()"),
        );
    }
    let items = match args.positional.len() {
        0 => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("{name} expected at least 1 argument, got 0"),
            )
        }
        1 => ops::iterate(vm, &args.positional[0])?,
        _ if default.is_some() => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "Cannot specify a default for {name}() with multiple positional arguments"
                ),
            )
        }
        _ => args.positional,
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(func) => vm.call(func, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            Some((best_rank, _)) => ops::compare(vm, op, &rank, best_rank)?,
            None => true,
        };
        if replace {
            best = Some((rank, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) | (None, Some(item)) => Ok(item),
        (None, None) => raise(
            &exceptions::VALUE_ERROR,
            format!("{name}() iterable argument is empty"),
        ),
    }
}

fn builtin_max(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    extreme(vm, args, "max", CmpOperator::Gt)
}

fn builtin_min(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    extreme(vm, args, "min", CmpOperator::Lt)
}

fn builtin_pow(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [base, exp, modulus] = args.bind("pow", ["base", "exp", "mod"], 2)?;
    let (base, exp) = (required(base), required(exp));
    let Some(modulus) = modulus.filter(|m| !m.is_none()) else {
        return ops::binary(vm, BinOperator::Pow, &base, &exp);
    };
    let (Some(b), Some(e), Some(m)) = (base.as_int(), exp.as_int(), modulus.as_int()) else {
        return raise(
            &exceptions::TYPE_ERROR,
            "pow() 3rd argument not allowed unless all arguments are integers",
        );
    };
    if m == 0 {
        return raise(&exceptions::VALUE_ERROR, "pow() 3rd argument cannot be 0");
    }
    if e < 0 {
        return raise(&exceptions::VALUE_ERROR, "base is not invertible for the given modulus");
    }
    Ok(Value::Int(mod_pow(b, e, m)))
}

fn mod_pow(base: i64, mut exp: i64, modulus: i64) -> i64 {
    let m = i128::from(modulus);
    let mut result: i128 = 1 % m;
    let mut base = i128::from(base).rem_euclid(m);
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exp >>= 1;
    }
    // Python gives the result the sign of the modulus.
    let result = result.rem_euclid(m.abs());
    let result = if m < 0 && result != 0 { result + m } else { result };
    result as i64
}

fn builtin_repr(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [value] = args.bind("repr", ["obj"], 1)?;
    Ok(Value::from(format::repr(&required(value))))
}

fn builtin_reversed(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [sequence] = args.bind("reversed", ["sequence"], 1)?;
    let sequence = required(sequence);
    let sequence = match &sequence {
        Value::Wrapper(w) => w.inner().clone(),
        _ => sequence,
    };
    let mut items: Vec<Value> = match &sequence {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
        Value::Range(r) => r.iter().map(Value::Int).collect(),
        Value::Dict(d) => d.borrow().keys().map(|k| k.value().clone()).collect(),
        other => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("'{}' object is not reversible", other.type_name()),
            )
        }
    };
    items.reverse();
    Ok(Value::iterator(&class::REVERSED, items))
}

fn builtin_round(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [number, ndigits] = args.bind("round", ["number", "ndigits"], 1)?;
    let number = required(number);
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(n) => Some(index_arg(&n)?),
    };
    match (&number, ndigits) {
        (Value::Int(_) | Value::Bool(_), None) => Ok(Value::Int(number.as_int().unwrap_or(0))),
        (Value::Int(_) | Value::Bool(_), Some(n)) => {
            let i = number.as_int().unwrap_or(0);
            if n >= 0 {
                return Ok(Value::Int(i));
            }
            let Some(factor) = u32::try_from(-n).ok().and_then(|e| 10i64.checked_pow(e)) else {
                return Ok(Value::Int(0));
            };
            let (q, r) = ops::int_divmod(i, factor)?;
            let twice = r.saturating_mul(2);
            let q = if twice > factor || (twice == factor && q % 2 != 0) {
                q + 1
            } else {
                q
            };
            q.checked_mul(factor)
                .map(Value::Int)
                .ok_or_else(|| exceptions::fault(&exceptions::OVERFLOW_ERROR, "integer overflow"))
        }
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => Ok(Value::Float(format::round_float(*f, n))),
        (other, _) => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            ),
        ),
    }
}

fn builtin_sorted(vm: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let key = args.take_keyword("key");
    let reverse = args.take_keyword("reverse");
    let [iterable] = args.bind("sorted", ["iterable"], 1)?;
    let items = ops::iterate(vm, &required(iterable))?;
    methods::sort_items(vm, items, key, reverse).map(Value::list)
}

fn builtin_sum(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [iterable, start] = args.bind("sum", ["iterable", "start"], 1)?;
    let mut total = start.unwrap_or(Value::Int(0));
    if let Value::Str(_) = total {
        return raise(
            &exceptions::TYPE_ERROR,
            "sum() can't sum strings [use ''.join(seq) instead]",
        );
    }
    for item in ops::iterate(vm, &required(iterable))? {
        total = ops::binary(vm, BinOperator::Add, &total, &item)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> VmResult<Value> {
        let names = namespace();
        let func = names.get(name).expect("builtin exists").clone();
        Vm::default().call(&func, CallArgs::new(args))
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_namespace_contents() {
        let names = namespace();
        for name in ["abs", "sorted", "int", "dict", "ValueError", "ZeroDivisionError"] {
            assert!(names.contains_key(name), "missing {name}");
        }
        for name in ["eval", "exec", "open", "getattr", "__import__", "type", "vars"] {
            assert!(!names.contains_key(name), "unexpected {name}");
        }
    }

    #[test]
    fn test_len_of_huge_range_overflows() {
        let wide = call("range", vec![Value::Int(i64::MIN), Value::Int(i64::MAX)]).unwrap();
        let fault = call("len", vec![wide]).unwrap_err();
        assert!(fault
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::OVERFLOW_ERROR)));
        let half = call("range", vec![Value::Int(0), Value::Int(i64::MAX), Value::Int(2)]).unwrap();
        assert_eq!(call("len", vec![half]).unwrap(), Value::Int(i64::MAX / 2 + 1));
    }

    #[test]
    fn test_int_parsing() {
        assert_eq!(call("int", vec![" 42 ".into()]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec!["-1_000".into()]).unwrap(), Value::Int(-1000));
        assert_eq!(call("int", vec!["ff".into(), Value::Int(16)]).unwrap(), Value::Int(255));
        assert_eq!(call("int", vec!["0b101".into(), Value::Int(0)]).unwrap(), Value::Int(5));
        assert_eq!(call("int", vec![Value::Float(-3.9)]).unwrap(), Value::Int(-3));
        assert!(call("int", vec!["4.5".into()]).is_err());
        assert!(call("int", vec!["99999999999999999999".into()]).is_err());
    }

    #[test]
    fn test_float_parsing() {
        assert_eq!(call("float", vec!["1_0.5".into()]).unwrap(), Value::Float(10.5));
        assert!(call("float", vec!["abc".into()]).is_err());
    }

    #[test]
    fn test_aggregates() {
        assert_eq!(call("sum", vec![ints(&[1, 2, 3])]).unwrap(), Value::Int(6));
        assert_eq!(call("max", vec![ints(&[3, 9, 2])]).unwrap(), Value::Int(9));
        assert_eq!(call("min", vec![Value::Int(4), Value::Int(-1)]).unwrap(), Value::Int(-1));
        assert!(call("max", vec![ints(&[])]).is_err());
        assert_eq!(call("sorted", vec![ints(&[3, 1, 2])]).unwrap(), ints(&[1, 2, 3]));
        assert!(call("sum", vec![Value::list(vec![]), "".into()]).is_err());
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(call("round", vec![Value::Int(1250), Value::Int(-2)]).unwrap(), Value::Int(1200));
        assert_eq!(call("round", vec![Value::Int(1350), Value::Int(-2)]).unwrap(), Value::Int(1400));
    }

    #[test]
    fn test_pow_and_divmod() {
        assert_eq!(call("pow", vec![Value::Int(3), Value::Int(4), Value::Int(5)]).unwrap(), Value::Int(1));
        assert_eq!(call("pow", vec![Value::Int(2), Value::Int(10)]).unwrap(), Value::Int(1024));
        assert_eq!(
            call("divmod", vec![Value::Int(-7), Value::Int(2)]).unwrap(),
            Value::tuple(vec![Value::Int(-4), Value::Int(1)])
        );
        assert!(call("divmod", vec![Value::Float(1.0), Value::Float(0.0)]).is_err());
    }

    #[test]
    fn test_iterators() {
        let zipped = call("zip", vec![ints(&[1, 2, 3]), "ab".into()]).unwrap();
        let rows = call("list", vec![zipped]).unwrap();
        assert_eq!(
            rows,
            Value::list(vec![
                Value::tuple(vec![Value::Int(1), "a".into()]),
                Value::tuple(vec![Value::Int(2), "b".into()]),
            ])
        );
        let it = call("iter", vec![ints(&[7])]).unwrap();
        assert_eq!(call("next", vec![it.clone()]).unwrap(), Value::Int(7));
        assert!(call("next", vec![it.clone()]).is_err());
        assert_eq!(call("next", vec![it, Value::None]).unwrap(), Value::None);
    }

    #[test]
    fn test_isinstance() {
        let int_class = Value::Class(class::INT.clone());
        assert_eq!(call("isinstance", vec![Value::Bool(true), int_class.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(
            call("isinstance", vec!["x".into(), Value::tuple(vec![int_class, Value::Class(class::STR.clone())])]).unwrap(),
            Value::Bool(true)
        );
        assert!(call("isinstance", vec![Value::Int(1), Value::Int(2)]).is_err());
    }

    #[test]
    fn test_chr_ord() {
        assert_eq!(call("chr", vec![Value::Int(955)]).unwrap(), Value::from("λ"));
        assert_eq!(call("ord", vec!["λ".into()]).unwrap(), Value::Int(955));
        assert!(call("chr", vec![Value::Int(-1)]).is_err());
        assert!(call("ord", vec!["ab".into()]).is_err());
    }
}
