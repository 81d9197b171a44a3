//! Methods and attributes of the built-in types.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::runtime::exceptions::{self, raise, Exception};
use crate::runtime::format;
use crate::runtime::interp::Vm;
use crate::runtime::ops;
use crate::runtime::value::{Builtin, BuiltinKind, CallArgs, Dict, HashKey, Value};
use crate::runtime::VmResult;

type MethodFn = fn(&mut Vm, CallArgs) -> VmResult<Value>;

/// Resolve attribute `name` on a built-in value.
pub fn lookup(receiver: &Value, name: &str) -> Option<Value> {
    match (receiver, name) {
        (Value::Exception(exc), "args") => return Some(Value::tuple(exc.args.clone())),
        (Value::Range(r), "start") => return Some(Value::Int(r.start)),
        (Value::Range(r), "stop") => return Some(Value::Int(r.stop)),
        (Value::Range(r), "step") => return Some(Value::Int(r.step)),
        (Value::Slice(s), "start" | "stop" | "step") => {
            let bound = match name {
                "start" => s.lower,
                "stop" => s.upper,
                _ => s.step,
            };
            return Some(bound.map_or(Value::None, Value::Int));
        }
        (Value::Int(_) | Value::Bool(_), "real" | "numerator") => {
            return receiver.as_int().map(Value::Int)
        }
        (Value::Int(_) | Value::Bool(_), "imag") => return Some(Value::Int(0)),
        (Value::Int(_) | Value::Bool(_), "denominator") => return Some(Value::Int(1)),
        (Value::Float(f), "real") => return Some(Value::Float(*f)),
        (Value::Float(_), "imag") => return Some(Value::Float(0.0)),
        _ => {}
    }
    if let Value::Str(_) = receiver {
        if let Some(&(method, func)) = UNSAFE_STR_METHODS.iter().find(|(n, _)| *n == name) {
            return Some(Builtin::bind(
                method,
                receiver.clone(),
                Arc::new(func),
                BuiltinKind::Unsafe,
            ));
        }
    }
    let table: &[(&'static str, MethodFn)] = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        Value::Range(_) => RANGE_METHODS,
        Value::Int(_) | Value::Bool(_) => INT_METHODS,
        Value::Float(_) => FLOAT_METHODS,
        _ => return None,
    };
    table.iter().find(|(n, _)| *n == name).map(|&(method, func)| {
        Builtin::bind(method, receiver.clone(), Arc::new(func), BuiltinKind::Method)
    })
}

const UNSAFE_STR_METHODS: &[(&str, MethodFn)] =
    &[("format", str_format), ("format_map", str_format_map)];

const STR_METHODS: &[(&str, MethodFn)] = &[
    ("lower", str_lower),
    ("upper", str_upper),
    ("casefold", str_lower),
    ("swapcase", str_swapcase),
    ("capitalize", str_capitalize),
    ("title", str_title),
    ("strip", str_strip),
    ("lstrip", str_lstrip),
    ("rstrip", str_rstrip),
    ("split", str_split),
    ("rsplit", str_rsplit),
    ("splitlines", str_splitlines),
    ("join", str_join),
    ("replace", str_replace),
    ("startswith", str_startswith),
    ("endswith", str_endswith),
    ("find", str_find),
    ("rfind", str_rfind),
    ("index", str_index),
    ("rindex", str_rindex),
    ("count", str_count),
    ("isdigit", str_isdigit),
    ("isdecimal", str_isdigit),
    ("isnumeric", str_isnumeric),
    ("isalpha", str_isalpha),
    ("isalnum", str_isalnum),
    ("isspace", str_isspace),
    ("islower", str_islower),
    ("isupper", str_isupper),
    ("center", str_center),
    ("ljust", str_ljust),
    ("rjust", str_rjust),
    ("zfill", str_zfill),
    ("partition", str_partition),
    ("rpartition", str_rpartition),
    ("removeprefix", str_removeprefix),
    ("removesuffix", str_removesuffix),
];

const LIST_METHODS: &[(&str, MethodFn)] = &[
    ("append", list_append),
    ("extend", list_extend),
    ("insert", list_insert),
    ("pop", list_pop),
    ("remove", list_remove),
    ("index", seq_index),
    ("count", seq_count),
    ("sort", list_sort),
    ("reverse", list_reverse),
    ("copy", list_copy),
    ("clear", list_clear),
];

const TUPLE_METHODS: &[(&str, MethodFn)] = &[("index", seq_index), ("count", seq_count)];

const RANGE_METHODS: &[(&str, MethodFn)] = &[("index", seq_index), ("count", seq_count)];

const DICT_METHODS: &[(&str, MethodFn)] = &[
    ("get", dict_get),
    ("keys", dict_keys),
    ("values", dict_values),
    ("items", dict_items),
    ("pop", dict_pop),
    ("popitem", dict_popitem),
    ("setdefault", dict_setdefault),
    ("update", dict_update),
    ("copy", dict_copy),
    ("clear", dict_clear),
];

const SET_METHODS: &[(&str, MethodFn)] = &[
    ("add", set_add),
    ("discard", set_discard),
    ("remove", set_remove),
    ("pop", set_pop),
    ("clear", set_clear),
    ("copy", set_copy),
    ("union", set_union),
    ("intersection", set_intersection),
    ("difference", set_difference),
    ("symmetric_difference", set_symmetric_difference),
    ("issubset", set_issubset),
    ("issuperset", set_issuperset),
    ("isdisjoint", set_isdisjoint),
    ("update", set_update),
    ("intersection_update", set_intersection_update),
    ("difference_update", set_difference_update),
];

const INT_METHODS: &[(&str, MethodFn)] = &[("bit_length", int_bit_length)];

const FLOAT_METHODS: &[(&str, MethodFn)] = &[("is_integer", float_is_integer)];

// -- receivers -----------------------------------------------------------

fn split_receiver(mut args: CallArgs) -> (Value, CallArgs) {
    if args.positional.is_empty() {
        return (Value::None, args);
    }
    let receiver = args.positional.remove(0);
    (receiver, args)
}

fn descriptor_error<T>(type_name: &str, got: &Value) -> VmResult<T> {
    raise(
        &exceptions::TYPE_ERROR,
        format!(
            "descriptor requires a '{type_name}' object but received a '{}'",
            got.type_name()
        ),
    )
}

fn str_receiver(args: CallArgs) -> VmResult<(Rc<str>, CallArgs)> {
    match split_receiver(args) {
        (Value::Str(s), rest) => Ok((s, rest)),
        (other, _) => descriptor_error("str", &other),
    }
}

type ListRef = Rc<RefCell<Vec<Value>>>;

fn list_receiver(args: CallArgs) -> VmResult<(ListRef, CallArgs)> {
    match split_receiver(args) {
        (Value::List(items), rest) => Ok((items, rest)),
        (other, _) => descriptor_error("list", &other),
    }
}

fn dict_receiver(args: CallArgs) -> VmResult<(Rc<RefCell<Dict>>, CallArgs)> {
    match split_receiver(args) {
        (Value::Dict(dict), rest) => Ok((dict, rest)),
        (other, _) => descriptor_error("dict", &other),
    }
}

type SetRef = Rc<RefCell<IndexSet<HashKey>>>;

fn set_receiver(args: CallArgs) -> VmResult<(SetRef, CallArgs)> {
    match split_receiver(args) {
        (Value::Set(set), rest) => Ok((set, rest)),
        (other, _) => descriptor_error("set", &other),
    }
}

fn no_args(name: &str, args: &CallArgs) -> VmResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        raise(
            &exceptions::TYPE_ERROR,
            format!("{name}() takes no arguments ({} given)", args.len()),
        )
    }
}

fn required(value: Option<Value>) -> Value {
    value.unwrap_or(Value::None)
}

fn str_arg(value: &Value, func: &str) -> VmResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("{func}() argument must be str, not {}", other.type_name()),
        ),
    }
}

fn int_arg(value: &Value, func: &str) -> VmResult<i64> {
    value.as_int().map_or_else(
        || {
            raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "{func}() argument must be int, not {}",
                    value.type_name()
                ),
            )
        },
        Ok,
    )
}

fn optional_int(value: Option<Value>, func: &str) -> VmResult<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(v) => int_arg(&v, func).map(Some),
    }
}

/// Clamp Python-style `start`/`end` arguments to a char range of `len`.
fn char_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len_i = len as i64;
    let clamp = |i: i64| -> usize {
        let i = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
        i as usize
    };
    let start = start.map_or(0, clamp);
    let end = end.map_or(len, clamp);
    (start, end.max(start))
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end - start).collect()
}

fn char_index(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

// -- str -----------------------------------------------------------------

fn str_lower(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args("lower", &args)?;
    Ok(Value::from(s.to_lowercase()))
}

fn str_upper(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args("upper", &args)?;
    Ok(Value::from(s.to_uppercase()))
}

fn str_swapcase(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args("swapcase", &args)?;
    let swapped: String = s
        .chars()
        .flat_map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                c.to_uppercase().collect::<Vec<_>>()
            }
        })
        .collect();
    Ok(Value::from(swapped))
}

fn str_capitalize(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args("capitalize", &args)?;
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str().to_lowercase()),
        None => String::new(),
    };
    Ok(Value::from(out))
}

fn str_title(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args("title", &args)?;
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    Ok(Value::from(out))
}

fn strip_with(args: CallArgs, name: &str, left: bool, right: bool) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [chars] = args.bind(name, ["chars"], 0)?;
    let chars: Option<Vec<char>> = match chars {
        None | Some(Value::None) => None,
        Some(v) => Some(str_arg(&v, name)?.chars().collect()),
    };
    let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
    };
    let mut out: &str = &s;
    if left {
        out = out.trim_start_matches(matches);
    }
    if right {
        out = out.trim_end_matches(matches);
    }
    Ok(Value::from(out))
}

fn str_strip(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    strip_with(args, "strip", true, true)
}

fn str_lstrip(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    strip_with(args, "lstrip", true, false)
}

fn str_rstrip(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    strip_with(args, "rstrip", false, true)
}

fn split_args(args: CallArgs, name: &str) -> VmResult<(Option<Rc<str>>, Option<usize>)> {
    let [sep, maxsplit] = args.bind(name, ["sep", "maxsplit"], 0)?;
    let sep = match sep {
        None | Some(Value::None) => None,
        Some(v) => {
            let sep = str_arg(&v, name)?;
            if sep.is_empty() {
                return raise(&exceptions::VALUE_ERROR, "empty separator");
            }
            Some(sep)
        }
    };
    let maxsplit = optional_int(maxsplit, name)?.and_then(|n| usize::try_from(n).ok());
    Ok((sep, maxsplit))
}

fn split_whitespace(s: &str, maxsplit: Option<usize>, reverse: bool) -> Vec<String> {
    let words: Vec<&str> = s.split_whitespace().collect();
    let Some(limit) = maxsplit else {
        return words.into_iter().map(String::from).collect();
    };
    if words.len() <= limit + 1 {
        return words.into_iter().map(String::from).collect();
    }
    if reverse {
        let trimmed = s.trim_end();
        let mut out = Vec::new();
        let mut rest = trimmed;
        for _ in 0..limit {
            match rest.rfind(char::is_whitespace) {
                Some(pos) => {
                    let word_start = pos + rest[pos..].chars().next().map_or(1, char::len_utf8);
                    out.push(rest[word_start..].to_string());
                    rest = rest[..pos].trim_end();
                }
                None => break,
            }
        }
        out.push(rest.to_string());
        out.reverse();
        out
    } else {
        let mut out = Vec::new();
        let mut rest = s.trim_start();
        for _ in 0..limit {
            match rest.find(char::is_whitespace) {
                Some(pos) => {
                    out.push(rest[..pos].to_string());
                    rest = rest[pos..].trim_start();
                }
                None => break,
            }
        }
        out.push(rest.to_string());
        out
    }
}

fn str_split(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let (sep, maxsplit) = split_args(args, "split")?;
    let parts: Vec<String> = match (sep, maxsplit) {
        (None, limit) => split_whitespace(&s, limit, false),
        (Some(sep), None) => s.split(&*sep).map(String::from).collect(),
        (Some(sep), Some(limit)) => s.splitn(limit + 1, &*sep).map(String::from).collect(),
    };
    Ok(Value::list(parts.into_iter().map(Value::from).collect()))
}

fn str_rsplit(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let (sep, maxsplit) = split_args(args, "rsplit")?;
    let parts: Vec<String> = match (sep, maxsplit) {
        (None, limit) => split_whitespace(&s, limit, true),
        (Some(sep), None) => s.split(&*sep).map(String::from).collect(),
        (Some(sep), Some(limit)) => {
            let mut parts: Vec<String> = s.rsplitn(limit + 1, &*sep).map(String::from).collect();
            parts.reverse();
            parts
        }
    };
    Ok(Value::list(parts.into_iter().map(Value::from).collect()))
}

fn str_splitlines(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [keepends] = args.bind("splitlines", ["keepends"], 0)?;
    let keepends = keepends.is_some_and(|k| ops::truthy(&k));
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' | '\r' => {
                let mut ending = c.to_string();
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                    ending.push('\n');
                }
                if keepends {
                    current.push_str(&ending);
                }
                lines.push(Value::from(std::mem::take(&mut current)));
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        lines.push(Value::from(current));
    }
    Ok(Value::list(lines))
}

fn str_join(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [iterable] = args.bind("join", ["iterable"], 1)?;
    let items = ops::iterate(vm, &required(iterable))?;
    let mut parts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item {
            Value::Str(part) => parts.push(part.to_string()),
            other => {
                return raise(
                    &exceptions::TYPE_ERROR,
                    format!(
                        "sequence item {i}: expected str instance, {} found",
                        other.type_name()
                    ),
                )
            }
        }
    }
    Ok(Value::from(parts.join(&s)))
}

fn str_replace(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [old, new, count] = args.bind("replace", ["old", "new", "count"], 2)?;
    let old = str_arg(&required(old), "replace")?;
    let new = str_arg(&required(new), "replace")?;
    let out = match optional_int(count, "replace")? {
        Some(n) if n >= 0 => s.replacen(&*old, &new, n as usize),
        _ => s.replace(&*old, &new),
    };
    Ok(Value::from(out))
}

fn affix_check(
    args: CallArgs,
    name: &str,
    test: fn(&str, &str) -> bool,
) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [affix, start, end] = args.bind(name, ["prefix", "start", "end"], 1)?;
    let len = s.chars().count();
    let (start, end) = char_bounds(
        len,
        optional_int(start, name)?,
        optional_int(end, name)?,
    );
    let window = char_slice(&s, start, end);
    let found = match required(affix) {
        Value::Str(affix) => test(&window, &affix),
        Value::Tuple(options) => {
            let mut found = false;
            for option in options.iter() {
                found |= test(&window, &str_arg(option, name)?);
            }
            found
        }
        other => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "{name} first arg must be str or a tuple of str, not {}",
                    other.type_name()
                ),
            )
        }
    };
    Ok(Value::Bool(found))
}

fn str_startswith(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    affix_check(args, "startswith", |s, p| s.starts_with(p))
}

fn str_endswith(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    affix_check(args, "endswith", |s, p| s.ends_with(p))
}

/// Char position of `sub` within the `start..end` window of the receiver.
fn search(args: CallArgs, name: &str, reverse: bool) -> VmResult<Option<usize>> {
    let (s, args) = str_receiver(args)?;
    let [sub, start, end] = args.bind(name, ["sub", "start", "end"], 1)?;
    let sub = str_arg(&required(sub), name)?;
    let len = s.chars().count();
    let (start, end) = char_bounds(len, optional_int(start, name)?, optional_int(end, name)?);
    let window = char_slice(&s, start, end);
    let found = if reverse {
        window.rfind(&*sub)
    } else {
        window.find(&*sub)
    };
    Ok(found.map(|byte| start + char_index(&window, byte)))
}

fn str_find(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    Ok(Value::Int(search(args, "find", false)?.map_or(-1, |i| i as i64)))
}

fn str_rfind(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    Ok(Value::Int(search(args, "rfind", true)?.map_or(-1, |i| i as i64)))
}

fn str_index(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    match search(args, "index", false)? {
        Some(i) => Ok(Value::Int(i as i64)),
        None => raise(&exceptions::VALUE_ERROR, "substring not found"),
    }
}

fn str_rindex(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    match search(args, "rindex", true)? {
        Some(i) => Ok(Value::Int(i as i64)),
        None => raise(&exceptions::VALUE_ERROR, "substring not found"),
    }
}

fn str_count(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [sub, start, end] = args.bind("count", ["sub", "start", "end"], 1)?;
    let sub = str_arg(&required(sub), "count")?;
    let len = s.chars().count();
    let (start, end) = char_bounds(len, optional_int(start, "count")?, optional_int(end, "count")?);
    let window = char_slice(&s, start, end);
    let count = if sub.is_empty() {
        window.chars().count() + 1
    } else {
        window.matches(&*sub).count()
    };
    Ok(Value::Int(count as i64))
}

fn char_predicate(args: CallArgs, name: &str, test: fn(&str) -> bool) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    no_args(name, &args)?;
    Ok(Value::Bool(test(&s)))
}

fn str_isdigit(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isdigit", |s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    })
}

fn str_isnumeric(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isnumeric", |s| {
        !s.is_empty() && s.chars().all(char::is_numeric)
    })
}

fn str_isalpha(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isalpha", |s| {
        !s.is_empty() && s.chars().all(char::is_alphabetic)
    })
}

fn str_isalnum(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isalnum", |s| {
        !s.is_empty() && s.chars().all(char::is_alphanumeric)
    })
}

fn str_isspace(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isspace", |s| {
        !s.is_empty() && s.chars().all(char::is_whitespace)
    })
}

fn str_islower(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "islower", |s| {
        s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
    })
}

fn str_isupper(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    char_predicate(args, "isupper", |s| {
        s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
    })
}

fn padding_args(args: CallArgs, name: &str) -> VmResult<(Rc<str>, usize, char)> {
    let (s, args) = str_receiver(args)?;
    let [width, fill] = args.bind(name, ["width", "fillchar"], 1)?;
    let width = padding_width(int_arg(&required(width), name)?)?;
    let fill = match fill {
        None => ' ',
        Some(v) => {
            let text = str_arg(&v, name)?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return raise(
                        &exceptions::TYPE_ERROR,
                        "The fill character must be exactly one character long",
                    )
                }
            }
        }
    };
    Ok((s, width, fill))
}

fn padding_width(width: i64) -> VmResult<usize> {
    let width = width.max(0) as usize;
    if width > ops::MAX_REPEAT_LEN {
        return raise(&exceptions::OVERFLOW_ERROR, "padded string is too long");
    }
    Ok(width)
}

fn pad(s: &str, width: usize, fill: char, align: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let total = width - len;
    let (left, right) = match align {
        '<' => (0, total),
        '>' => (total, 0),
        _ => {
            let left = total / 2 + (total & width & 1);
            (left, total - left)
        }
    };
    let fill = fill.to_string();
    format!("{}{s}{}", fill.repeat(left), fill.repeat(right))
}

fn str_center(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, width, fill) = padding_args(args, "center")?;
    Ok(Value::from(pad(&s, width, fill, '^')))
}

fn str_ljust(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, width, fill) = padding_args(args, "ljust")?;
    Ok(Value::from(pad(&s, width, fill, '<')))
}

fn str_rjust(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, width, fill) = padding_args(args, "rjust")?;
    Ok(Value::from(pad(&s, width, fill, '>')))
}

fn str_zfill(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [width] = args.bind("zfill", ["width"], 1)?;
    let width = padding_width(int_arg(&required(width), "zfill")?)?;
    let len = s.chars().count();
    if len >= width {
        return Ok(Value::Str(s));
    }
    let zeros = "0".repeat(width - len);
    let out = match s.strip_prefix(['+', '-']) {
        Some(rest) => format!("{}{zeros}{rest}", &s[..1]),
        None => format!("{zeros}{s}"),
    };
    Ok(Value::from(out))
}

fn partition_with(args: CallArgs, name: &str, reverse: bool) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [sep] = args.bind(name, ["sep"], 1)?;
    let sep = str_arg(&required(sep), name)?;
    if sep.is_empty() {
        return raise(&exceptions::VALUE_ERROR, "empty separator");
    }
    let found = if reverse { s.rfind(&*sep) } else { s.find(&*sep) };
    let parts = match found {
        Some(pos) => [&s[..pos], &*sep, &s[pos + sep.len()..]],
        None if reverse => ["", "", &*s],
        None => [&*s, "", ""],
    };
    Ok(Value::tuple(parts.iter().map(|p| Value::from(*p)).collect()))
}

fn str_partition(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    partition_with(args, "partition", false)
}

fn str_rpartition(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    partition_with(args, "rpartition", true)
}

fn str_removeprefix(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [prefix] = args.bind("removeprefix", ["prefix"], 1)?;
    let prefix = str_arg(&required(prefix), "removeprefix")?;
    Ok(Value::from(s.strip_prefix(&*prefix).unwrap_or(&s)))
}

fn str_removesuffix(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (s, args) = str_receiver(args)?;
    let [suffix] = args.bind("removesuffix", ["suffix"], 1)?;
    let suffix = str_arg(&required(suffix), "removesuffix")?;
    Ok(Value::from(s.strip_suffix(&*suffix).unwrap_or(&s)))
}

/// `str.format`: replacement fields may traverse attributes and items of
/// their arguments, which is why guests never get to call it.
fn str_format(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (template, args) = str_receiver(args)?;
    let keywords: Dict = args
        .keywords
        .into_iter()
        .map(|(k, v)| (HashKey::from(k.as_str()), v))
        .collect();
    render_template(vm, &template, &args.positional, &Value::dict(keywords)).map(Value::from)
}

fn str_format_map(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (template, args) = str_receiver(args)?;
    let [mapping] = args.bind("format_map", ["mapping"], 1)?;
    render_template(vm, &template, &[], &required(mapping)).map(Value::from)
}

fn render_template(
    vm: &mut Vm,
    template: &str,
    positional: &[Value],
    mapping: &Value,
) -> VmResult<String> {
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return raise(
                    &exceptions::VALUE_ERROR,
                    "Single '}' encountered in format string",
                )
            }
            '{' => {
                let mut field = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    field.push(c);
                }
                if depth != 0 {
                    return raise(
                        &exceptions::VALUE_ERROR,
                        "expected '}' before end of string",
                    );
                }
                let (field, spec) = match field.split_once(':') {
                    Some((f, s)) => (f.to_string(), s.to_string()),
                    None => (field, String::new()),
                };
                let (path, conversion) = match field.split_once('!') {
                    Some((p, c)) => (p.to_string(), c.chars().next()),
                    None => (field, None),
                };
                let spec = if spec.contains('{') {
                    render_template(vm, &spec, positional, mapping)?
                } else {
                    spec
                };
                let value = resolve_field(vm, &path, &mut auto_index, positional, mapping)?;
                let value = match conversion {
                    Some('r') => Value::from(format::repr(&value)),
                    Some('s') => Value::from(format::to_str(&value)),
                    Some('a') => Value::from(format::ascii(&value)),
                    None => value,
                    Some(other) => {
                        return raise(
                            &exceptions::VALUE_ERROR,
                            format!("Unknown conversion specifier {other}"),
                        )
                    }
                };
                out.push_str(&format::format_value(&value, &spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn resolve_field(
    vm: &mut Vm,
    path: &str,
    auto_index: &mut usize,
    positional: &[Value],
    mapping: &Value,
) -> VmResult<Value> {
    let head_end = path.find(['.', '[']).unwrap_or(path.len());
    let (head, mut rest) = path.split_at(head_end);
    let mut value = if head.is_empty() {
        let index = *auto_index;
        *auto_index += 1;
        positional.get(index).cloned().ok_or_else(|| {
            exceptions::fault(
                &exceptions::INDEX_ERROR,
                format!("Replacement index {index} out of range for positional args tuple"),
            )
        })?
    } else if let Ok(index) = head.parse::<usize>() {
        positional.get(index).cloned().ok_or_else(|| {
            exceptions::fault(
                &exceptions::INDEX_ERROR,
                format!("Replacement index {index} out of range for positional args tuple"),
            )
        })?
    } else {
        vm.get_item(mapping, &Value::from(head))?
    };
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            value = vm.get_attr(&value, &after[..end])?;
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let Some(end) = after.find(']') else {
                return raise(&exceptions::VALUE_ERROR, "Missing ']' in format string");
            };
            let key = &after[..end];
            let key = key
                .parse::<i64>()
                .map_or_else(|_| Value::from(key), Value::Int);
            value = vm.get_item(&value, &key)?;
            rest = &after[end + 1..];
        } else {
            return raise(
                &exceptions::VALUE_ERROR,
                "Only '.' or '[' may follow ']' in format field specifier",
            );
        }
    }
    Ok(value)
}

// -- list, tuple, range --------------------------------------------------

fn list_append(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    let [item] = args.bind("append", ["object"], 1)?;
    items.borrow_mut().push(required(item));
    Ok(Value::None)
}

fn list_extend(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    let [iterable] = args.bind("extend", ["iterable"], 1)?;
    let extra = ops::iterate(vm, &required(iterable))?;
    items.borrow_mut().extend(extra);
    Ok(Value::None)
}

fn list_insert(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    let [index, item] = args.bind("insert", ["index", "object"], 2)?;
    let index = int_arg(&required(index), "insert")?;
    let mut items = items.borrow_mut();
    let len = items.len() as i64;
    let position = if index < 0 {
        (index + len).max(0)
    } else {
        index.min(len)
    };
    items.insert(position as usize, required(item));
    Ok(Value::None)
}

fn list_pop(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    let [index] = args.bind("pop", ["index"], 0)?;
    let index = optional_int(index, "pop")?.unwrap_or(-1);
    let mut items = items.borrow_mut();
    if items.is_empty() {
        return raise(&exceptions::INDEX_ERROR, "pop from empty list");
    }
    let len = items.len() as i64;
    let position = if index < 0 { index + len } else { index };
    if position < 0 || position >= len {
        return raise(&exceptions::INDEX_ERROR, "pop index out of range");
    }
    Ok(items.remove(position as usize))
}

fn list_remove(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    let [item] = args.bind("remove", ["value"], 1)?;
    let item = required(item);
    let mut items = items.borrow_mut();
    match items.iter().position(|v| ops::equals(v, &item)) {
        Some(position) => {
            items.remove(position);
            Ok(Value::None)
        }
        None => raise(&exceptions::VALUE_ERROR, "list.remove(x): x not in list"),
    }
}

fn sequence_items(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        Value::Range(r) => r.iter().map(Value::Int).collect(),
        _ => Vec::new(),
    }
}

fn seq_index(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (receiver, args) = split_receiver(args);
    let [item, start, end] = args.bind("index", ["value", "start", "stop"], 1)?;
    let item = required(item);
    let items = sequence_items(&receiver);
    let (start, end) = char_bounds(
        items.len(),
        optional_int(start, "index")?,
        optional_int(end, "index")?,
    );
    match items[start..end].iter().position(|v| ops::equals(v, &item)) {
        Some(position) => Ok(Value::Int((start + position) as i64)),
        None => raise(
            &exceptions::VALUE_ERROR,
            format!(
                "{} is not in {}",
                format::repr(&item),
                receiver.type_name()
            ),
        ),
    }
}

fn seq_count(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (receiver, args) = split_receiver(args);
    let [item] = args.bind("count", ["value"], 1)?;
    let item = required(item);
    let count = sequence_items(&receiver)
        .iter()
        .filter(|v| ops::equals(v, &item))
        .count();
    Ok(Value::Int(count as i64))
}

/// Sort `items`, computing keys with `key` when given.
pub fn sort_items(
    vm: &mut Vm,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: Option<Value>,
) -> VmResult<Vec<Value>> {
    let keys = match key {
        Some(key) if !key.is_none() => {
            let mut keys = Vec::with_capacity(items.len());
            for item in &items {
                keys.push(vm.call(&key, CallArgs::new(vec![item.clone()]))?);
            }
            Some(keys)
        }
        _ => None,
    };
    let reverse = reverse.is_some_and(|r| ops::truthy(&r));
    ops::sort_values(vm, items, keys, reverse)
}

fn list_sort(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    if !args.positional.is_empty() {
        return raise(
            &exceptions::TYPE_ERROR,
            "sort() takes no positional arguments",
        );
    }
    let [key, reverse] = args.bind("sort", ["key", "reverse"], 0)?;
    let current = items.borrow().clone();
    let sorted = sort_items(vm, current, key, reverse)?;
    *items.borrow_mut() = sorted;
    Ok(Value::None)
}

fn list_reverse(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    no_args("reverse", &args)?;
    items.borrow_mut().reverse();
    Ok(Value::None)
}

fn list_copy(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    no_args("copy", &args)?;
    let copy = items.borrow().clone();
    Ok(Value::list(copy))
}

fn list_clear(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (items, args) = list_receiver(args)?;
    no_args("clear", &args)?;
    items.borrow_mut().clear();
    Ok(Value::None)
}

// -- dict ----------------------------------------------------------------

fn dict_get(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    let [key, default] = args.bind("get", ["key", "default"], 1)?;
    let key = HashKey::new(required(key))?;
    let found = dict.borrow().get(&key).cloned();
    Ok(found.or(default).unwrap_or(Value::None))
}

fn dict_keys(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("keys", &args)?;
    let keys = dict.borrow().keys().map(|k| k.value().clone()).collect();
    Ok(Value::list(keys))
}

fn dict_values(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("values", &args)?;
    let values = dict.borrow().values().cloned().collect();
    Ok(Value::list(values))
}

fn dict_items(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("items", &args)?;
    let items = dict
        .borrow()
        .iter()
        .map(|(k, v)| Value::tuple(vec![k.value().clone(), v.clone()]))
        .collect();
    Ok(Value::list(items))
}

fn dict_pop(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    let [key, default] = args.bind("pop", ["key", "default"], 1)?;
    let key = required(key);
    let removed = dict.borrow_mut().shift_remove(&HashKey::new(key.clone())?);
    match (removed, default) {
        (Some(value), _) | (None, Some(value)) => Ok(value),
        (None, None) => Err(Exception::with_args(&exceptions::KEY_ERROR, vec![key]).into()),
    }
}

fn dict_popitem(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("popitem", &args)?;
    let popped = dict.borrow_mut().pop();
    match popped {
        Some((key, value)) => Ok(Value::tuple(vec![key.into_value(), value])),
        None => raise(&exceptions::KEY_ERROR, "popitem(): dictionary is empty"),
    }
}

fn dict_setdefault(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    let [key, default] = args.bind("setdefault", ["key", "default"], 1)?;
    let key = HashKey::new(required(key))?;
    let mut dict = dict.borrow_mut();
    Ok(dict
        .entry(key)
        .or_insert_with(|| default.unwrap_or(Value::None))
        .clone())
}

/// Key/value pairs from a mapping or an iterable of pairs.
pub fn pairs_of(vm: &mut Vm, source: &Value) -> VmResult<Vec<(HashKey, Value)>> {
    match source {
        Value::Dict(dict) => Ok(dict
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Value::Wrapper(wrapper) => pairs_of(vm, wrapper.inner()),
        other => {
            let mut pairs = Vec::new();
            for (i, item) in ops::iterate(vm, other)?.into_iter().enumerate() {
                let pair = ops::iterate(vm, &item)?;
                let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
                    exceptions::fault(
                        &exceptions::VALUE_ERROR,
                        format!(
                            "dictionary update sequence element #{i} has length {}; 2 is required",
                            pair.len()
                        ),
                    )
                })?;
                pairs.push((HashKey::new(key)?, value));
            }
            Ok(pairs)
        }
    }
}

fn dict_update(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, mut args) = dict_receiver(args)?;
    if args.positional.len() > 1 {
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "update expected at most 1 argument, got {}",
                args.positional.len()
            ),
        );
    }
    let mut pairs = match args.positional.pop() {
        Some(source) => pairs_of(vm, &source)?,
        None => Vec::new(),
    };
    for (key, value) in args.keywords {
        pairs.push((HashKey::from(key.as_str()), value));
    }
    dict.borrow_mut().extend(pairs);
    Ok(Value::None)
}

fn dict_copy(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("copy", &args)?;
    let copy = dict.borrow().clone();
    Ok(Value::dict(copy))
}

fn dict_clear(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (dict, args) = dict_receiver(args)?;
    no_args("clear", &args)?;
    dict.borrow_mut().clear();
    Ok(Value::None)
}

// -- set -----------------------------------------------------------------

fn hash_all(vm: &mut Vm, value: &Value) -> VmResult<IndexSet<HashKey>> {
    ops::iterate(vm, value)?
        .into_iter()
        .map(HashKey::new)
        .collect()
}

fn set_add(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    let [item] = args.bind("add", ["object"], 1)?;
    set.borrow_mut().insert(HashKey::new(required(item))?);
    Ok(Value::None)
}

fn set_discard(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    let [item] = args.bind("discard", ["object"], 1)?;
    set.borrow_mut().shift_remove(&HashKey::new(required(item))?);
    Ok(Value::None)
}

fn set_remove(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    let [item] = args.bind("remove", ["object"], 1)?;
    let item = required(item);
    if set.borrow_mut().shift_remove(&HashKey::new(item.clone())?) {
        Ok(Value::None)
    } else {
        Err(Exception::with_args(&exceptions::KEY_ERROR, vec![item]).into())
    }
}

fn set_pop(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    no_args("pop", &args)?;
    let popped = set.borrow_mut().shift_remove_index(0);
    match popped {
        Some(key) => Ok(key.into_value()),
        None => raise(&exceptions::KEY_ERROR, "pop from an empty set"),
    }
}

fn set_clear(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    no_args("clear", &args)?;
    set.borrow_mut().clear();
    Ok(Value::None)
}

fn set_copy(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, args) = set_receiver(args)?;
    no_args("copy", &args)?;
    let copy = set.borrow().clone();
    Ok(Value::set(copy))
}

/// Fold every positional argument into the receiver's items with `combine`.
fn set_fold(
    vm: &mut Vm,
    args: CallArgs,
    combine: fn(&mut IndexSet<HashKey>, IndexSet<HashKey>),
) -> VmResult<(SetRef, IndexSet<HashKey>)> {
    let (set, args) = set_receiver(args)?;
    let mut out = set.borrow().clone();
    for other in &args.positional {
        let other = hash_all(vm, other)?;
        combine(&mut out, other);
    }
    Ok((set, out))
}

fn union(out: &mut IndexSet<HashKey>, other: IndexSet<HashKey>) {
    out.extend(other);
}

fn intersection(out: &mut IndexSet<HashKey>, other: IndexSet<HashKey>) {
    out.retain(|k| other.contains(k));
}

fn difference(out: &mut IndexSet<HashKey>, other: IndexSet<HashKey>) {
    out.retain(|k| !other.contains(k));
}

fn set_union(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    set_fold(vm, args, union).map(|(_, out)| Value::set(out))
}

fn set_intersection(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    set_fold(vm, args, intersection).map(|(_, out)| Value::set(out))
}

fn set_difference(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    set_fold(vm, args, difference).map(|(_, out)| Value::set(out))
}

fn set_update(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, out) = set_fold(vm, args, union)?;
    *set.borrow_mut() = out;
    Ok(Value::None)
}

fn set_intersection_update(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, out) = set_fold(vm, args, intersection)?;
    *set.borrow_mut() = out;
    Ok(Value::None)
}

fn set_difference_update(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, out) = set_fold(vm, args, difference)?;
    *set.borrow_mut() = out;
    Ok(Value::None)
}

fn set_other(vm: &mut Vm, args: CallArgs, name: &str) -> VmResult<(SetRef, IndexSet<HashKey>)> {
    let (set, args) = set_receiver(args)?;
    let [other] = args.bind(name, ["other"], 1)?;
    let other = hash_all(vm, &required(other))?;
    Ok((set, other))
}

fn set_symmetric_difference(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, other) = set_other(vm, args, "symmetric_difference")?;
    let set = set.borrow();
    let out: IndexSet<HashKey> = set
        .iter()
        .filter(|k| !other.contains(*k))
        .chain(other.iter().filter(|k| !set.contains(*k)))
        .cloned()
        .collect();
    Ok(Value::set(out))
}

fn set_issubset(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, other) = set_other(vm, args, "issubset")?;
    let result = set.borrow().iter().all(|k| other.contains(k));
    Ok(Value::Bool(result))
}

fn set_issuperset(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, other) = set_other(vm, args, "issuperset")?;
    let set = set.borrow();
    Ok(Value::Bool(other.iter().all(|k| set.contains(k))))
}

fn set_isdisjoint(vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (set, other) = set_other(vm, args, "isdisjoint")?;
    let result = !set.borrow().iter().any(|k| other.contains(k));
    Ok(Value::Bool(result))
}

// -- numbers -------------------------------------------------------------

fn int_bit_length(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (receiver, args) = split_receiver(args);
    no_args("bit_length", &args)?;
    let value = receiver.as_int().unwrap_or(0);
    Ok(Value::Int(i64::from(64 - value.unsigned_abs().leading_zeros())))
}

fn float_is_integer(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let (receiver, args) = split_receiver(args);
    no_args("is_integer", &args)?;
    let value = receiver.as_float().unwrap_or(f64::NAN);
    Ok(Value::Bool(value.is_finite() && value.fract() == 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Value, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let mut vm = Vm::default();
        let method = lookup(&receiver, name).expect("method exists");
        vm.call(&method, CallArgs::new(args))
    }

    #[test]
    fn test_padding_width_is_bounded() {
        for method in ["center", "ljust", "rjust", "zfill"] {
            let fault = call(Value::from("a"), method, vec![Value::Int(1 << 40)]).unwrap_err();
            assert!(
                fault
                    .as_exception()
                    .is_some_and(|e| e.is_instance(&exceptions::OVERFLOW_ERROR)),
                "{method}"
            );
        }
    }

    #[test]
    fn test_string_methods() {
        let s = Value::from("  Hello World  ");
        assert_eq!(call(s.clone(), "strip", vec![]).unwrap(), Value::from("Hello World"));
        assert_eq!(
            call(Value::from("a,b,,c"), "split", vec![Value::from(",")]).unwrap(),
            Value::list(vec!["a".into(), "b".into(), "".into(), "c".into()])
        );
        assert_eq!(
            call(Value::from(" a  b c "), "split", vec![Value::None, Value::Int(1)]).unwrap(),
            Value::list(vec!["a".into(), "b c ".into()])
        );
        assert_eq!(
            call(Value::from("a b c"), "rsplit", vec![Value::None, Value::Int(1)]).unwrap(),
            Value::list(vec!["a b".into(), "c".into()])
        );
        assert_eq!(
            call(Value::from("-"), "join", vec![Value::list(vec!["x".into(), "y".into()])]).unwrap(),
            Value::from("x-y")
        );
        assert_eq!(call(Value::from("héllo"), "find", vec!["l".into()]).unwrap(), Value::Int(2));
        assert_eq!(call(Value::from("ab"), "center", vec![Value::Int(5), "*".into()]).unwrap(), Value::from("**ab*"));
        assert_eq!(call(Value::from("-42"), "zfill", vec![Value::Int(5)]).unwrap(), Value::from("-0042"));
        assert_eq!(call(Value::from("hello world"), "title", vec![]).unwrap(), Value::from("Hello World"));
    }

    #[test]
    fn test_format_is_unsafe() {
        let method = lookup(&Value::from("{}"), "format").unwrap();
        match method {
            Value::Builtin(b) => assert_eq!(b.kind, BuiltinKind::Unsafe),
            _ => panic!("expected builtin"),
        }
    }

    #[test]
    fn test_host_side_format_traverses_fields() {
        let out = call(
            Value::from("{0[name]!r:>7}|{1:.1f}"),
            "format",
            vec![Value::dict_from([("name", Value::from("ada"))]), Value::Float(2.5)],
        )
        .unwrap();
        assert_eq!(out, Value::from("  'ada'|2.5"));
        assert!(call(Value::from("{5}"), "format", vec![]).is_err());
    }

    #[test]
    fn test_list_methods() {
        let list = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        call(list.clone(), "sort", vec![]).unwrap();
        assert_eq!(list, Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
        assert_eq!(call(list.clone(), "pop", vec![]).unwrap(), Value::Int(3));
        assert_eq!(call(list.clone(), "index", vec![Value::Int(2)]).unwrap(), Value::Int(1));
        assert!(call(list.clone(), "remove", vec![Value::Int(9)]).is_err());
        assert!(call(Value::list(vec![]), "pop", vec![]).is_err());
    }

    #[test]
    fn test_dict_methods() {
        let dict = Value::dict_from([("a", Value::Int(1))]);
        assert_eq!(call(dict.clone(), "get", vec!["b".into(), Value::Int(0)]).unwrap(), Value::Int(0));
        assert_eq!(call(dict.clone(), "setdefault", vec!["b".into(), Value::Int(2)]).unwrap(), Value::Int(2));
        assert_eq!(call(dict.clone(), "keys", vec![]).unwrap(), Value::list(vec!["a".into(), "b".into()]));
        assert!(call(dict.clone(), "pop", vec!["zz".into()]).is_err());
        call(dict.clone(), "update", vec![Value::list(vec![Value::tuple(vec!["c".into(), Value::Int(3)])])]).unwrap();
        assert_eq!(call(dict, "pop", vec!["c".into()]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_set_methods() {
        let set = Value::set(IndexSet::new());
        call(set.clone(), "add", vec![Value::Int(1)]).unwrap();
        call(set.clone(), "update", vec![Value::list(vec![Value::Int(2), Value::Int(3)])]).unwrap();
        let inter = call(set.clone(), "intersection", vec![Value::list(vec![Value::Int(2), Value::Int(9)])]).unwrap();
        assert_eq!(crate::runtime::ops::len(&inter).unwrap(), 1);
        assert!(call(set.clone(), "remove", vec![Value::Int(42)]).is_err());
        assert_eq!(call(set, "issubset", vec![Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)])]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_attributes() {
        let range = Value::Range(crate::runtime::value::Range { start: 1, stop: 9, step: 2 });
        assert_eq!(lookup(&range, "step"), Some(Value::Int(2)));
        assert!(lookup(&Value::Int(1), "upper").is_none());
    }
}
