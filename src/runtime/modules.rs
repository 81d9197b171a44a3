//! Host modules guest code may import: `math`, `time`, `json`, `datetime`.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::LazyLock;

use anyhow::bail;
use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::runtime::class::Class;
use crate::runtime::exceptions::{self, raise};
use crate::runtime::interp::Vm;
use crate::runtime::ops;
use crate::runtime::value::{
    host_fn, Builtin, BuiltinKind, CallArgs, HostError, HostObject, Module, Value,
};
use crate::runtime::VmResult;
use crate::syntax::BinOperator;

/// Modules importable by default.
pub const STANDARD_MODULES: [&str; 4] = ["math", "time", "json", "datetime"];

/// Build a fresh module object for `name`.
pub fn load(name: &str) -> Option<Value> {
    let attrs = match name {
        "math" => math_module(),
        "time" => time_module(),
        "json" => json_module(),
        "datetime" => datetime_module(),
        _ => return None,
    };
    Some(Value::Module(Rc::new(Module::new(name, attrs))))
}

/// Classes exported by `datetime`, which guests may name and construct.
pub fn datetime_classes() -> [Class; 3] {
    [DATE.clone(), DATETIME.clone(), TIMEDELTA.clone()]
}

fn native(name: &'static str, func: fn(&mut Vm, CallArgs) -> VmResult<Value>) -> (String, Value) {
    (name.to_string(), Builtin::function(name, func))
}

// -- math ----------------------------------------------------------------

fn host(
    name: &'static str,
    f: impl Fn(CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
) -> (String, Value) {
    let builtin = Builtin::new(name, host_fn(f), BuiltinKind::Function);
    (name.to_string(), Value::Builtin(Rc::new(builtin)))
}

fn type_error(message: String) -> anyhow::Error {
    HostError::new(&exceptions::TYPE_ERROR, message).into()
}

fn domain_error() -> anyhow::Error {
    HostError::new(&exceptions::VALUE_ERROR, "math domain error").into()
}

fn real(value: &Value) -> anyhow::Result<f64> {
    value
        .as_float()
        .ok_or_else(|| type_error(format!("must be real number, not {}", value.type_name())))
}

fn reals<const N: usize>(args: &CallArgs, func: &str) -> anyhow::Result<[f64; N]> {
    if !args.keywords.is_empty() {
        return Err(type_error(format!("{func}() takes no keyword arguments")));
    }
    if args.positional.len() != N {
        return Err(type_error(format!(
            "{func}() takes exactly {N} argument{} ({} given)",
            if N == 1 { "" } else { "s" },
            args.positional.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(&args.positional) {
        *slot = real(value)?;
    }
    Ok(out)
}

/// A one-argument float function that fails outside `domain`.
fn unary_math(
    name: &'static str,
    domain: fn(f64) -> bool,
    f: fn(f64) -> f64,
) -> (String, Value) {
    host(name, move |args| {
        let [x] = reals::<1>(&args, name)?;
        if !domain(x) {
            return Err(domain_error());
        }
        Ok(Value::Float(f(x)))
    })
}

fn to_int(f: f64) -> anyhow::Result<Value> {
    if f.is_nan() {
        return Err(HostError::new(&exceptions::VALUE_ERROR, "cannot convert float NaN to integer").into());
    }
    if f.is_infinite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(HostError::new(
            &exceptions::OVERFLOW_ERROR,
            "cannot convert float infinity to integer",
        )
        .into());
    }
    Ok(Value::Int(f as i64))
}

/// `floor`/`ceil`/`trunc`: integers pass through, floats become ints.
fn rounding(name: &'static str, f: fn(f64) -> f64) -> (String, Value) {
    host(name, move |args| {
        let [x] = reals::<1>(&args, name)?;
        match args.positional[0].as_int() {
            Some(i) => Ok(Value::Int(i)),
            None => to_int(f(x)),
        }
    })
}

fn ints(args: &CallArgs) -> anyhow::Result<Vec<i64>> {
    args.positional
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect()
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

fn math_module() -> IndexMap<String, Value> {
    let always = |_: f64| true;
    let positive = |x: f64| x > 0.0;
    let mut attrs: IndexMap<String, Value> = IndexMap::from([
        ("pi".to_string(), Value::Float(std::f64::consts::PI)),
        ("e".to_string(), Value::Float(std::f64::consts::E)),
        ("tau".to_string(), Value::Float(std::f64::consts::TAU)),
        ("inf".to_string(), Value::Float(f64::INFINITY)),
        ("nan".to_string(), Value::Float(f64::NAN)),
    ]);
    attrs.extend([
        unary_math("sqrt", |x| x >= 0.0, f64::sqrt),
        unary_math("exp", always, f64::exp),
        unary_math("log10", positive, f64::log10),
        unary_math("log2", positive, f64::log2),
        unary_math("sin", f64::is_finite, f64::sin),
        unary_math("cos", f64::is_finite, f64::cos),
        unary_math("tan", f64::is_finite, f64::tan),
        unary_math("asin", |x| (-1.0..=1.0).contains(&x), f64::asin),
        unary_math("acos", |x| (-1.0..=1.0).contains(&x), f64::acos),
        unary_math("atan", always, f64::atan),
        unary_math("fabs", always, f64::abs),
        unary_math("degrees", always, f64::to_degrees),
        unary_math("radians", always, f64::to_radians),
        rounding("floor", f64::floor),
        rounding("ceil", f64::ceil),
        rounding("trunc", f64::trunc),
        host("log", |args| {
            let (x, base) = match args.positional.as_slice() {
                [x] => (real(x)?, None),
                [x, base] => (real(x)?, Some(real(base)?)),
                _ => bail!(type_error("log expected 1 or 2 arguments".to_string())),
            };
            if x <= 0.0 || base.is_some_and(|b| b <= 0.0 || b == 1.0) {
                return Err(domain_error());
            }
            Ok(Value::Float(match base {
                Some(b) => x.ln() / b.ln(),
                None => x.ln(),
            }))
        }),
        host("pow", |args| {
            let [x, y] = reals::<2>(&args, "pow")?;
            let result = x.powf(y);
            if result.is_nan() && !x.is_nan() && !y.is_nan() {
                return Err(domain_error());
            }
            Ok(Value::Float(result))
        }),
        host("atan2", |args| {
            let [y, x] = reals::<2>(&args, "atan2")?;
            Ok(Value::Float(y.atan2(x)))
        }),
        host("hypot", |args| {
            let values = args
                .positional
                .iter()
                .map(real)
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(Value::Float(values.iter().map(|v| v * v).sum::<f64>().sqrt()))
        }),
        host("copysign", |args| {
            let [x, y] = reals::<2>(&args, "copysign")?;
            Ok(Value::Float(x.copysign(y)))
        }),
        host("fmod", |args| {
            let [x, y] = reals::<2>(&args, "fmod")?;
            if y == 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x % y))
        }),
        host("isfinite", |args| {
            let [x] = reals::<1>(&args, "isfinite")?;
            Ok(Value::Bool(x.is_finite()))
        }),
        host("isinf", |args| {
            let [x] = reals::<1>(&args, "isinf")?;
            Ok(Value::Bool(x.is_infinite()))
        }),
        host("isnan", |args| {
            let [x] = reals::<1>(&args, "isnan")?;
            Ok(Value::Bool(x.is_nan()))
        }),
        host("isclose", |mut args| {
            let rel_tol = args.take_keyword("rel_tol").map_or(Ok(1e-9), |v| real(&v))?;
            let abs_tol = args.take_keyword("abs_tol").map_or(Ok(0.0), |v| real(&v))?;
            let [a, b] = reals::<2>(&args, "isclose")?;
            if a == b {
                return Ok(Value::Bool(true));
            }
            let diff = (a - b).abs();
            let close = diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()) || diff <= abs_tol;
            Ok(Value::Bool(close && a.is_finite() && b.is_finite()))
        }),
        host("fsum", |args| {
            let [iterable] = args.positional.as_slice() else {
                bail!(type_error("fsum() takes exactly one argument".to_string()));
            };
            let items = match iterable {
                Value::List(items) => items.borrow().clone(),
                Value::Tuple(items) => items.to_vec(),
                other => bail!(type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                ))),
            };
            // Kahan summation keeps the rounding error of long sums small.
            let (mut sum, mut carry) = (0.0f64, 0.0f64);
            for item in &items {
                let y = real(item)? - carry;
                let t = sum + y;
                carry = (t - sum) - y;
                sum = t;
            }
            Ok(Value::Float(sum))
        }),
        host("gcd", |args| {
            let values = ints(&args)?;
            Ok(Value::Int(values.into_iter().fold(0, gcd)))
        }),
        host("factorial", |args| {
            let values = ints(&args)?;
            let [n] = values.as_slice() else {
                bail!(type_error("factorial() takes exactly one argument".to_string()));
            };
            if *n < 0 {
                bail!(HostError::new(
                    &exceptions::VALUE_ERROR,
                    "factorial() not defined for negative values"
                ));
            }
            let mut result: i64 = 1;
            for k in 2..=*n {
                result = result.checked_mul(k).ok_or_else(|| {
                    HostError::new(&exceptions::OVERFLOW_ERROR, "integer overflow")
                })?;
            }
            Ok(Value::Int(result))
        }),
    ]);
    attrs
}

// -- time ----------------------------------------------------------------

fn time_module() -> IndexMap<String, Value> {
    IndexMap::from([native("time", time_time), native("strftime", time_strftime)])
}

fn time_time(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    args.bind::<0>("time", [], 0)?;
    Ok(Value::Float(Utc::now().timestamp_micros() as f64 / 1e6))
}

fn time_strftime(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [format] = args.bind("strftime", ["format"], 1)?;
    let format = str_arg(format, "strftime")?;
    strftime(&Local::now().naive_local(), &format).map(Value::from)
}

fn str_arg(value: Option<Value>, func: &str) -> VmResult<Rc<str>> {
    match value {
        Some(Value::Str(s)) => Ok(s),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "{func}() argument must be str, not {}",
                other.unwrap_or(Value::None).type_name()
            ),
        ),
    }
}

/// Python `strftime` over a naive timestamp; `%f` means microseconds.
fn strftime(moment: &NaiveDateTime, format: &str) -> VmResult<String> {
    let mut translated = String::with_capacity(format.len());
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        translated.push(c);
        if c == '%' {
            match chars.next() {
                Some('f') => translated.push_str("6f"),
                Some(next) => translated.push(next),
                None => {}
            }
        }
    }
    let items: Vec<Item<'_>> = StrftimeItems::new(&translated).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return raise(&exceptions::VALUE_ERROR, "Invalid format string");
    }
    let mut out = String::new();
    if write!(out, "{}", moment.format_with_items(items.iter())).is_err() {
        return raise(
            &exceptions::VALUE_ERROR,
            format!("format {format:?} is not supported for naive values"),
        );
    }
    Ok(out)
}

// -- json ----------------------------------------------------------------

static JSON_DECODE_ERROR: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("json.JSONDecodeError")
        .base(&exceptions::VALUE_ERROR)
        .build()
});

fn json_module() -> IndexMap<String, Value> {
    IndexMap::from([
        native("dumps", json_dumps),
        native("loads", json_loads),
        (
            "JSONDecodeError".to_string(),
            Value::Class(JSON_DECODE_ERROR.clone()),
        ),
    ])
}

/// Compact output with Python's `", "` and `": "` separators.
struct PythonFormatter;

impl serde_json::ser::Formatter for PythonFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: ?Sized + std::io::Write,
    {
        writer.write_all(b": ")
    }
}

fn sort_keys(json: serde_json::Value) -> serde_json::Value {
    match json {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

/// Escape non-ASCII characters the way `ensure_ascii=True` does.
fn escape_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

fn json_dumps(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [obj, indent, sort, ensure_ascii] =
        args.bind("dumps", ["obj", "indent", "sort_keys", "ensure_ascii"], 1)?;
    let mut json = serde_json::Value::try_from(&obj.unwrap_or(Value::None))?;
    if sort.is_some_and(|s| ops::truthy(&s)) {
        json = sort_keys(json);
    }
    let indent = match indent {
        None | Some(Value::None) => None,
        Some(Value::Int(n)) => Some(" ".repeat(n.max(0) as usize)),
        Some(Value::Str(s)) => Some(s.to_string()),
        Some(other) => {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("indent must be int or str, not {}", other.type_name()),
            )
        }
    };
    let mut out = Vec::new();
    let written = match &indent {
        Some(indent) => {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            json.serialize(&mut serde_json::Serializer::with_formatter(&mut out, formatter))
        }
        None => json.serialize(&mut serde_json::Serializer::with_formatter(
            &mut out,
            PythonFormatter,
        )),
    };
    if let Err(err) = written {
        return raise(&exceptions::VALUE_ERROR, err.to_string());
    }
    let text = String::from_utf8_lossy(&out);
    if ensure_ascii.map_or(true, |e| ops::truthy(&e)) {
        Ok(Value::from(escape_non_ascii(&text)))
    } else {
        Ok(Value::from(text.into_owned()))
    }
}

fn json_loads(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [text] = args.bind("loads", ["s"], 1)?;
    let text = str_arg(text, "loads")?;
    serde_json::from_str::<serde_json::Value>(&text)
        .map(Value::from)
        .or_else(|err| raise(&JSON_DECODE_ERROR, err.to_string()))
}

// -- datetime ------------------------------------------------------------

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

static DATE: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("datetime.date")
        .constructor(date_new)
        .static_method("today", date_today)
        .static_method("fromisoformat", date_fromisoformat)
        .build()
});

static DATETIME: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("datetime.datetime")
        .base(&DATE)
        .constructor(datetime_new)
        .static_method("now", datetime_now)
        .static_method("today", datetime_now)
        .static_method("fromisoformat", datetime_fromisoformat)
        .static_method("strptime", datetime_strptime)
        .build()
});

static TIMEDELTA: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("datetime.timedelta")
        .constructor(timedelta_new)
        .build()
});

fn datetime_module() -> IndexMap<String, Value> {
    IndexMap::from([
        ("date".to_string(), Value::Class(DATE.clone())),
        ("datetime".to_string(), Value::Class(DATETIME.clone())),
        ("timedelta".to_string(), Value::Class(TIMEDELTA.clone())),
        ("MINYEAR".to_string(), Value::Int(1)),
        ("MAXYEAR".to_string(), Value::Int(9999)),
    ])
}

/// `datetime.date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateValue(pub NaiveDate);

/// `datetime.datetime` (naive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTimeValue(pub NaiveDateTime);

/// `datetime.timedelta`, stored as a microsecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeltaValue(pub i64);

fn downcast<T: Copy + 'static>(value: &Value) -> Option<T> {
    match value {
        Value::Object(obj) => obj.as_any().downcast_ref::<T>().copied(),
        Value::Wrapper(w) => downcast(w.inner()),
        _ => None,
    }
}

fn receiver<T: Copy + 'static>(args: &mut CallArgs, class: &Class) -> VmResult<T> {
    let value = if args.positional.is_empty() {
        Value::None
    } else {
        args.positional.remove(0)
    };
    downcast(&value).map_or_else(
        || {
            raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "descriptor requires a '{}' object but received a '{}'",
                    class.name(),
                    value.type_name()
                ),
            )
        },
        Ok,
    )
}

fn hash_of(value: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

fn out_of_range<T>() -> VmResult<T> {
    raise(&exceptions::OVERFLOW_ERROR, "date value out of range")
}

fn int_field(value: Option<Value>, name: &str, default: i64) -> VmResult<i64> {
    match value {
        None => Ok(default),
        Some(v) => v.as_int().map_or_else(
            || {
                raise(
                    &exceptions::TYPE_ERROR,
                    format!(
                        "'{}' object cannot be interpreted as an integer ({name})",
                        v.type_name()
                    ),
                )
            },
            Ok,
        ),
    }
}

fn make_date(year: i64, month: i64, day: i64) -> VmResult<NaiveDate> {
    if !(1..=9999).contains(&year) {
        return raise(&exceptions::VALUE_ERROR, format!("year {year} is out of range"));
    }
    if !(1..=12).contains(&month) {
        return raise(&exceptions::VALUE_ERROR, "month must be in 1..12");
    }
    u32::try_from(day)
        .ok()
        .and_then(|d| NaiveDate::from_ymd_opt(year as i32, month as u32, d))
        .map_or_else(
            || raise(&exceptions::VALUE_ERROR, "day is out of range for month"),
            Ok,
        )
}

fn date_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [year, month, day] = args.bind("date", ["year", "month", "day"], 3)?;
    let date = make_date(
        int_field(year, "year", 1)?,
        int_field(month, "month", 1)?,
        int_field(day, "day", 1)?,
    )?;
    Ok(Value::object(DateValue(date)))
}

fn date_today(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    args.bind::<0>("today", [], 0)?;
    Ok(Value::object(DateValue(Local::now().date_naive())))
}

fn date_fromisoformat(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [text] = args.bind("fromisoformat", ["date_string"], 1)?;
    let text = str_arg(text, "fromisoformat")?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map(|d| Value::object(DateValue(d)))
        .or_else(|_| {
            raise(
                &exceptions::VALUE_ERROR,
                format!("Invalid isoformat string: {text:?}"),
            )
        })
}

fn datetime_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [year, month, day, hour, minute, second, micro] = args.bind(
        "datetime",
        ["year", "month", "day", "hour", "minute", "second", "microsecond"],
        3,
    )?;
    let date = make_date(
        int_field(year, "year", 1)?,
        int_field(month, "month", 1)?,
        int_field(day, "day", 1)?,
    )?;
    let hour = int_field(hour, "hour", 0)?;
    let minute = int_field(minute, "minute", 0)?;
    let second = int_field(second, "second", 0)?;
    let micro = int_field(micro, "microsecond", 0)?;
    if !(0..24).contains(&hour) {
        return raise(&exceptions::VALUE_ERROR, "hour must be in 0..23");
    }
    if !(0..60).contains(&minute) {
        return raise(&exceptions::VALUE_ERROR, "minute must be in 0..59");
    }
    if !(0..60).contains(&second) {
        return raise(&exceptions::VALUE_ERROR, "second must be in 0..59");
    }
    if !(0..MICROS_PER_SECOND).contains(&micro) {
        return raise(&exceptions::VALUE_ERROR, "microsecond must be in 0..999999");
    }
    let time = NaiveTime::from_hms_micro_opt(hour as u32, minute as u32, second as u32, micro as u32);
    match time {
        Some(time) => Ok(Value::object(DateTimeValue(date.and_time(time)))),
        None => raise(&exceptions::VALUE_ERROR, "invalid time"),
    }
}

fn datetime_now(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    args.bind::<0>("now", [], 0)?;
    Ok(Value::object(DateTimeValue(Local::now().naive_local())))
}

fn datetime_fromisoformat(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [text] = args.bind("fromisoformat", ["date_string"], 1)?;
    let text = str_arg(text, "fromisoformat")?;
    let formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let parsed = formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(&text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::default()))
        });
    match parsed {
        Some(moment) => Ok(Value::object(DateTimeValue(moment))),
        None => raise(
            &exceptions::VALUE_ERROR,
            format!("Invalid isoformat string: {text:?}"),
        ),
    }
}

fn datetime_strptime(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let [text, format] = args.bind("strptime", ["date_string", "format"], 2)?;
    let text = str_arg(text, "strptime")?;
    let format = str_arg(format, "strptime")?;
    let parsed = NaiveDateTime::parse_from_str(&text, &format).ok().or_else(|| {
        NaiveDate::parse_from_str(&text, &format)
            .ok()
            .map(|d| d.and_time(NaiveTime::default()))
    });
    match parsed {
        Some(moment) => Ok(Value::object(DateTimeValue(moment))),
        None => raise(
            &exceptions::VALUE_ERROR,
            format!("time data {text:?} does not match format {format:?}"),
        ),
    }
}

fn timedelta_new(_: &mut Vm, args: CallArgs) -> VmResult<Value> {
    let fields = args.bind(
        "timedelta",
        [
            "days",
            "seconds",
            "microseconds",
            "milliseconds",
            "minutes",
            "hours",
            "weeks",
        ],
        0,
    )?;
    let units = [
        MICROS_PER_DAY as f64,
        MICROS_PER_SECOND as f64,
        1.0,
        1_000.0,
        60.0 * MICROS_PER_SECOND as f64,
        3_600.0 * MICROS_PER_SECOND as f64,
        7.0 * MICROS_PER_DAY as f64,
    ];
    let mut total = 0.0;
    for (field, unit) in fields.into_iter().zip(units) {
        if let Some(value) = field {
            let Some(amount) = value.as_float() else {
                return raise(
                    &exceptions::TYPE_ERROR,
                    format!(
                        "unsupported type for timedelta component: {}",
                        value.type_name()
                    ),
                );
            };
            total += amount * unit;
        }
    }
    delta_from_micros(total.round_ties_even())
}

fn delta_from_micros(micros: f64) -> VmResult<Value> {
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return raise(&exceptions::OVERFLOW_ERROR, "timedelta value out of range");
    }
    Ok(Value::object(DeltaValue(micros as i64)))
}

fn chrono_delta(micros: i64) -> chrono::TimeDelta {
    chrono::TimeDelta::microseconds(micros)
}

impl DateValue {
    fn shift(self, micros: i64) -> VmResult<Value> {
        let days = micros.div_euclid(MICROS_PER_DAY);
        match self.0.checked_add_signed(chrono::TimeDelta::days(days)) {
            Some(date) => Ok(Value::object(DateValue(date))),
            None => out_of_range(),
        }
    }

    fn isoformat(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

fn date_method(args: &mut CallArgs) -> VmResult<DateValue> {
    receiver(args, &DATE)
}

fn date_isoformat(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let date = date_method(&mut args)?;
    args.bind::<0>("isoformat", [], 0)?;
    Ok(Value::from(date.isoformat()))
}

fn date_strftime(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let date = date_method(&mut args)?;
    let [format] = args.bind("strftime", ["format"], 1)?;
    let format = str_arg(format, "strftime")?;
    strftime(&date.0.and_time(NaiveTime::default()), &format).map(Value::from)
}

fn date_weekday(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let date = date_method(&mut args)?;
    args.bind::<0>("weekday", [], 0)?;
    Ok(Value::Int(i64::from(date.0.weekday().num_days_from_monday())))
}

fn date_isoweekday(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let date = date_method(&mut args)?;
    args.bind::<0>("isoweekday", [], 0)?;
    Ok(Value::Int(i64::from(date.0.weekday().number_from_monday())))
}

fn date_replace(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let date = date_method(&mut args)?;
    let [year, month, day] = args.bind("replace", ["year", "month", "day"], 0)?;
    let replaced = make_date(
        int_field(year, "year", i64::from(date.0.year()))?,
        int_field(month, "month", i64::from(date.0.month()))?,
        int_field(day, "day", i64::from(date.0.day()))?,
    )?;
    Ok(Value::object(DateValue(replaced)))
}

impl HostObject for DateValue {
    fn class(&self) -> Class {
        DATE.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, _vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
        let receiver = Value::object(*self);
        Ok(Some(match name {
            "year" => Value::Int(i64::from(self.0.year())),
            "month" => Value::Int(i64::from(self.0.month())),
            "day" => Value::Int(i64::from(self.0.day())),
            "isoformat" => Builtin::method("isoformat", receiver, date_isoformat),
            "strftime" => Builtin::method("strftime", receiver, date_strftime),
            "weekday" => Builtin::method("weekday", receiver, date_weekday),
            "isoweekday" => Builtin::method("isoweekday", receiver, date_isoweekday),
            "replace" => Builtin::method("replace", receiver, date_replace),
            _ => return Ok(None),
        }))
    }

    fn binary_op(
        &self,
        _vm: &mut Vm,
        op: BinOperator,
        other: &Value,
        reflected: bool,
    ) -> VmResult<Option<Value>> {
        match (op, reflected) {
            (BinOperator::Add, _) => match downcast::<DeltaValue>(other) {
                Some(delta) => self.shift(delta.0).map(Some),
                None => Ok(None),
            },
            (BinOperator::Sub, false) => {
                if let Some(delta) = downcast::<DeltaValue>(other) {
                    return match delta.0.checked_neg() {
                        Some(negated) => self.shift(negated).map(Some),
                        None => out_of_range(),
                    };
                }
                match downcast::<DateValue>(other) {
                    Some(date) => {
                        let days = (self.0 - date.0).num_days();
                        Ok(Some(Value::object(DeltaValue(days * MICROS_PER_DAY))))
                    }
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        downcast::<DateValue>(other) == Some(*self)
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        downcast::<DateValue>(other).map(|d| self.cmp(&d))
    }

    fn hash_value(&self) -> Option<u64> {
        Some(hash_of(self))
    }

    fn repr(&self) -> String {
        format!(
            "datetime.date({}, {}, {})",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }

    fn to_str(&self) -> String {
        self.isoformat()
    }

    fn format(&self, spec: &str) -> VmResult<String> {
        if spec.is_empty() {
            return Ok(self.to_str());
        }
        strftime(&self.0.and_time(NaiveTime::default()), spec)
    }
}

impl DateTimeValue {
    fn shift(self, micros: i64) -> VmResult<Value> {
        match self.0.checked_add_signed(chrono_delta(micros)) {
            Some(moment) => Ok(Value::object(DateTimeValue(moment))),
            None => out_of_range(),
        }
    }

    fn micros(&self) -> u32 {
        self.0.nanosecond() / 1_000
    }

    fn isoformat(&self, sep: &str) -> String {
        let mut out = format!(
            "{}{sep}{}",
            self.0.format("%Y-%m-%d"),
            self.0.format("%H:%M:%S")
        );
        if self.micros() != 0 {
            let _ = write!(out, ".{:06}", self.micros());
        }
        out
    }
}

fn datetime_method(args: &mut CallArgs) -> VmResult<DateTimeValue> {
    receiver(args, &DATETIME)
}

fn datetime_isoformat(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let moment = datetime_method(&mut args)?;
    let [sep] = args.bind("isoformat", ["sep"], 0)?;
    let sep = match sep {
        Some(sep) => str_arg(Some(sep), "isoformat")?.to_string(),
        None => "T".to_string(),
    };
    Ok(Value::from(moment.isoformat(&sep)))
}

fn datetime_strftime(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let moment = datetime_method(&mut args)?;
    let [format] = args.bind("strftime", ["format"], 1)?;
    let format = str_arg(format, "strftime")?;
    strftime(&moment.0, &format).map(Value::from)
}

fn datetime_date(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let moment = datetime_method(&mut args)?;
    args.bind::<0>("date", [], 0)?;
    Ok(Value::object(DateValue(moment.0.date())))
}

fn datetime_weekday(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let moment = datetime_method(&mut args)?;
    args.bind::<0>("weekday", [], 0)?;
    Ok(Value::Int(i64::from(moment.0.weekday().num_days_from_monday())))
}

fn datetime_timestamp(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let moment = datetime_method(&mut args)?;
    args.bind::<0>("timestamp", [], 0)?;
    let micros = moment.0.and_utc().timestamp_micros();
    Ok(Value::Float(micros as f64 / MICROS_PER_SECOND as f64))
}

impl HostObject for DateTimeValue {
    fn class(&self) -> Class {
        DATETIME.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, _vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
        let receiver = Value::object(*self);
        Ok(Some(match name {
            "year" => Value::Int(i64::from(self.0.year())),
            "month" => Value::Int(i64::from(self.0.month())),
            "day" => Value::Int(i64::from(self.0.day())),
            "hour" => Value::Int(i64::from(self.0.hour())),
            "minute" => Value::Int(i64::from(self.0.minute())),
            "second" => Value::Int(i64::from(self.0.second())),
            "microsecond" => Value::Int(i64::from(self.micros())),
            "isoformat" => Builtin::method("isoformat", receiver, datetime_isoformat),
            "strftime" => Builtin::method("strftime", receiver, datetime_strftime),
            "date" => Builtin::method("date", receiver, datetime_date),
            "weekday" => Builtin::method("weekday", receiver, datetime_weekday),
            "timestamp" => Builtin::method("timestamp", receiver, datetime_timestamp),
            _ => return Ok(None),
        }))
    }

    fn binary_op(
        &self,
        _vm: &mut Vm,
        op: BinOperator,
        other: &Value,
        reflected: bool,
    ) -> VmResult<Option<Value>> {
        match (op, reflected) {
            (BinOperator::Add, _) => match downcast::<DeltaValue>(other) {
                Some(delta) => self.shift(delta.0).map(Some),
                None => Ok(None),
            },
            (BinOperator::Sub, false) => {
                if let Some(delta) = downcast::<DeltaValue>(other) {
                    return match delta.0.checked_neg() {
                        Some(negated) => self.shift(negated).map(Some),
                        None => out_of_range(),
                    };
                }
                match downcast::<DateTimeValue>(other) {
                    Some(moment) => match (self.0 - moment.0).num_microseconds() {
                        Some(micros) => Ok(Some(Value::object(DeltaValue(micros)))),
                        None => out_of_range(),
                    },
                    None => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        downcast::<DateTimeValue>(other) == Some(*self)
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        downcast::<DateTimeValue>(other).map(|d| self.cmp(&d))
    }

    fn hash_value(&self) -> Option<u64> {
        Some(hash_of(self))
    }

    fn repr(&self) -> String {
        let mut out = format!(
            "datetime.datetime({}, {}, {}, {}, {}",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute()
        );
        if self.0.second() != 0 || self.micros() != 0 {
            let _ = write!(out, ", {}", self.0.second());
        }
        if self.micros() != 0 {
            let _ = write!(out, ", {}", self.micros());
        }
        out.push(')');
        out
    }

    fn to_str(&self) -> String {
        self.isoformat(" ")
    }

    fn format(&self, spec: &str) -> VmResult<String> {
        if spec.is_empty() {
            return Ok(self.to_str());
        }
        strftime(&self.0, spec)
    }
}

impl DeltaValue {
    /// Python's normalised `(days, seconds, microseconds)`.
    fn parts(&self) -> (i64, i64, i64) {
        let days = self.0.div_euclid(MICROS_PER_DAY);
        let rest = self.0.rem_euclid(MICROS_PER_DAY);
        (days, rest / MICROS_PER_SECOND, rest % MICROS_PER_SECOND)
    }
}

fn timedelta_total_seconds(_: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
    let delta: DeltaValue = receiver(&mut args, &TIMEDELTA)?;
    args.bind::<0>("total_seconds", [], 0)?;
    Ok(Value::Float(delta.0 as f64 / MICROS_PER_SECOND as f64))
}

fn checked(micros: Option<i64>) -> VmResult<Option<Value>> {
    match micros {
        Some(m) => Ok(Some(Value::object(DeltaValue(m)))),
        None => raise(&exceptions::OVERFLOW_ERROR, "timedelta value out of range"),
    }
}

impl HostObject for DeltaValue {
    fn class(&self) -> Class {
        TIMEDELTA.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, _vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
        let (days, seconds, micros) = self.parts();
        Ok(Some(match name {
            "days" => Value::Int(days),
            "seconds" => Value::Int(seconds),
            "microseconds" => Value::Int(micros),
            "total_seconds" => {
                Builtin::method("total_seconds", Value::object(*self), timedelta_total_seconds)
            }
            _ => return Ok(None),
        }))
    }

    fn truthy(&self) -> bool {
        self.0 != 0
    }

    fn binary_op(
        &self,
        _vm: &mut Vm,
        op: BinOperator,
        other: &Value,
        reflected: bool,
    ) -> VmResult<Option<Value>> {
        if let Some(other) = downcast::<DeltaValue>(other) {
            let (a, b) = if reflected { (other.0, self.0) } else { (self.0, other.0) };
            return match op {
                BinOperator::Add => checked(a.checked_add(b)),
                BinOperator::Sub => checked(a.checked_sub(b)),
                BinOperator::Div if b == 0 => {
                    raise(&exceptions::ZERO_DIVISION_ERROR, "division by zero")
                }
                BinOperator::Div => Ok(Some(Value::Float(a as f64 / b as f64))),
                BinOperator::FloorDiv => {
                    ops::int_divmod(a, b).map(|(q, _)| Some(Value::Int(q)))
                }
                _ => Ok(None),
            };
        }
        match (op, other, reflected) {
            (BinOperator::Mult, Value::Int(n), _) => checked(self.0.checked_mul(*n)),
            (BinOperator::Mult, Value::Float(f), _) => {
                delta_from_micros((self.0 as f64 * f).round_ties_even()).map(Some)
            }
            (BinOperator::Div | BinOperator::FloorDiv, Value::Int(0), false) => {
                raise(&exceptions::ZERO_DIVISION_ERROR, "division by zero")
            }
            (BinOperator::FloorDiv, Value::Int(n), false) => {
                let (q, _) = ops::int_divmod(self.0, *n)?;
                checked(Some(q))
            }
            (BinOperator::Div, Value::Int(n), false) => {
                delta_from_micros((self.0 as f64 / *n as f64).round_ties_even()).map(Some)
            }
            (BinOperator::Div, Value::Float(f), false) if *f == 0.0 => {
                raise(&exceptions::ZERO_DIVISION_ERROR, "division by zero")
            }
            (BinOperator::Div, Value::Float(f), false) => {
                delta_from_micros((self.0 as f64 / f).round_ties_even()).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        downcast::<DeltaValue>(other) == Some(*self)
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        downcast::<DeltaValue>(other).map(|d| self.cmp(&d))
    }

    fn hash_value(&self) -> Option<u64> {
        Some(hash_of(self))
    }

    fn repr(&self) -> String {
        let (days, seconds, micros) = self.parts();
        let fields: Vec<String> = [("days", days), ("seconds", seconds), ("microseconds", micros)]
            .into_iter()
            .filter(|(_, v)| *v != 0)
            .map(|(name, v)| format!("{name}={v}"))
            .collect();
        if fields.is_empty() {
            "datetime.timedelta(0)".to_string()
        } else {
            format!("datetime.timedelta({})", fields.join(", "))
        }
    }

    fn to_str(&self) -> String {
        let (days, seconds, micros) = self.parts();
        let mut out = String::new();
        if days != 0 {
            let plural = if days.abs() == 1 { "" } else { "s" };
            let _ = write!(out, "{days} day{plural}, ");
        }
        let _ = write!(
            out,
            "{}:{:02}:{:02}",
            seconds / 3600,
            seconds % 3600 / 60,
            seconds % 60
        );
        if micros != 0 {
            let _ = write!(out, ".{micros:06}");
        }
        out
    }
}
