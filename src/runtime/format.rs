//! Text rendering: `repr`, `str`, `%`-interpolation and format specs.

use std::fmt::Write;

use crate::runtime::builtins::float_to_int;
use crate::runtime::exceptions::{self, raise};
use crate::runtime::ops::MAX_REPEAT_LEN;
use crate::runtime::value::{BuiltinKind, Value};
use crate::runtime::VmResult;

/// Containers nested deeper than this render as `...`.
const MAX_REPR_DEPTH: usize = 200;

/// `repr(value)`.
pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    Repr::default().write(&mut out, value);
    out
}

/// `str(value)`.
pub fn to_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Float(f) => float_repr(*f),
        Value::Exception(exc) => exc.message(),
        Value::Object(obj) => obj.to_str(),
        Value::Wrapper(w) => to_str(w.inner()),
        other => repr(other),
    }
}

/// `ascii(value)`: `repr` with non-ASCII characters escaped.
pub fn ascii(value: &Value) -> String {
    let mut out = String::new();
    for c in repr(value).chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            push_escape(&mut out, c);
        }
    }
    out
}

fn push_escape(out: &mut String, c: char) {
    let code = c as u32;
    let _ = if code <= 0xff {
        write!(out, "\\x{code:02x}")
    } else if code <= 0xffff {
        write!(out, "\\u{code:04x}")
    } else {
        write!(out, "\\U{code:08x}")
    };
}

/// Quote a string the way Python's `repr` does.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
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
            c if c.is_control() => push_escape(&mut out, c),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Shortest round-tripping float text, switching to exponent notation
/// outside `1e-4 <= |f| < 1e16`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let sci = format!("{f:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if (-4..16).contains(&exp) {
        let point = exp + 1;
        if point <= 0 {
            out.push_str("0.");
            out.push_str(&"0".repeat((-point) as usize));
            out.push_str(&digits);
        } else if point as usize >= digits.len() {
            out.push_str(&digits);
            out.push_str(&"0".repeat(point as usize - digits.len()));
            out.push_str(".0");
        } else {
            let (int_part, frac) = digits.split_at(point as usize);
            out.push_str(int_part);
            out.push('.');
            out.push_str(frac);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let _ = write!(out, "e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs());
    }
    out
}

#[derive(Default)]
struct Repr {
    seen: Vec<usize>,
}

impl Repr {
    fn enter(&mut self, addr: usize) -> bool {
        if self.seen.contains(&addr) || self.seen.len() >= MAX_REPR_DEPTH {
            return false;
        }
        self.seen.push(addr);
        true
    }

    fn items<'a>(&mut self, out: &mut String, items: impl Iterator<Item = &'a Value>) {
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write(out, item);
        }
    }

    fn write(&mut self, out: &mut String, value: &Value) {
        match value {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => {
                let _ = write!(out, "{i}");
            }
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&str_repr(s)),
            Value::List(items) => {
                if !self.enter(items.as_ptr() as usize) {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                self.items(out, items.borrow().iter());
                out.push(']');
                self.seen.pop();
            }
            Value::Tuple(items) => {
                if !self.enter(items.as_ptr() as usize) {
                    out.push_str("(...)");
                    return;
                }
                out.push('(');
                self.items(out, items.iter());
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                self.seen.pop();
            }
            Value::Dict(dict) => {
                if !self.enter(dict.as_ptr() as usize) {
                    out.push_str("{...}");
                    return;
                }
                out.push('{');
                for (i, (key, item)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write(out, key.value());
                    out.push_str(": ");
                    self.write(out, item);
                }
                out.push('}');
                self.seen.pop();
            }
            Value::Set(set) => {
                let set = set.borrow();
                if set.is_empty() {
                    out.push_str("set()");
                    return;
                }
                out.push('{');
                self.items(out, set.iter().map(|k| k.value()));
                out.push('}');
            }
            Value::Range(r) => {
                let _ = if r.step == 1 {
                    write!(out, "range({}, {})", r.start, r.stop)
                } else {
                    write!(out, "range({}, {}, {})", r.start, r.stop, r.step)
                };
            }
            Value::Slice(s) => {
                let bound = |b: Option<i64>| b.map_or_else(|| "None".to_string(), |i| i.to_string());
                let _ = write!(
                    out,
                    "slice({}, {}, {})",
                    bound(s.lower),
                    bound(s.upper),
                    bound(s.step)
                );
            }
            Value::Function(f) => {
                let _ = write!(out, "<function {}>", f.name);
            }
            Value::Builtin(b) => {
                let _ = match (&b.bound, b.kind) {
                    (Some(receiver), BuiltinKind::Method | BuiltinKind::Unsafe) => write!(
                        out,
                        "<built-in method {} of {} object>",
                        b.name,
                        receiver.type_name()
                    ),
                    _ => write!(out, "<built-in function {}>", b.name),
                };
            }
            Value::Class(c) => {
                let _ = write!(out, "<class '{}'>", c.id());
            }
            Value::Exception(exc) => out.push_str(&exc.repr()),
            Value::Module(m) => {
                let _ = write!(out, "<module '{}'>", m.name);
            }
            Value::Iterator(state) => {
                let _ = write!(out, "<{} object>", state.borrow().class.name());
            }
            Value::Object(obj) => out.push_str(&obj.repr()),
            Value::Wrapper(w) => self.write(out, w.inner()),
        }
    }
}

/// A parsed format specification (`[[fill]align][sign][#][0][width][,][.prec][type]`).
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub fill: char,
    pub align: Option<char>,
    pub sign: char,
    pub alternate: bool,
    pub width: usize,
    pub grouping: Option<char>,
    pub precision: Option<usize>,
    pub kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

fn invalid_spec<T>() -> VmResult<T> {
    raise(&exceptions::VALUE_ERROR, "Invalid format specifier")
}

impl FormatSpec {
    pub fn parse(spec: &str) -> VmResult<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = chars[0];
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().is_some_and(|c| is_align(*c)) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if let Some(c @ ('+' | '-' | ' ')) = chars.get(i) {
            out.sign = *c;
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            if out.align.is_none() {
                out.fill = '0';
                out.align = Some('=');
            }
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            out.width = chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .or_else(|_| invalid_spec())?;
        }
        if let Some(c @ (',' | '_')) = chars.get(i) {
            out.grouping = Some(*c);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return raise(&exceptions::VALUE_ERROR, "Format specifier missing precision");
            }
            out.precision = Some(
                chars[start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .or_else(|_| invalid_spec())?,
            );
        }
        if let Some(c) = chars.get(i) {
            out.kind = Some(*c);
            i += 1;
        }
        if i != chars.len() {
            return invalid_spec();
        }
        Ok(out)
    }

    fn pad(&self, body: String, sign: &str, default_align: char) -> VmResult<String> {
        let width = size_limit(self.width, "width")?;
        let len = sign.chars().count() + body.chars().count();
        if len >= width {
            return Ok(format!("{sign}{body}"));
        }
        let padding = width - len;
        let fill = |n: usize| self.fill.to_string().repeat(n);
        Ok(match self.align.unwrap_or(default_align) {
            '<' => format!("{sign}{body}{}", fill(padding)),
            '^' => format!(
                "{}{sign}{body}{}",
                fill(padding / 2),
                fill(padding - padding / 2)
            ),
            '=' => format!("{sign}{}{body}", fill(padding)),
            _ => format!("{}{sign}{body}", fill(padding)),
        })
    }

    fn sign_for(&self, negative: bool) -> &'static str {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, '+') => "+",
            (false, ' ') => " ",
            _ => "",
        }
    }
}

/// Widths and precisions share the ceiling on repeated sequences.
fn size_limit(n: usize, what: &str) -> VmResult<usize> {
    if n > MAX_REPEAT_LEN {
        return raise(&exceptions::OVERFLOW_ERROR, format!("{what} too big"));
    }
    Ok(n)
}

fn group_digits(digits: &str, separator: char, every: usize) -> String {
    let (int_part, rest) = match digits.find(|c: char| !c.is_ascii_alphanumeric()) {
        Some(pos) => digits.split_at(pos),
        None => (digits, ""),
    };
    let chars: Vec<char> = int_part.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out.push_str(rest);
    out
}

/// Normalise Rust's `1.5e3` exponent to Python's `1.5e+03`.
fn python_exponent(text: &str, upper: bool) -> String {
    let Some((mantissa, exp)) = text.split_once('e') else {
        return text.to_string();
    };
    let (sign, digits) = match exp.strip_prefix('-') {
        Some(d) => ('-', d),
        None => ('+', exp),
    };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{digits:0>2}")
}

fn strip_trailing_zeros(text: &str) -> String {
    let (number, exponent) = match text.find(['e', 'E']) {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{number}{exponent}")
}

/// `%g`-style formatting of a non-negative finite float.
fn general(f: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let p = precision.max(1);
    let sci = format!("{:.*e}", p - 1, f);
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let text = if exp >= -4 && exp < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, f)
    } else {
        python_exponent(&sci, upper)
    };
    if alternate {
        text
    } else {
        strip_trailing_zeros(&text)
    }
}

fn format_float(f: f64, spec: &FormatSpec) -> VmResult<String> {
    let negative = f.is_sign_negative() && !f.is_nan();
    let magnitude = f.abs();
    if let Some(precision) = spec.precision {
        size_limit(precision, "precision")?;
    }
    let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));
    let mut body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        if upper {
            text.to_uppercase()
        } else {
            text.to_string()
        }
    } else {
        match spec.kind {
            Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            Some('e' | 'E') => python_exponent(
                &format!("{:.*e}", spec.precision.unwrap_or(6), magnitude),
                upper,
            ),
            Some('g' | 'G' | 'n') => {
                general(magnitude, spec.precision.unwrap_or(6), spec.alternate, upper)
            }
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            None => match spec.precision {
                Some(p) => {
                    let text = general(magnitude, p, spec.alternate, false);
                    if text.contains(['.', 'e']) {
                        text
                    } else {
                        format!("{text}.0")
                    }
                }
                None => float_repr(magnitude),
            },
            Some(other) => {
                return raise(
                    &exceptions::VALUE_ERROR,
                    format!("Unknown format code '{other}' for object of type 'float'"),
                )
            }
        }
    };
    if let Some(sep) = spec.grouping {
        body = group_digits(&body, sep, 3);
    }
    spec.pad(body, spec.sign_for(negative), '>')
}

fn format_int(i: i64, spec: &FormatSpec) -> VmResult<String> {
    let magnitude = i.unsigned_abs();
    let (mut body, prefix, group_every) = match spec.kind {
        None | Some('d' | 'n') => (magnitude.to_string(), "", 3),
        Some('b') => (format!("{magnitude:b}"), "0b", 4),
        Some('o') => (format!("{magnitude:o}"), "0o", 4),
        Some('x') => (format!("{magnitude:x}"), "0x", 4),
        Some('X') => (format!("{magnitude:X}"), "0X", 4),
        Some('c') => {
            let c = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    exceptions::fault(&exceptions::OVERFLOW_ERROR, "%c arg not in range(0x110000)")
                })?;
            return spec.pad(c.to_string(), "", '<');
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_float(i as f64, spec),
        Some(other) => {
            return raise(
                &exceptions::VALUE_ERROR,
                format!("Unknown format code '{other}' for object of type 'int'"),
            )
        }
    };
    if let Some(sep) = spec.grouping {
        body = group_digits(&body, sep, group_every);
    }
    let sign = spec.sign_for(i < 0);
    let sign = if spec.alternate {
        format!("{sign}{prefix}")
    } else {
        sign.to_string()
    };
    spec.pad(body, &sign, '>')
}

fn format_text(text: &str, spec: &FormatSpec) -> VmResult<String> {
    if !matches!(spec.kind, None | Some('s')) {
        return raise(
            &exceptions::VALUE_ERROR,
            format!(
                "Unknown format code '{}' for object of type 'str'",
                spec.kind.unwrap_or('?')
            ),
        );
    }
    if spec.align == Some('=') {
        return raise(
            &exceptions::VALUE_ERROR,
            "'=' alignment not allowed in string format specifier",
        );
    }
    let body: String = match spec.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text.to_string(),
    };
    spec.pad(body, "", '<')
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> VmResult<String> {
    match value {
        Value::Object(obj) => return obj.format(spec),
        Value::Wrapper(w) => return format_value(w.inner(), spec),
        _ => {}
    }
    if spec.is_empty() {
        return Ok(to_str(value));
    }
    let parsed = FormatSpec::parse(spec)?;
    match value {
        Value::Bool(b) => format_int(i64::from(*b), &parsed),
        Value::Int(i) => format_int(*i, &parsed),
        Value::Float(f) => format_float(*f, &parsed),
        Value::Str(s) => format_text(s, &parsed),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            ),
        ),
    }
}

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> VmResult<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mapping = match args {
        Value::Dict(_) => Some(args),
        _ => None,
    };
    let mut next = 0usize;
    let take = |next: &mut usize| -> VmResult<Value> {
        let value = positional.get(*next).cloned().ok_or_else(|| {
            exceptions::fault(&exceptions::TYPE_ERROR, "not enough arguments for format string")
        })?;
        *next += 1;
        Ok(value)
    };

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let mut spec = FormatSpec::default();
        let mut value = None;

        if chars.get(i) == Some(&'(') {
            let close = chars[i..].iter().position(|c| *c == ')').map(|p| p + i);
            let Some(close) = close else {
                return raise(&exceptions::VALUE_ERROR, "incomplete format key");
            };
            let key: String = chars[i + 1..close].iter().collect();
            let Some(Value::Dict(dict)) = mapping else {
                return raise(&exceptions::TYPE_ERROR, "format requires a mapping");
            };
            let found = dict.borrow().get(&crate::runtime::value::HashKey::from(key.as_str())).cloned();
            value = Some(found.ok_or_else(|| {
                crate::runtime::exceptions::Exception::with_args(
                    &exceptions::KEY_ERROR,
                    vec![Value::from(key.clone())],
                )
            })?);
            i = close + 1;
        }
        while let Some(flag @ ('-' | '+' | ' ' | '#' | '0')) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' | ' ' => spec.sign = *flag,
                '#' => spec.alternate = true,
                _ => {
                    if spec.align.is_none() {
                        spec.fill = '0';
                        spec.align = Some('=');
                    }
                }
            }
            i += 1;
        }
        if spec.align == Some('<') {
            spec.fill = ' ';
        }
        if chars.get(i) == Some(&'*') {
            spec.width = take(&mut next)?.as_int().unwrap_or(0).max(0) as usize;
            i += 1;
        } else {
            while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
                spec.width = spec.width.saturating_mul(10).saturating_add(d as usize);
                i += 1;
            }
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let mut precision = 0usize;
            while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
                precision = precision.saturating_mul(10).saturating_add(d as usize);
                i += 1;
            }
            spec.precision = Some(precision);
        }
        let Some(&conversion) = chars.get(i) else {
            return raise(&exceptions::VALUE_ERROR, "incomplete format");
        };
        i += 1;
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let value = match value {
            Some(v) => v,
            None if mapping.is_some() => args.clone(),
            None => take(&mut next)?,
        };
        let rendered = match conversion {
            's' => format_text(&to_str(&value), &FormatSpec { kind: None, ..spec })?,
            'r' => format_text(&repr(&value), &FormatSpec { kind: None, ..spec })?,
            'a' => format_text(&ascii(&value), &FormatSpec { kind: None, ..spec })?,
            'd' | 'i' | 'u' => {
                let number = match &value {
                    Value::Float(f) => float_to_int(*f)?,
                    other => other.as_int().ok_or_else(|| {
                        exceptions::fault(
                            &exceptions::TYPE_ERROR,
                            format!(
                                "%{conversion} format: a real number is required, not {}",
                                other.type_name()
                            ),
                        )
                    })?,
                };
                format_int(number, &FormatSpec { kind: Some('d'), ..spec })?
            }
            'x' | 'X' | 'o' => {
                let number = value.as_int().ok_or_else(|| {
                    exceptions::fault(
                        &exceptions::TYPE_ERROR,
                        format!(
                            "%{conversion} format: an integer is required, not {}",
                            value.type_name()
                        ),
                    )
                })?;
                format_int(number, &FormatSpec { kind: Some(conversion), ..spec })?
            }
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                let number = value.as_float().ok_or_else(|| {
                    exceptions::fault(
                        &exceptions::TYPE_ERROR,
                        format!("must be real number, not {}", value.type_name()),
                    )
                })?;
                format_float(number, &FormatSpec { kind: Some(conversion), ..spec })?
            }
            'c' => match &value {
                Value::Str(s) if s.chars().count() == 1 => format_text(s, &spec)?,
                other => match other.as_int() {
                    Some(code) => format_int(code, &FormatSpec { kind: Some('c'), ..spec })?,
                    None => {
                        return raise(&exceptions::TYPE_ERROR, "%c requires int or char");
                    }
                },
            },
            other => {
                return raise(
                    &exceptions::VALUE_ERROR,
                    format!(
                        "unsupported format character '{other}' (0x{:x}) at index {}",
                        other as u32,
                        i - 1
                    ),
                )
            }
        };
        out.push_str(&rendered);
    }
    if mapping.is_none() && next < positional.len() {
        return raise(
            &exceptions::TYPE_ERROR,
            "not all arguments converted during string formatting",
        );
    }
    Ok(out)
}

/// Python's `round(x, ndigits)` for floats: correctly rounded, ties to even.
pub fn round_float(f: f64, ndigits: i64) -> f64 {
    if !f.is_finite() {
        return f;
    }
    if ndigits >= 0 {
        let digits = ndigits.min(330) as usize;
        format!("{f:.digits$}").parse().unwrap_or(f)
    } else {
        let factor = 10f64.powi(ndigits.unsigned_abs().min(330) as i32);
        let scaled = (f / factor).round_ties_even() * factor;
        if scaled.is_finite() {
            scaled
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(123456789.125), "123456789.125");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn test_repr_containers() {
        let value = Value::list(vec![
            Value::from("it's"),
            Value::tuple(vec![Value::Int(1)]),
            Value::dict_from([("k", Value::None)]),
        ]);
        assert_eq!(repr(&value), "[\"it's\", (1,), {'k': None}]");
    }

    #[test]
    fn test_recursive_repr() {
        let list = Value::list(vec![]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(repr(&list), "[[...]]");
    }

    #[test]
    fn test_format_spec() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::from("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Float(1234.5), ".3e").unwrap(), "1.234e+03");
        assert_eq!(format_value(&Value::Float(0.00001234), "g").unwrap(), "1.234e-05");
        assert_eq!(format_value(&Value::Float(0.25), ".1%").unwrap(), "25.0%");
        assert!(format_value(&Value::from("x"), "d").is_err());
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::from("x"), Value::Int(3), Value::Float(2.5)]);
        assert_eq!(percent_format("%s=%03d (%.2f)", &args).unwrap(), "x=003 (2.50)");
        let mapping = Value::dict_from([("name", Value::from("bob"))]);
        assert_eq!(percent_format("hi %(name)s!", &mapping).unwrap(), "hi bob!");
        assert_eq!(percent_format("100%%", &Value::tuple(vec![])).unwrap(), "100%");
        assert!(percent_format("%s %s", &Value::from("one")).is_err());
        assert!(percent_format("%s", &Value::tuple(vec![Value::Int(1), Value::Int(2)])).is_err());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_float(2.675, 2), 2.67);
        assert_eq!(round_float(0.125, 2), 0.12);
        assert_eq!(round_float(1234.0, -2), 1200.0);
    }

    fn assert_raises(result: VmResult<String>, class: &crate::runtime::class::Class) {
        let fault = result.unwrap_err();
        assert!(fault.as_exception().is_some_and(|e| e.is_instance(class)));
    }

    #[test]
    fn test_huge_widths_are_refused() {
        assert_raises(format_value(&Value::Int(1), ">999999999999"), &exceptions::OVERFLOW_ERROR);
        assert_raises(format_value(&Value::from("a"), "<999999999999"), &exceptions::OVERFLOW_ERROR);
        assert_raises(format_value(&Value::Float(1.0), ".999999999999f"), &exceptions::OVERFLOW_ERROR);
        assert_raises(percent_format("%999999999999d", &Value::Int(1)), &exceptions::OVERFLOW_ERROR);
        assert_raises(
            percent_format("%99999999999999999999999999s", &Value::from("a")),
            &exceptions::OVERFLOW_ERROR,
        );
        assert_eq!(format_value(&Value::Int(1), ">4").unwrap(), "   1");
    }

    #[test]
    fn test_percent_d_converts_floats_like_int() {
        assert_eq!(percent_format("%d", &Value::Float(-2.7)).unwrap(), "-2");
        assert_raises(percent_format("%d", &Value::Float(1e300)), &exceptions::OVERFLOW_ERROR);
        assert_raises(percent_format("%d", &Value::Float(f64::INFINITY)), &exceptions::OVERFLOW_ERROR);
        assert_raises(percent_format("%d", &Value::Float(f64::NAN)), &exceptions::VALUE_ERROR);
    }
}
