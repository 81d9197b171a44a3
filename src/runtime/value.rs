//! The dynamic value model shared by the executor, builtins and gates.

use std::any::Any;
use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::error::SandboxError;
use crate::runtime::class::{self, Class, NativeFn};
use crate::runtime::exceptions::{self, Exception};
use crate::runtime::interp::{Env, Vm};
use crate::runtime::{format, ops, Fault, VmResult};
use crate::sandbox::wrapper::SafeWrapper;
use crate::syntax::ast::{self, Expr, Stmt};
use crate::syntax::BinOperator;

/// Insertion-ordered dictionary storage.
pub type Dict = IndexMap<HashKey, Value>;

/// Name → value bindings supplied by (and returned to) callers.
pub type Bindings = IndexMap<String, Value>;

/// A guest-visible value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<IndexSet<HashKey>>>),
    Range(Range),
    Slice(SliceValue),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Class(Class),
    Exception(Rc<Exception>),
    Module(Rc<Module>),
    Iterator(Rc<RefCell<IterState>>),
    Object(Rc<dyn HostObject>),
    Wrapper(Rc<SafeWrapper>),
}

impl Value {
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(entries: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn set(items: IndexSet<HashKey>) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    /// Build a dict from string keys.
    pub fn dict_from<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let dict = entries
            .into_iter()
            .map(|(k, v)| (HashKey::from(k.as_ref()), v))
            .collect();
        Value::dict(dict)
    }

    pub fn object(obj: impl HostObject) -> Self {
        Value::Object(Rc::new(obj))
    }

    pub fn iterator(class: &Class, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Iterator(Rc::new(RefCell::new(IterState {
            class: class.clone(),
            items: items.into_iter().collect(),
        })))
    }

    /// The value's host type.
    pub fn class(&self) -> Class {
        match self {
            Value::None => class::NONE_TYPE.clone(),
            Value::Bool(_) => class::BOOL.clone(),
            Value::Int(_) => class::INT.clone(),
            Value::Float(_) => class::FLOAT.clone(),
            Value::Str(_) => class::STR.clone(),
            Value::List(_) => class::LIST.clone(),
            Value::Tuple(_) => class::TUPLE.clone(),
            Value::Dict(_) => class::DICT.clone(),
            Value::Set(_) => class::SET.clone(),
            Value::Range(_) => class::RANGE.clone(),
            Value::Slice(_) => class::SLICE.clone(),
            Value::Function(_) => class::FUNCTION.clone(),
            Value::Builtin(_) => class::BUILTIN_FUNCTION.clone(),
            Value::Class(_) => class::TYPE.clone(),
            Value::Exception(exc) => exc.class.clone(),
            Value::Module(_) => class::MODULE.clone(),
            Value::Iterator(state) => state.borrow().class.clone(),
            Value::Object(obj) => obj.class(),
            Value::Wrapper(wrapper) => wrapper.inner().class(),
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> String {
        self.class().name().to_string()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Integer view; `bool` counts as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric view of ints, bools and floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison (`is`).
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => ptr_addr(a) == ptr_addr(b),
            (Value::Wrapper(a), b) => a.inner().is(b),
            (a, Value::Wrapper(b)) => a.is(b.inner()),
            _ => false,
        }
    }
}

fn ptr_addr(obj: &Rc<dyn HostObject>) -> usize {
    Rc::as_ptr(obj) as *const () as usize
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format::repr(self))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format::to_str(self))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(self, other)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<Class> for Value {
    fn from(class: Class) -> Self {
        Value::Class(class)
    }
}

/// A hashable value usable as dict key or set member.
#[derive(Clone)]
pub struct HashKey(Value);

impl HashKey {
    /// Wrap `value`, raising `TypeError` for unhashable values.
    pub fn new(value: Value) -> VmResult<Self> {
        if let Some(unhashable) = find_unhashable(&value) {
            return exceptions::raise(
                &exceptions::TYPE_ERROR,
                format!("unhashable type: '{unhashable}'"),
            );
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

fn find_unhashable(value: &Value) -> Option<String> {
    match value {
        Value::List(_) | Value::Dict(_) | Value::Set(_) | Value::Slice(_) => Some(value.type_name()),
        Value::Tuple(items) => items.iter().find_map(find_unhashable),
        Value::Wrapper(w) => find_unhashable(w.inner()),
        _ => None,
    }
}

impl From<&str> for HashKey {
    fn from(s: &str) -> Self {
        HashKey(Value::str(s))
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for HashKey {
    fn eq(&self, other: &Self) -> bool {
        ops::equals(&self.0, &other.0)
    }
}

impl Eq for HashKey {}

impl Hash for HashKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::None => state.write_u8(0),
        Value::Bool(b) => i64::from(*b).hash(state),
        Value::Int(i) => i.hash(state),
        Value::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                (*f as i64).hash(state);
            } else {
                f.to_bits().hash(state);
            }
        }
        Value::Str(s) => s.hash(state),
        Value::Tuple(items) => {
            state.write_usize(items.len());
            for item in items.iter() {
                hash_value(item, state);
            }
        }
        Value::Range(r) => (r.start, r.stop, r.step).hash(state),
        Value::Class(c) => c.id().hash(state),
        Value::Wrapper(w) => hash_value(w.inner(), state),
        Value::Object(obj) => match obj.hash_value() {
            Some(h) => h.hash(state),
            None => ptr_addr(obj).hash(state),
        },
        Value::Function(f) => (Rc::as_ptr(f) as usize).hash(state),
        Value::Builtin(b) => (Rc::as_ptr(b) as usize).hash(state),
        Value::Exception(e) => (Rc::as_ptr(e) as usize).hash(state),
        Value::Module(m) => (Rc::as_ptr(m) as usize).hash(state),
        Value::Iterator(i) => (Rc::as_ptr(i) as usize).hash(state),
        Value::List(_) | Value::Dict(_) | Value::Set(_) | Value::Slice(_) => state.write_u8(1),
    }
}

/// `range(start, stop, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            (self.stop as i128 - self.start as i128 + self.step as i128 - 1) / self.step as i128
        } else {
            (self.start as i128 - self.stop as i128 - self.step as i128 - 1) / (-(self.step as i128))
        };
        span.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        // In bounds, so the element itself fits even when the offset does not.
        let value = self.start as i128 + self.step as i128 * index as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            value >= self.start && value < self.stop
        } else {
            value <= self.start && value > self.stop
        };
        in_bounds && (value as i128 - self.start as i128) % self.step as i128 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

/// Bounds of a slice expression, already converted to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceValue {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceValue {
    /// Resolve against a sequence of `len` items into `(start, stop, step)`.
    pub fn indices(&self, len: usize) -> VmResult<(i64, i64, i64)> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return exceptions::raise(&exceptions::VALUE_ERROR, "slice step cannot be zero");
        }
        let clamp = |bound: Option<i64>, default: i64| -> i64 {
            match bound {
                None => default,
                Some(i) if i < 0 => {
                    let i = i + len;
                    if i < 0 {
                        if step < 0 {
                            -1
                        } else {
                            0
                        }
                    } else {
                        i
                    }
                }
                Some(i) if i >= len => {
                    if step < 0 {
                        len - 1
                    } else {
                        len
                    }
                }
                Some(i) => i,
            }
        };
        let (start_default, stop_default) = if step < 0 { (len - 1, -1) } else { (0, len) };
        Ok((clamp(self.lower, start_default), clamp(self.upper, stop_default), step))
    }

    /// Positions selected by this slice in a sequence of `len` items.
    pub fn positions(&self, len: usize) -> VmResult<Vec<usize>> {
        let (start, stop, step) = self.indices(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }
}

/// Body of a guest function.
#[derive(Clone)]
pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Expr(Rc<Expr>),
}

/// Parameter names of a guest function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Positional parameters, positional-only ones first.
    pub args: Vec<String>,
    /// How many leading `args` cannot be passed by keyword.
    pub positional_only: usize,
    pub vararg: Option<String>,
    pub kwonly: Vec<String>,
    pub kwarg: Option<String>,
}

impl Signature {
    pub fn new(arguments: &ast::Arguments) -> Self {
        let name = |arg: &ast::ArgWithDefault| arg.def.arg.to_string();
        Self {
            args: arguments
                .posonlyargs
                .iter()
                .chain(&arguments.args)
                .map(name)
                .collect(),
            positional_only: arguments.posonlyargs.len(),
            vararg: arguments.vararg.as_ref().map(|arg| arg.arg.to_string()),
            kwonly: arguments.kwonlyargs.iter().map(name).collect(),
            kwarg: arguments.kwarg.as_ref().map(|arg| arg.arg.to_string()),
        }
    }

    /// Every parameter name, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .chain(self.vararg.iter())
            .chain(self.kwonly.iter())
            .chain(self.kwarg.iter())
            .map(String::as_str)
    }
}

/// A guest-defined function or lambda.
pub struct Function {
    pub name: String,
    pub params: Signature,
    /// Evaluated defaults, aligned with `params.args`.
    pub defaults: Vec<Option<Value>>,
    /// Evaluated defaults, aligned with `params.kwonly`.
    pub kw_defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    /// Enclosing scope.
    pub env: Rc<Env>,
    /// Names bound anywhere in the body; they are local to each call.
    pub local_names: Rc<HashSet<String>>,
}

/// How the gates treat a native callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// A free function.
    Function,
    /// A method bound to a receiver.
    Method,
    /// Sandbox machinery; never crosses the boundary.
    Internal,
    /// Exists on the host but may not be handed to guest code.
    Unsafe,
}

/// A native function, optionally bound to a receiver.
pub struct Builtin {
    pub name: Cow<'static, str>,
    pub func: NativeFn,
    pub bound: Option<Value>,
    pub kind: BuiltinKind,
}

impl Builtin {
    pub fn new(name: impl Into<Cow<'static, str>>, func: NativeFn, kind: BuiltinKind) -> Self {
        Self {
            name: name.into(),
            func,
            bound: None,
            kind,
        }
    }

    /// A free native function value.
    pub fn function<F>(name: &'static str, f: F) -> Value
    where
        F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        Value::Builtin(Rc::new(Self::new(name, Arc::new(f), BuiltinKind::Function)))
    }

    /// A method bound to `receiver`; the receiver is passed as first argument.
    pub fn method<F>(name: &'static str, receiver: Value, f: F) -> Value
    where
        F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self::bind(name, receiver, Arc::new(f), BuiltinKind::Method)
    }

    pub fn bind(name: &'static str, receiver: Value, func: NativeFn, kind: BuiltinKind) -> Value {
        Value::Builtin(Rc::new(Self {
            name: Cow::Borrowed(name),
            func,
            bound: Some(receiver),
            kind,
        }))
    }

    /// `true` for callables the gates refuse outright.
    pub fn is_forbidden(&self) -> bool {
        matches!(self.kind, BuiltinKind::Internal | BuiltinKind::Unsafe)
    }

    pub fn invoke(&self, vm: &mut Vm, mut args: CallArgs) -> VmResult<Value> {
        if let Some(receiver) = &self.bound {
            args.positional.insert(0, receiver.clone());
        }
        (self.func)(vm, args)
    }
}

/// An importable host module.
pub struct Module {
    pub name: String,
    pub attrs: IndexMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>, attrs: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            attrs,
        }
    }
}

/// State of an eagerly materialised iterator.
pub struct IterState {
    pub class: Class,
    pub items: VecDeque<Value>,
}

/// Positional and keyword arguments of a call.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: Value) -> Self {
        self.keywords.push((name.into(), value));
        self
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Every argument value, positional first.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.positional
            .iter()
            .chain(self.keywords.iter().map(|(_, v)| v))
    }

    /// Remove and return a keyword argument.
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Match arguments against the parameter `names` of `func`.
    ///
    /// The first `required` parameters must be supplied.
    pub fn bind<const N: usize>(
        self,
        func: &str,
        names: [&str; N],
        required: usize,
    ) -> VmResult<[Option<Value>; N]> {
        let mut slots: [Option<Value>; N] = std::array::from_fn(|_| None);
        if self.positional.len() > N {
            return exceptions::raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "{func}() takes at most {N} argument{} ({} given)",
                    if N == 1 { "" } else { "s" },
                    self.positional.len()
                ),
            );
        }
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (name, value) in self.keywords {
            let Some(index) = names.iter().position(|n| *n == name) else {
                return exceptions::raise(
                    &exceptions::TYPE_ERROR,
                    format!("'{name}' is an invalid keyword argument for {func}()"),
                );
            };
            if slots[index].is_some() {
                return exceptions::raise(
                    &exceptions::TYPE_ERROR,
                    format!("{func}() got multiple values for argument '{name}'"),
                );
            }
            slots[index] = Some(value);
        }
        if let Some(missing) = (0..required.min(N)).find(|i| slots[*i].is_none()) {
            return exceptions::raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "{func}() missing required argument '{}' (pos {})",
                    names[missing],
                    missing + 1
                ),
            );
        }
        Ok(slots)
    }
}

/// An error raised by host code as a specific guest exception class.
///
/// Native functions returning `anyhow::Result` can wrap one of these to
/// raise e.g. `ValueError` instead of the default `RuntimeError`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HostError {
    pub class: Class,
    pub message: String,
}

impl HostError {
    pub fn new(class: &Class, message: impl Into<String>) -> Self {
        Self {
            class: class.clone(),
            message: message.into(),
        }
    }
}

/// Translate an error returned by host code into a guest fault.
pub fn host_fault(err: anyhow::Error) -> Fault {
    if let Some(host) = err.downcast_ref::<HostError>() {
        return exceptions::fault(&host.class, host.message.clone());
    }
    match err.downcast::<SandboxError>() {
        Ok(violation) => Fault::Violation(violation),
        Err(other) => exceptions::fault(&exceptions::RUNTIME_ERROR, format!("{other:#}")),
    }
}

/// Adapt a host closure returning `anyhow::Result` into a native function.
pub fn host_fn<F>(f: F) -> NativeFn
where
    F: Fn(CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |_vm: &mut Vm, args: CallArgs| f(args).map_err(host_fault))
}

/// Host-implemented object type exposed to guest code.
///
/// Every method has a default that raises the `TypeError` or
/// `AttributeError` a Python object without that capability would raise.
pub trait HostObject: Any {
    fn class(&self) -> Class;

    fn as_any(&self) -> &dyn Any;

    /// Attribute lookup; `Ok(None)` means "no such attribute".
    fn get_attr(&self, vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
        let _ = (vm, name);
        Ok(None)
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
        let _ = (vm, args);
        exceptions::raise(
            &exceptions::TYPE_ERROR,
            format!("'{}' object is not callable", self.class().name()),
        )
    }

    fn get_item(&self, vm: &mut Vm, key: &Value) -> VmResult<Value> {
        let _ = (vm, key);
        exceptions::raise(
            &exceptions::TYPE_ERROR,
            format!("'{}' object is not subscriptable", self.class().name()),
        )
    }

    fn set_item(&self, vm: &mut Vm, key: Value, value: Value) -> VmResult<()> {
        let _ = (vm, key, value);
        exceptions::raise(
            &exceptions::TYPE_ERROR,
            format!(
                "'{}' object does not support item assignment",
                self.class().name()
            ),
        )
    }

    /// Items produced by iterating the object.
    fn iter(&self, vm: &mut Vm) -> VmResult<Vec<Value>> {
        let _ = vm;
        exceptions::raise(
            &exceptions::TYPE_ERROR,
            format!("'{}' object is not iterable", self.class().name()),
        )
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn truthy(&self) -> bool {
        true
    }

    /// `self <op> other` (or `other <op> self` when `reflected`);
    /// `Ok(None)` when unsupported.
    fn binary_op(
        &self,
        vm: &mut Vm,
        op: BinOperator,
        other: &Value,
        reflected: bool,
    ) -> VmResult<Option<Value>> {
        let _ = (vm, op, other, reflected);
        Ok(None)
    }

    fn equals(&self, other: &Value) -> bool {
        let _ = other;
        false
    }

    /// Ordering against `other`, when comparable.
    fn compare(&self, other: &Value) -> Option<Ordering> {
        let _ = other;
        None
    }

    /// Content hash for value-like objects; identity is used otherwise.
    fn hash_value(&self) -> Option<u64> {
        None
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.class().id())
    }

    fn to_str(&self) -> String {
        self.repr()
    }

    /// `format(obj, spec)`.
    fn format(&self, spec: &str) -> VmResult<String> {
        if spec.is_empty() {
            Ok(self.to_str())
        } else {
            exceptions::raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "unsupported format string passed to {}.__format__",
                    self.class().name()
                ),
            )
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::dict_from(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

/// Containers nested deeper than this are assumed to be cyclic.
const MAX_JSON_DEPTH: usize = 512;

impl TryFrom<&Value> for serde_json::Value {
    type Error = Exception;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        to_json(value, 0)
    }
}

fn to_json(value: &Value, depth: usize) -> Result<serde_json::Value, Exception> {
    if depth > MAX_JSON_DEPTH {
        return Err(Exception::new(
            &exceptions::VALUE_ERROR,
            "Circular reference detected",
        ));
    }
    let items = |values: &[Value]| {
        values
            .iter()
            .map(|v| to_json(v, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array)
    };
    Ok(match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| {
                Exception::new(
                    &exceptions::VALUE_ERROR,
                    "Out of range float values are not JSON compliant",
                )
            })?,
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(list) => items(&list.borrow())?,
        Value::Tuple(tuple) => items(tuple)?,
        Value::Dict(dict) => {
            let mut map = serde_json::Map::new();
            for (key, item) in dict.borrow().iter() {
                let key = match key.value() {
                    Value::Str(s) => s.to_string(),
                    Value::None => "null".to_string(),
                    Value::Bool(b) => b.to_string(),
                    k @ (Value::Int(_) | Value::Float(_)) => format::repr(k),
                    other => {
                        return Err(Exception::new(
                            &exceptions::TYPE_ERROR,
                            format!(
                                "keys must be str, int, float, bool or None, not {}",
                                other.type_name()
                            ),
                        ))
                    }
                };
                map.insert(key, to_json(item, depth + 1)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Wrapper(w) => to_json(w.inner(), depth)?,
        other => {
            return Err(Exception::new(
                &exceptions::TYPE_ERROR,
                format!("Object of type {} is not JSON serializable", other.type_name()),
            ))
        }
    })
}
