//! Host type identity.
//!
//! A [`Class`] is a cheap, thread-safe handle to a type object. Policy
//! tables store [`ClassId`]s, so they never hold evaluation values.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, LazyLock};

use indexmap::IndexMap;

use crate::runtime::builtins;
use crate::runtime::interp::Vm;
use crate::runtime::value::{CallArgs, Value};
use crate::runtime::VmResult;

/// A native function callable from guest code.
pub type NativeFn = Arc<dyn Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync>;

/// Stable identity of a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(Cow<'static, str>);

impl ClassId {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ClassId {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

struct ClassDef {
    id: ClassId,
    name: String,
    base: Option<Class>,
    constructor: Option<NativeFn>,
    statics: IndexMap<String, NativeFn>,
}

/// A host type object.
#[derive(Clone)]
pub struct Class(Arc<ClassDef>);

impl Class {
    /// Start describing a class; `qualified_name` becomes its [`ClassId`].
    pub fn builder(qualified_name: impl Into<String>) -> ClassBuilder {
        let qualified: String = qualified_name.into();
        let name = qualified
            .rsplit('.')
            .next()
            .unwrap_or(qualified.as_str())
            .to_string();
        ClassBuilder {
            id: ClassId::new(qualified),
            name,
            base: None,
            constructor: None,
            statics: IndexMap::new(),
        }
    }

    pub fn id(&self) -> &ClassId {
        &self.0.id
    }

    /// Short name as shown to guests (`"date"` for `datetime.date`).
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn base(&self) -> Option<&Class> {
        self.0.base.as_ref()
    }

    pub fn constructor(&self) -> Option<&NativeFn> {
        self.0.constructor.as_ref()
    }

    /// A class-level function such as `dict.fromkeys`.
    pub fn static_method(&self, name: &str) -> Option<&NativeFn> {
        self.0
            .statics
            .get(name)
            .or_else(|| self.0.base.as_ref().and_then(|b| b.static_method(name)))
    }

    /// `true` if `self` is `other` or derives from it.
    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.id() == other.id() {
                return true;
            }
            current = class.base();
        }
        false
    }

    /// The class followed by its bases.
    pub fn lineage(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |c| c.base())
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class '{}'>", self.0.id)
    }
}

/// Builder for [`Class`].
pub struct ClassBuilder {
    id: ClassId,
    name: String,
    base: Option<Class>,
    constructor: Option<NativeFn>,
    statics: IndexMap<String, NativeFn>,
}

impl ClassBuilder {
    pub fn base(mut self, base: &Class) -> Self {
        self.base = Some(base.clone());
        self
    }

    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(f));
        self
    }

    pub fn static_method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.statics.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn build(self) -> Class {
        Class(Arc::new(ClassDef {
            id: self.id,
            name: self.name,
            base: self.base,
            constructor: self.constructor,
            statics: self.statics,
        }))
    }
}

macro_rules! plain_class {
    ($($ident:ident => $name:literal),* $(,)?) => {
        $(pub static $ident: LazyLock<Class> = LazyLock::new(|| Class::builder($name).build());)*
    };
}

plain_class! {
    NONE_TYPE => "NoneType",
    SLICE => "slice",
    FUNCTION => "function",
    BUILTIN_FUNCTION => "builtin_function_or_method",
    TYPE => "type",
    MODULE => "module",
    GENERATOR => "generator",
    MAP => "map",
    FILTER => "filter",
    ZIP => "zip",
    ENUMERATE => "enumerate",
    REVERSED => "reversed",
    LIST_ITERATOR => "list_iterator",
}

pub static INT: LazyLock<Class> =
    LazyLock::new(|| Class::builder("int").constructor(builtins::int_new).build());

pub static BOOL: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("bool")
        .base(&INT)
        .constructor(builtins::bool_new)
        .build()
});

pub static FLOAT: LazyLock<Class> =
    LazyLock::new(|| Class::builder("float").constructor(builtins::float_new).build());

pub static STR: LazyLock<Class> =
    LazyLock::new(|| Class::builder("str").constructor(builtins::str_new).build());

pub static LIST: LazyLock<Class> =
    LazyLock::new(|| Class::builder("list").constructor(builtins::list_new).build());

pub static TUPLE: LazyLock<Class> =
    LazyLock::new(|| Class::builder("tuple").constructor(builtins::tuple_new).build());

pub static DICT: LazyLock<Class> = LazyLock::new(|| {
    Class::builder("dict")
        .constructor(builtins::dict_new)
        .static_method("fromkeys", builtins::dict_fromkeys)
        .build()
});

pub static SET: LazyLock<Class> =
    LazyLock::new(|| Class::builder("set").constructor(builtins::set_new).build());

pub static RANGE: LazyLock<Class> =
    LazyLock::new(|| Class::builder("range").constructor(builtins::range_new).build());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_chain() {
        assert!(BOOL.is_subclass_of(&INT));
        assert!(!INT.is_subclass_of(&BOOL));
        assert_eq!(BOOL.lineage().count(), 2);
    }

    #[test]
    fn test_qualified_names() {
        let class = Class::builder("datetime.date").build();
        assert_eq!(class.name(), "date");
        assert_eq!(class.id().as_str(), "datetime.date");
        assert_eq!(format!("{class:?}"), "<class 'datetime.date'>");
    }

    #[test]
    fn test_static_methods_are_inherited() {
        let base = Class::builder("base")
            .static_method("make", |_, _| Ok(Value::None))
            .build();
        let child = Class::builder("child").base(&base).build();
        assert!(child.static_method("make").is_some());
        assert!(child.static_method("other").is_none());
    }
}
