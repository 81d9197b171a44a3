//! Built-in exception classes and guest exception values.

use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::runtime::class::Class;
use crate::runtime::format;
use crate::runtime::value::Value;
use crate::runtime::{Fault, VmResult};

/// A raised or constructed guest exception.
#[derive(Clone)]
pub struct Exception {
    pub class: Class,
    pub args: Vec<Value>,
    /// The exception named by `raise ... from ...`.
    pub cause: Option<Rc<Exception>>,
}

impl Exception {
    pub fn new(class: &Class, message: impl Into<String>) -> Self {
        Self::with_args(class, vec![Value::from(message.into())])
    }

    pub fn with_args(class: &Class, args: Vec<Value>) -> Self {
        Self {
            class: class.clone(),
            args,
            cause: None,
        }
    }

    /// The message as `str(exc)` renders it.
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [arg] if self.class.is_subclass_of(&KEY_ERROR) => format::repr(arg),
            [arg] => format::to_str(arg),
            args => format::repr(&Value::tuple(args.to_vec())),
        }
    }

    /// `repr(exc)`, e.g. `ValueError('bad')`.
    pub fn repr(&self) -> String {
        let args: Vec<String> = self.args.iter().map(format::repr).collect();
        format!("{}({})", self.class.name(), args.join(", "))
    }

    pub fn is_instance(&self, class: &Class) -> bool {
        self.class.is_subclass_of(class)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<Exception> for Fault {
    fn from(exc: Exception) -> Self {
        Fault::Exception(Rc::new(exc))
    }
}

/// Build a fault carrying a new exception of `class`.
pub fn fault(class: &Class, message: impl Into<String>) -> Fault {
    Exception::new(class, message).into()
}

/// Raise a new exception of `class`.
pub fn raise<T>(class: &Class, message: impl Into<String>) -> VmResult<T> {
    Err(fault(class, message))
}

macro_rules! exception_classes {
    ($($ident:ident => $name:literal $(: $base:ident)?),* $(,)?) => {
        $(
            pub static $ident: LazyLock<Class> = LazyLock::new(|| {
                let builder = Class::builder($name);
                $(let builder = builder.base(&$base);)?
                builder.build()
            });
        )*

        /// Every built-in exception class, in declaration order.
        pub fn all() -> Vec<Class> {
            vec![$((*$ident).clone()),*]
        }
    };
}

exception_classes! {
    EXCEPTION => "Exception",
    ARITHMETIC_ERROR => "ArithmeticError": EXCEPTION,
    ZERO_DIVISION_ERROR => "ZeroDivisionError": ARITHMETIC_ERROR,
    OVERFLOW_ERROR => "OverflowError": ARITHMETIC_ERROR,
    ASSERTION_ERROR => "AssertionError": EXCEPTION,
    ATTRIBUTE_ERROR => "AttributeError": EXCEPTION,
    IMPORT_ERROR => "ImportError": EXCEPTION,
    LOOKUP_ERROR => "LookupError": EXCEPTION,
    INDEX_ERROR => "IndexError": LOOKUP_ERROR,
    KEY_ERROR => "KeyError": LOOKUP_ERROR,
    NAME_ERROR => "NameError": EXCEPTION,
    UNBOUND_LOCAL_ERROR => "UnboundLocalError": NAME_ERROR,
    RUNTIME_ERROR => "RuntimeError": EXCEPTION,
    RECURSION_ERROR => "RecursionError": RUNTIME_ERROR,
    NOT_IMPLEMENTED_ERROR => "NotImplementedError": RUNTIME_ERROR,
    STOP_ITERATION => "StopIteration": EXCEPTION,
    TYPE_ERROR => "TypeError": EXCEPTION,
    VALUE_ERROR => "ValueError": EXCEPTION,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(ZERO_DIVISION_ERROR.is_subclass_of(&ARITHMETIC_ERROR));
        assert!(KEY_ERROR.is_subclass_of(&LOOKUP_ERROR));
        assert!(RECURSION_ERROR.is_subclass_of(&EXCEPTION));
        assert!(!VALUE_ERROR.is_subclass_of(&TYPE_ERROR));
        assert_eq!(all().len(), 18);
    }

    #[test]
    fn test_messages() {
        let exc = Exception::new(&VALUE_ERROR, "bad value");
        assert_eq!(exc.message(), "bad value");
        assert_eq!(exc.repr(), "ValueError('bad value')");

        let key = Exception::with_args(&KEY_ERROR, vec![Value::from("k")]);
        assert_eq!(key.message(), "'k'");

        let empty = Exception::with_args(&RUNTIME_ERROR, vec![]);
        assert_eq!(empty.message(), "");
    }
}
