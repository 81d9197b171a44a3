//! The host runtime guest programs execute on.
//!
//! `value` and `class` define what guest code manipulates, `interp` walks the
//! syntax tree, and `builtins`/`methods`/`modules` supply the library.

use std::fmt;
use std::rc::Rc;

use crate::error::{NamingViolation, SandboxError, SyntaxViolation, TypeViolation};

pub mod builtins;
pub mod class;
pub mod exceptions;
pub mod format;
pub mod interp;
pub mod literal;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod value;

pub use class::{Class, ClassId, NativeFn};
pub use exceptions::Exception;
pub use interp::Vm;
pub use value::{Bindings, CallArgs, HashKey, HostError, HostObject, Value};

/// Why evaluation stopped abnormally.
pub enum Fault {
    /// A guest exception; `try`/`except` can handle it.
    Exception(Rc<Exception>),
    /// A sandbox violation; it unwinds through every guest handler.
    Violation(SandboxError),
}

impl Fault {
    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Fault::Exception(exc) => Some(exc),
            Fault::Violation(_) => None,
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Exception(exc) => write!(f, "Exception({})", exc.repr()),
            Fault::Violation(err) => write!(f, "Violation({err})"),
        }
    }
}

impl From<SandboxError> for Fault {
    fn from(err: SandboxError) -> Self {
        Fault::Violation(err)
    }
}

impl From<SyntaxViolation> for Fault {
    fn from(err: SyntaxViolation) -> Self {
        Fault::Violation(err.into())
    }
}

impl From<NamingViolation> for Fault {
    fn from(err: NamingViolation) -> Self {
        Fault::Violation(err.into())
    }
}

impl From<TypeViolation> for Fault {
    fn from(err: TypeViolation) -> Self {
        Fault::Violation(err.into())
    }
}

/// Result of any runtime operation.
pub type VmResult<T> = Result<T, Fault>;
