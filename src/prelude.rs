//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::runtime::{Bindings, Class, Value};
pub use crate::sandbox::{
    config::{EvalOptions, PassThrough, SandboxConfig},
    executor::{const_eval, expr_eval, safe_eval, test_python_expr, Sandbox},
    policy::Policy,
};
pub use crate::syntax::Mode;
