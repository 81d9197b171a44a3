//! # Safe Eval Sandbox
//!
//! Evaluation of untrusted Python-syntax expressions and scripts against an
//! explicit policy.
//!
//! The crate carries its own guest-language front end and tree-walking
//! runtime. Guest source is parsed, checked against a whitelist of syntax
//! node kinds, and rewritten so that every attribute access, subscript and
//! call passes through a runtime gate before it runs. The sandbox enforces:
//!
//! - **Syntax whitelist**: no classes, imports, `with`, `global`, generators or async
//! - **No reflection**: identifiers containing `__` are rejected outright
//! - **Type boundary**: only values of allowed classes reach guest code unwrapped
//! - **Controlled imports**: only modules named by the policy can be loaded
//!
//! ## Example
//!
//! ```rust,ignore
//! use safe_eval_sandbox::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut locals = Bindings::new();
//!     locals.insert("data".into(), Value::from(serde_json::json!({"a": 2, "b": 3})));
//!
//!     safe_eval(
//!         "result = sum(data.get(k, 0) for k in ['a', 'b', 'c'])",
//!         Some(&mut locals),
//!         &EvalOptions::exec(),
//!     )?;
//!     assert_eq!(locals["result"], Value::Int(5));
//!
//!     assert_eq!(expr_eval("2 ** 10")?, Value::Int(1024));
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! 1. **Static check**: forbidden node kinds, dunder names and attribute
//!    assignment are refused before anything runs
//! 2. **Runtime gates**: values crossing attribute, subscript, call and
//!    return boundaries are admitted, wrapped or refused by the type gate
//! 3. **Wrappers**: values that may be used but not trusted are proxied by
//!    [`SafeWrapper`], which re-checks everything it hands out
//! 4. **Call depth**: guest recursion is bounded so it cannot overflow the
//!    host stack
//!
//! ## Resource limits
//!
//! There are none. The sandbox imposes no timeout and no memory ceiling, and
//! a guest loop that never terminates blocks the calling thread. Run
//! evaluations on a thread or process whose lifetime you control when the
//! source is untrusted.

pub mod error;
pub mod prelude;
pub mod runtime;
pub mod sandbox;
pub mod syntax;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use runtime::{Bindings, Class, HostError, HostObject, Value};
pub use sandbox::checker::CodeChecker;
pub use sandbox::config::{EvalOptions, PassThrough, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{
    const_eval, default_sandbox, expr_eval, safe_eval, test_python_expr, CompiledProgram, Sandbox,
    Source,
};
pub use sandbox::policy::{Policy, PolicyBuilder};
pub use sandbox::wrapper::SafeWrapper;
pub use syntax::Mode;
