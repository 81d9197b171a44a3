//! Sandbox configuration with builder pattern.

use std::fmt;
use std::sync::Arc;

use crate::runtime::class::Class;
use crate::runtime::{exceptions, Bindings};
use crate::sandbox::limits::DEFAULT_MAX_CALL_DEPTH;
use crate::sandbox::policy::{NodeSet, Policy};
use crate::syntax::Mode;

/// Decides which guest exceptions escape unchanged instead of being wrapped
/// in [`SandboxError::Evaluation`](crate::SandboxError::Evaluation).
#[derive(Clone)]
pub struct PassThrough(Arc<dyn Fn(&Class) -> bool + Send + Sync>);

impl PassThrough {
    /// Pass through exceptions whose class satisfies `predicate`.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Class) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Wrap every guest exception.
    pub fn none() -> Self {
        Self::new(|_| false)
    }

    /// Pass through instances of `classes` and their subclasses.
    pub fn classes(classes: &[Class]) -> Self {
        let classes = classes.to_vec();
        Self::new(move |class| classes.iter().any(|c| class.is_subclass_of(c)))
    }

    pub fn matches(&self, class: &Class) -> bool {
        (self.0)(class)
    }
}

impl Default for PassThrough {
    fn default() -> Self {
        Self::classes(&[exceptions::ZERO_DIVISION_ERROR.clone()])
    }
}

impl fmt::Debug for PassThrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PassThrough(..)")
    }
}

/// Configuration for the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Syntax, type and module tables.
    pub policy: Arc<Policy>,
    /// Guest exceptions re-raised unchanged.
    pub pass_through: PassThrough,
    /// Maximum depth of nested guest function calls.
    pub max_call_depth: usize,
    /// Filename reported when an evaluation does not name one.
    pub default_filename: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            policy: Arc::new(Policy::default()),
            pass_through: PassThrough::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            default_filename: "<sandbox>".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    policy: Option<Arc<Policy>>,
    pass_through: Option<PassThrough>,
    max_call_depth: Option<usize>,
    default_filename: Option<String>,
}

impl SandboxConfigBuilder {
    /// Use `policy` instead of the default tables.
    pub fn policy(mut self, policy: Arc<Policy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set which guest exceptions escape unchanged.
    pub fn pass_through(mut self, pass_through: PassThrough) -> Self {
        self.pass_through = Some(pass_through);
        self
    }

    /// Set the maximum guest call depth.
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = Some(depth);
        self
    }

    /// Set the filename used when a call does not give one.
    pub fn default_filename(mut self, filename: impl Into<String>) -> Self {
        self.default_filename = Some(filename.into());
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            policy: self.policy.unwrap_or(default.policy),
            pass_through: self.pass_through.unwrap_or(default.pass_through),
            max_call_depth: self.max_call_depth.unwrap_or(default.max_call_depth),
            default_filename: self.default_filename.unwrap_or(default.default_filename),
        }
    }
}

/// Per-call parameters of [`Sandbox::safe_eval`](crate::Sandbox::safe_eval).
#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    pub mode: Mode,
    pub filename: Option<String>,
    /// Bindings visible to the guest behind its locals.
    pub globals: Option<Bindings>,
    /// Extra classes whose instances may cross the boundary for this call.
    pub sandboxed_instances: Vec<Class>,
    /// Extra classes guests may use as values, and whose instances may cross.
    pub sandboxed_types: Vec<Class>,
    /// Restrict the syntax to this subset of the policy's allowed nodes.
    pub ast_subset: Option<NodeSet>,
}

impl EvalOptions {
    /// Options for a statement program.
    pub fn exec() -> Self {
        Self::default().mode(Mode::Exec)
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn globals(mut self, globals: Bindings) -> Self {
        self.globals = Some(globals);
        self
    }

    pub fn sandboxed_instances(mut self, classes: &[Class]) -> Self {
        self.sandboxed_instances.extend_from_slice(classes);
        self
    }

    pub fn sandboxed_types(mut self, classes: &[Class]) -> Self {
        self.sandboxed_types.extend_from_slice(classes);
        self
    }

    pub fn ast_subset(mut self, nodes: NodeSet) -> Self {
        self.ast_subset = Some(nodes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.default_filename, "<sandbox>");
        assert!(config.pass_through.matches(&exceptions::ZERO_DIVISION_ERROR));
        assert!(!config.pass_through.matches(&exceptions::VALUE_ERROR));
    }

    #[test]
    fn test_builder() {
        let config = SandboxConfig::builder()
            .max_call_depth(16)
            .default_filename("rule.py")
            .pass_through(PassThrough::classes(&[exceptions::LOOKUP_ERROR.clone()]))
            .build();

        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.default_filename, "rule.py");
        assert!(config.pass_through.matches(&exceptions::KEY_ERROR));
        assert!(!config.pass_through.matches(&exceptions::ZERO_DIVISION_ERROR));
    }

    #[test]
    fn test_pass_through_none() {
        assert!(!PassThrough::none().matches(&exceptions::ZERO_DIVISION_ERROR));
    }

    #[test]
    fn test_eval_options_chain() {
        let options = EvalOptions::exec().filename("x.py");
        assert_eq!(options.mode, Mode::Exec);
        assert_eq!(options.filename.as_deref(), Some("x.py"));
        assert!(options.globals.is_none());
    }
}
