//! Policy tables: which syntax, types, modules and builtins guests may use.
//!
//! A [`Policy`] is assembled once through [`PolicyBuilder`] and then shared
//! read-only (`Arc<Policy>`) by every evaluation. The builder can only add
//! entries; nothing is ever removed from the defaults.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

use crate::runtime::class::{self, Class, ClassId};
use crate::runtime::value::{host_fn, Bindings, Builtin, BuiltinKind, Module};
use crate::runtime::{builtins, exceptions, modules, CallArgs, NativeFn, Value, Vm, VmResult};
use crate::syntax::NodeKind;

/// A set of syntax node kinds.
pub type NodeSet = HashSet<NodeKind>;

/// Produces the attributes of an embedder-supplied module.
pub type ModuleLoader = Arc<dyn Fn() -> Bindings + Send + Sync>;

const FORBIDDEN_NODES: [NodeKind; 19] = [
    NodeKind::ClassDef,
    NodeKind::With,
    NodeKind::AsyncWith,
    NodeKind::AsyncFor,
    NodeKind::TryStar,
    NodeKind::Match,
    NodeKind::TypeAlias,
    NodeKind::Global,
    NodeKind::Nonlocal,
    NodeKind::AsyncFunctionDef,
    NodeKind::NamedExpr,
    NodeKind::Yield,
    NodeKind::YieldFrom,
    NodeKind::Await,
    NodeKind::AnnAssign,
    NodeKind::Import,
    NodeKind::ImportFrom,
    NodeKind::Alias,
    NodeKind::MatMult,
];

const MATH_NODES: [NodeKind; 37] = [
    NodeKind::Expression,
    NodeKind::Constant,
    NodeKind::Tuple,
    NodeKind::List,
    NodeKind::BinOp,
    NodeKind::UnaryOp,
    NodeKind::BoolOp,
    NodeKind::Compare,
    NodeKind::IfExp,
    NodeKind::Add,
    NodeKind::Sub,
    NodeKind::Mult,
    NodeKind::Div,
    NodeKind::FloorDiv,
    NodeKind::Mod,
    NodeKind::Pow,
    NodeKind::LShift,
    NodeKind::RShift,
    NodeKind::BitOr,
    NodeKind::BitXor,
    NodeKind::BitAnd,
    NodeKind::UAdd,
    NodeKind::USub,
    NodeKind::Not,
    NodeKind::Invert,
    NodeKind::And,
    NodeKind::Or,
    NodeKind::Eq,
    NodeKind::NotEq,
    NodeKind::Lt,
    NodeKind::LtE,
    NodeKind::Gt,
    NodeKind::GtE,
    NodeKind::Is,
    NodeKind::IsNot,
    NodeKind::In,
    NodeKind::NotIn,
];

static ALLOWED_NODES: LazyLock<NodeSet> = LazyLock::new(|| {
    NodeKind::ALL
        .iter()
        .copied()
        .filter(|kind| !FORBIDDEN_NODES.contains(kind))
        .collect()
});

/// Node kinds permitted by default in full programs.
pub fn allowed_nodes() -> &'static NodeSet {
    &ALLOWED_NODES
}

static MATH: LazyLock<NodeSet> = LazyLock::new(|| MATH_NODES.into_iter().collect());

/// Node kinds permitted by [`expr_eval`](crate::sandbox::executor::Sandbox::expr_eval).
pub fn math_nodes() -> &'static NodeSet {
    &MATH
}

/// The sandbox's static tables.
pub struct Policy {
    allowed_nodes: NodeSet,
    math_nodes: NodeSet,
    allowed_types: HashSet<ClassId>,
    allowed_instances: HashSet<ClassId>,
    wrapped_types: HashSet<ClassId>,
    callable_kinds: HashSet<ClassId>,
    allowed_modules: HashSet<String>,
    import_modules: HashSet<String>,
    loaders: HashMap<String, ModuleLoader>,
    extra_builtins: Vec<(String, NativeFn)>,
}

impl Policy {
    /// Start from the default tables.
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    pub fn allowed_nodes(&self) -> &NodeSet {
        &self.allowed_nodes
    }

    pub fn math_nodes(&self) -> &NodeSet {
        &self.math_nodes
    }

    /// `true` if the class object may be named and passed around.
    pub fn is_allowed_type(&self, id: &ClassId) -> bool {
        self.allowed_types.contains(id)
    }

    /// `true` if instances of the class cross the boundary untouched.
    pub fn is_allowed_instance(&self, id: &ClassId) -> bool {
        self.allowed_instances.contains(id)
    }

    /// `true` if instances and the class object cross only inside a wrapper.
    pub fn is_wrapped_type(&self, id: &ClassId) -> bool {
        self.wrapped_types.contains(id)
    }

    /// `true` for ordinary callables: guest functions and native builtins.
    pub fn is_callable_kind(&self, id: &ClassId) -> bool {
        self.callable_kinds.contains(id)
    }

    /// `true` if module objects with this name are proxied rather than refused.
    pub fn is_allowed_module(&self, name: &str) -> bool {
        self.allowed_modules.contains(name)
    }

    /// `true` if the controlled importer may load this module.
    pub fn is_import_allowed(&self, name: &str) -> bool {
        self.import_modules.contains(name)
    }

    /// Load a fresh module object, if importing it is allowed.
    pub fn load_module(&self, name: &str) -> Option<Value> {
        if !self.is_import_allowed(name) {
            return None;
        }
        match self.loaders.get(name) {
            Some(loader) => Some(Value::Module(Rc::new(Module::new(name, loader())))),
            None => modules::load(name),
        }
    }

    /// The names every guest program sees implicitly.
    pub fn builtins(&self) -> Bindings {
        let mut names = builtins::namespace();
        for (name, func) in &self.extra_builtins {
            let builtin = Builtin::new(name.clone(), func.clone(), BuiltinKind::Function);
            names.insert(name.clone(), Value::Builtin(Rc::new(builtin)));
        }
        names
    }
}

impl Default for Policy {
    fn default() -> Self {
        PolicyBuilder::default().into_policy()
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&String> = self.import_modules.iter().collect();
        modules.sort();
        f.debug_struct("Policy")
            .field("allowed_nodes", &self.allowed_nodes.len())
            .field("allowed_types", &self.allowed_types.len())
            .field("allowed_instances", &self.allowed_instances.len())
            .field("wrapped_types", &self.wrapped_types.len())
            .field("import_modules", &modules)
            .field("extra_builtins", &self.extra_builtins.len())
            .finish()
    }
}

/// Builder for [`Policy`]. Every method adds; nothing can be taken away.
pub struct PolicyBuilder {
    policy: Policy,
}

impl Default for PolicyBuilder {
    fn default() -> Self {
        let mut types: Vec<Class> = vec![
            class::BOOL.clone(),
            class::INT.clone(),
            class::FLOAT.clone(),
            class::STR.clone(),
            class::LIST.clone(),
            class::TUPLE.clone(),
            class::DICT.clone(),
            class::SET.clone(),
            class::RANGE.clone(),
        ];
        types.extend(exceptions::all());
        types.extend(modules::datetime_classes());

        let instances_only = [
            &class::NONE_TYPE,
            &class::SLICE,
            &class::FUNCTION,
            &class::BUILTIN_FUNCTION,
            &class::GENERATOR,
            &class::MAP,
            &class::FILTER,
            &class::ZIP,
            &class::ENUMERATE,
            &class::REVERSED,
            &class::LIST_ITERATOR,
        ];

        let allowed_types: HashSet<ClassId> = types.iter().map(|c| c.id().clone()).collect();
        let mut allowed_instances = allowed_types.clone();
        allowed_instances.extend(instances_only.iter().map(|c| c.id().clone()));

        let standard: HashSet<String> = modules::STANDARD_MODULES
            .iter()
            .map(|name| name.to_string())
            .collect();

        Self {
            policy: Policy {
                allowed_nodes: allowed_nodes().clone(),
                math_nodes: math_nodes().clone(),
                allowed_types,
                allowed_instances,
                wrapped_types: HashSet::new(),
                callable_kinds: [class::FUNCTION.id().clone(), class::BUILTIN_FUNCTION.id().clone()]
                    .into_iter()
                    .collect(),
                allowed_modules: standard.clone(),
                import_modules: standard,
                loaders: HashMap::new(),
                extra_builtins: Vec::new(),
            },
        }
    }
}

impl PolicyBuilder {
    /// Let guests name `class` and pass its instances around.
    pub fn allow_type(mut self, class: &Class) -> Self {
        self.policy.allowed_types.insert(class.id().clone());
        self.policy.allowed_instances.insert(class.id().clone());
        self
    }

    /// Let instances of `class` cross the boundary; the class object itself stays hidden.
    pub fn allow_instance(mut self, class: &Class) -> Self {
        self.policy.allowed_instances.insert(class.id().clone());
        self
    }

    /// Let `class` and its instances in, but only behind a `SafeWrapper`.
    pub fn wrap_type(mut self, class: &Class) -> Self {
        self.policy.wrapped_types.insert(class.id().clone());
        self
    }

    /// Proxy module objects named `name` instead of refusing them.
    pub fn allow_module(mut self, name: impl Into<String>) -> Self {
        self.policy.allowed_modules.insert(name.into());
        self
    }

    /// Let the controlled importer load `name`.
    pub fn allow_import(mut self, name: impl Into<String>) -> Self {
        self.policy.import_modules.insert(name.into());
        self
    }

    /// Register an importable module built by `loader`; it is also proxied.
    pub fn module<F>(mut self, name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Bindings + Send + Sync + 'static,
    {
        let name = name.into();
        self.policy.loaders.insert(name.clone(), Arc::new(loader));
        self.allow_import(name.clone()).allow_module(name)
    }

    /// Add a native function to the builtins every guest sees.
    pub fn builtin_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.policy.extra_builtins.push((name.into(), Arc::new(f)));
        self
    }

    /// Add a builtin implemented as a fallible host function.
    ///
    /// Errors become guest exceptions; see [`HostError`](crate::runtime::HostError).
    pub fn builtin_host_fn<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.policy.extra_builtins.push((name.into(), host_fn(f)));
        self
    }

    fn into_policy(self) -> Policy {
        self.policy
    }

    /// Freeze the tables.
    pub fn build(self) -> Arc<Policy> {
        Arc::new(self.into_policy())
    }
}

/// Attributes for a module registered with [`PolicyBuilder::module`].
pub fn module_attrs<I>(entries: I) -> Bindings
where
    I: IntoIterator<Item = (&'static str, Value)>,
{
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_math_nodes_are_allowed_nodes() {
        assert!(math_nodes().is_subset(allowed_nodes()));
        assert!(!math_nodes().contains(&NodeKind::Name));
        assert!(!math_nodes().contains(&NodeKind::Call));
        assert!(math_nodes().contains(&NodeKind::Pow));
    }

    #[test]
    fn test_forbidden_nodes_excluded() {
        for kind in FORBIDDEN_NODES {
            assert!(!allowed_nodes().contains(&kind), "{kind} should be forbidden");
        }
        assert!(allowed_nodes().contains(&NodeKind::FunctionDef));
        assert!(allowed_nodes().contains(&NodeKind::Try));
        assert!(allowed_nodes().contains(&NodeKind::JoinedStr));
    }

    #[test]
    fn test_default_types() {
        let policy = Policy::default();
        assert!(policy.is_allowed_type(class::INT.id()));
        assert!(policy.is_allowed_instance(class::INT.id()));
        assert!(policy.is_allowed_instance(class::FUNCTION.id()));
        assert!(!policy.is_allowed_type(class::FUNCTION.id()));
        assert!(!policy.is_allowed_instance(class::TYPE.id()));
        assert!(!policy.is_allowed_instance(class::MODULE.id()));
        assert!(policy.is_allowed_type(exceptions::KEY_ERROR.id()));
        for class in modules::datetime_classes() {
            assert!(policy.is_allowed_type(class.id()));
        }
    }

    #[test]
    fn test_types_are_instances() {
        let policy = Policy::default();
        for id in &policy.allowed_types {
            assert!(policy.is_allowed_instance(id));
        }
    }

    #[test]
    fn test_builder_adds_entries() {
        let record = Class::builder("app.Record").build();
        let mock = Class::builder("tests.Mock").build();
        let policy = Policy::builder()
            .allow_instance(&record)
            .wrap_type(&mock)
            .allow_import("extra")
            .build();
        assert!(policy.is_allowed_instance(record.id()));
        assert!(!policy.is_allowed_type(record.id()));
        assert!(policy.is_wrapped_type(mock.id()));
        assert!(policy.is_import_allowed("extra"));
        assert!(policy.is_import_allowed("math"));
        assert!(!policy.is_import_allowed("os"));
    }

    #[test]
    fn test_load_module() {
        let policy = Policy::builder()
            .module("settings", || module_attrs([("precision", Value::Int(2))]))
            .build();
        assert!(policy.is_allowed_module("settings"));
        match policy.load_module("settings") {
            Some(Value::Module(module)) => {
                assert_eq!(module.name, "settings");
                assert!(module.attrs.contains_key("precision"));
            }
            other => panic!("expected module, got {other:?}"),
        }
        assert!(policy.load_module("json").is_some());
        assert!(policy.load_module("os").is_none());
    }

    #[test]
    fn test_extra_builtins() {
        let policy = Policy::builder()
            .builtin_fn("twice", |_, args| {
                let n = args.positional.first().and_then(Value::as_int).unwrap_or(0);
                Ok(Value::Int(n * 2))
            })
            .build();
        let names = policy.builtins();
        assert!(names.contains_key("twice"));
        assert!(names.contains_key("len"));
        assert!(names.contains_key("ZeroDivisionError"));
    }
}
