//! Runtime gates injected into every checked program.
//!
//! The checker rewrites attribute access, subscripts and calls into calls of
//! the builtins defined here, so every value a guest reaches through one of
//! those operations is judged against the policy snapshot held by a
//! [`TypeGate`].

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{SyntaxKind, SyntaxViolation, TypeViolation};
use crate::runtime::class::{Class, ClassId};
use crate::runtime::exceptions::{self, raise};
use crate::runtime::value::{Bindings, Builtin, BuiltinKind};
use crate::runtime::{CallArgs, NativeFn, Value, Vm, VmResult};
use crate::sandbox::policy::Policy;
use crate::sandbox::wrapper::SafeWrapper;

/// Name of the type gate in guest globals.
pub const TYPE_GATE: &str = "__sandbox_check_type";
/// Name of the call gate in guest globals.
pub const CALL_GATE: &str = "__sandbox_call";
/// Name of the wrapper constructor in guest globals.
pub const WRAP: &str = "__sandbox_wrap";
/// Name of the controlled importer.
pub const IMPORT: &str = "__import__";

/// Names callers may not bind; guests cannot spell them because of the `__`.
pub const RESERVED_NAMES: [&str; 3] = [TYPE_GATE, CALL_GATE, WRAP];

/// How a value may cross the boundary.
enum Admission {
    Verbatim,
    Wrap,
    Refuse(TypeViolation),
}

/// The type gate of one evaluation: policy plus per-call additions.
pub struct TypeGate {
    policy: Arc<Policy>,
    extra_instances: HashSet<ClassId>,
    extra_types: HashSet<ClassId>,
}

impl TypeGate {
    /// Snapshot `policy` extended with per-call types and instances.
    ///
    /// Per-call types are also admitted as instances.
    pub fn new(
        policy: Arc<Policy>,
        sandboxed_instances: &[Class],
        sandboxed_types: &[Class],
    ) -> Arc<Self> {
        let extra_types: HashSet<ClassId> =
            sandboxed_types.iter().map(|c| c.id().clone()).collect();
        let mut extra_instances: HashSet<ClassId> =
            sandboxed_instances.iter().map(|c| c.id().clone()).collect();
        extra_instances.extend(extra_types.iter().cloned());
        Arc::new(Self {
            policy,
            extra_instances,
            extra_types,
        })
    }

    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    fn allows_instance(&self, class: &Class) -> bool {
        self.policy.is_allowed_instance(class.id()) || self.extra_instances.contains(class.id())
    }

    fn allows_type(&self, class: &Class) -> bool {
        self.policy.is_allowed_type(class.id()) || self.extra_types.contains(class.id())
    }

    /// `true` for values a wrapper may hold without consulting the gate.
    pub fn is_transparent(&self, value: &Value) -> bool {
        match value {
            Value::Class(class) => self.allows_type(class),
            Value::Module(module) => self.policy.is_allowed_module(&module.name),
            other => self.allows_instance(&other.class()),
        }
    }

    fn admission(&self, value: &Value) -> Admission {
        if let Value::Builtin(builtin) = value {
            if builtin.is_forbidden() {
                return Admission::Refuse(forbidden(builtin));
            }
        }
        match value {
            Value::Wrapper(_) => Admission::Verbatim,
            Value::Class(class) if self.allows_type(class) => Admission::Verbatim,
            Value::Class(class) if self.policy.is_wrapped_type(class.id()) => Admission::Wrap,
            Value::Class(class) => {
                Admission::Refuse(TypeViolation::unsafe_type(&format!("type[{}]", class.id())))
            }
            Value::Module(module) if self.policy.is_allowed_module(&module.name) => Admission::Wrap,
            Value::Module(module) => Admission::Refuse(TypeViolation::new(
                "module",
                format!("module {:?} cannot cross the sandbox boundary", module.name),
            )),
            other => {
                let class = other.class();
                if self.allows_instance(&class) {
                    Admission::Verbatim
                } else if self.policy.is_wrapped_type(class.id()) {
                    Admission::Wrap
                } else {
                    Admission::Refuse(TypeViolation::unsafe_type(class.id().as_str()))
                }
            }
        }
    }

    /// Validate `value`, wrapping it when the policy says so.
    pub fn check(self: &Arc<Self>, value: Value) -> VmResult<Value> {
        match self.admission(&value) {
            Admission::Verbatim => Ok(value),
            Admission::Wrap => {
                #[cfg(feature = "tracing")]
                tracing::trace!(type_name = %value.type_name(), "wrapping value at sandbox boundary");
                Ok(Value::Wrapper(SafeWrapper::new(self, value)))
            }
            Admission::Refuse(violation) => Err(violation.into()),
        }
    }

    /// Validate `value` without keeping a wrapped copy.
    pub fn validate(&self, value: &Value) -> VmResult<()> {
        match self.admission(value) {
            Admission::Refuse(violation) => Err(violation.into()),
            _ => Ok(()),
        }
    }

    /// Broker a guest call of `func`.
    pub fn call(self: &Arc<Self>, vm: &mut Vm, func: Value, args: CallArgs) -> VmResult<Value> {
        if let Value::Builtin(builtin) = &func {
            if builtin.is_forbidden() {
                return Err(forbidden(builtin).into());
            }
        }
        for value in args.values() {
            self.validate(value)?;
        }
        if let Value::Wrapper(wrapper) = &func {
            return wrapper.call(vm, args);
        }
        let class = func.class();
        if self.policy.is_callable_kind(class.id()) {
            let result = vm.call(&func, args)?;
            return self.check(result);
        }
        let trusted = match &func {
            Value::Class(class) => self.allows_type(class),
            _ => self.allows_instance(&class),
        };
        if trusted {
            return vm.call(&func, args);
        }
        if let Admission::Wrap = self.admission(&func) {
            return SafeWrapper::new(self, func).call(vm, args);
        }
        let name = match &func {
            Value::Class(class) => class.id().to_string(),
            other => other.type_name(),
        };
        Err(SyntaxViolation::new(
            SyntaxKind::NotCallable,
            format!("'{name}' object is not callable in the sandbox"),
            None,
        )
        .into())
    }

    /// The internal builtins the checked program refers to.
    pub fn bindings(self: &Arc<Self>) -> Bindings {
        let mut names = Bindings::new();

        let gate = self.clone();
        names.insert(
            TYPE_GATE.to_string(),
            internal(TYPE_GATE, move |_, args| {
                let [value] = args.bind(TYPE_GATE, ["value"], 1)?;
                gate.check(value.unwrap_or(Value::None))
            }),
        );

        let gate = self.clone();
        names.insert(
            CALL_GATE.to_string(),
            internal(CALL_GATE, move |vm, mut args| {
                if args.positional.is_empty() {
                    return raise(
                        &exceptions::TYPE_ERROR,
                        format!("{CALL_GATE}() missing the callable"),
                    );
                }
                let func = args.positional.remove(0);
                gate.call(vm, func, args)
            }),
        );

        let gate = self.clone();
        names.insert(
            WRAP.to_string(),
            internal(WRAP, move |_, args| {
                let [value, checker] = args.bind(WRAP, ["value", "checker"], 2)?;
                match checker {
                    Some(Value::Builtin(b)) if b.kind == BuiltinKind::Internal && b.name == TYPE_GATE => {}
                    _ => {
                        return Err(TypeViolation::new(
                            "builtin_function_or_method",
                            format!("{WRAP}() requires the sandbox type gate"),
                        )
                        .into())
                    }
                }
                SafeWrapper::wrap(&gate, value.unwrap_or(Value::None))
            }),
        );

        let policy = self.policy.clone();
        names.insert(
            IMPORT.to_string(),
            internal(IMPORT, move |_, args| {
                let [name] = args.bind(IMPORT, ["name"], 1)?;
                let Some(Value::Str(name)) = name else {
                    return raise(&exceptions::TYPE_ERROR, "module name must be a string");
                };
                match policy.load_module(&name) {
                    Some(module) => Ok(module),
                    None => raise(
                        &exceptions::IMPORT_ERROR,
                        format!("import of {name:?} is not allowed"),
                    ),
                }
            }),
        );

        names
    }
}

fn internal<F>(name: &'static str, f: F) -> Value
where
    F: Fn(&mut Vm, CallArgs) -> VmResult<Value> + Send + Sync + 'static,
{
    let func: NativeFn = Arc::new(f);
    Value::Builtin(Rc::new(Builtin::new(name, func, BuiltinKind::Internal)))
}

fn forbidden(builtin: &Builtin) -> TypeViolation {
    match (&builtin.kind, &builtin.bound) {
        (BuiltinKind::Unsafe, Some(receiver)) => TypeViolation::new(
            "builtin_function_or_method",
            format!(
                "'{}.{}' is forbidden in the sandbox",
                receiver.type_name(),
                builtin.name
            ),
        ),
        _ => TypeViolation::new(
            "builtin_function_or_method",
            format!("'{}' cannot be used by guest code", builtin.name),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::HostObject;
    use crate::runtime::{methods, modules, Fault};
    use std::any::Any;

    struct Opaque;

    impl HostObject for Opaque {
        fn class(&self) -> Class {
            Class::builder("tests.Opaque").build()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn gate() -> Arc<TypeGate> {
        TypeGate::new(Arc::new(Policy::default()), &[], &[])
    }

    fn is_type_violation<T: std::fmt::Debug>(result: VmResult<T>) -> bool {
        matches!(result, Err(Fault::Violation(err)) if err.is_type_violation())
    }

    #[test]
    fn test_plain_values_pass_verbatim() {
        let gate = gate();
        let list = Value::list(vec![Value::Int(1)]);
        let checked = gate.check(list.clone()).unwrap();
        assert!(checked.is(&list));
        assert!(matches!(gate.check(Value::None).unwrap(), Value::None));
    }

    #[test]
    fn test_unknown_object_refused() {
        let gate = gate();
        assert!(is_type_violation(gate.check(Value::object(Opaque))));
    }

    #[test]
    fn test_sandboxed_instances_extend_policy() {
        let class = Opaque.class();
        let gate = TypeGate::new(Arc::new(Policy::default()), &[class.clone()], &[]);
        assert!(gate.check(Value::object(Opaque)).is_ok());
        assert!(is_type_violation(gate.check(Value::Class(class))));
    }

    #[test]
    fn test_modules_are_wrapped() {
        let gate = gate();
        let math = modules::load("math").unwrap();
        assert!(matches!(gate.check(math).unwrap(), Value::Wrapper(_)));
    }

    #[test]
    fn test_unknown_module_refused() {
        let gate = gate();
        let module = Value::Module(Rc::new(crate::runtime::value::Module::new(
            "os",
            Default::default(),
        )));
        assert!(is_type_violation(gate.check(module)));
    }

    #[test]
    fn test_str_format_is_forbidden() {
        let gate = gate();
        let format = methods::lookup(&Value::from("{}"), "format").unwrap();
        match gate.check(format) {
            Err(Fault::Violation(err)) => assert!(err.to_string().contains("'str.format'")),
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn test_internal_builtins_refused() {
        let gate = gate();
        let names = gate.bindings();
        for name in [TYPE_GATE, CALL_GATE, WRAP, IMPORT] {
            assert!(is_type_violation(gate.check(names[name].clone())), "{name}");
        }
    }

    #[test]
    fn test_call_gate_checks_arguments() {
        let gate = gate();
        let mut vm = Vm::default();
        let len = crate::runtime::builtins::namespace()["len"].clone();
        let ok = gate.call(&mut vm, len.clone(), CallArgs::new(vec![Value::from("abc")]));
        assert_eq!(ok.unwrap(), Value::Int(3));
        let refused = gate.call(&mut vm, len, CallArgs::new(vec![Value::object(Opaque)]));
        assert!(is_type_violation(refused));
    }

    #[test]
    fn test_call_gate_refuses_non_callables() {
        let gate = gate();
        let mut vm = Vm::default();
        let class = Value::Class(Opaque.class());
        match gate.call(&mut vm, class, CallArgs::default()) {
            Err(Fault::Violation(err)) => {
                assert!(err.is_syntax());
                assert!(err.to_string().contains("not callable in the sandbox"));
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn test_allowed_type_constructs() {
        let gate = gate();
        let mut vm = Vm::default();
        let int = Value::Class(crate::runtime::class::INT.clone());
        let value = gate
            .call(&mut vm, int, CallArgs::new(vec![Value::from("42")]))
            .unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[test]
    fn test_importer() {
        let gate = gate();
        let mut vm = Vm::default();
        let import = gate.bindings()[IMPORT].clone();
        let json = vm.call(&import, CallArgs::new(vec![Value::from("json")]));
        assert!(matches!(json, Ok(Value::Module(_))));
        match vm.call(&import, CallArgs::new(vec![Value::from("os")])) {
            Err(Fault::Exception(exc)) => assert!(exc.is_instance(&exceptions::IMPORT_ERROR)),
            other => panic!("expected ImportError, got {other:?}"),
        }
    }
}
