//! `SafeWrapper`: a proxy that re-checks everything leaving a wrapped value.

use std::rc::Rc;
use std::sync::Arc;

use crate::error::{NamingKind, NamingViolation, TypeViolation};
use crate::runtime::class;
use crate::runtime::{ops, CallArgs, Value, Vm, VmResult};
use crate::sandbox::gates::TypeGate;

const UNSAFE_STR_ATTRS: [&str; 2] = ["format", "format_map"];

/// A value guests may use but not trust.
///
/// Attribute reads, subscripts and calls on the wrapper go through the type
/// gate it was created with. The wrapped value itself is never handed out.
pub struct SafeWrapper {
    inner: Value,
    gate: Arc<TypeGate>,
}

impl SafeWrapper {
    /// Wrap `value` as is. Wrapping a wrapper returns the same wrapper.
    pub(crate) fn new(gate: &Arc<TypeGate>, value: Value) -> Rc<Self> {
        match value {
            Value::Wrapper(existing) => existing,
            inner => Rc::new(Self {
                inner,
                gate: gate.clone(),
            }),
        }
    }

    /// Wrap `value`, routing it through the gate unless the policy already
    /// lets it cross untouched.
    pub fn wrap(gate: &Arc<TypeGate>, value: Value) -> VmResult<Value> {
        if matches!(value, Value::Wrapper(_)) || gate.is_transparent(&value) {
            return Ok(Value::Wrapper(Self::new(gate, value)));
        }
        let checked = gate.check(value)?;
        Ok(Value::Wrapper(Self::new(gate, checked)))
    }

    pub(crate) fn inner(&self) -> &Value {
        &self.inner
    }

    /// `wrapper.name`.
    pub fn get_attr(&self, vm: &mut Vm, name: &str) -> VmResult<Value> {
        if name.contains("__") {
            return Err(NamingViolation::new(NamingKind::Identifier, name, None).into());
        }
        let is_str = match &self.inner {
            Value::Str(_) => true,
            Value::Class(c) => *c == *class::STR,
            _ => false,
        };
        if is_str && UNSAFE_STR_ATTRS.contains(&name) {
            return Err(TypeViolation::new(
                "str",
                format!("'str.{name}' is forbidden in the sandbox"),
            )
            .into());
        }
        let value = vm.get_attr(&self.inner, name)?;
        self.gate.check(value)
    }

    /// `wrapper[key]`.
    pub fn get_item(&self, vm: &mut Vm, key: &Value) -> VmResult<Value> {
        self.gate.validate(key)?;
        let value = vm.get_item(&self.inner, key)?;
        self.gate.check(value)
    }

    /// `wrapper[key] = value`.
    pub fn set_item(&self, vm: &mut Vm, key: Value, value: Value) -> VmResult<()> {
        self.gate.validate(&key)?;
        self.gate.validate(&value)?;
        if let Value::Str(text) = &key {
            if text.contains("__") {
                return Err(
                    NamingViolation::new(NamingKind::SubscriptKey, text.to_string(), None).into(),
                );
            }
        }
        vm.set_item(&self.inner, key, value)
    }

    /// `del wrapper[key]`.
    pub fn del_item(&self, vm: &mut Vm, key: &Value) -> VmResult<()> {
        self.gate.validate(key)?;
        vm.del_item(&self.inner, key)
    }

    /// `wrapper(*args, **kwargs)`.
    pub fn call(&self, vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
        for value in args.values() {
            self.gate.validate(value)?;
        }
        let result = vm.call(&self.inner, args)?;
        self.gate.check(result)
    }

    /// Items of `for x in wrapper`, each checked.
    pub fn iterate(&self, vm: &mut Vm) -> VmResult<Vec<Value>> {
        ops::iterate(vm, &self.inner)?
            .into_iter()
            .map(|item| self.gate.check(item))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::RefCell;

    use super::*;
    use crate::runtime::class::Class;
    use crate::runtime::value::HostObject;
    use crate::runtime::{exceptions, modules, Fault};
    use crate::sandbox::policy::Policy;

    /// Records what it was asked for, like a test double.
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    fn recorder_class() -> Class {
        Class::builder("tests.Recorder").build()
    }

    impl HostObject for Recorder {
        fn class(&self) -> Class {
            recorder_class()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn get_attr(&self, _vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
            self.calls.borrow_mut().push(name.to_string());
            Ok(match name {
                "name" => Some(Value::from("recorder")),
                "secret" => Some(Value::object(Recorder {
                    calls: RefCell::default(),
                })),
                _ => None,
            })
        }

        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, _vm: &mut Vm, args: CallArgs) -> VmResult<Value> {
            Ok(Value::Int(args.len() as i64))
        }
    }

    fn gate() -> Arc<TypeGate> {
        let policy = Policy::builder().wrap_type(&recorder_class()).build();
        TypeGate::new(policy, &[], &[])
    }

    fn recorder() -> Value {
        Value::object(Recorder {
            calls: RefCell::default(),
        })
    }

    fn wrapper(value: Value) -> Rc<SafeWrapper> {
        match SafeWrapper::wrap(&gate(), value) {
            Ok(Value::Wrapper(w)) => w,
            other => panic!("expected wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapping_is_idempotent() {
        let gate = gate();
        let once = SafeWrapper::wrap(&gate, recorder()).unwrap();
        let twice = SafeWrapper::wrap(&gate, once.clone()).unwrap();
        match (&once, &twice) {
            (Value::Wrapper(a), Value::Wrapper(b)) => assert!(Rc::ptr_eq(a, b)),
            _ => panic!("expected wrappers"),
        }
    }

    #[test]
    fn test_attribute_results_are_checked() {
        let mut vm = Vm::default();
        let w = wrapper(recorder());
        assert_eq!(w.get_attr(&mut vm, "name").unwrap(), Value::from("recorder"));
        assert!(matches!(w.get_attr(&mut vm, "secret").unwrap(), Value::Wrapper(_)));
        match w.get_attr(&mut vm, "missing") {
            Err(Fault::Exception(exc)) => assert!(exc.is_instance(&exceptions::ATTRIBUTE_ERROR)),
            other => panic!("expected AttributeError, got {other:?}"),
        }
    }

    #[test]
    fn test_dunder_attributes_refused() {
        let mut vm = Vm::default();
        let w = wrapper(recorder());
        match w.get_attr(&mut vm, "__class__") {
            Err(Fault::Violation(err)) => assert!(err.is_naming()),
            other => panic!("expected naming violation, got {other:?}"),
        }
    }

    #[test]
    fn test_str_format_refused() {
        let mut vm = Vm::default();
        let w = wrapper(Value::from("{}"));
        for name in UNSAFE_STR_ATTRS {
            match w.get_attr(&mut vm, name) {
                Err(Fault::Violation(err)) => assert!(err.is_type_violation()),
                other => panic!("expected type violation, got {other:?}"),
            }
        }
        assert!(w.get_attr(&mut vm, "upper").is_ok());
    }

    #[test]
    fn test_subscript_key_check() {
        let mut vm = Vm::default();
        let dict = Value::dict(Default::default());
        let w = wrapper(dict.clone());
        w.set_item(&mut vm, Value::from("ok"), Value::Int(1)).unwrap();
        match w.set_item(&mut vm, Value::from("a__b"), Value::Int(2)) {
            Err(Fault::Violation(err)) => assert!(err.is_naming()),
            other => panic!("expected naming violation, got {other:?}"),
        }
        assert_eq!(w.get_item(&mut vm, &Value::from("ok")).unwrap(), Value::Int(1));
        w.del_item(&mut vm, &Value::from("ok")).unwrap();
        assert_eq!(ops::len(&dict).unwrap(), 0);
    }

    #[test]
    fn test_call_checks_arguments() {
        let mut vm = Vm::default();
        let w = wrapper(recorder());
        let result = w.call(&mut vm, CallArgs::new(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(result.unwrap(), Value::Int(2));
        let math = modules::load("math").unwrap();
        let opaque = Value::Module(Rc::new(crate::runtime::value::Module::new(
            "os",
            Default::default(),
        )));
        assert!(w.call(&mut vm, CallArgs::new(vec![math])).is_ok());
        assert!(matches!(
            w.call(&mut vm, CallArgs::new(vec![opaque])),
            Err(Fault::Violation(_))
        ));
    }

    #[test]
    fn test_module_attributes() {
        let mut vm = Vm::default();
        let w = wrapper(modules::load("math").unwrap());
        assert!(w.get_attr(&mut vm, "pi").unwrap().as_float().is_some());
    }
}
