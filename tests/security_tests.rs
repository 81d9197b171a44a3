//! Security tests to verify sandbox isolation.
//!
//! These tests attempt various escape techniques to verify the sandbox
//! properly restricts what guest code can reach.

use std::any::Any;
use std::rc::Rc;

use safe_eval_sandbox::error::{NamingKind, SyntaxKind};
use safe_eval_sandbox::prelude::*;
use safe_eval_sandbox::runtime::value::Module;
use safe_eval_sandbox::{default_sandbox, HostObject};

/// Helper to evaluate an expression with the given locals.
fn eval_with(source: &str, locals: &mut Bindings) -> Result<Value> {
    safe_eval(source, Some(locals), &EvalOptions::default())
}

fn exec(source: &str) -> Result<Value> {
    safe_eval(source, None, &EvalOptions::exec())
}

fn eval(source: &str) -> Result<Value> {
    safe_eval(source, None, &EvalOptions::default())
}

fn evaluation_type(err: SandboxError) -> String {
    match err {
        SandboxError::Evaluation { exception_type, .. } => exception_type,
        other => panic!("expected a guest exception, got {other:?}"),
    }
}

/// A host object the policy knows nothing about.
struct Opaque;

impl HostObject for Opaque {
    fn class(&self) -> Class {
        Class::builder("host.Opaque").build()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Test that the dynamic importer cannot be named.
#[test]
fn test_import_builtin_blocked() {
    let err = eval("__import__('os').system('ls')").unwrap_err();
    match err {
        SandboxError::Naming(v) => {
            assert_eq!(v.kind, NamingKind::Identifier);
            assert_eq!(v.name, "__import__");
        }
        other => panic!("expected naming violation, got {other:?}"),
    }
}

/// Test that import statements are rejected before anything runs.
#[test]
fn test_import_statements_blocked() {
    for source in ["import os\n", "from os import system\n", "import math as m\n"] {
        match exec(source).unwrap_err() {
            SandboxError::Syntax(v) => assert_eq!(v.kind, SyntaxKind::ForbiddenNode),
            other => panic!("{source}: expected forbidden syntax, got {other:?}"),
        }
    }
}

/// Test the classic subclass walk back to `object`.
#[test]
fn test_subclass_walk_blocked() {
    let err = eval("().__class__.__bases__[0].__subclasses__()").unwrap_err();
    assert!(err.is_naming());
}

/// Test that reflection attributes are unreachable however they are spelled.
#[test]
fn test_reflection_attributes_blocked() {
    for source in [
        "(lambda: 0).__globals__",
        "type(1).__mro__",
        "[].__class__",
        "f'{().__class__}'",
        "[x.__dict__ for x in [1]]",
    ] {
        assert!(eval(source).unwrap_err().is_naming(), "{source}");
    }
    assert!(exec("def f():\n    pass\ng = f.__code__\n")
        .unwrap_err()
        .is_naming());
}

/// Test that dangerous host functions simply do not exist.
#[test]
fn test_dangerous_builtins_absent() {
    for source in [
        "open('/etc/passwd')",
        "eval('1')",
        "exec('x = 1')",
        "compile('1', 'f', 'eval')",
        "getattr(1, 'real')",
        "globals()",
        "vars()",
        "type(1)",
    ] {
        assert_eq!(evaluation_type(eval(source).unwrap_err()), "NameError", "{source}");
    }
}

/// Test that `str.format` is refused while f-strings keep working.
#[test]
fn test_str_format_blocked() {
    let mut locals = Bindings::new();
    locals.insert("x".into(), Value::from("hello {}"));
    let err = eval_with("x.format('a')", &mut locals).unwrap_err();
    assert!(err.is_type_violation(), "{err:?}");
    assert!(err.to_string().contains("format"));

    let err = eval("'{0.real}'.format_map({})").unwrap_err();
    assert!(err.is_type_violation());

    assert!(eval("str.format('{}', 1)").is_err());

    locals.insert("name".into(), Value::from("world"));
    assert_eq!(
        eval_with("f'hello {name!r:>9}'", &mut locals).unwrap(),
        Value::from("hello   'world'")
    );
}

/// Test that a bound `format` cannot be smuggled out and called later.
#[test]
fn test_str_format_not_smuggled() {
    let err = exec("f = 'x{}'.format\ny = f(1)\n").unwrap_err();
    assert!(err.is_type_violation());
}

/// Test that violations unwind through guest exception handlers.
#[test]
fn test_violations_not_catchable() {
    let source = "\
try:
    y = 'a{}'.format(1)
except Exception:
    y = 'caught'
";
    let mut locals = Bindings::new();
    let err = safe_eval(source, Some(&mut locals), &EvalOptions::exec()).unwrap_err();
    assert!(err.is_type_violation());
    assert!(!locals.contains_key("y"));
}

/// Test that a `finally` block cannot swallow a violation.
#[test]
fn test_violations_survive_finally() {
    let source = "\
def f():
    try:
        y = 'a{}'.format(1)
    finally:
        return 'swallowed'
r = f()
";
    let mut locals = Bindings::new();
    let err = safe_eval(source, Some(&mut locals), &EvalOptions::exec()).unwrap_err();
    assert!(err.is_type_violation(), "{err:?}");
    assert!(!locals.contains_key("r"));

    let source = "\
for i in range(3):
    try:
        y = 'a{}'.format(i)
    finally:
        break
";
    assert!(exec(source).unwrap_err().is_type_violation());

    let source = "\
while True:
    try:
        y = 'a{}'.format(1)
    finally:
        continue
";
    assert!(exec(source).unwrap_err().is_type_violation());
}

/// Test that ordinary guest exceptions remain catchable.
#[test]
fn test_guest_exceptions_catchable() {
    let source = "\
try:
    y = {}['missing']
except KeyError as e:
    y = 'caught ' + str(e)
";
    let mut locals = Bindings::new();
    safe_eval(source, Some(&mut locals), &EvalOptions::exec()).unwrap();
    assert_eq!(locals["y"], Value::from("caught 'missing'"));
}

/// Test that unknown host objects cannot cross the boundary.
#[test]
fn test_unknown_host_object_refused() {
    let mut locals = Bindings::new();
    locals.insert("o".into(), Value::object(Opaque));
    for source in ["o", "o.anything", "len(o)", "o[0]", "[1].append(o)"] {
        let err = eval_with(source, &mut locals).unwrap_err();
        assert!(err.is_type_violation(), "{source}: {err:?}");
    }
    match eval_with("o()", &mut locals).unwrap_err() {
        SandboxError::Syntax(v) => {
            assert_eq!(v.kind, SyntaxKind::NotCallable);
            assert!(v.message.contains("Opaque"), "{}", v.message);
        }
        other => panic!("expected not-callable violation, got {other:?}"),
    }
}

/// Test that only modules named by the policy are usable.
#[test]
fn test_unlisted_module_refused() {
    let mut os = Bindings::new();
    os.insert("name".into(), Value::from("posix"));
    let mut locals = Bindings::new();
    locals.insert("os".into(), Value::Module(Rc::new(Module::new("os", os))));
    let err = eval_with("os.name", &mut locals).unwrap_err();
    assert!(err.is_type_violation());

    let math = default_sandbox().import_module("math").unwrap();
    locals.insert("math".into(), math);
    assert_eq!(eval_with("math.sqrt(16)", &mut locals).unwrap(), Value::Float(4.0));
}

/// Test that attribute assignment is rejected statically.
#[test]
fn test_attribute_assignment_blocked() {
    for source in ["x.y = 1\n", "x.y += 1\n", "del x.y\n", "for x.y in []:\n    pass\n"] {
        match exec(source).unwrap_err() {
            SandboxError::Syntax(v) => assert_eq!(v.kind, SyntaxKind::AssignmentShape, "{source}"),
            other => panic!("{source}: expected assignment violation, got {other:?}"),
        }
    }
}

/// Test that dunder keys cannot be written through subscripts.
#[test]
fn test_dunder_subscript_key_blocked() {
    let mut locals = Bindings::new();
    locals.insert("d".into(), Value::from(serde_json::json!({})));
    let err = safe_eval("d['__class__'] = 1\n", Some(&mut locals), &EvalOptions::exec())
        .unwrap_err();
    match err {
        SandboxError::Naming(v) => assert_eq!(v.kind, NamingKind::SubscriptKey),
        other => panic!("expected naming violation, got {other:?}"),
    }
    safe_eval("d['ok'] = 1\n", Some(&mut locals), &EvalOptions::exec()).unwrap();
}

/// Test that callers cannot shadow the runtime gates.
#[test]
fn test_reserved_names_blocked() {
    let mut locals = Bindings::new();
    locals.insert("__sandbox_call".into(), Value::None);
    let err = eval_with("1", &mut locals).unwrap_err();
    match err {
        SandboxError::Naming(v) => assert_eq!(v.kind, NamingKind::ReservedName),
        other => panic!("expected reserved name violation, got {other:?}"),
    }
}

/// Test that forbidden statement kinds are rejected.
#[test]
fn test_forbidden_statements_blocked() {
    for source in [
        "class A:\n    pass\n",
        "with x:\n    pass\n",
        "global g\n",
        "def f():\n    yield 1\n",
        "async def f():\n    pass\n",
    ] {
        assert!(exec(source).unwrap_err().is_syntax(), "{source}");
    }
}

/// Test that runaway recursion becomes a guest error, not a crash.
#[test]
fn test_recursion_bounded() {
    let err = exec("def f(n):\n    return f(n + 1)\nf(0)\n").unwrap_err();
    assert_eq!(evaluation_type(err), "RecursionError");

    let err = eval("(lambda f: f(f))(lambda f: f(f))").unwrap_err();
    assert_eq!(evaluation_type(err), "RecursionError");
}

/// Test that pathological nesting is a syntax error, not a stack overflow.
#[test]
fn test_deep_nesting_rejected() {
    let deep = format!("{}1{}", "[".repeat(500), "]".repeat(500));
    assert!(eval(&deep).unwrap_err().is_syntax());
}

/// Test that long operator chains are refused instead of overflowing the stack.
#[test]
fn test_long_chains_rejected() {
    let chain = format!("1{}", "+1".repeat(10_000));
    assert!(eval(&chain).unwrap_err().is_syntax());
    assert!(exec(&format!("x = {chain}\n")).unwrap_err().is_syntax());
    assert!(expr_eval(&chain).unwrap_err().is_syntax());
    assert!(test_python_expr(&chain, Mode::Eval).is_some());
    assert!(const_eval(&chain).is_err());

    let strings = format!("'1'{}", "+'1'".repeat(10_000));
    assert!(eval(&strings).unwrap_err().is_syntax());

    let deep = format!("{}1{}", "[".repeat(500), "]".repeat(500));
    assert!(const_eval(&deep).unwrap_err().is_syntax());
}

/// Test that huge repetitions are refused instead of allocating.
#[test]
fn test_memory_exhaustion_protection() {
    assert_eq!(evaluation_type(eval("'a' * (1 << 40)").unwrap_err()), "OverflowError");
    assert_eq!(evaluation_type(eval("[0] * (1 << 40)").unwrap_err()), "OverflowError");
}

/// Test that format widths cannot request unbounded padding.
#[test]
fn test_format_width_bounded() {
    for source in [
        "f'{1:>999999999999}'",
        "format(1, '>999999999999')",
        "format('a', '^999999999999')",
        "f'{1.5:.999999999999f}'",
        "'%999999999999d' % 1",
        "'%*d' % (999999999999, 1)",
        "'a'.ljust(999999999999)",
    ] {
        assert_eq!(evaluation_type(eval(source).unwrap_err()), "OverflowError", "{source}");
    }
    assert_eq!(evaluation_type(eval("'%d' % 1e300").unwrap_err()), "OverflowError");
    assert_eq!(eval("f'{7:>3}'").unwrap(), Value::from("  7"));
}

/// Test that pre-compiled programs cannot be fed back in.
#[test]
fn test_compiled_program_refused() {
    let compiled = default_sandbox().compile("1 + 1", Mode::Eval).unwrap();
    let err = safe_eval(&compiled, None, &EvalOptions::default()).unwrap_err();
    assert!(err.is_type_violation());
}
