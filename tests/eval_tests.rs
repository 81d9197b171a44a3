//! End-to-end evaluation tests: the documented scenarios plus coverage of
//! the guest language and the embedding API.

use std::any::Any;

use safe_eval_sandbox::error::SyntaxKind;
use safe_eval_sandbox::sandbox::policy::module_attrs;
use safe_eval_sandbox::prelude::*;
use safe_eval_sandbox::runtime::exceptions;
use safe_eval_sandbox::runtime::{CallArgs, Vm, VmResult};
use safe_eval_sandbox::{default_sandbox, HostError, HostObject};

fn eval(source: &str) -> Value {
    safe_eval(source, None, &EvalOptions::default())
        .unwrap_or_else(|err| panic!("{source}: {err}"))
}

fn run(source: &str) -> Bindings {
    let mut locals = Bindings::new();
    safe_eval(source, Some(&mut locals), &EvalOptions::exec())
        .unwrap_or_else(|err| panic!("{source}: {err}"));
    locals
}

fn shown(source: &str) -> String {
    eval(source).to_string()
}

// -- documented scenarios ----------------------------------------------------

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
}

#[test]
fn test_list_comprehension() {
    assert_eq!(shown("[x*x for x in range(4)]"), "[0, 1, 4, 9]");
}

#[test]
fn test_dunder_import_rejected() {
    let err = safe_eval("__import__('os').system('ls')", None, &EvalOptions::default())
        .unwrap_err();
    assert!(err.is_naming());
    assert!(err.to_string().contains("__import__"));
}

#[test]
fn test_subclass_walk_rejected() {
    let err = safe_eval(
        "().__class__.__bases__[0].__subclasses__()",
        None,
        &EvalOptions::default(),
    )
    .unwrap_err();
    assert!(err.is_naming());
}

#[test]
fn test_str_format_rejected() {
    let mut locals = Bindings::new();
    locals.insert("x".into(), Value::from("hello {}"));
    let err = safe_eval("x.format('a')", Some(&mut locals), &EvalOptions::default())
        .unwrap_err();
    assert!(err.is_violation());
    assert!(err.to_string().contains("format"));
}

#[test]
fn test_diagnostic_for_incomplete_expression() {
    let text = test_python_expr("a +", Mode::Eval).expect("diagnostic");
    assert!(text.contains("line 1"), "{text}");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "a +");
    assert!(lines[2].ends_with('^'));
}

#[test]
fn test_expr_eval_rejects_names() {
    let err = expr_eval("__import__('sys').modules").unwrap_err();
    assert!(err.is_syntax(), "{err:?}");
}

#[test]
fn test_exec_updates_locals() {
    let mut locals = Bindings::new();
    locals.insert("data".into(), Value::from(serde_json::json!({"a": 2, "b": 3})));
    safe_eval(
        "result = sum(data.get(k, 0) for k in ['a','b','c'])\n",
        Some(&mut locals),
        &EvalOptions::exec(),
    )
    .unwrap();
    assert_eq!(locals["result"], Value::Int(5));
}

// -- modes and sources -------------------------------------------------------

#[test]
fn test_eval_mode_requires_expression() {
    let err = safe_eval("x = 1", None, &EvalOptions::default()).unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(
        safe_eval("x = 1", None, &EvalOptions::exec()).unwrap(),
        Value::None
    );
}

#[test]
fn test_bytes_behave_like_text() {
    let text = safe_eval("'é' * 2", None, &EvalOptions::default()).unwrap();
    let bytes = safe_eval("'é' * 2".as_bytes(), None, &EvalOptions::default()).unwrap();
    assert_eq!(text, bytes);
}

#[test]
fn test_leading_blanks_in_eval_mode() {
    assert_eq!(eval("   \t1 + 1"), Value::Int(2));
}

#[test]
fn test_custom_subset() {
    let subset = default_sandbox().policy().math_nodes().clone();
    let options = EvalOptions::default().ast_subset(subset);
    assert_eq!(
        safe_eval("2 ** 8", None, &options).unwrap(),
        Value::Int(256)
    );
    match safe_eval("[i for i in (1, 2)]", None, &options).unwrap_err() {
        SandboxError::Syntax(v) => assert_eq!(v.kind, SyntaxKind::ForbiddenNode),
        other => panic!("expected forbidden syntax, got {other:?}"),
    }
}

// -- language coverage -------------------------------------------------------

#[test]
fn test_functions_and_arguments() {
    let locals = run("\
def add(a, b=10, *rest, scale=1, **extra):
    return (a + b + sum(rest)) * scale + len(extra)
r1 = add(1)
r2 = add(1, 2, 3, 4, scale=2)
r3 = add(1, 1, flag=True)
");
    assert_eq!(locals["r1"], Value::Int(11));
    assert_eq!(locals["r2"], Value::Int(20));
    assert_eq!(locals["r3"], Value::Int(3));
}

#[test]
fn test_closures() {
    let locals = run("\
def counter():
    total = [0]
    def inc(n):
        total[0] += n
        return total[0]
    return inc
c = counter()
c(2)
result = c(3)
");
    assert_eq!(locals["result"], Value::Int(5));
}

#[test]
fn test_caller_names_visible_in_nested_scopes() {
    let mut locals = Bindings::new();
    locals.insert("factor".into(), Value::Int(3));
    let value = safe_eval(
        "[(lambda v: v * factor)(i) for i in range(3)]",
        Some(&mut locals),
        &EvalOptions::default(),
    )
    .unwrap();
    assert_eq!(value.to_string(), "[0, 3, 6]");
}

#[test]
fn test_loops() {
    let locals = run("\
found = None
for n in range(2, 20):
    if n % 7 == 0:
        found = n
        break
else:
    found = -1
count = 0
while count < 5:
    count += 1
    if count == 2:
        continue
else:
    done = True
");
    assert_eq!(locals["found"], Value::Int(7));
    assert_eq!(locals["count"], Value::Int(5));
    assert_eq!(locals["done"], Value::Bool(true));
}

#[test]
fn test_comprehensions() {
    assert_eq!(
        shown("{k: v for k, v in zip('ab', [1, 2])}"),
        "{'a': 1, 'b': 2}"
    );
    assert_eq!(shown("{x % 3 for x in range(10)}"), "{0, 1, 2}");
    assert_eq!(
        shown("[(i, j) for i in range(3) for j in range(i) if j]"),
        "[(2, 1)]"
    );
}

#[test]
fn test_strings() {
    assert_eq!(
        eval("'-'.join(s.upper() for s in 'a b c'.split())"),
        Value::from("A-B-C")
    );
    assert_eq!(
        eval("'%s has %d items' % ('cart', 3)"),
        Value::from("cart has 3 items")
    );
    assert_eq!(eval("'hello'[::-1]"), Value::from("olleh"));
    assert_eq!(eval("f'{3.14159:.2f}|{42:>5}'"), Value::from("3.14|   42"));
}

#[test]
fn test_containers() {
    assert_eq!(shown("[1, 2, 3, 4, 5][1:4:2]"), "[2, 4]");
    assert_eq!(
        shown("sorted([(1, 'b'), (2, 'a')], key=lambda p: p[1])"),
        "[(2, 'a'), (1, 'b')]"
    );
    let locals = run("\
d = {'a': 1}
d['b'] = 2
d.update({'c': 3})
del d['a']
keys = sorted(d.keys())
items = [1, 2, 3]
items.append(4)
");
    assert_eq!(locals["keys"].to_string(), "['b', 'c']");
    assert_eq!(locals["items"].to_string(), "[1, 2, 3, 4]");
}

#[test]
fn test_exception_handling() {
    let locals = run("\
log = []
try:
    try:
        1 / 0
    finally:
        log.append('cleanup')
except ZeroDivisionError:
    log.append('handled')
");
    assert_eq!(locals["log"].to_string(), "['cleanup', 'handled']");
}

#[test]
fn test_guest_raise() {
    match safe_eval("raise ValueError('bad input')\n", None, &EvalOptions::exec()).unwrap_err() {
        SandboxError::Evaluation {
            exception_type,
            message,
            source_text,
        } => {
            assert_eq!(exception_type, "ValueError");
            assert_eq!(message, "bad input");
            assert!(source_text.contains("raise ValueError"));
        }
        other => panic!("expected evaluation error, got {other:?}"),
    }
    let err = safe_eval("assert 1 == 2, 'nope'\n", None, &EvalOptions::exec()).unwrap_err();
    assert!(err.to_string().starts_with("AssertionError"));
}

#[test]
fn test_isinstance() {
    assert_eq!(
        eval("isinstance(1, int) and not isinstance('a', (int, float))"),
        Value::Bool(true)
    );
}

// -- modules -------------------------------------------------------------------

fn with_module(name: &str) -> Bindings {
    let mut locals = Bindings::new();
    locals.insert(name.into(), default_sandbox().import_module(name).unwrap());
    locals
}

#[test]
fn test_json_module() {
    let mut locals = with_module("json");
    let value = safe_eval(
        "json.dumps({'a': [1, 2]})",
        Some(&mut locals),
        &EvalOptions::default(),
    )
    .unwrap();
    assert_eq!(value, Value::from(r#"{"a": [1, 2]}"#));
    let value = safe_eval("json.loads('[1, null]')", Some(&mut locals), &EvalOptions::default())
        .unwrap();
    assert_eq!(value.to_string(), "[1, None]");
}

#[test]
fn test_datetime_module() {
    let mut locals = with_module("datetime");
    let value = safe_eval(
        "str(datetime.date(2024, 2, 28) + datetime.timedelta(1))",
        Some(&mut locals),
        &EvalOptions::default(),
    )
    .unwrap();
    assert_eq!(value, Value::from("2024-02-29"));
}

#[test]
fn test_math_module() {
    let mut locals = with_module("math");
    let value = safe_eval("math.floor(-2.5) + math.factorial(5)", Some(&mut locals), &EvalOptions::default())
        .unwrap();
    assert_eq!(value, Value::Int(117));
}

// -- embedding -----------------------------------------------------------------

/// A host object handed to guests through a wrapper.
struct Account;

fn account_class() -> Class {
    Class::builder("bank.Account").build()
}

impl HostObject for Account {
    fn class(&self) -> Class {
        account_class()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_attr(&self, _vm: &mut Vm, name: &str) -> VmResult<Option<Value>> {
        Ok(match name {
            "balance" => Some(Value::Int(120)),
            "owner" => Some(Value::from("ada")),
            _ => None,
        })
    }
}

#[test]
fn test_wrapped_host_object() {
    let policy = Policy::builder().wrap_type(&account_class()).build();
    let sandbox = Sandbox::with_policy(policy);
    let mut locals = Bindings::new();
    locals.insert("acct".into(), Value::object(Account));

    let value = sandbox
        .safe_eval(
            "acct.owner.upper() + ':' + str(acct.balance - 20)",
            Some(&mut locals),
            &EvalOptions::default(),
        )
        .unwrap();
    assert_eq!(value, Value::from("ADA:100"));

    let value = sandbox
        .safe_eval("acct", Some(&mut locals), &EvalOptions::default())
        .unwrap();
    assert!(matches!(value, Value::Wrapper(_)));
}

#[test]
fn test_per_call_sandboxed_instances() {
    let mut locals = Bindings::new();
    locals.insert("acct".into(), Value::object(Account));
    assert!(safe_eval("acct.balance", Some(&mut locals), &EvalOptions::default())
        .unwrap_err()
        .is_type_violation());

    let options = EvalOptions::default().sandboxed_instances(&[account_class()]);
    assert_eq!(
        safe_eval("acct.balance", Some(&mut locals), &options).unwrap(),
        Value::Int(120)
    );
}

#[test]
fn test_host_functions() {
    let policy = Policy::builder()
        .builtin_host_fn("percent", |args: CallArgs| {
            let text = args
                .positional
                .first()
                .and_then(|v| v.as_str().map(str::to_owned))
                .ok_or_else(|| HostError::new(&exceptions::TYPE_ERROR, "expected text"))?;
            let number: f64 = text.trim_end_matches('%').parse().map_err(|_| {
                HostError::new(&exceptions::VALUE_ERROR, format!("not a percentage: {text}"))
            })?;
            Ok(Value::Float(number / 100.0))
        })
        .build();
    let sandbox = Sandbox::with_policy(policy);
    assert_eq!(
        sandbox.safe_eval("percent('25%') * 4", None, &EvalOptions::default()).unwrap(),
        Value::Float(1.0)
    );
    let locals = {
        let mut locals = Bindings::new();
        sandbox
            .safe_eval(
                "try:\n    percent('lots')\nexcept ValueError as e:\n    msg = str(e)\n",
                Some(&mut locals),
                &EvalOptions::exec(),
            )
            .unwrap();
        locals
    };
    assert_eq!(locals["msg"], Value::from("not a percentage: lots"));
}

#[test]
fn test_custom_module() {
    let policy = Policy::builder()
        .module("settings", || module_attrs([("precision", Value::Int(2))]))
        .build();
    let sandbox = Sandbox::with_policy(policy);
    let mut locals = Bindings::new();
    locals.insert("settings".into(), sandbox.import_module("settings").unwrap());
    assert_eq!(
        sandbox
            .safe_eval("round(2 / 3, settings.precision)", Some(&mut locals), &EvalOptions::default())
            .unwrap(),
        Value::Float(0.67)
    );
}

#[test]
fn test_custom_pass_through() {
    let config = SandboxConfig::builder()
        .pass_through(PassThrough::classes(&[exceptions::KEY_ERROR.clone()]))
        .build();
    let sandbox = Sandbox::new(config);
    match sandbox.safe_eval("{}['k']", None, &EvalOptions::default()).unwrap_err() {
        SandboxError::PassThrough { class, message, .. } => {
            assert!(class.is_subclass_of(&exceptions::LOOKUP_ERROR));
            assert_eq!(message, "'k'");
        }
        other => panic!("expected pass-through, got {other:?}"),
    }
    assert!(sandbox
        .safe_eval("1 // 0", None, &EvalOptions::default())
        .unwrap_err()
        .is_evaluation());
}

#[test]
fn test_const_eval_literals() {
    let source = "{'a': (1, 2.5), 'b': [None, True, -3]}";
    assert_eq!(const_eval(source).unwrap(), eval(source));
    assert!(const_eval("a + 1").unwrap_err().is_evaluation());
}
