//! Property tests over generated guest sources.

use proptest::prelude::*;

use safe_eval_sandbox::error::NamingKind;
use safe_eval_sandbox::prelude::*;
use safe_eval_sandbox::default_sandbox;

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn dunder_name() -> impl Strategy<Value = String> {
    ("[a-z]{0,4}", "[a-z]{0,4}").prop_map(|(head, tail)| format!("{head}__{tail}"))
}

proptest! {
    #[test]
    fn arithmetic_matches_host(a in any::<i32>(), b in any::<i32>()) {
        let (a, b) = (i64::from(a), i64::from(b));
        prop_assert_eq!(expr_eval(&format!("({a}) + ({b})")).unwrap(), Value::Int(a + b));
        prop_assert_eq!(expr_eval(&format!("({a}) - ({b})")).unwrap(), Value::Int(a - b));
        prop_assert_eq!(expr_eval(&format!("({a}) * ({b})")).unwrap(), Value::Int(a * b));
    }

    #[test]
    fn floor_division_rounds_down(a in -10_000i64..10_000, b in -100i64..100) {
        prop_assume!(b != 0);
        let q = floor_div(a, b);
        prop_assert_eq!(expr_eval(&format!("({a}) // ({b})")).unwrap(), Value::Int(q));
        prop_assert_eq!(expr_eval(&format!("({a}) % ({b})")).unwrap(), Value::Int(a - q * b));
    }

    #[test]
    fn dunder_names_always_rejected(name in dunder_name()) {
        for source in [name.clone(), format!("x.{name}"), format!("[0][0].{name}")] {
            let err = safe_eval(&source, None, &EvalOptions::default()).unwrap_err();
            prop_assert!(err.is_naming(), "{}: {:?}", source, err);
        }
    }

    #[test]
    fn int_lists_round_trip_through_const_eval(items in prop::collection::vec(-1_000_000_000_000i64..1_000_000_000_000, 0..8)) {
        let shown = format!(
            "[{}]",
            items.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
        );
        prop_assert_eq!(const_eval(&shown).unwrap().to_string(), shown);
    }

    #[test]
    fn plain_strings_round_trip_through_const_eval(text in "[a-zA-Z0-9 ,.]{0,24}") {
        prop_assert_eq!(const_eval(&format!("'{text}'")).unwrap(), Value::from(text.as_str()));
    }

    #[test]
    fn const_eval_agrees_with_safe_eval(a in any::<i16>(), flag in any::<bool>(), text in "[a-z]{0,6}") {
        let flag = if flag { "True" } else { "False" };
        let source = format!("{{'n': {a}, 'ok': {flag}, 'tags': ('{text}', None)}}");
        let literal = const_eval(&source).unwrap();
        let evaluated = safe_eval(&source, None, &EvalOptions::default()).unwrap();
        prop_assert_eq!(literal.to_string(), evaluated.to_string());
    }

    #[test]
    fn reserved_names_rejected_in_locals(
        name in prop::sample::select(vec!["__sandbox_call", "__sandbox_check_type", "__sandbox_wrap"]),
    ) {
        let mut locals = Bindings::new();
        locals.insert(name.into(), Value::Int(1));
        match safe_eval("1", Some(&mut locals), &EvalOptions::default()).unwrap_err() {
            SandboxError::Naming(v) => prop_assert_eq!(v.kind, NamingKind::ReservedName),
            other => prop_assert!(false, "expected reserved name violation, got {:?}", other),
        }
    }

    #[test]
    fn valid_expressions_have_no_diagnostic(a in any::<u16>(), b in 1u16..) {
        prop_assert_eq!(test_python_expr(&format!("{a} * ({b} + x)"), Mode::Eval), None);
    }

    #[test]
    fn rewrapping_keeps_identity(depth in 1usize..6) {
        let mut locals = Bindings::new();
        locals.insert("math".into(), default_sandbox().import_module("math").unwrap());
        let nested = format!("{}math{}{}", "[".repeat(depth), "]".repeat(depth), "[0]".repeat(depth));
        let options = EvalOptions::default();

        let value = safe_eval(&nested, Some(&mut locals), &options).unwrap();
        prop_assert!(matches!(value, Value::Wrapper(_)), "{:?}", value);
        prop_assert_eq!(
            safe_eval(&format!("{nested} is math"), Some(&mut locals), &options).unwrap(),
            Value::Bool(true)
        );
        prop_assert_eq!(
            safe_eval(&format!("{nested}.pi"), Some(&mut locals), &options).unwrap(),
            Value::Float(std::f64::consts::PI)
        );
    }
}
