//! Benchmarks for the expression sandbox.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use safe_eval_sandbox::prelude::*;
use safe_eval_sandbox::syntax::parse;
use safe_eval_sandbox::{default_sandbox, CodeChecker};

const RULE: &str = "\
total = 0
for item in items:
    if item['qty'] > 0:
        total += item['qty'] * item['price']
discount = 0.1 if total > 100 else 0
result = round(total * (1 - discount), 2)
";

fn items(count: usize) -> Value {
    let items: Vec<serde_json::Value> = (0..count)
        .map(|i| serde_json::json!({"qty": i % 4, "price": 2.5}))
        .collect();
    Value::from(serde_json::Value::Array(items))
}

/// Benchmark the front end: parsing alone, then parsing plus checking.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("parse_rule", |b| {
        b.iter(|| black_box(parse(black_box(RULE), Mode::Exec).unwrap()));
    });

    let nodes = default_sandbox().policy().allowed_nodes().clone();
    group.bench_function("parse_and_check_rule", |b| {
        b.iter(|| {
            let program = parse(black_box(RULE), Mode::Exec).unwrap();
            black_box(CodeChecker::new(&nodes).check_and_transform(program).unwrap())
        });
    });

    group.bench_function("compile_rule", |b| {
        b.iter(|| black_box(default_sandbox().compile(black_box(RULE), Mode::Exec).unwrap()));
    });

    group.finish();
}

/// Benchmark the three expression entry points on small inputs.
fn bench_expressions(c: &mut Criterion) {
    let mut group = c.benchmark_group("expressions");

    group.bench_function("safe_eval_arithmetic", |b| {
        b.iter(|| black_box(safe_eval("1 + 2 * 3", None, &EvalOptions::default()).unwrap()));
    });

    group.bench_function("expr_eval_arithmetic", |b| {
        b.iter(|| black_box(expr_eval("(1 + 2) * 3 ** 2 - 4 / 5").unwrap()));
    });

    group.bench_function("const_eval_literal", |b| {
        b.iter(|| black_box(const_eval("{'a': [1, 2, 3], 'b': (True, None, -1.5)}").unwrap()));
    });

    group.bench_function("comprehension", |b| {
        b.iter(|| {
            black_box(safe_eval("[x * x for x in range(100) if x % 3]", None, &EvalOptions::default()).unwrap())
        });
    });

    group.finish();
}

/// Benchmark statement programs over growing inputs.
fn bench_statements(c: &mut Criterion) {
    let mut group = c.benchmark_group("statements");

    for count in [10usize, 100, 1000].iter() {
        let data = items(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("pricing_rule", count), &data, |b, data| {
            b.iter(|| {
                let mut locals = Bindings::new();
                locals.insert("items".into(), data.clone());
                safe_eval(RULE, Some(&mut locals), &EvalOptions::exec()).unwrap();
                black_box(locals)
            });
        });
    }

    group.bench_function("recursive_function", |b| {
        let source = "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\nresult = fib(12)\n";
        b.iter(|| {
            let mut locals = Bindings::new();
            safe_eval(source, Some(&mut locals), &EvalOptions::exec()).unwrap();
            black_box(locals)
        });
    });

    group.finish();
}

/// Benchmark rejection paths, which run before any guest code.
fn bench_rejections(c: &mut Criterion) {
    let mut group = c.benchmark_group("rejections");

    group.bench_function("dunder_attribute", |b| {
        b.iter(|| {
            black_box(
                safe_eval("().__class__.__bases__[0]", None, &EvalOptions::default()).unwrap_err(),
            )
        });
    });

    group.bench_function("syntax_diagnostic", |b| {
        b.iter(|| black_box(test_python_expr("a + (b *", Mode::Eval)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_compile,
    bench_expressions,
    bench_statements,
    bench_rejections,
);

criterion_main!(benches);
