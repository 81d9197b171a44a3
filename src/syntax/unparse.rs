//! Render a checked program back to source text.
//!
//! Expressions use the parser crate's own unparser; this module lays out the
//! statements around them.

use std::fmt::Write;

use rustpython_parser::ast::{self, Expr, Stmt};

use crate::syntax::nodes::{stmt_kind, BinOperator};
use crate::syntax::program::{Body, Program};

/// Render a whole program.
pub fn unparse(program: &Program) -> String {
    let mut out = String::new();
    match program.body() {
        Body::Expression(expr) => out.push_str(&unparse_expr(expr)),
        Body::Module(body) => block(&mut out, body, 0),
    }
    out
}

/// Render a single expression.
pub fn unparse_expr(expr: &Expr) -> String {
    expr.to_string()
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("    ");
    }
}

fn block(out: &mut String, body: &[Stmt], level: usize) {
    if body.is_empty() {
        indent(out, level);
        out.push_str("pass\n");
    }
    for stmt in body {
        stmt_into(out, stmt, level);
    }
}

fn suite(out: &mut String, header: &str, body: &[Stmt], level: usize) {
    indent(out, level);
    out.push_str(header);
    out.push_str(":\n");
    block(out, body, level + 1);
}

fn else_suite(out: &mut String, orelse: &[Stmt], level: usize) {
    if !orelse.is_empty() {
        suite(out, "else", orelse, level);
    }
}

fn comma_list(items: &[Expr]) -> String {
    items.iter().map(unparse_expr).collect::<Vec<_>>().join(", ")
}

fn parameters(args: &ast::Arguments) -> String {
    let param = |arg: &ast::ArgWithDefault| match &arg.default {
        Some(default) => format!("{}={}", arg.def.arg, unparse_expr(default)),
        None => arg.def.arg.to_string(),
    };
    let mut parts: Vec<String> = args.posonlyargs.iter().map(param).collect();
    if !args.posonlyargs.is_empty() {
        parts.push("/".into());
    }
    parts.extend(args.args.iter().map(param));
    match &args.vararg {
        Some(vararg) => parts.push(format!("*{}", vararg.arg)),
        None if !args.kwonlyargs.is_empty() => parts.push("*".into()),
        None => {}
    }
    parts.extend(args.kwonlyargs.iter().map(param));
    if let Some(kwarg) = &args.kwarg {
        parts.push(format!("**{}", kwarg.arg));
    }
    parts.join(", ")
}

fn try_into(
    out: &mut String,
    body: &[Stmt],
    handlers: &[ast::ExceptHandler],
    orelse: &[Stmt],
    finalbody: &[Stmt],
    level: usize,
) {
    suite(out, "try", body, level);
    for ast::ExceptHandler::ExceptHandler(handler) in handlers {
        let mut header = String::from("except");
        if let Some(typ) = &handler.type_ {
            let _ = write!(header, " {}", unparse_expr(typ));
        }
        if let Some(name) = &handler.name {
            let _ = write!(header, " as {name}");
        }
        suite(out, &header, &handler.body, level);
    }
    else_suite(out, orelse, level);
    if !finalbody.is_empty() {
        suite(out, "finally", finalbody, level);
    }
}

fn stmt_into(out: &mut String, stmt: &Stmt, level: usize) {
    let line = match stmt {
        Stmt::If(s) => {
            suite(out, &format!("if {}", unparse_expr(&s.test)), &s.body, level);
            else_suite(out, &s.orelse, level);
            return;
        }
        Stmt::While(s) => {
            suite(out, &format!("while {}", unparse_expr(&s.test)), &s.body, level);
            else_suite(out, &s.orelse, level);
            return;
        }
        Stmt::For(s) => {
            let header = format!("for {} in {}", unparse_expr(&s.target), unparse_expr(&s.iter));
            suite(out, &header, &s.body, level);
            else_suite(out, &s.orelse, level);
            return;
        }
        Stmt::Try(s) => {
            try_into(out, &s.body, &s.handlers, &s.orelse, &s.finalbody, level);
            return;
        }
        Stmt::FunctionDef(def) => {
            for decorator in &def.decorator_list {
                indent(out, level);
                let _ = writeln!(out, "@{}", unparse_expr(decorator));
            }
            let header = format!("def {}({})", def.name, parameters(&def.args));
            suite(out, &header, &def.body, level);
            return;
        }
        Stmt::Expr(s) => unparse_expr(&s.value),
        Stmt::Assign(s) => {
            let mut line = String::new();
            for target in &s.targets {
                let _ = write!(line, "{} = ", unparse_expr(target));
            }
            line + &unparse_expr(&s.value)
        }
        Stmt::AugAssign(s) => format!(
            "{} {}= {}",
            unparse_expr(&s.target),
            BinOperator::from(s.op).symbol(),
            unparse_expr(&s.value)
        ),
        Stmt::Pass(_) => "pass".into(),
        Stmt::Break(_) => "break".into(),
        Stmt::Continue(_) => "continue".into(),
        Stmt::Return(s) => match &s.value {
            Some(value) => format!("return {}", unparse_expr(value)),
            None => "return".into(),
        },
        Stmt::Delete(s) => format!("del {}", comma_list(&s.targets)),
        Stmt::Raise(s) => {
            let mut line = String::from("raise");
            if let Some(exc) = &s.exc {
                let _ = write!(line, " {}", unparse_expr(exc));
            }
            if let Some(cause) = &s.cause {
                let _ = write!(line, " from {}", unparse_expr(cause));
            }
            line
        }
        Stmt::Assert(s) => match &s.msg {
            Some(msg) => format!("assert {}, {}", unparse_expr(&s.test), unparse_expr(msg)),
            None => format!("assert {}", unparse_expr(&s.test)),
        },
        // Checked programs contain no other statements.
        other => format!("# {}", stmt_kind(other)),
    };
    indent(out, level);
    out.push_str(&line);
    out.push('\n');
}
