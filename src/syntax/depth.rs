//! Nesting bound and iterative teardown of syntax trees.
//!
//! The parser accepts arbitrarily deep trees (`1+1+1+...` is a left-leaning
//! chain as long as the source). Everything that walks a tree recursively
//! stops at [`MAX_NESTING`]; trees that are too deep are dropped through
//! [`dismantle`], which uses an explicit stack.

use std::mem;

use rustpython_parser::ast::{self, Expr, Ranged, Stmt};
use rustpython_parser::text_size::TextRange;

use crate::error::SyntaxViolation;
use crate::syntax::location::Location;
use crate::syntax::program::Body;

/// Maximum depth of nested statements and expressions.
pub const MAX_NESTING: usize = 100;

/// The error for a tree that exceeds [`MAX_NESTING`].
pub fn too_deep(location: Location) -> SyntaxViolation {
    SyntaxViolation::parse("too many nested expressions or blocks", location)
}

/// A trivial expression used to fill slots whose contents were moved out.
pub fn placeholder(range: TextRange) -> Expr {
    ast::ExprConstant {
        range,
        value: ast::Constant::None,
        kind: None,
    }
    .into()
}

enum Node {
    Expr(Expr),
    Stmt(Stmt),
}

/// Take `body` apart without recursion, leaving it empty.
pub fn dismantle(body: &mut Body) {
    let mut stack = Vec::new();
    match body {
        Body::Expression(expr) => {
            let range = expr.range();
            stack.push(Node::Expr(mem::replace(expr, placeholder(range))));
        }
        Body::Module(stmts) => stack.extend(mem::take(stmts).into_iter().map(Node::Stmt)),
    }
    while let Some(node) = stack.pop() {
        match node {
            Node::Expr(mut expr) => detach_expr(&mut expr, &mut stack),
            Node::Stmt(mut stmt) => detach_stmt(&mut stmt, &mut stack),
        }
    }
}

fn take(slot: &mut Expr, stack: &mut Vec<Node>) {
    let range = slot.range();
    stack.push(Node::Expr(mem::replace(slot, placeholder(range))));
}

fn take_all(slots: &mut Vec<Expr>, stack: &mut Vec<Node>) {
    stack.extend(mem::take(slots).into_iter().map(Node::Expr));
}

fn take_opt(slot: &mut Option<Box<Expr>>, stack: &mut Vec<Node>) {
    if let Some(expr) = slot.take() {
        stack.push(Node::Expr(*expr));
    }
}

fn take_body(body: &mut Vec<Stmt>, stack: &mut Vec<Node>) {
    stack.extend(mem::take(body).into_iter().map(Node::Stmt));
}

fn take_arguments(args: &mut ast::Arguments, stack: &mut Vec<Node>) {
    for arg in args
        .posonlyargs
        .iter_mut()
        .chain(args.args.iter_mut())
        .chain(args.kwonlyargs.iter_mut())
    {
        take_opt(&mut arg.def.annotation, stack);
        take_opt(&mut arg.default, stack);
    }
    for arg in args.vararg.iter_mut().chain(args.kwarg.iter_mut()) {
        take_opt(&mut arg.annotation, stack);
    }
}

fn take_generators(generators: &mut Vec<ast::Comprehension>, stack: &mut Vec<Node>) {
    for mut generator in mem::take(generators) {
        take(&mut generator.target, stack);
        take(&mut generator.iter, stack);
        take_all(&mut generator.ifs, stack);
    }
}

fn detach_expr(expr: &mut Expr, stack: &mut Vec<Node>) {
    match expr {
        Expr::BoolOp(e) => take_all(&mut e.values, stack),
        Expr::NamedExpr(e) => {
            take(&mut e.target, stack);
            take(&mut e.value, stack);
        }
        Expr::BinOp(e) => {
            take(&mut e.left, stack);
            take(&mut e.right, stack);
        }
        Expr::UnaryOp(e) => take(&mut e.operand, stack),
        Expr::Lambda(e) => {
            take_arguments(&mut e.args, stack);
            take(&mut e.body, stack);
        }
        Expr::IfExp(e) => {
            take(&mut e.test, stack);
            take(&mut e.body, stack);
            take(&mut e.orelse, stack);
        }
        Expr::Dict(e) => {
            stack.extend(mem::take(&mut e.keys).into_iter().flatten().map(Node::Expr));
            take_all(&mut e.values, stack);
        }
        Expr::Set(e) => take_all(&mut e.elts, stack),
        Expr::ListComp(e) => {
            take(&mut e.elt, stack);
            take_generators(&mut e.generators, stack);
        }
        Expr::SetComp(e) => {
            take(&mut e.elt, stack);
            take_generators(&mut e.generators, stack);
        }
        Expr::GeneratorExp(e) => {
            take(&mut e.elt, stack);
            take_generators(&mut e.generators, stack);
        }
        Expr::DictComp(e) => {
            take(&mut e.key, stack);
            take(&mut e.value, stack);
            take_generators(&mut e.generators, stack);
        }
        Expr::Await(e) => take(&mut e.value, stack),
        Expr::Yield(e) => take_opt(&mut e.value, stack),
        Expr::YieldFrom(e) => take(&mut e.value, stack),
        Expr::Compare(e) => {
            take(&mut e.left, stack);
            take_all(&mut e.comparators, stack);
        }
        Expr::Call(e) => {
            take(&mut e.func, stack);
            take_all(&mut e.args, stack);
            for keyword in &mut e.keywords {
                take(&mut keyword.value, stack);
            }
        }
        Expr::FormattedValue(e) => {
            take(&mut e.value, stack);
            take_opt(&mut e.format_spec, stack);
        }
        Expr::JoinedStr(e) => take_all(&mut e.values, stack),
        Expr::Attribute(e) => take(&mut e.value, stack),
        Expr::Subscript(e) => {
            take(&mut e.value, stack);
            take(&mut e.slice, stack);
        }
        Expr::Starred(e) => take(&mut e.value, stack),
        Expr::List(e) => take_all(&mut e.elts, stack),
        Expr::Tuple(e) => take_all(&mut e.elts, stack),
        Expr::Slice(e) => {
            take_opt(&mut e.lower, stack);
            take_opt(&mut e.upper, stack);
            take_opt(&mut e.step, stack);
        }
        Expr::Constant(_) | Expr::Name(_) => {}
    }
}

fn detach_stmt(stmt: &mut Stmt, stack: &mut Vec<Node>) {
    match stmt {
        Stmt::FunctionDef(s) => {
            take_all(&mut s.decorator_list, stack);
            take_arguments(&mut s.args, stack);
            take_opt(&mut s.returns, stack);
            take_body(&mut s.body, stack);
        }
        Stmt::AsyncFunctionDef(s) => {
            take_all(&mut s.decorator_list, stack);
            take_arguments(&mut s.args, stack);
            take_opt(&mut s.returns, stack);
            take_body(&mut s.body, stack);
        }
        Stmt::ClassDef(s) => {
            take_all(&mut s.decorator_list, stack);
            take_all(&mut s.bases, stack);
            for keyword in &mut s.keywords {
                take(&mut keyword.value, stack);
            }
            take_body(&mut s.body, stack);
        }
        Stmt::Return(s) => take_opt(&mut s.value, stack),
        Stmt::Delete(s) => take_all(&mut s.targets, stack),
        Stmt::Assign(s) => {
            take_all(&mut s.targets, stack);
            take(&mut s.value, stack);
        }
        Stmt::AugAssign(s) => {
            take(&mut s.target, stack);
            take(&mut s.value, stack);
        }
        Stmt::AnnAssign(s) => {
            take(&mut s.target, stack);
            take(&mut s.annotation, stack);
            take_opt(&mut s.value, stack);
        }
        Stmt::For(s) => {
            take(&mut s.target, stack);
            take(&mut s.iter, stack);
            take_body(&mut s.body, stack);
            take_body(&mut s.orelse, stack);
        }
        Stmt::AsyncFor(s) => {
            take(&mut s.target, stack);
            take(&mut s.iter, stack);
            take_body(&mut s.body, stack);
            take_body(&mut s.orelse, stack);
        }
        Stmt::While(s) => {
            take(&mut s.test, stack);
            take_body(&mut s.body, stack);
            take_body(&mut s.orelse, stack);
        }
        Stmt::If(s) => {
            take(&mut s.test, stack);
            take_body(&mut s.body, stack);
            take_body(&mut s.orelse, stack);
        }
        Stmt::With(s) => {
            for item in &mut s.items {
                take(&mut item.context_expr, stack);
                take_opt(&mut item.optional_vars, stack);
            }
            take_body(&mut s.body, stack);
        }
        Stmt::AsyncWith(s) => {
            for item in &mut s.items {
                take(&mut item.context_expr, stack);
                take_opt(&mut item.optional_vars, stack);
            }
            take_body(&mut s.body, stack);
        }
        Stmt::Raise(s) => {
            take_opt(&mut s.exc, stack);
            take_opt(&mut s.cause, stack);
        }
        Stmt::Try(s) => {
            take_body(&mut s.body, stack);
            for ast::ExceptHandler::ExceptHandler(handler) in &mut s.handlers {
                take_opt(&mut handler.type_, stack);
                take_body(&mut handler.body, stack);
            }
            take_body(&mut s.orelse, stack);
            take_body(&mut s.finalbody, stack);
        }
        Stmt::TryStar(s) => {
            take_body(&mut s.body, stack);
            for ast::ExceptHandler::ExceptHandler(handler) in &mut s.handlers {
                take_opt(&mut handler.type_, stack);
                take_body(&mut handler.body, stack);
            }
            take_body(&mut s.orelse, stack);
            take_body(&mut s.finalbody, stack);
        }
        Stmt::Assert(s) => {
            take(&mut s.test, stack);
            take_opt(&mut s.msg, stack);
        }
        Stmt::Expr(s) => take(&mut s.value, stack),
        Stmt::Match(s) => {
            take(&mut s.subject, stack);
            for case in &mut s.cases {
                take_opt(&mut case.guard, stack);
                take_body(&mut case.body, stack);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, Mode};

    #[test]
    fn test_long_chains_drop_without_overflow() {
        let chain = format!("1{}", "+1".repeat(100_000));
        let program = parse(&chain, Mode::Eval).unwrap();
        drop(program);

        let unary = format!("{}1", "-".repeat(100_000));
        drop(parse(&unary, Mode::Eval).unwrap());
    }

    #[test]
    fn test_dismantle_empties_the_tree() {
        let mut body = Body::Module(vec![]);
        dismantle(&mut body);
        assert!(matches!(body, Body::Module(ref stmts) if stmts.is_empty()));

        let mut body = match parse("[f(x) for x in y if x]", Mode::Eval).unwrap().body() {
            Body::Expression(expr) => Body::Expression(expr.clone()),
            Body::Module(_) => unreachable!(),
        };
        dismantle(&mut body);
        assert!(matches!(body, Body::Expression(Expr::Constant(_))));
    }
}
