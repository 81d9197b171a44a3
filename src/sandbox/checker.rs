//! Static checks and rewrites applied to every guest program.
//!
//! The checker rejects node kinds outside the permitted subset, identifiers
//! containing `__`, and assignment targets other than names, subscripts and
//! tuples of those. It also rewrites the tree in place so that attribute
//! access, subscripts and calls go through the runtime gates:
//!
//! ```text
//! a.b        =>  __sandbox_check_type(a).b
//! a[i]       =>  __sandbox_wrap(a, __sandbox_check_type)[i]
//! f(x, k=y)  =>  __sandbox_call(f, x, k=y)
//! ```

use std::mem;

use rustpython_parser::ast::{self, Constant, Expr, Ranged, Stmt};
use rustpython_parser::text_size::{TextRange, TextSize};

use crate::error::{NamingKind, NamingViolation, Result, SyntaxKind, SyntaxViolation};
use crate::sandbox::gates::{CALL_GATE, TYPE_GATE, WRAP};
use crate::sandbox::policy::NodeSet;
use crate::syntax::depth::too_deep;
use crate::syntax::{
    expr_kind, placeholder, stmt_kind, BinOperator, BoolOperator, Body, CmpOperator, Location,
    Locator, NodeKind, Program, UnaryOperator, MAX_NESTING,
};

/// Whitelist checker and gate-injecting transformer.
pub struct CodeChecker<'a> {
    nodes: &'a NodeSet,
}

impl<'a> CodeChecker<'a> {
    /// A checker permitting exactly the node kinds in `nodes`.
    pub fn new(nodes: &'a NodeSet) -> Self {
        Self { nodes }
    }

    /// Check `program` and return it with the gates injected.
    pub fn check_and_transform(self, mut program: Program) -> Result<Program> {
        let (locator, body) = program.parts_mut();
        let mut walk = Walk {
            nodes: self.nodes,
            locator,
            loop_depth: 0,
            function_depth: 0,
            depth: 0,
        };
        match body {
            Body::Expression(expr) => {
                walk.require(NodeKind::Expression, walk.location(expr.start()))?;
                walk.expr(expr)?;
            }
            Body::Module(stmts) => {
                walk.require(NodeKind::Module, Location::new(1, 0))?;
                walk.block(stmts)?;
            }
        }
        Ok(program)
    }
}

/// Check `program` against `nodes` and inject the gates.
pub fn check_and_transform(program: Program, nodes: &NodeSet) -> Result<Program> {
    CodeChecker::new(nodes).check_and_transform(program)
}

struct Walk<'a, 's> {
    nodes: &'a NodeSet,
    locator: Locator<'s>,
    loop_depth: usize,
    function_depth: usize,
    /// Nesting of the node being visited; bounded by [`MAX_NESTING`].
    depth: usize,
}

impl Walk<'_, '_> {
    fn location(&self, offset: TextSize) -> Location {
        self.locator.locate(offset)
    }

    fn require(&self, kind: NodeKind, loc: Location) -> Result<()> {
        if self.nodes.contains(&kind) {
            Ok(())
        } else {
            Err(forbidden(kind, loc).into())
        }
    }

    fn identifier(&self, name: &str, loc: Location) -> Result<()> {
        if name.contains("__") {
            return Err(NamingViolation::new(NamingKind::Identifier, name, Some(loc)).into());
        }
        Ok(())
    }

    fn enter(&mut self, loc: Location) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(too_deep(loc).into());
        }
        Ok(())
    }

    fn bad_target(&self, target: &Expr) -> Result<()> {
        Err(SyntaxViolation::new(
            SyntaxKind::AssignmentShape,
            format!("cannot assign to {}", expr_kind(target)),
            Some(self.location(target.start())),
        )
        .into())
    }

    // -- statements ------------------------------------------------------

    fn block(&mut self, body: &mut [Stmt]) -> Result<()> {
        body.iter_mut().try_for_each(|stmt| self.stmt(stmt))
    }

    fn loop_body(&mut self, body: &mut [Stmt]) -> Result<()> {
        self.loop_depth += 1;
        self.block(body)?;
        self.loop_depth -= 1;
        Ok(())
    }

    fn stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        let kind = stmt_kind(stmt);
        let loc = self.location(stmt.start());
        self.require(kind, loc)?;
        self.enter(loc)?;
        match stmt {
            Stmt::Expr(s) => self.expr(&mut s.value)?,
            Stmt::Assign(s) => {
                for target in &mut s.targets {
                    self.target(target)?;
                }
                self.expr(&mut s.value)?;
            }
            Stmt::AugAssign(s) => {
                self.require(BinOperator::from(s.op).kind(), loc)?;
                if !matches!(*s.target, Expr::Name(_) | Expr::Subscript(_)) {
                    return self.bad_target(&s.target);
                }
                self.target(&mut s.target)?;
                self.expr(&mut s.value)?;
            }
            Stmt::AnnAssign(s) => {
                self.target(&mut s.target)?;
                self.expr(&mut s.annotation)?;
                self.opt(&mut s.value)?;
            }
            Stmt::Pass(_) => {}
            Stmt::Break(_) | Stmt::Continue(_) if self.loop_depth == 0 => {
                let word = if kind == NodeKind::Break { "break" } else { "continue" };
                return Err(SyntaxViolation::parse(format!("'{word}' outside loop"), loc).into());
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::Return(_) if self.function_depth == 0 => {
                return Err(SyntaxViolation::parse("'return' outside function", loc).into());
            }
            Stmt::Return(s) => self.opt(&mut s.value)?,
            Stmt::Delete(s) => {
                for target in &mut s.targets {
                    self.target(target)?;
                }
            }
            Stmt::Raise(s) => {
                self.opt(&mut s.exc)?;
                self.opt(&mut s.cause)?;
            }
            Stmt::Assert(s) => {
                self.expr(&mut s.test)?;
                self.opt(&mut s.msg)?;
            }
            Stmt::If(s) => {
                self.expr(&mut s.test)?;
                self.block(&mut s.body)?;
                self.block(&mut s.orelse)?;
            }
            Stmt::While(s) => {
                self.expr(&mut s.test)?;
                self.loop_body(&mut s.body)?;
                self.block(&mut s.orelse)?;
            }
            Stmt::For(s) => {
                self.target(&mut s.target)?;
                self.expr(&mut s.iter)?;
                self.loop_body(&mut s.body)?;
                self.block(&mut s.orelse)?;
            }
            Stmt::Try(s) => {
                self.block(&mut s.body)?;
                for handler in &mut s.handlers {
                    self.handler(handler)?;
                }
                self.block(&mut s.orelse)?;
                self.block(&mut s.finalbody)?;
            }
            Stmt::FunctionDef(def) => self.function_def(def, loc)?,
            // Never part of a permitted subset; `require` has already refused them.
            _ => return Err(forbidden(kind, loc).into()),
        }
        self.depth -= 1;
        Ok(())
    }

    fn handler(&mut self, handler: &mut ast::ExceptHandler) -> Result<()> {
        let ast::ExceptHandler::ExceptHandler(handler) = handler;
        let loc = self.location(handler.range.start());
        self.require(NodeKind::ExceptHandler, loc)?;
        if let Some(name) = &handler.name {
            self.identifier(name.as_str(), loc)?;
        }
        self.opt(&mut handler.type_)?;
        self.block(&mut handler.body)
    }

    fn function_def(&mut self, def: &mut ast::StmtFunctionDef, loc: Location) -> Result<()> {
        self.identifier(def.name.as_str(), loc)?;
        for decorator in &mut def.decorator_list {
            self.expr(decorator)?;
        }
        self.arguments(&mut def.args, loc)?;
        self.opt(&mut def.returns)?;

        let saved_loops = mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        self.block(&mut def.body)?;
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        Ok(())
    }

    fn arguments(&mut self, args: &mut ast::Arguments, loc: Location) -> Result<()> {
        self.require(NodeKind::Arguments, loc)?;
        for arg in args
            .posonlyargs
            .iter_mut()
            .chain(args.args.iter_mut())
            .chain(args.kwonlyargs.iter_mut())
        {
            self.arg(&mut arg.def)?;
            self.opt(&mut arg.default)?;
        }
        for arg in args.vararg.iter_mut().chain(args.kwarg.iter_mut()) {
            self.arg(arg)?;
        }
        Ok(())
    }

    fn arg(&mut self, arg: &mut ast::Arg) -> Result<()> {
        let loc = self.location(arg.range.start());
        self.require(NodeKind::Arg, loc)?;
        self.identifier(arg.arg.as_str(), loc)?;
        self.opt(&mut arg.annotation)
    }

    /// Assignment, `for`, `del` and comprehension targets.
    fn target(&mut self, target: &mut Expr) -> Result<()> {
        let kind = expr_kind(target);
        match target {
            Expr::Name(_) | Expr::Subscript(_) => self.expr(target),
            Expr::Tuple(ast::ExprTuple { elts, range, .. })
            | Expr::List(ast::ExprList { elts, range, .. }) => {
                let loc = self.location(range.start());
                self.require(kind, loc)?;
                self.enter(loc)?;
                for elt in elts {
                    self.target(elt)?;
                }
                self.depth -= 1;
                Ok(())
            }
            _ => self.bad_target(target),
        }
    }

    // -- expressions -----------------------------------------------------

    fn exprs(&mut self, exprs: &mut [Expr]) -> Result<()> {
        exprs.iter_mut().try_for_each(|expr| self.expr(expr))
    }

    fn opt(&mut self, expr: &mut Option<Box<Expr>>) -> Result<()> {
        match expr {
            Some(expr) => self.expr(expr),
            None => Ok(()),
        }
    }

    fn expr(&mut self, expr: &mut Expr) -> Result<()> {
        let loc = self.location(expr.start());
        self.require(expr_kind(expr), loc)?;
        self.enter(loc)?;
        match expr {
            Expr::Constant(c) => self.constant(&c.value, loc)?,
            Expr::JoinedStr(s) => self.exprs(&mut s.values)?,
            Expr::FormattedValue(v) => {
                self.expr(&mut v.value)?;
                self.opt(&mut v.format_spec)?;
            }
            Expr::Name(named) => self.identifier(named.id.as_str(), loc)?,
            Expr::List(list) => self.exprs(&mut list.elts)?,
            Expr::Tuple(tuple) => self.exprs(&mut tuple.elts)?,
            Expr::Set(set) => self.exprs(&mut set.elts)?,
            Expr::Dict(dict) => {
                for key in dict.keys.iter_mut().flatten() {
                    self.expr(key)?;
                }
                self.exprs(&mut dict.values)?;
            }
            Expr::BinOp(e) => {
                self.require(BinOperator::from(e.op).kind(), loc)?;
                self.expr(&mut e.left)?;
                self.expr(&mut e.right)?;
            }
            Expr::UnaryOp(e) => {
                self.require(UnaryOperator::from(e.op).kind(), loc)?;
                self.expr(&mut e.operand)?;
            }
            Expr::BoolOp(e) => {
                self.require(BoolOperator::from(e.op).kind(), loc)?;
                self.exprs(&mut e.values)?;
            }
            Expr::Compare(e) => {
                for op in &e.ops {
                    self.require(CmpOperator::from(*op).kind(), loc)?;
                }
                self.expr(&mut e.left)?;
                self.exprs(&mut e.comparators)?;
            }
            Expr::IfExp(e) => {
                self.expr(&mut e.test)?;
                self.expr(&mut e.body)?;
                self.expr(&mut e.orelse)?;
            }
            Expr::Lambda(lambda) => {
                self.arguments(&mut lambda.args, loc)?;
                self.expr(&mut lambda.body)?;
            }
            Expr::Call(e) => {
                self.expr(&mut e.func)?;
                self.exprs(&mut e.args)?;
                for keyword in &mut e.keywords {
                    self.require(NodeKind::Keyword, loc)?;
                    if let Some(arg) = &keyword.arg {
                        self.identifier(arg.as_str(), loc)?;
                    }
                    self.expr(&mut keyword.value)?;
                }
                let range = e.func.range();
                let func = mem::replace(&mut *e.func, name(CALL_GATE, range));
                e.args.insert(0, func);
            }
            Expr::Attribute(attribute) => {
                self.identifier(attribute.attr.as_str(), loc)?;
                self.expr(&mut attribute.value)?;
                gate(&mut attribute.value, |value, range| {
                    call(name(TYPE_GATE, range), vec![value], range)
                });
            }
            Expr::Subscript(subscript) => {
                self.expr(&mut subscript.value)?;
                self.expr(&mut subscript.slice)?;
                gate(&mut subscript.value, |value, range| {
                    call(name(WRAP, range), vec![value, name(TYPE_GATE, range)], range)
                });
            }
            Expr::Slice(slice) => {
                self.opt(&mut slice.lower)?;
                self.opt(&mut slice.upper)?;
                self.opt(&mut slice.step)?;
            }
            Expr::Starred(starred) => self.expr(&mut starred.value)?,
            Expr::ListComp(comp) => {
                self.generators(&mut comp.generators, loc)?;
                self.expr(&mut comp.elt)?;
            }
            Expr::SetComp(comp) => {
                self.generators(&mut comp.generators, loc)?;
                self.expr(&mut comp.elt)?;
            }
            Expr::GeneratorExp(comp) => {
                self.generators(&mut comp.generators, loc)?;
                self.expr(&mut comp.elt)?;
            }
            Expr::DictComp(comp) => {
                self.generators(&mut comp.generators, loc)?;
                self.expr(&mut comp.key)?;
                self.expr(&mut comp.value)?;
            }
            Expr::NamedExpr(e) => {
                if !matches!(*e.target, Expr::Name(_)) {
                    return self.bad_target(&e.target);
                }
                self.expr(&mut e.target)?;
                self.expr(&mut e.value)?;
            }
            Expr::Yield(e) => self.opt(&mut e.value)?,
            Expr::YieldFrom(e) => self.expr(&mut e.value)?,
            Expr::Await(e) => self.expr(&mut e.value)?,
        }
        self.depth -= 1;
        Ok(())
    }

    /// Literals the runtime has no value for are refused up front.
    fn constant(&self, constant: &Constant, loc: Location) -> Result<()> {
        let message = match constant {
            Constant::Int(int) if i64::try_from(int).is_err() => "integer literal too large",
            Constant::Bytes(_) => "bytes literals are not supported",
            Constant::Complex { .. } => "complex literals are not supported",
            Constant::Ellipsis => "Ellipsis is not supported",
            Constant::Tuple(items) => {
                return items.iter().try_for_each(|item| self.constant(item, loc));
            }
            _ => return Ok(()),
        };
        Err(SyntaxViolation::parse(message, loc).into())
    }

    fn generators(&mut self, generators: &mut [ast::Comprehension], loc: Location) -> Result<()> {
        for generator in generators {
            self.require(NodeKind::Comprehension, loc)?;
            if generator.is_async {
                return Err(forbidden(NodeKind::Await, loc).into());
            }
            self.target(&mut generator.target)?;
            self.expr(&mut generator.iter)?;
            self.exprs(&mut generator.ifs)?;
        }
        Ok(())
    }
}

fn name(id: &str, range: TextRange) -> Expr {
    ast::ExprName {
        range,
        id: ast::Identifier::new(id),
        ctx: ast::ExprContext::Load,
    }
    .into()
}

fn call(func: Expr, args: Vec<Expr>, range: TextRange) -> Expr {
    ast::ExprCall {
        range,
        func: Box::new(func),
        args,
        keywords: Vec::new(),
    }
    .into()
}

/// Replace `slot` with `wrap(slot)`.
fn gate(slot: &mut Expr, wrap: impl FnOnce(Expr, TextRange) -> Expr) {
    let range = slot.range();
    let inner = mem::replace(slot, placeholder(range));
    *slot = wrap(inner, range);
}

fn forbidden(kind: NodeKind, loc: Location) -> SyntaxViolation {
    SyntaxViolation::new(
        SyntaxKind::ForbiddenNode,
        format!("forbidden syntax: {kind}"),
        Some(loc),
    )
}
