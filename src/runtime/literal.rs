//! Literal-only evaluation.
//!
//! Accepts constants, the four container displays, `set()` and a sign in
//! front of a number. Nothing is looked up and nothing is called.

use indexmap::IndexSet;

use crate::runtime::exceptions::{self, raise};
use crate::runtime::value::{Dict, HashKey, Value};
use crate::runtime::VmResult;
use crate::syntax::ast::{self, Constant, Expr, Ranged, UnaryOp};
use crate::syntax::depth::too_deep;
use crate::syntax::{parse, Body, Locator, Mode, MAX_NESTING};

/// Parse `source` as one expression and build the literal it denotes.
pub fn literal_eval(source: &str) -> VmResult<Value> {
    let program = parse(source.trim_start_matches([' ', '\t']), Mode::Eval)?;
    let Body::Expression(expr) = program.body() else {
        return raise(&exceptions::VALUE_ERROR, "malformed node or string");
    };
    Literal {
        locator: program.locator(),
        depth: 0,
    }
    .convert(expr)
}

struct Literal<'a> {
    locator: Locator<'a>,
    depth: usize,
}

impl Literal<'_> {
    fn convert(&mut self, expr: &Expr) -> VmResult<Value> {
        if self.depth >= MAX_NESTING {
            return Err(too_deep(self.locator.locate(expr.start())).into());
        }
        self.depth += 1;
        let value = self.node(expr)?;
        self.depth -= 1;
        Ok(value)
    }

    fn node(&mut self, expr: &Expr) -> VmResult<Value> {
        match expr {
            Expr::Constant(constant) => match &constant.value {
                Constant::None => Ok(Value::None),
                Constant::Bool(b) => Ok(Value::Bool(*b)),
                Constant::Int(i) => int_value(i64::try_from(i).ok()),
                Constant::Float(f) => Ok(Value::Float(*f)),
                Constant::Str(s) => Ok(Value::str(s)),
                _ => self.malformed(expr),
            },
            Expr::Tuple(tuple) => self.elements(&tuple.elts).map(Value::tuple),
            Expr::List(list) => self.elements(&list.elts).map(Value::list),
            Expr::Set(set) => {
                let mut items = IndexSet::new();
                for elt in &set.elts {
                    items.insert(HashKey::new(self.convert(elt)?)?);
                }
                Ok(Value::set(items))
            }
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries.keys.iter().zip(&entries.values) {
                    let Some(key) = key else {
                        return self.malformed(value);
                    };
                    let key = HashKey::new(self.convert(key)?)?;
                    dict.insert(key, self.convert(value)?);
                }
                Ok(Value::dict(dict))
            }
            Expr::Call(call)
                if call.args.is_empty()
                    && call.keywords.is_empty()
                    && matches!(&*call.func, Expr::Name(name) if name.id.as_str() == "set") =>
            {
                Ok(Value::set(IndexSet::new()))
            }
            Expr::UnaryOp(unary) if matches!(unary.op, UnaryOp::UAdd | UnaryOp::USub) => {
                let negate = unary.op == UnaryOp::USub;
                let Expr::Constant(ast::ExprConstant { value, .. }) = &*unary.operand else {
                    return self.malformed(expr);
                };
                match value {
                    Constant::Int(i) if negate => int_value(i64::try_from(-i).ok()),
                    Constant::Int(i) => int_value(i64::try_from(i).ok()),
                    Constant::Float(f) if negate => Ok(Value::Float(-f)),
                    Constant::Float(f) => Ok(Value::Float(*f)),
                    _ => self.malformed(expr),
                }
            }
            _ => self.malformed(expr),
        }
    }

    fn elements(&mut self, elts: &[Expr]) -> VmResult<Vec<Value>> {
        elts.iter().map(|elt| self.convert(elt)).collect()
    }

    /// Quotes the offending source rather than re-rendering the node, which
    /// may be nested too deeply to walk.
    fn malformed<T>(&self, expr: &Expr) -> VmResult<T> {
        raise(
            &exceptions::VALUE_ERROR,
            format!(
                "malformed node or string on line {}: {}",
                self.locator.locate(expr.start()).line,
                self.locator.text(expr.range())
            ),
        )
    }
}

fn int_value(value: Option<i64>) -> VmResult<Value> {
    match value {
        Some(i) => Ok(Value::Int(i)),
        None => raise(&exceptions::OVERFLOW_ERROR, "integer overflow"),
    }
}
