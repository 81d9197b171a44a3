//! Node kinds named by the whitelist, and the operator sets the runtime
//! dispatches on.

use std::fmt;

use rustpython_parser::ast::{self, Expr, Stmt};

macro_rules! node_kinds {
    ($($kind:ident),* $(,)?) => {
        /// Every kind of node the whitelist can mention.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum NodeKind {
            $($kind),*
        }

        impl NodeKind {
            /// All node kinds.
            pub const ALL: &'static [NodeKind] = &[$(NodeKind::$kind),*];

            /// The node's class name as guest authors know it.
            pub fn name(&self) -> &'static str {
                match self {
                    $(NodeKind::$kind => stringify!($kind)),*
                }
            }
        }
    };
}

node_kinds! {
    // roots
    Module, Expression,
    // statements
    Expr, Assign, AugAssign, AnnAssign, Pass, Break, Continue, Return, Delete,
    Raise, Assert, If, While, For, AsyncFor, Try, TryStar, ExceptHandler,
    FunctionDef, AsyncFunctionDef, ClassDef, With, AsyncWith, Match, TypeAlias,
    Import, ImportFrom, Alias, Global, Nonlocal,
    // expressions
    Constant, JoinedStr, FormattedValue, Name, List, Tuple, Set, Dict, BinOp,
    UnaryOp, BoolOp, Compare, IfExp, Lambda, Call, Keyword, Attribute, Subscript,
    Slice, Starred, ListComp, SetComp, GeneratorExp, DictComp, Comprehension,
    NamedExpr, Yield, YieldFrom, Await, Arguments, Arg,
    // operators
    Add, Sub, Mult, MatMult, Div, FloorDiv, Mod, Pow, LShift, RShift, BitOr,
    BitXor, BitAnd, UAdd, USub, Not, Invert, And, Or, Eq, NotEq, Lt, LtE, Gt,
    GtE, Is, IsNot, In, NotIn,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The whitelist kind of a statement.
#[allow(unreachable_patterns)]
pub fn stmt_kind(stmt: &Stmt) -> NodeKind {
    match stmt {
        Stmt::Expr(_) => NodeKind::Expr,
        Stmt::Assign(_) => NodeKind::Assign,
        Stmt::AugAssign(_) => NodeKind::AugAssign,
        Stmt::AnnAssign(_) => NodeKind::AnnAssign,
        Stmt::Pass(_) => NodeKind::Pass,
        Stmt::Break(_) => NodeKind::Break,
        Stmt::Continue(_) => NodeKind::Continue,
        Stmt::Return(_) => NodeKind::Return,
        Stmt::Delete(_) => NodeKind::Delete,
        Stmt::Raise(_) => NodeKind::Raise,
        Stmt::Assert(_) => NodeKind::Assert,
        Stmt::If(_) => NodeKind::If,
        Stmt::While(_) => NodeKind::While,
        Stmt::For(_) => NodeKind::For,
        Stmt::AsyncFor(_) => NodeKind::AsyncFor,
        Stmt::Try(_) => NodeKind::Try,
        Stmt::TryStar(_) => NodeKind::TryStar,
        Stmt::FunctionDef(_) => NodeKind::FunctionDef,
        Stmt::AsyncFunctionDef(_) => NodeKind::AsyncFunctionDef,
        Stmt::ClassDef(_) => NodeKind::ClassDef,
        Stmt::With(_) => NodeKind::With,
        Stmt::AsyncWith(_) => NodeKind::AsyncWith,
        Stmt::Match(_) => NodeKind::Match,
        Stmt::Import(_) => NodeKind::Import,
        Stmt::ImportFrom(_) => NodeKind::ImportFrom,
        Stmt::Global(_) => NodeKind::Global,
        Stmt::Nonlocal(_) => NodeKind::Nonlocal,
        // `type X = ...`
        _ => NodeKind::TypeAlias,
    }
}

/// The whitelist kind of an expression.
pub fn expr_kind(expr: &Expr) -> NodeKind {
    match expr {
        Expr::BoolOp(_) => NodeKind::BoolOp,
        Expr::NamedExpr(_) => NodeKind::NamedExpr,
        Expr::BinOp(_) => NodeKind::BinOp,
        Expr::UnaryOp(_) => NodeKind::UnaryOp,
        Expr::Lambda(_) => NodeKind::Lambda,
        Expr::IfExp(_) => NodeKind::IfExp,
        Expr::Dict(_) => NodeKind::Dict,
        Expr::Set(_) => NodeKind::Set,
        Expr::ListComp(_) => NodeKind::ListComp,
        Expr::SetComp(_) => NodeKind::SetComp,
        Expr::DictComp(_) => NodeKind::DictComp,
        Expr::GeneratorExp(_) => NodeKind::GeneratorExp,
        Expr::Await(_) => NodeKind::Await,
        Expr::Yield(_) => NodeKind::Yield,
        Expr::YieldFrom(_) => NodeKind::YieldFrom,
        Expr::Compare(_) => NodeKind::Compare,
        Expr::Call(_) => NodeKind::Call,
        Expr::FormattedValue(_) => NodeKind::FormattedValue,
        Expr::JoinedStr(_) => NodeKind::JoinedStr,
        Expr::Constant(_) => NodeKind::Constant,
        Expr::Attribute(_) => NodeKind::Attribute,
        Expr::Subscript(_) => NodeKind::Subscript,
        Expr::Starred(_) => NodeKind::Starred,
        Expr::Name(_) => NodeKind::Name,
        Expr::List(_) => NodeKind::List,
        Expr::Tuple(_) => NodeKind::Tuple,
        Expr::Slice(_) => NodeKind::Slice,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

impl BinOperator {
    /// Source spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOperator::Add => "+",
            BinOperator::Sub => "-",
            BinOperator::Mult => "*",
            BinOperator::MatMult => "@",
            BinOperator::Div => "/",
            BinOperator::FloorDiv => "//",
            BinOperator::Mod => "%",
            BinOperator::Pow => "**",
            BinOperator::LShift => "<<",
            BinOperator::RShift => ">>",
            BinOperator::BitOr => "|",
            BinOperator::BitXor => "^",
            BinOperator::BitAnd => "&",
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            BinOperator::Add => NodeKind::Add,
            BinOperator::Sub => NodeKind::Sub,
            BinOperator::Mult => NodeKind::Mult,
            BinOperator::MatMult => NodeKind::MatMult,
            BinOperator::Div => NodeKind::Div,
            BinOperator::FloorDiv => NodeKind::FloorDiv,
            BinOperator::Mod => NodeKind::Mod,
            BinOperator::Pow => NodeKind::Pow,
            BinOperator::LShift => NodeKind::LShift,
            BinOperator::RShift => NodeKind::RShift,
            BinOperator::BitOr => NodeKind::BitOr,
            BinOperator::BitXor => NodeKind::BitXor,
            BinOperator::BitAnd => NodeKind::BitAnd,
        }
    }
}

impl From<ast::Operator> for BinOperator {
    fn from(op: ast::Operator) -> Self {
        match op {
            ast::Operator::Add => BinOperator::Add,
            ast::Operator::Sub => BinOperator::Sub,
            ast::Operator::Mult => BinOperator::Mult,
            ast::Operator::MatMult => BinOperator::MatMult,
            ast::Operator::Div => BinOperator::Div,
            ast::Operator::FloorDiv => BinOperator::FloorDiv,
            ast::Operator::Mod => BinOperator::Mod,
            ast::Operator::Pow => BinOperator::Pow,
            ast::Operator::LShift => BinOperator::LShift,
            ast::Operator::RShift => BinOperator::RShift,
            ast::Operator::BitOr => BinOperator::BitOr,
            ast::Operator::BitXor => BinOperator::BitXor,
            ast::Operator::BitAnd => BinOperator::BitAnd,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    UAdd,
    USub,
    Not,
    Invert,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOperator::UAdd => "+",
            UnaryOperator::USub => "-",
            UnaryOperator::Not => "not ",
            UnaryOperator::Invert => "~",
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            UnaryOperator::UAdd => NodeKind::UAdd,
            UnaryOperator::USub => NodeKind::USub,
            UnaryOperator::Not => NodeKind::Not,
            UnaryOperator::Invert => NodeKind::Invert,
        }
    }
}

impl From<ast::UnaryOp> for UnaryOperator {
    fn from(op: ast::UnaryOp) -> Self {
        match op {
            ast::UnaryOp::UAdd => UnaryOperator::UAdd,
            ast::UnaryOp::USub => UnaryOperator::USub,
            ast::UnaryOp::Not => UnaryOperator::Not,
            ast::UnaryOp::Invert => UnaryOperator::Invert,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    And,
    Or,
}

impl BoolOperator {
    pub fn keyword(&self) -> &'static str {
        match self {
            BoolOperator::And => "and",
            BoolOperator::Or => "or",
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            BoolOperator::And => NodeKind::And,
            BoolOperator::Or => NodeKind::Or,
        }
    }
}

impl From<ast::BoolOp> for BoolOperator {
    fn from(op: ast::BoolOp) -> Self {
        match op {
            ast::BoolOp::And => BoolOperator::And,
            ast::BoolOp::Or => BoolOperator::Or,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOperator::Eq => "==",
            CmpOperator::NotEq => "!=",
            CmpOperator::Lt => "<",
            CmpOperator::LtE => "<=",
            CmpOperator::Gt => ">",
            CmpOperator::GtE => ">=",
            CmpOperator::Is => "is",
            CmpOperator::IsNot => "is not",
            CmpOperator::In => "in",
            CmpOperator::NotIn => "not in",
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            CmpOperator::Eq => NodeKind::Eq,
            CmpOperator::NotEq => NodeKind::NotEq,
            CmpOperator::Lt => NodeKind::Lt,
            CmpOperator::LtE => NodeKind::LtE,
            CmpOperator::Gt => NodeKind::Gt,
            CmpOperator::GtE => NodeKind::GtE,
            CmpOperator::Is => NodeKind::Is,
            CmpOperator::IsNot => NodeKind::IsNot,
            CmpOperator::In => NodeKind::In,
            CmpOperator::NotIn => NodeKind::NotIn,
        }
    }
}

impl From<ast::CmpOp> for CmpOperator {
    fn from(op: ast::CmpOp) -> Self {
        match op {
            ast::CmpOp::Eq => CmpOperator::Eq,
            ast::CmpOp::NotEq => CmpOperator::NotEq,
            ast::CmpOp::Lt => CmpOperator::Lt,
            ast::CmpOp::LtE => CmpOperator::LtE,
            ast::CmpOp::Gt => CmpOperator::Gt,
            ast::CmpOp::GtE => CmpOperator::GtE,
            ast::CmpOp::Is => CmpOperator::Is,
            ast::CmpOp::IsNot => CmpOperator::IsNot,
            ast::CmpOp::In => CmpOperator::In,
            ast::CmpOp::NotIn => CmpOperator::NotIn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, Body, Mode};

    #[test]
    fn test_node_kind_names() {
        assert_eq!(NodeKind::ListComp.name(), "ListComp");
        assert_eq!(NodeKind::AsyncFunctionDef.to_string(), "AsyncFunctionDef");
        assert!(NodeKind::ALL.contains(&NodeKind::NotIn));
    }

    #[test]
    fn test_statement_kinds() {
        let program = parse("async def f():\n    pass\nx += 1\n", Mode::Exec).unwrap();
        let Body::Module(body) = program.body() else {
            panic!("expected a module");
        };
        let kinds: Vec<_> = body.iter().map(stmt_kind).collect();
        assert_eq!(kinds, [NodeKind::AsyncFunctionDef, NodeKind::AugAssign]);
    }

    #[test]
    fn test_operator_conversions() {
        assert_eq!(BinOperator::from(ast::Operator::FloorDiv).symbol(), "//");
        assert_eq!(CmpOperator::from(ast::CmpOp::NotIn).kind(), NodeKind::NotIn);
        assert_eq!(UnaryOperator::from(ast::UnaryOp::Invert).symbol(), "~");
        assert_eq!(BoolOperator::from(ast::BoolOp::Or).keyword(), "or");
    }
}
