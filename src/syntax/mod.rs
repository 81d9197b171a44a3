//! Guest language front end.
//!
//! Source is parsed with `rustpython-parser`. This module wraps the resulting
//! tree in a [`Program`], names the node kinds the whitelist can mention,
//! bounds nesting depth and renders checked programs back to source.

pub mod depth;
mod location;
mod nodes;
mod program;
mod unparse;

pub use rustpython_parser::ast;

pub use depth::{placeholder, MAX_NESTING};
pub use location::{Location, Locator};
pub use nodes::{
    expr_kind, stmt_kind, BinOperator, BoolOperator, CmpOperator, NodeKind, UnaryOperator,
};
pub use program::{parse, Body, Mode, Program};
pub use unparse::{unparse, unparse_expr};
