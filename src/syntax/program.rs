//! Parsing guest source into a [`Program`].

use rustpython_parser::ast::{self, Expr, Stmt};
use rustpython_parser::text_size::TextSize;

use crate::error::SyntaxViolation;
use crate::syntax::depth;
use crate::syntax::location::Locator;

/// Compilation mode of a guest program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// A single expression whose value is returned.
    #[default]
    Eval,
    /// A sequence of statements; evaluation returns `None`.
    Exec,
}

impl Mode {
    /// The conventional lowercase name (`"eval"` / `"exec"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Eval => "eval",
            Mode::Exec => "exec",
        }
    }
}

impl From<Mode> for rustpython_parser::Mode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Eval => rustpython_parser::Mode::Expression,
            Mode::Exec => rustpython_parser::Mode::Module,
        }
    }
}

/// The parsed tree of a program.
#[derive(Debug, Clone)]
pub enum Body {
    /// Result of parsing in [`Mode::Eval`].
    Expression(Expr),
    /// Result of parsing in [`Mode::Exec`].
    Module(Vec<Stmt>),
}

/// A parsed program together with the source it came from.
///
/// Dropping a program takes its tree apart iteratively, so trees of any depth
/// can be discarded without exhausting the stack.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    body: Body,
}

impl Program {
    /// The mode this program was parsed for.
    pub fn mode(&self) -> Mode {
        match self.body {
            Body::Expression(_) => Mode::Eval,
            Body::Module(_) => Mode::Exec,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The text the tree was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn locator(&self) -> Locator<'_> {
        Locator::new(&self.source)
    }

    /// Mutable access to the tree alongside a locator for its source.
    pub fn parts_mut(&mut self) -> (Locator<'_>, &mut Body) {
        (Locator::new(&self.source), &mut self.body)
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        depth::dismantle(&mut self.body);
    }
}

/// Parse `source` in `mode`.
pub fn parse(source: &str, mode: Mode) -> Result<Program, SyntaxViolation> {
    let parsed = rustpython_parser::parse(source, mode.into(), "<sandbox>").map_err(|err| {
        SyntaxViolation::parse(err.error.to_string(), Locator::new(source).locate(err.offset))
    })?;
    let body = match parsed {
        ast::Mod::Expression(module) => Body::Expression(*module.body),
        ast::Mod::Module(module) => Body::Module(module.body),
        _ => {
            return Err(SyntaxViolation::parse(
                "unsupported program form",
                Locator::new(source).locate(TextSize::from(0)),
            ))
        }
    };
    Ok(Program {
        source: source.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxKind;
    use crate::syntax::Location;

    #[test]
    fn test_modes() {
        assert_eq!(parse("1 + 2", Mode::Eval).unwrap().mode(), Mode::Eval);
        assert_eq!(parse("x = 1\n", Mode::Exec).unwrap().mode(), Mode::Exec);
        assert_eq!(Mode::default().as_str(), "eval");
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = parse("x = 1\ny = (", Mode::Exec).unwrap_err();
        assert_eq!(err.kind, SyntaxKind::Parse);
        assert_eq!(err.location.map(|loc| loc.line), Some(2));
    }

    #[test]
    fn test_statements_rejected_in_eval_mode() {
        assert!(parse("x = 1", Mode::Eval).is_err());
        assert!(parse("", Mode::Exec).is_ok());
        assert_eq!(Location::default(), Location::new(0, 0));
    }
}
