//! Error types for the sandbox.

use std::fmt;

use thiserror::Error;

use crate::runtime::class::Class;
use crate::syntax::Location;

/// What a [`SyntaxViolation`] objects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    /// The source could not be parsed.
    Parse,
    /// The program uses a node kind outside the permitted subset.
    ForbiddenNode,
    /// An assignment, `for` or comprehension target has a forbidden shape.
    AssignmentShape,
    /// The program tried to call something that is not callable in the sandbox.
    NotCallable,
    /// The source is empty.
    EmptySource,
    /// Byte source that is not valid UTF-8.
    InvalidEncoding,
    /// The requested node subset is not contained in the allowed nodes.
    InvalidSubset,
}

/// Static or dynamic rejection of a construct, surfaced as a syntax error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}{}", fmt_location(.location))]
pub struct SyntaxViolation {
    pub kind: SyntaxKind,
    pub message: String,
    pub location: Option<Location>,
}

impl SyntaxViolation {
    pub fn new(kind: SyntaxKind, message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }

    pub fn parse(message: impl Into<String>, location: Location) -> Self {
        Self::new(SyntaxKind::Parse, message, Some(location))
    }
}

/// What a [`NamingViolation`] objects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingKind {
    /// An identifier in the source contains `__`.
    Identifier,
    /// Caller bindings use a name reserved for the sandbox runtime.
    ReservedName,
    /// A string subscript key written through a wrapper contains `__`.
    SubscriptKey,
}

/// Rejection of an identifier or key.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}{}", fmt_location(.location))]
pub struct NamingViolation {
    pub kind: NamingKind,
    /// The offending identifier.
    pub name: String,
    pub message: String,
    pub location: Option<Location>,
}

impl NamingViolation {
    pub fn new(kind: NamingKind, name: impl Into<String>, location: Option<Location>) -> Self {
        let name = name.into();
        let message = match kind {
            NamingKind::Identifier => format!("names containing '__' are forbidden: {name:?}"),
            NamingKind::ReservedName => format!("{name:?} is a reserved name and cannot be bound"),
            NamingKind::SubscriptKey => format!("keys containing '__' cannot be assigned: {name:?}"),
        };
        Self {
            kind,
            name,
            message,
            location,
        }
    }
}

/// A value refused at the sandbox boundary.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TypeViolation {
    /// Class name of the refused value.
    pub type_name: String,
    pub message: String,
}

impl TypeViolation {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// The standard refusal of a value whose class is not allowed.
    pub fn unsafe_type(type_name: &str) -> Self {
        Self::new(
            type_name,
            format!("unsafe type {type_name:?} cannot cross the sandbox boundary"),
        )
    }
}

fn fmt_location(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" ({loc})"),
        None => String::new(),
    }
}

/// Errors that can occur while checking or evaluating guest code.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Forbidden syntax, assignment shape or call.
    #[error(transparent)]
    Syntax(#[from] SyntaxViolation),

    /// Forbidden identifier or reserved binding.
    #[error(transparent)]
    Naming(#[from] NamingViolation),

    /// A value of a forbidden type reached the boundary.
    #[error(transparent)]
    Type(#[from] TypeViolation),

    /// The guest raised an exception that is not passed through.
    #[error("{exception_type}: \"{message}\" while evaluating\n{source_text:?}")]
    Evaluation {
        /// Class name of the guest exception (e.g. "KeyError").
        exception_type: String,
        /// The exception message.
        message: String,
        /// The guest source that was being evaluated.
        source_text: String,
    },

    /// A guest exception the configuration re-raises unchanged.
    #[error("{exception_type}: {message}")]
    PassThrough {
        /// Class name of the exception.
        exception_type: String,
        /// The exception message.
        message: String,
        /// The exception class, so callers can match on identity.
        class: Class,
    },
}

impl SandboxError {
    /// Check if this error is a syntax-class violation.
    pub fn is_syntax(&self) -> bool {
        matches!(self, SandboxError::Syntax(_))
    }

    /// Check if this error is a naming violation.
    pub fn is_naming(&self) -> bool {
        matches!(self, SandboxError::Naming(_))
    }

    /// Check if this error is a boundary type violation.
    pub fn is_type_violation(&self) -> bool {
        matches!(self, SandboxError::Type(_))
    }

    /// Check if this error wraps a guest exception.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, SandboxError::Evaluation { .. })
    }

    /// Check if this error is a passed-through guest exception.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, SandboxError::PassThrough { .. })
    }

    /// Check if this error is any static or runtime violation of the sandbox rules.
    pub fn is_violation(&self) -> bool {
        self.is_syntax() || self.is_naming() || self.is_type_violation()
    }

    /// Source location of the violation, when known.
    pub fn location(&self) -> Option<Location> {
        match self {
            SandboxError::Syntax(v) => v.location,
            SandboxError::Naming(v) => v.location,
            _ => None,
        }
    }

    /// The class name used when the error is rendered as a diagnostic.
    pub fn class_name(&self) -> &str {
        match self {
            SandboxError::Syntax(_) => "SyntaxViolation",
            SandboxError::Naming(_) => "NamingViolation",
            SandboxError::Type(_) => "TypeViolation",
            SandboxError::Evaluation { exception_type, .. }
            | SandboxError::PassThrough { exception_type, .. } => exception_type,
        }
    }

    fn bare_message(&self) -> String {
        match self {
            SandboxError::Syntax(v) => v.message.clone(),
            SandboxError::Naming(v) => v.message.clone(),
            other => other.to_string(),
        }
    }

    /// Render a multi-line diagnostic pointing at the offending source line.
    ///
    /// ```text
    /// SyntaxViolation : invalid syntax at line 1
    /// a +
    ///    ^
    /// ```
    pub fn diagnostic(&self, source: &str) -> String {
        let location = self.location().unwrap_or(Location::new(1, 0));
        let text = source
            .lines()
            .nth(location.line.saturating_sub(1))
            .unwrap_or("");
        let mut out = format!(
            "{} : {} at line {}\n{}",
            self.class_name(),
            self.bare_message(),
            location.line,
            text
        );
        let caret = Caret {
            column: location.column,
        };
        out.push('\n');
        out.push_str(&caret.to_string());
        out
    }
}

struct Caret {
    column: usize,
}

impl fmt::Display for Caret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:width$}^", "", width = self.column)
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let syntax: SandboxError =
            SyntaxViolation::parse("invalid syntax", Location::new(1, 3)).into();
        assert!(syntax.is_syntax());
        assert!(syntax.is_violation());
        assert!(!syntax.is_naming());

        let naming: SandboxError =
            NamingViolation::new(NamingKind::Identifier, "__class__", None).into();
        assert!(naming.is_naming());
        assert!(naming.to_string().contains("__class__"));

        let evaluation = SandboxError::Evaluation {
            exception_type: "KeyError".into(),
            message: "'x'".into(),
            source_text: "d['x']".into(),
        };
        assert!(evaluation.is_evaluation());
        assert!(!evaluation.is_violation());
        assert!(evaluation.to_string().contains("while evaluating"));
    }

    #[test]
    fn test_diagnostic_points_at_column() {
        let err: SandboxError = SyntaxViolation::parse("invalid syntax", Location::new(1, 3)).into();
        let text = err.diagnostic("a +");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SyntaxViolation : invalid syntax at line 1");
        assert_eq!(lines[1], "a +");
        assert_eq!(lines[2], "   ^");
    }

    #[test]
    fn test_display_includes_location() {
        let v = SyntaxViolation::new(
            SyntaxKind::ForbiddenNode,
            "forbidden syntax: ClassDef",
            Some(Location::new(2, 0)),
        );
        assert_eq!(v.to_string(), "forbidden syntax: ClassDef (line 2, column 1)");
    }
}
