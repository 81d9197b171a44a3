//! Core execution engine for the sandbox.
//!
//! A [`Sandbox`] owns an immutable [`SandboxConfig`]. Every evaluation parses
//! the source, checks and rewrites it, builds fresh gates over the policy
//! snapshot and runs the result on a new [`Vm`].
//!
//! There is no timeout and no memory ceiling. A guest that loops forever
//! blocks the calling thread, so embedders must enforce deadlines themselves.

use std::sync::{Arc, LazyLock};

use crate::error::{
    NamingKind, NamingViolation, Result, SandboxError, SyntaxKind, SyntaxViolation, TypeViolation,
};
use crate::runtime::exceptions;
use crate::runtime::interp::Env;
use crate::runtime::literal::literal_eval;
use crate::runtime::{Bindings, Fault, Value, Vm};
use crate::sandbox::checker::check_and_transform;
use crate::sandbox::config::{EvalOptions, SandboxConfig};
use crate::sandbox::gates::{TypeGate, RESERVED_NAMES};
use crate::sandbox::limits::CallDepthLimiter;
use crate::sandbox::policy::{NodeSet, Policy};
use crate::syntax::{parse, unparse, Mode, Program};

/// Guest source as accepted by [`Sandbox::safe_eval`].
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Text(&'a str),
    /// UTF-8 encoded text.
    Bytes(&'a [u8]),
    /// Always refused: only source text is checked.
    Compiled(&'a CompiledProgram),
}

impl<'a> Source<'a> {
    fn text(self) -> Result<&'a str> {
        match self {
            Source::Text(text) => Ok(text),
            Source::Bytes(bytes) => std::str::from_utf8(bytes).map_err(|e| {
                SyntaxViolation::new(
                    SyntaxKind::InvalidEncoding,
                    format!("source is not valid UTF-8: {e}"),
                    None,
                )
                .into()
            }),
            Source::Compiled(_) => Err(TypeViolation::new(
                "code",
                "pre-compiled code cannot be evaluated in the sandbox",
            )
            .into()),
        }
    }
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(text: &'a str) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a String> for Source<'a> {
    fn from(text: &'a String) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Source<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Source<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a> From<&'a CompiledProgram> for Source<'a> {
    fn from(program: &'a CompiledProgram) -> Self {
        Source::Compiled(program)
    }
}

/// A checked and rewritten program.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    program: Program,
    filename: String,
    source: String,
}

impl CompiledProgram {
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn mode(&self) -> Mode {
        self.program.mode()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The guest source as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The program after gate injection, rendered as source.
    pub fn transformed_source(&self) -> String {
        unparse(&self.program)
    }
}

/// A configured sandbox. Cheap to share; every evaluation is independent.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    /// Create a new sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// A sandbox with default configuration over `policy`.
    pub fn with_policy(policy: Arc<Policy>) -> Self {
        Self::new(SandboxConfig::builder().policy(policy).build())
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<Policy> {
        &self.config.policy
    }

    /// Evaluate guest code.
    ///
    /// In [`Mode::Eval`] the value of the expression is returned after
    /// passing the type gate; in [`Mode::Exec`] the result is `None`. When
    /// `locals` is given, the guest's top-level bindings are written back to
    /// it, also when evaluation fails part way.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use safe_eval_sandbox::prelude::*;
    ///
    /// let sandbox = Sandbox::default();
    /// let mut locals = Bindings::new();
    /// locals.insert("n".into(), Value::Int(4));
    /// let value = sandbox.safe_eval("[x * x for x in range(n)]", Some(&mut locals), &EvalOptions::default())?;
    /// assert_eq!(value.to_string(), "[0, 1, 4, 9]");
    /// ```
    pub fn safe_eval<'a>(
        &self,
        source: impl Into<Source<'a>>,
        locals: Option<&mut Bindings>,
        options: &EvalOptions,
    ) -> Result<Value> {
        let text = source.into().text()?;
        let nodes = match &options.ast_subset {
            Some(subset) => {
                self.validate_subset(subset)?;
                subset
            }
            None => self.policy().allowed_nodes(),
        };
        let mut scratch = Bindings::new();
        let locals = locals.unwrap_or(&mut scratch);
        self.evaluate(text, locals, options, nodes)
    }

    /// Evaluate arithmetic over literals: no names, calls or containers
    /// other than tuples and lists.
    pub fn expr_eval(&self, source: &str) -> Result<Value> {
        self.evaluate(
            source,
            &mut Bindings::new(),
            &EvalOptions::default(),
            self.policy().math_nodes(),
        )
    }

    /// Build the literal `source` denotes. Nothing is compiled or executed.
    pub fn const_eval(&self, source: &str) -> Result<Value> {
        if source.trim().is_empty() {
            return Err(empty_source());
        }
        literal_eval(source).map_err(|fault| self.map_fault(fault, source))
    }

    /// Check and compile `source` without running it.
    ///
    /// Returns a diagnostic naming the violation, its line and the offending
    /// source line, or `None` when the program is acceptable.
    pub fn test_python_expr(&self, source: &str, mode: Mode) -> Option<String> {
        match self.compile(source, mode) {
            Ok(_) => None,
            Err(err) => Some(err.diagnostic(source)),
        }
    }

    /// Check and rewrite `source` against the policy's allowed nodes.
    pub fn compile(&self, source: &str, mode: Mode) -> Result<CompiledProgram> {
        self.compile_with(
            source,
            mode,
            &self.config.default_filename,
            self.policy().allowed_nodes(),
        )
    }

    /// Load a module the policy allows guests to import.
    pub fn import_module(&self, name: &str) -> Result<Value> {
        match self.policy().load_module(name) {
            Some(module) => Ok(module),
            None => Err(self.map_fault(
                exceptions::fault(
                    &exceptions::IMPORT_ERROR,
                    format!("import of {name:?} is not allowed"),
                ),
                name,
            )),
        }
    }

    fn validate_subset(&self, subset: &NodeSet) -> Result<()> {
        let allowed = self.policy().allowed_nodes();
        let mut extra: Vec<_> = subset.difference(allowed).collect();
        if extra.is_empty() {
            return Ok(());
        }
        extra.sort();
        let names: Vec<String> = extra.iter().map(|kind| kind.to_string()).collect();
        Err(SyntaxViolation::new(
            SyntaxKind::InvalidSubset,
            format!("node kinds outside the allowed set: {}", names.join(", ")),
            None,
        )
        .into())
    }

    fn evaluate(
        &self,
        source: &str,
        locals: &mut Bindings,
        options: &EvalOptions,
        nodes: &NodeSet,
    ) -> Result<Value> {
        check_reserved(locals)?;
        if let Some(globals) = &options.globals {
            check_reserved(globals)?;
        }

        let filename = options
            .filename
            .as_deref()
            .unwrap_or(&self.config.default_filename);
        let compiled = self.compile_with(source, options.mode, filename, nodes)?;
        let gate = TypeGate::new(
            self.policy().clone(),
            &options.sandboxed_instances,
            &options.sandboxed_types,
        );
        self.run(&compiled, locals, options.globals.as_ref(), &gate)
    }

    fn compile_with(
        &self,
        source: &str,
        mode: Mode,
        filename: &str,
        nodes: &NodeSet,
    ) -> Result<CompiledProgram> {
        if source.trim().is_empty() {
            return Err(empty_source());
        }
        let text = match mode {
            Mode::Eval => source.trim_start_matches([' ', '\t']),
            Mode::Exec => source,
        };
        let offset = source.len() - text.len();

        let program = parse(text, mode)
            .map_err(SandboxError::from)
            .and_then(|program| check_and_transform(program, nodes))
            .map_err(|err| shift_first_line(err, offset))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            filename,
            mode = mode.as_str(),
            program = %unparse(&program),
            "compiled guest program"
        );

        Ok(CompiledProgram {
            program,
            filename: filename.to_string(),
            source: source.to_string(),
        })
    }

    fn run(
        &self,
        compiled: &CompiledProgram,
        locals: &mut Bindings,
        globals: Option<&Bindings>,
        gate: &Arc<TypeGate>,
    ) -> Result<Value> {
        let mut names = self.policy().builtins();
        if let Some(globals) = globals {
            names.extend(globals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        names.extend(gate.bindings());
        let globals = Env::new(names, None);
        let env = Env::new(std::mem::take(locals), Some(globals));

        let mut vm = Vm::new(CallDepthLimiter::new(self.config.max_call_depth));
        let outcome = vm
            .run(&compiled.program, &env)
            .and_then(|value| match compiled.mode() {
                Mode::Eval => gate.check(value),
                Mode::Exec => Ok(value),
            });

        *locals = env.take_vars();
        vm.release();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            filename = compiled.filename(),
            ok = outcome.is_ok(),
            peak_depth = vm.limiter().peak_depth(),
            "guest evaluation finished"
        );

        outcome.map_err(|fault| self.map_fault(fault, &compiled.source))
    }

    fn map_fault(&self, fault: Fault, source: &str) -> SandboxError {
        match fault {
            Fault::Violation(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "sandbox violation");
                err
            }
            Fault::Exception(exc) if self.config.pass_through.matches(&exc.class) => {
                SandboxError::PassThrough {
                    exception_type: exc.class.name().to_string(),
                    message: exc.message(),
                    class: exc.class.clone(),
                }
            }
            Fault::Exception(exc) => SandboxError::Evaluation {
                exception_type: exc.class.name().to_string(),
                message: exc.message(),
                source_text: source.to_string(),
            },
        }
    }
}

fn check_reserved(bindings: &Bindings) -> Result<()> {
    match RESERVED_NAMES
        .iter()
        .find(|name| bindings.contains_key(**name))
    {
        Some(name) => {
            Err(NamingViolation::new(NamingKind::ReservedName, *name, None).into())
        }
        None => Ok(()),
    }
}

fn empty_source() -> SandboxError {
    SyntaxViolation::new(SyntaxKind::EmptySource, "cannot evaluate empty source", None).into()
}

/// Map locations on the first line back past blanks stripped in eval mode.
fn shift_first_line(mut err: SandboxError, offset: usize) -> SandboxError {
    let location = match &mut err {
        SandboxError::Syntax(v) => v.location.as_mut(),
        SandboxError::Naming(v) => v.location.as_mut(),
        _ => None,
    };
    if let Some(loc) = location {
        if loc.line == 1 {
            loc.column += offset;
        }
    }
    err
}

static DEFAULT_SANDBOX: LazyLock<Sandbox> = LazyLock::new(Sandbox::default);

/// The process-wide sandbox with the default policy.
pub fn default_sandbox() -> &'static Sandbox {
    &DEFAULT_SANDBOX
}

/// [`Sandbox::safe_eval`] on the default sandbox.
pub fn safe_eval<'a>(
    source: impl Into<Source<'a>>,
    locals: Option<&mut Bindings>,
    options: &EvalOptions,
) -> Result<Value> {
    default_sandbox().safe_eval(source, locals, options)
}

/// [`Sandbox::expr_eval`] on the default sandbox.
pub fn expr_eval(source: &str) -> Result<Value> {
    default_sandbox().expr_eval(source)
}

/// [`Sandbox::const_eval`] on the default sandbox.
pub fn const_eval(source: &str) -> Result<Value> {
    default_sandbox().const_eval(source)
}

/// [`Sandbox::test_python_expr`] on the default sandbox.
pub fn test_python_expr(source: &str, mode: Mode) -> Option<String> {
    default_sandbox().test_python_expr(source, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::config::PassThrough;
    use crate::syntax::NodeKind;

    fn eval(source: &str) -> Value {
        safe_eval(source, None, &EvalOptions::default()).unwrap()
    }

    #[test]
    fn test_sandbox_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sandbox>();
    }

    #[test]
    fn test_simple_expression() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("  'a' * 2"), Value::from("aa"));
    }

    #[test]
    fn test_exec_writes_back_locals() {
        let mut locals = Bindings::new();
        locals.insert("n".into(), Value::Int(3));
        let result = safe_eval(
            "m = n * 2\ndel n\n",
            Some(&mut locals),
            &EvalOptions::exec(),
        )
        .unwrap();
        assert_eq!(result, Value::None);
        assert_eq!(locals.get("m"), Some(&Value::Int(6)));
        assert!(!locals.contains_key("n"));
    }

    #[test]
    fn test_locals_written_back_on_failure() {
        let mut locals = Bindings::new();
        let err = safe_eval(
            "a = 1\nb = {}['missing']\n",
            Some(&mut locals),
            &EvalOptions::exec(),
        )
        .unwrap_err();
        assert!(err.is_evaluation());
        assert_eq!(locals.get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_globals_behind_locals() {
        let mut locals = Bindings::new();
        locals.insert("x".into(), Value::Int(1));
        let mut globals = Bindings::new();
        globals.insert("x".into(), Value::Int(100));
        globals.insert("y".into(), Value::Int(10));
        let options = EvalOptions::default().globals(globals);
        let value = safe_eval("x + y", Some(&mut locals), &options).unwrap();
        assert_eq!(value, Value::Int(11));
        assert!(!locals.contains_key("y"));
    }

    #[test]
    fn test_bytes_source() {
        assert_eq!(safe_eval(b"40 + 2", None, &EvalOptions::default()).unwrap(), Value::Int(42));
        let err = safe_eval(&[0xffu8, 0xfe][..], None, &EvalOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Syntax(SyntaxViolation { kind: SyntaxKind::InvalidEncoding, .. })
        ));
    }

    #[test]
    fn test_compiled_program_refused() {
        let compiled = default_sandbox().compile("1", Mode::Eval).unwrap();
        let err = safe_eval(&compiled, None, &EvalOptions::default()).unwrap_err();
        assert!(err.is_type_violation());
    }

    #[test]
    fn test_empty_source() {
        for source in ["", "   ", "\n\n"] {
            let err = safe_eval(source, None, &EvalOptions::default()).unwrap_err();
            assert!(matches!(
                err,
                SandboxError::Syntax(SyntaxViolation { kind: SyntaxKind::EmptySource, .. })
            ));
        }
    }

    #[test]
    fn test_reserved_names_rejected_before_parsing() {
        for name in RESERVED_NAMES {
            let mut locals = Bindings::new();
            locals.insert(name.to_string(), Value::None);
            let err = safe_eval("this is not ( python", Some(&mut locals), &EvalOptions::default())
                .unwrap_err();
            assert!(err.is_naming(), "{name}: {err}");
        }
    }

    #[test]
    fn test_invalid_subset() {
        let subset: NodeSet = [NodeKind::Expression, NodeKind::Import].into_iter().collect();
        let err = safe_eval("1", None, &EvalOptions::default().ast_subset(subset)).unwrap_err();
        match err {
            SandboxError::Syntax(v) => {
                assert_eq!(v.kind, SyntaxKind::InvalidSubset);
                assert!(v.message.contains("Import"));
            }
            other => panic!("expected invalid subset, got {other:?}"),
        }
    }

    #[test]
    fn test_evaluation_error_carries_source() {
        match safe_eval("int('x')", None, &EvalOptions::default()).unwrap_err() {
            SandboxError::Evaluation {
                exception_type,
                source_text,
                ..
            } => {
                assert_eq!(exception_type, "ValueError");
                assert_eq!(source_text, "int('x')");
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_division_passes_through() {
        let err = safe_eval("1 / 0", None, &EvalOptions::default()).unwrap_err();
        assert!(err.is_pass_through());

        let strict = Sandbox::new(SandboxConfig::builder().pass_through(PassThrough::none()).build());
        let err = strict.safe_eval("1 / 0", None, &EvalOptions::default()).unwrap_err();
        assert!(err.is_evaluation());
    }

    #[test]
    fn test_recursion_limit() {
        let sandbox = Sandbox::new(SandboxConfig::builder().max_call_depth(8).build());
        let source = "def f(n):\n    return f(n + 1)\nf(0)\n";
        match sandbox.safe_eval(source, None, &EvalOptions::exec()).unwrap_err() {
            SandboxError::Evaluation { exception_type, .. } => {
                assert_eq!(exception_type, "RecursionError")
            }
            other => panic!("expected RecursionError, got {other:?}"),
        }
    }

    #[test]
    fn test_expr_eval_math_only() {
        assert_eq!(expr_eval("(1 + 2) ** 2 - 1").unwrap(), Value::Int(8));
        assert!(expr_eval("abs(-1)").unwrap_err().is_syntax());
        assert!(expr_eval("x").unwrap_err().is_syntax());
    }

    #[test]
    fn test_const_eval() {
        assert_eq!(const_eval("[1, -2]").unwrap().to_string(), "[1, -2]");
        assert!(const_eval("len('a')").unwrap_err().is_evaluation());
        assert!(const_eval("").unwrap_err().is_syntax());
    }

    #[test]
    fn test_diagnostic() {
        assert!(test_python_expr("a + 1", Mode::Eval).is_none());
        let text = test_python_expr("a +", Mode::Eval).unwrap();
        assert!(text.contains("line 1"), "{text}");
        assert!(text.contains("a +"));
        assert!(text.contains('^'));
    }

    #[test]
    fn test_diagnostic_after_stripped_blanks() {
        let text = test_python_expr("  x.__class__", Mode::Eval).unwrap();
        assert!(text.starts_with("NamingViolation"), "{text}");
    }

    #[test]
    fn test_transformed_source() {
        let compiled = default_sandbox().compile("len(x)", Mode::Eval).unwrap();
        assert_eq!(compiled.transformed_source(), "__sandbox_call(len, x)");
        assert_eq!(compiled.filename(), "<sandbox>");
        assert_eq!(compiled.source(), "len(x)");
    }

    #[test]
    fn test_import_module() {
        assert!(default_sandbox().import_module("math").is_ok());
        match default_sandbox().import_module("os").unwrap_err() {
            SandboxError::Evaluation { exception_type, .. } => {
                assert_eq!(exception_type, "ImportError")
            }
            other => panic!("expected ImportError, got {other:?}"),
        }
    }
}
