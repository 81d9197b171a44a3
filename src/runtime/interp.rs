//! Tree-walking executor for checked programs.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use crate::error::{SyntaxKind, SyntaxViolation};
use crate::runtime::class::{self, Class};
use crate::runtime::exceptions::{self, raise, Exception};
use crate::runtime::format;
use crate::runtime::methods;
use crate::runtime::ops;
use crate::runtime::value::{
    Bindings, Builtin, BuiltinKind, CallArgs, Dict, Function, FunctionBody, HashKey, Range,
    Signature, SliceValue, Value,
};
use crate::runtime::{Fault, VmResult};
use crate::sandbox::limits::CallDepthLimiter;
use crate::syntax::ast::{self, Constant, Expr, Stmt};
use crate::syntax::{
    expr_kind, stmt_kind, BinOperator, BoolOperator, Body, CmpOperator, Program, UnaryOperator,
};

/// A lexical scope.
pub struct Env {
    vars: RefCell<Bindings>,
    parent: Option<Rc<Env>>,
    /// Names assigned somewhere in this scope; reading one before it is
    /// bound raises `UnboundLocalError` instead of falling through.
    locals: Rc<HashSet<String>>,
}

impl Env {
    pub fn new(vars: Bindings, parent: Option<Rc<Env>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(vars),
            parent,
            locals: Rc::default(),
        })
    }

    fn scope(parent: &Rc<Env>, locals: Rc<HashSet<String>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
            locals,
        })
    }

    /// Resolve `name`, innermost scope first.
    pub fn lookup(&self, name: &str) -> VmResult<Value> {
        let mut current = Some(self);
        while let Some(env) = current {
            if let Some(value) = env.vars.borrow().get(name) {
                return Ok(value.clone());
            }
            if env.locals.contains(name) {
                return raise(
                    &exceptions::UNBOUND_LOCAL_ERROR,
                    format!("cannot access local variable '{name}' where it is not associated with a value"),
                );
            }
            current = env.parent.as_deref();
        }
        raise(
            &exceptions::NAME_ERROR,
            format!("name '{name}' is not defined"),
        )
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    fn remove(&self, name: &str) -> bool {
        self.vars.borrow_mut().shift_remove(name).is_some()
    }

    /// Move every binding out of this scope.
    pub fn take_vars(&self) -> Bindings {
        std::mem::take(&mut *self.vars.borrow_mut())
    }
}

/// Control flow out of a statement.
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Executor state for one evaluation.
pub struct Vm {
    limiter: CallDepthLimiter,
    /// Exceptions currently being handled, innermost last.
    handling: Vec<Rc<Exception>>,
    /// Scopes captured by closures; cleared by [`Vm::release`].
    captured: Vec<Weak<Env>>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(CallDepthLimiter::default())
    }
}

impl Vm {
    pub fn new(limiter: CallDepthLimiter) -> Self {
        Self {
            limiter,
            handling: Vec::new(),
            captured: Vec::new(),
        }
    }

    pub fn limiter(&self) -> &CallDepthLimiter {
        &self.limiter
    }

    /// Evaluate an expression program or execute a statement program.
    pub fn run(&mut self, program: &Program, env: &Rc<Env>) -> VmResult<Value> {
        match program.body() {
            Body::Expression(expr) => self.eval(env, expr),
            Body::Module(body) => {
                self.exec_block(env, body)?;
                Ok(Value::None)
            }
        }
    }

    /// Break the reference cycles between closures and the scopes they
    /// capture. Functions that outlive the evaluation see empty scopes.
    pub fn release(&mut self) {
        for env in self.captured.drain(..) {
            if let Some(env) = env.upgrade() {
                drop(env.take_vars());
            }
        }
    }

    fn capture(&mut self, env: &Rc<Env>) {
        let ptr = Rc::as_ptr(env);
        if !self.captured.iter().any(|w| w.as_ptr() == ptr) {
            self.captured.push(Rc::downgrade(env));
        }
    }

    // -- statements ------------------------------------------------------

    pub fn exec_block(&mut self, env: &Rc<Env>, body: &[Stmt]) -> VmResult<Flow> {
        for stmt in body {
            match self.exec(env, stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, env: &Rc<Env>, stmt: &Stmt) -> VmResult<Flow> {
        match stmt {
            Stmt::Expr(s) => {
                self.eval(env, &s.value)?;
            }
            Stmt::Assign(s) => {
                let value = self.eval(env, &s.value)?;
                for target in &s.targets {
                    self.assign(env, target, value.clone())?;
                }
            }
            Stmt::AugAssign(s) => {
                let op = BinOperator::from(s.op);
                match &*s.target {
                    Expr::Name(name) => {
                        let current = env.lookup(name.id.as_str())?;
                        let rhs = self.eval(env, &s.value)?;
                        let updated = ops::inplace(self, op, &current, &rhs)?;
                        env.set(name.id.as_str(), updated);
                    }
                    Expr::Subscript(subscript) => {
                        let container = self.eval(env, &subscript.value)?;
                        let key = self.eval(env, &subscript.slice)?;
                        let current = self.get_item(&container, &key)?;
                        let rhs = self.eval(env, &s.value)?;
                        let updated = ops::inplace(self, op, &current, &rhs)?;
                        self.set_item(&container, key, updated)?;
                    }
                    target => return Err(bad_target(target).into()),
                }
            }
            Stmt::AnnAssign(s) => {
                if let Some(value) = &s.value {
                    let value = self.eval(env, value)?;
                    self.assign(env, &s.target, value)?;
                }
            }
            Stmt::Pass(_) => {}
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Continue(_) => return Ok(Flow::Continue),
            Stmt::Return(s) => {
                let value = match &s.value {
                    Some(expr) => self.eval(env, expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Delete(s) => {
                for target in &s.targets {
                    self.delete(env, target)?;
                }
            }
            Stmt::Raise(s) => {
                let Some(exc) = &s.exc else {
                    return match self.handling.last() {
                        Some(current) => Err(Fault::Exception(current.clone())),
                        None => raise(&exceptions::RUNTIME_ERROR, "No active exception to reraise"),
                    };
                };
                let value = self.eval(env, exc)?;
                let fault = self.to_exception(value)?;
                let Some(cause) = &s.cause else {
                    return Err(fault);
                };
                let cause = match self.eval(env, cause)? {
                    Value::None => None,
                    value => match self.to_exception(value) {
                        Ok(Fault::Exception(cause)) => Some(cause),
                        _ => {
                            return raise(
                                &exceptions::TYPE_ERROR,
                                "exception causes must derive from BaseException",
                            )
                        }
                    },
                };
                return Err(match fault {
                    Fault::Exception(exc) => {
                        let mut exc = Exception::clone(&exc);
                        exc.cause = cause;
                        exc.into()
                    }
                    violation => violation,
                });
            }
            Stmt::Assert(s) => {
                if !ops::truthy(&self.eval(env, &s.test)?) {
                    let args = match &s.msg {
                        Some(msg) => vec![self.eval(env, msg)?],
                        None => Vec::new(),
                    };
                    return Err(Exception::with_args(&exceptions::ASSERTION_ERROR, args).into());
                }
            }
            Stmt::If(s) => {
                let branch = if ops::truthy(&self.eval(env, &s.test)?) {
                    &s.body
                } else {
                    &s.orelse
                };
                return self.exec_block(env, branch);
            }
            Stmt::While(s) => {
                while ops::truthy(&self.eval(env, &s.test)?) {
                    match self.exec_block(env, &s.body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(env, &s.orelse);
            }
            Stmt::For(s) => {
                let iterable = self.eval(env, &s.iter)?;
                for item in ops::iterate(self, &iterable)? {
                    self.assign(env, &s.target, item)?;
                    match self.exec_block(env, &s.body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(env, &s.orelse);
            }
            Stmt::Try(s) => {
                return self.exec_try(env, &s.body, &s.handlers, &s.orelse, &s.finalbody)
            }
            Stmt::FunctionDef(def) => {
                let mut function = self.make_function(
                    env,
                    def.name.as_str(),
                    &def.args,
                    FunctionBody::Block(Rc::new(def.body.clone())),
                )?;
                for decorator in def.decorator_list.iter().rev() {
                    let decorator = self.eval(env, decorator)?;
                    function = self.call(&decorator, CallArgs::new(vec![function]))?;
                }
                env.set(def.name.as_str(), function);
            }
            other => {
                return Err(SyntaxViolation::new(
                    SyntaxKind::ForbiddenNode,
                    format!("'{}' statements cannot be executed", stmt_kind(other)),
                    None,
                )
                .into())
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        env: &Rc<Env>,
        body: &[Stmt],
        handlers: &[ast::ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> VmResult<Flow> {
        let outcome = match self.exec_block(env, body) {
            Ok(Flow::Normal) => self.exec_block(env, orelse),
            Ok(flow) => Ok(flow),
            Err(Fault::Exception(exc)) => self.handle(env, exc, handlers),
            Err(violation) => Err(violation),
        };
        if finalbody.is_empty() {
            return outcome;
        }
        let cleanup = self.exec_block(env, finalbody);
        // A violation survives any flow out of the cleanup.
        if let Err(violation @ Fault::Violation(_)) = outcome {
            return Err(violation);
        }
        match cleanup? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn handle(
        &mut self,
        env: &Rc<Env>,
        exc: Rc<Exception>,
        handlers: &[ast::ExceptHandler],
    ) -> VmResult<Flow> {
        for ast::ExceptHandler::ExceptHandler(handler) in handlers {
            if let Some(typ) = &handler.type_ {
                let typ = self.eval(env, typ)?;
                if !exception_matches(&exc, &typ)? {
                    continue;
                }
            }
            if let Some(name) = &handler.name {
                env.set(name.as_str(), Value::Exception(exc.clone()));
            }
            self.handling.push(exc.clone());
            let result = self.exec_block(env, &handler.body);
            self.handling.pop();
            if let Some(name) = &handler.name {
                env.remove(name.as_str());
            }
            return result;
        }
        Err(Fault::Exception(exc))
    }

    fn to_exception(&mut self, value: Value) -> VmResult<Fault> {
        match value {
            Value::Exception(exc) => Ok(Fault::Exception(exc)),
            Value::Class(class) if class.is_subclass_of(&exceptions::EXCEPTION) => {
                Ok(Exception::with_args(&class, Vec::new()).into())
            }
            Value::Wrapper(w) => self.to_exception(w.inner().clone()),
            _ => raise(
                &exceptions::TYPE_ERROR,
                "exceptions must derive from BaseException",
            ),
        }
    }

    // -- targets ---------------------------------------------------------

    fn assign(&mut self, env: &Rc<Env>, target: &Expr, value: Value) -> VmResult<()> {
        match target {
            Expr::Name(name) => {
                env.set(name.id.as_str(), value);
                Ok(())
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                let items = ops::iterate(self, &value)?;
                let star = elts.iter().position(|e| matches!(e, Expr::Starred(_)));
                match star {
                    None => {
                        if items.len() != elts.len() {
                            return unpack_error(elts.len(), items.len());
                        }
                        for (elt, item) in elts.iter().zip(items) {
                            self.assign(env, elt, item)?;
                        }
                    }
                    Some(star) => {
                        let after = elts.len() - star - 1;
                        if items.len() < star + after {
                            return raise(
                                &exceptions::VALUE_ERROR,
                                format!(
                                    "not enough values to unpack (expected at least {}, got {})",
                                    star + after,
                                    items.len()
                                ),
                            );
                        }
                        let mut items = items;
                        let tail = items.split_off(items.len() - after);
                        let middle = items.split_off(star);
                        for (elt, item) in elts[..star].iter().zip(items) {
                            self.assign(env, elt, item)?;
                        }
                        if let Expr::Starred(starred) = &elts[star] {
                            self.assign(env, &starred.value, Value::list(middle))?;
                        }
                        for (elt, item) in elts[star + 1..].iter().zip(tail) {
                            self.assign(env, elt, item)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::Subscript(subscript) => {
                let container = self.eval(env, &subscript.value)?;
                let key = self.eval(env, &subscript.slice)?;
                self.set_item(&container, key, value)
            }
            _ => Err(bad_target(target).into()),
        }
    }

    fn delete(&mut self, env: &Rc<Env>, target: &Expr) -> VmResult<()> {
        match target {
            Expr::Name(name) => {
                if env.remove(name.id.as_str()) {
                    Ok(())
                } else {
                    raise(
                        &exceptions::NAME_ERROR,
                        format!("name '{}' is not defined", name.id),
                    )
                }
            }
            Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
                for elt in elts {
                    self.delete(env, elt)?;
                }
                Ok(())
            }
            Expr::Subscript(subscript) => {
                let container = self.eval(env, &subscript.value)?;
                let key = self.eval(env, &subscript.slice)?;
                self.del_item(&container, &key)
            }
            _ => Err(bad_target(target).into()),
        }
    }

    // -- expressions -----------------------------------------------------

    pub fn eval(&mut self, env: &Rc<Env>, expr: &Expr) -> VmResult<Value> {
        match expr {
            Expr::Constant(constant) => constant_value(&constant.value),
            Expr::JoinedStr(joined) => {
                let mut out = String::new();
                for part in &joined.values {
                    match part {
                        Expr::Constant(ast::ExprConstant {
                            value: Constant::Str(text),
                            ..
                        }) => out.push_str(text),
                        other => out.push_str(&format::to_str(&self.eval(env, other)?)),
                    }
                }
                Ok(Value::from(out))
            }
            Expr::FormattedValue(formatted) => {
                let value = self.eval(env, &formatted.value)?;
                let value = match formatted.conversion {
                    ast::ConversionFlag::Repr => Value::from(format::repr(&value)),
                    ast::ConversionFlag::Str => Value::from(format::to_str(&value)),
                    ast::ConversionFlag::Ascii => Value::from(format::ascii(&value)),
                    ast::ConversionFlag::None => value,
                };
                let spec = match &formatted.format_spec {
                    Some(spec) => format::to_str(&self.eval(env, spec)?),
                    None => String::new(),
                };
                format::format_value(&value, &spec).map(Value::from)
            }
            Expr::Name(name) => env.lookup(name.id.as_str()),
            Expr::List(list) => self.eval_elements(env, &list.elts).map(Value::list),
            Expr::Tuple(tuple) => self.eval_elements(env, &tuple.elts).map(Value::tuple),
            Expr::Set(set) => {
                let items = self.eval_elements(env, &set.elts)?;
                let set = items
                    .into_iter()
                    .map(HashKey::new)
                    .collect::<VmResult<_>>()?;
                Ok(Value::set(set))
            }
            Expr::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries.keys.iter().zip(&entries.values) {
                    match key {
                        Some(key) => {
                            let key = HashKey::new(self.eval(env, key)?)?;
                            let value = self.eval(env, value)?;
                            dict.insert(key, value);
                        }
                        None => {
                            let mapping = self.eval(env, value)?;
                            for (k, v) in mapping_items(&mapping)? {
                                dict.insert(k, v);
                            }
                        }
                    }
                }
                Ok(Value::dict(dict))
            }
            Expr::BinOp(e) => {
                let left = self.eval(env, &e.left)?;
                let right = self.eval(env, &e.right)?;
                ops::binary(self, BinOperator::from(e.op), &left, &right)
            }
            Expr::UnaryOp(e) => {
                let operand = self.eval(env, &e.operand)?;
                ops::unary(UnaryOperator::from(e.op), &operand)
            }
            Expr::BoolOp(e) => {
                let op = BoolOperator::from(e.op);
                let mut result = Value::None;
                for value in &e.values {
                    result = self.eval(env, value)?;
                    let truth = ops::truthy(&result);
                    match op {
                        BoolOperator::And if !truth => break,
                        BoolOperator::Or if truth => break,
                        _ => {}
                    }
                }
                Ok(result)
            }
            Expr::Compare(e) => {
                let mut left = self.eval(env, &e.left)?;
                for (op, comparator) in e.ops.iter().zip(&e.comparators) {
                    let right = self.eval(env, comparator)?;
                    if !ops::compare(self, CmpOperator::from(*op), &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::IfExp(e) => {
                if ops::truthy(&self.eval(env, &e.test)?) {
                    self.eval(env, &e.body)
                } else {
                    self.eval(env, &e.orelse)
                }
            }
            Expr::Lambda(lambda) => self.make_function(
                env,
                "<lambda>",
                &lambda.args,
                FunctionBody::Expr(Rc::new(Expr::clone(&lambda.body))),
            ),
            Expr::Call(call) => {
                let func = self.eval(env, &call.func)?;
                let args = self.eval_args(env, &call.args, &call.keywords)?;
                self.call(&func, args)
            }
            Expr::Attribute(attribute) => {
                let value = self.eval(env, &attribute.value)?;
                self.get_attr(&value, attribute.attr.as_str())
            }
            Expr::Subscript(subscript) => {
                let value = self.eval(env, &subscript.value)?;
                let index = self.eval(env, &subscript.slice)?;
                self.get_item(&value, &index)
            }
            Expr::Slice(slice) => {
                let mut bound = |part: &Option<Box<Expr>>| -> VmResult<Option<i64>> {
                    let Some(part) = part else { return Ok(None) };
                    match self.eval(env, part)? {
                        Value::None => Ok(None),
                        other => other.as_int().map(Some).ok_or_else(|| {
                            exceptions::fault(
                                &exceptions::TYPE_ERROR,
                                "slice indices must be integers or None",
                            )
                        }),
                    }
                };
                Ok(Value::Slice(SliceValue {
                    lower: bound(&slice.lower)?,
                    upper: bound(&slice.upper)?,
                    step: bound(&slice.step)?,
                }))
            }
            Expr::ListComp(comp) => {
                let mut out = Vec::new();
                self.comprehension(env, &comp.generators, &mut |vm, scope| {
                    out.push(vm.eval(scope, &comp.elt)?);
                    Ok(())
                })?;
                Ok(Value::list(out))
            }
            Expr::GeneratorExp(comp) => {
                let mut out = Vec::new();
                self.comprehension(env, &comp.generators, &mut |vm, scope| {
                    out.push(vm.eval(scope, &comp.elt)?);
                    Ok(())
                })?;
                Ok(Value::iterator(&class::GENERATOR, out))
            }
            Expr::SetComp(comp) => {
                let mut out = indexmap::IndexSet::new();
                self.comprehension(env, &comp.generators, &mut |vm, scope| {
                    out.insert(HashKey::new(vm.eval(scope, &comp.elt)?)?);
                    Ok(())
                })?;
                Ok(Value::set(out))
            }
            Expr::DictComp(comp) => {
                let mut out = Dict::new();
                self.comprehension(env, &comp.generators, &mut |vm, scope| {
                    let k = HashKey::new(vm.eval(scope, &comp.key)?)?;
                    let v = vm.eval(scope, &comp.value)?;
                    out.insert(k, v);
                    Ok(())
                })?;
                Ok(Value::dict(out))
            }
            Expr::NamedExpr(e) => {
                let value = self.eval(env, &e.value)?;
                self.assign(env, &e.target, value.clone())?;
                Ok(value)
            }
            Expr::Starred(_) => raise(
                &exceptions::TYPE_ERROR,
                "can't use starred expression here",
            ),
            Expr::Yield(_) | Expr::YieldFrom(_) | Expr::Await(_) => Err(SyntaxViolation::new(
                SyntaxKind::ForbiddenNode,
                format!("'{}' expressions cannot be executed", expr_kind(expr)),
                None,
            )
            .into()),
        }
    }

    fn eval_elements(&mut self, env: &Rc<Env>, elts: &[Expr]) -> VmResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elts.len());
        for elt in elts {
            match elt {
                Expr::Starred(starred) => {
                    let value = self.eval(env, &starred.value)?;
                    out.extend(ops::iterate(self, &value)?);
                }
                _ => out.push(self.eval(env, elt)?),
            }
        }
        Ok(out)
    }

    fn eval_args(
        &mut self,
        env: &Rc<Env>,
        args: &[Expr],
        keywords: &[ast::Keyword],
    ) -> VmResult<CallArgs> {
        let mut call = CallArgs::new(self.eval_elements(env, args)?);
        for keyword in keywords {
            let value = self.eval(env, &keyword.value)?;
            match &keyword.arg {
                Some(name) => call.keywords.push((name.to_string(), value)),
                None => {
                    for (key, item) in mapping_items(&value)? {
                        match key.into_value() {
                            Value::Str(name) => call.keywords.push((name.to_string(), item)),
                            _ => return raise(&exceptions::TYPE_ERROR, "keywords must be strings"),
                        }
                    }
                }
            }
        }
        Ok(call)
    }

    fn comprehension(
        &mut self,
        env: &Rc<Env>,
        generators: &[ast::Comprehension],
        emit: &mut dyn FnMut(&mut Vm, &Rc<Env>) -> VmResult<()>,
    ) -> VmResult<()> {
        let Some(first) = generators.first() else {
            return Ok(());
        };
        let iterable = self.eval(env, &first.iter)?;
        let mut names = HashSet::new();
        for generator in generators {
            target_names(&generator.target, &mut names);
        }
        let scope = Env::scope(env, Rc::new(names));
        self.comprehension_level(&scope, generators, iterable, emit)
    }

    fn comprehension_level(
        &mut self,
        scope: &Rc<Env>,
        generators: &[ast::Comprehension],
        iterable: Value,
        emit: &mut dyn FnMut(&mut Vm, &Rc<Env>) -> VmResult<()>,
    ) -> VmResult<()> {
        let (generator, rest) = match generators.split_first() {
            Some(split) => split,
            None => return Ok(()),
        };
        'items: for item in ops::iterate(self, &iterable)? {
            self.assign(scope, &generator.target, item)?;
            for condition in &generator.ifs {
                if !ops::truthy(&self.eval(scope, condition)?) {
                    continue 'items;
                }
            }
            match rest.first() {
                Some(next) => {
                    let inner = self.eval(scope, &next.iter)?;
                    self.comprehension_level(scope, rest, inner, emit)?;
                }
                None => emit(self, scope)?,
            }
        }
        Ok(())
    }

    // -- functions -------------------------------------------------------

    fn make_function(
        &mut self,
        env: &Rc<Env>,
        name: &str,
        arguments: &ast::Arguments,
        body: FunctionBody,
    ) -> VmResult<Value> {
        let params = Signature::new(arguments);
        let mut defaults = Vec::with_capacity(params.args.len());
        for arg in arguments.posonlyargs.iter().chain(&arguments.args) {
            defaults.push(match &arg.default {
                Some(expr) => Some(self.eval(env, expr)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(params.kwonly.len());
        for arg in &arguments.kwonlyargs {
            kw_defaults.push(match &arg.default {
                Some(expr) => Some(self.eval(env, expr)?),
                None => None,
            });
        }
        let mut local_names: HashSet<String> = params.names().map(str::to_string).collect();
        if let FunctionBody::Block(stmts) = &body {
            assigned_names(stmts, &mut local_names);
        }
        self.capture(env);
        Ok(Value::Function(Rc::new(Function {
            name: name.to_string(),
            params,
            defaults,
            kw_defaults,
            body,
            env: env.clone(),
            local_names: Rc::new(local_names),
        })))
    }

    /// Call any callable value.
    pub fn call(&mut self, func: &Value, args: CallArgs) -> VmResult<Value> {
        match func {
            Value::Function(function) => {
                self.limiter.enter()?;
                let result = self.call_function(function, args);
                self.limiter.exit();
                result
            }
            Value::Builtin(builtin) => builtin.invoke(self, args),
            Value::Class(class) => self.instantiate(class, args),
            Value::Object(obj) if obj.is_callable() => obj.call(self, args),
            Value::Wrapper(wrapper) => wrapper.call(self, args),
            other => raise(
                &exceptions::TYPE_ERROR,
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn instantiate(&mut self, class: &Class, args: CallArgs) -> VmResult<Value> {
        if class.is_subclass_of(&exceptions::EXCEPTION) {
            if !args.keywords.is_empty() {
                return raise(
                    &exceptions::TYPE_ERROR,
                    format!("{}() takes no keyword arguments", class.name()),
                );
            }
            return Ok(Value::Exception(Rc::new(Exception::with_args(
                class,
                args.positional,
            ))));
        }
        match class.constructor() {
            Some(constructor) => {
                let constructor = constructor.clone();
                constructor(self, args)
            }
            None => raise(
                &exceptions::TYPE_ERROR,
                format!("cannot create '{}' instances", class.name()),
            ),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: CallArgs) -> VmResult<Value> {
        let env = Env::scope(&func.env, func.local_names.clone());
        bind_parameters(func, &env, args)?;
        match &func.body {
            FunctionBody::Expr(expr) => self.eval(&env, expr),
            FunctionBody::Block(body) => match self.exec_block(&env, body)? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::None),
            },
        }
    }

    // -- attributes and items --------------------------------------------

    /// `value.name`.
    pub fn get_attr(&mut self, value: &Value, name: &str) -> VmResult<Value> {
        let found = match value {
            Value::Wrapper(wrapper) => return wrapper.get_attr(self, name),
            Value::Object(obj) => obj.get_attr(self, name)?,
            Value::Module(module) => module.attrs.get(name).cloned(),
            Value::Class(class) => class.static_method(name).map(|f| {
                Value::Builtin(Rc::new(Builtin::new(
                    name.to_string(),
                    f.clone(),
                    BuiltinKind::Function,
                )))
            }),
            other => methods::lookup(other, name),
        };
        found.ok_or_else(|| {
            let message = match value {
                Value::Module(module) => {
                    format!("module '{}' has no attribute '{name}'", module.name)
                }
                Value::Class(class) => {
                    format!("type object '{}' has no attribute '{name}'", class.name())
                }
                other => format!("'{}' object has no attribute '{name}'", other.type_name()),
            };
            exceptions::fault(&exceptions::ATTRIBUTE_ERROR, message)
        })
    }

    /// `container[key]`.
    pub fn get_item(&mut self, container: &Value, key: &Value) -> VmResult<Value> {
        match container {
            Value::Str(s) => match key {
                Value::Slice(slice) => {
                    let chars: Vec<char> = s.chars().collect();
                    let picked: String = slice
                        .positions(chars.len())?
                        .into_iter()
                        .map(|i| chars[i])
                        .collect();
                    Ok(Value::from(picked))
                }
                _ => {
                    let len = s.chars().count();
                    let index = sequence_index(key, len, "string")?;
                    s.chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .ok_or_else(|| index_error("string"))
                }
            },
            Value::List(items) => {
                let items = items.borrow();
                match key {
                    Value::Slice(slice) => Ok(Value::list(
                        slice
                            .positions(items.len())?
                            .into_iter()
                            .map(|i| items[i].clone())
                            .collect(),
                    )),
                    _ => Ok(items[sequence_index(key, items.len(), "list")?].clone()),
                }
            }
            Value::Tuple(items) => match key {
                Value::Slice(slice) => Ok(Value::tuple(
                    slice
                        .positions(items.len())?
                        .into_iter()
                        .map(|i| items[i].clone())
                        .collect(),
                )),
                _ => Ok(items[sequence_index(key, items.len(), "tuple")?].clone()),
            },
            Value::Range(range) => match key {
                Value::Slice(slice) => {
                    let len = i64::try_from(range.len()).map_err(|_| range_overflow())?;
                    let (start, stop, step) = slice.indices(len as usize)?;
                    let at = |index: i64| {
                        let value = i128::from(range.start) + i128::from(index) * i128::from(range.step);
                        i64::try_from(value).map_err(|_| range_overflow())
                    };
                    Ok(Value::Range(Range {
                        start: at(start)?,
                        stop: at(stop)?,
                        step: range.step.checked_mul(step).ok_or_else(range_overflow)?,
                    }))
                }
                _ => {
                    let index = sequence_index(key, range.len(), "range object")?;
                    range
                        .get(index)
                        .map(Value::Int)
                        .ok_or_else(|| index_error("range object"))
                }
            },
            Value::Dict(dict) => {
                let hash_key = HashKey::new(key.clone())?;
                let found = dict.borrow().get(&hash_key).cloned();
                found.ok_or_else(|| {
                    Exception::with_args(&exceptions::KEY_ERROR, vec![key.clone()]).into()
                })
            }
            Value::Wrapper(wrapper) => wrapper.get_item(self, key),
            Value::Object(obj) => obj.get_item(self, key),
            other => raise(
                &exceptions::TYPE_ERROR,
                format!("'{}' object is not subscriptable", other.type_name()),
            ),
        }
    }

    /// `container[key] = value`.
    pub fn set_item(&mut self, container: &Value, key: Value, value: Value) -> VmResult<()> {
        match container {
            Value::List(items) => match &key {
                Value::Slice(slice) => {
                    let replacement = ops::iterate(self, &value)?;
                    let mut items = items.borrow_mut();
                    let (start, stop, step) = slice.indices(items.len())?;
                    if step == 1 {
                        let start = start.max(0) as usize;
                        let stop = (stop.max(0) as usize).max(start);
                        items.splice(start..stop, replacement);
                        return Ok(());
                    }
                    let positions = slice.positions(items.len())?;
                    if positions.len() != replacement.len() {
                        return raise(
                            &exceptions::VALUE_ERROR,
                            format!(
                                "attempt to assign sequence of size {} to extended slice of size {}",
                                replacement.len(),
                                positions.len()
                            ),
                        );
                    }
                    for (position, item) in positions.into_iter().zip(replacement) {
                        items[position] = item;
                    }
                    Ok(())
                }
                _ => {
                    let mut items = items.borrow_mut();
                    let index = sequence_index(&key, items.len(), "list assignment")?;
                    items[index] = value;
                    Ok(())
                }
            },
            Value::Dict(dict) => {
                let key = HashKey::new(key)?;
                dict.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::Wrapper(wrapper) => wrapper.set_item(self, key, value),
            Value::Object(obj) => obj.set_item(self, key, value),
            other => raise(
                &exceptions::TYPE_ERROR,
                format!(
                    "'{}' object does not support item assignment",
                    other.type_name()
                ),
            ),
        }
    }

    /// `del container[key]`.
    pub fn del_item(&mut self, container: &Value, key: &Value) -> VmResult<()> {
        match container {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                match key {
                    Value::Slice(slice) => {
                        let mut positions = slice.positions(items.len())?;
                        positions.sort_unstable();
                        for position in positions.into_iter().rev() {
                            items.remove(position);
                        }
                    }
                    _ => {
                        let index = sequence_index(key, items.len(), "list assignment")?;
                        items.remove(index);
                    }
                }
                Ok(())
            }
            Value::Dict(dict) => {
                let hash_key = HashKey::new(key.clone())?;
                match dict.borrow_mut().shift_remove(&hash_key) {
                    Some(_) => Ok(()),
                    None => Err(Exception::with_args(&exceptions::KEY_ERROR, vec![key.clone()]).into()),
                }
            }
            Value::Wrapper(wrapper) => wrapper.del_item(self, key),
            other => raise(
                &exceptions::TYPE_ERROR,
                format!("'{}' object doesn't support item deletion", other.type_name()),
            ),
        }
    }
}

fn constant_value(constant: &Constant) -> VmResult<Value> {
    Ok(match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => match i64::try_from(i) {
            Ok(i) => Value::Int(i),
            Err(_) => return raise(&exceptions::OVERFLOW_ERROR, "integer literal too large"),
        },
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s),
        Constant::Tuple(items) => Value::tuple(
            items
                .iter()
                .map(constant_value)
                .collect::<VmResult<Vec<_>>>()?,
        ),
        Constant::Bytes(_) | Constant::Complex { .. } | Constant::Ellipsis => {
            return Err(SyntaxViolation::new(
                SyntaxKind::Parse,
                "unsupported literal",
                None,
            )
            .into())
        }
    })
}

fn bad_target(target: &Expr) -> SyntaxViolation {
    SyntaxViolation::new(
        SyntaxKind::AssignmentShape,
        format!("cannot assign to {}", expr_kind(target)),
        None,
    )
}

fn unpack_error<T>(expected: usize, got: usize) -> VmResult<T> {
    let message = if got > expected {
        format!("too many values to unpack (expected {expected})")
    } else {
        format!("not enough values to unpack (expected {expected}, got {got})")
    };
    raise(&exceptions::VALUE_ERROR, message)
}

fn range_overflow() -> Fault {
    exceptions::fault(
        &exceptions::OVERFLOW_ERROR,
        "Python int too large to convert to C ssize_t",
    )
}

fn index_error(what: &str) -> Fault {
    exceptions::fault(&exceptions::INDEX_ERROR, format!("{what} index out of range"))
}

/// Resolve a (possibly negative) integer index into `0..len`.
fn sequence_index(key: &Value, len: usize, what: &str) -> VmResult<usize> {
    let Some(index) = key.as_int() else {
        let kind = what.split(' ').next().unwrap_or(what);
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "{kind} indices must be integers or slices, not {}",
                key.type_name()
            ),
        );
    };
    let (index, len) = (i128::from(index), len as i128);
    let resolved = if index < 0 { index + len } else { index };
    if resolved < 0 || resolved >= len {
        return Err(index_error(what));
    }
    Ok(resolved as usize)
}

/// Items of a `**mapping` operand.
fn mapping_items(value: &Value) -> VmResult<Vec<(HashKey, Value)>> {
    match value {
        Value::Dict(dict) => Ok(dict
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Value::Wrapper(wrapper) => mapping_items(wrapper.inner()),
        other => raise(
            &exceptions::TYPE_ERROR,
            format!("argument after ** must be a mapping, not {}", other.type_name()),
        ),
    }
}

fn exception_matches(exc: &Exception, typ: &Value) -> VmResult<bool> {
    match typ {
        Value::Class(class) if class.is_subclass_of(&exceptions::EXCEPTION) => {
            Ok(exc.is_instance(class))
        }
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if exception_matches(exc, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Wrapper(wrapper) => exception_matches(exc, wrapper.inner()),
        _ => raise(
            &exceptions::TYPE_ERROR,
            "catching classes that do not inherit from BaseException is not allowed",
        ),
    }
}

fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    match quoted.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
        None => String::new(),
    }
}

fn bind_parameters(func: &Function, env: &Env, args: CallArgs) -> VmResult<()> {
    let params = &func.params;
    let name = &func.name;
    let mut positional = args.positional.into_iter();
    let mut bound: Vec<Option<Value>> = vec![None; params.args.len()];
    for slot in bound.iter_mut() {
        match positional.next() {
            Some(value) => *slot = Some(value),
            None => break,
        }
    }
    let extra: Vec<Value> = positional.collect();
    if !extra.is_empty() && params.vararg.is_none() {
        let expected = params.args.len();
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "{name}() takes {expected} positional argument{} but {} {} given",
                if expected == 1 { "" } else { "s" },
                expected + extra.len(),
                if expected + extra.len() == 1 { "was" } else { "were" }
            ),
        );
    }

    let mut kwonly: Vec<Option<Value>> = vec![None; params.kwonly.len()];
    let mut kwargs = Dict::new();
    for (key, value) in args.keywords {
        let mut by_keyword = params.args.iter().skip(params.positional_only);
        let slot = if let Some(i) = by_keyword.position(|p| *p == key) {
            &mut bound[params.positional_only + i]
        } else if let Some(i) = params.kwonly.iter().position(|p| *p == key) {
            &mut kwonly[i]
        } else if params.kwarg.is_some() {
            kwargs.insert(HashKey::from(key.as_str()), value);
            continue;
        } else {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("{name}() got an unexpected keyword argument '{key}'"),
            );
        };
        if slot.is_some() {
            return raise(
                &exceptions::TYPE_ERROR,
                format!("{name}() got multiple values for argument '{key}'"),
            );
        }
        *slot = Some(value);
    }

    let mut missing = Vec::new();
    for ((param, slot), default) in params.args.iter().zip(&bound).zip(&func.defaults) {
        match slot.clone().or_else(|| default.clone()) {
            Some(value) => env.set(param, value),
            None => missing.push(param.as_str()),
        }
    }
    if !missing.is_empty() {
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "{name}() missing {} required positional argument{}: {}",
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                quoted_list(&missing)
            ),
        );
    }
    for ((param, slot), default) in params.kwonly.iter().zip(kwonly).zip(&func.kw_defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => env.set(param, value),
            None => missing.push(param.as_str()),
        }
    }
    if !missing.is_empty() {
        return raise(
            &exceptions::TYPE_ERROR,
            format!(
                "{name}() missing {} required keyword-only argument{}: {}",
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                quoted_list(&missing)
            ),
        );
    }
    if let Some(vararg) = &params.vararg {
        env.set(vararg, Value::tuple(extra));
    }
    if let Some(kwarg) = &params.kwarg {
        env.set(kwarg, Value::dict(kwargs));
    }
    Ok(())
}

/// Names bound by an assignment target.
fn target_names(target: &Expr, names: &mut HashSet<String>) {
    match target {
        Expr::Name(name) => {
            names.insert(name.id.to_string());
        }
        Expr::Tuple(ast::ExprTuple { elts, .. }) | Expr::List(ast::ExprList { elts, .. }) => {
            for elt in elts {
                target_names(elt, names);
            }
        }
        Expr::Starred(starred) => target_names(&starred.value, names),
        _ => {}
    }
}

/// Names bound anywhere in a function body, excluding nested scopes.
fn assigned_names(body: &[Stmt], names: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    target_names(target, names);
                }
            }
            Stmt::AugAssign(assign) => target_names(&assign.target, names),
            Stmt::AnnAssign(assign) => target_names(&assign.target, names),
            Stmt::Delete(delete) => {
                for target in &delete.targets {
                    target_names(target, names);
                }
            }
            Stmt::For(for_) => {
                target_names(&for_.target, names);
                assigned_names(&for_.body, names);
                assigned_names(&for_.orelse, names);
            }
            Stmt::If(if_) => {
                assigned_names(&if_.body, names);
                assigned_names(&if_.orelse, names);
            }
            Stmt::While(while_) => {
                assigned_names(&while_.body, names);
                assigned_names(&while_.orelse, names);
            }
            Stmt::Try(try_) => {
                assigned_names(&try_.body, names);
                for ast::ExceptHandler::ExceptHandler(handler) in &try_.handlers {
                    if let Some(name) = &handler.name {
                        names.insert(name.to_string());
                    }
                    assigned_names(&handler.body, names);
                }
                assigned_names(&try_.orelse, names);
                assigned_names(&try_.finalbody, names);
            }
            Stmt::FunctionDef(def) => {
                names.insert(def.name.to_string());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, Mode};

    fn run(source: &str, mode: Mode) -> (VmResult<Value>, Rc<Env>) {
        let program = parse(source, mode).unwrap();
        let globals = Env::new(crate::runtime::builtins::namespace(), None);
        let module = Env::new(Bindings::new(), Some(globals));
        let mut vm = Vm::default();
        let result = vm.run(&program, &module);
        (result, module)
    }

    fn eval(source: &str) -> Value {
        run(source, Mode::Eval).0.unwrap()
    }

    fn exec(source: &str) -> Bindings {
        let (result, module) = run(source, Mode::Exec);
        result.unwrap();
        module.take_vars()
    }

    #[test]
    fn test_expressions() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("0 or 'x'"), Value::from("x"));
        assert_eq!(eval("[1, *[2, 3]]"), eval("[1, 2, 3]"));
        assert_eq!(eval("{**{'a': 1}, 'b': 2}['a']"), Value::Int(1));
        assert_eq!(eval("'abc'[::-1]"), Value::from("cba"));
        assert_eq!(eval("f'{1 + 1:>3}|{[1]!r}'"), Value::from("  2|[1]"));
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(
            eval("[x * y for x in range(3) for y in range(x) if y]"),
            eval("[2]")
        );
        assert_eq!(eval("{k: v for k, v in [('a', 1)]}"), eval("{'a': 1}"));
        assert_eq!(eval("sum(x for x in range(5))"), Value::Int(10));
    }

    #[test]
    fn test_functions_and_closures() {
        let vars = exec(
            "def make(n):\n    def add(x, y=1, *rest, **kw):\n        return x + y + n + len(rest) + len(kw)\n    return add\nr = make(10)(1, 2, 3, 4, k=5)\n",
        );
        assert_eq!(vars["r"], Value::Int(16));
    }

    #[test]
    fn test_top_level_functions_see_module_names() {
        let vars = exec("base = 5\ndef f():\n    return base * 2\nr = f()\n");
        assert_eq!(vars["r"], Value::Int(10));
    }

    #[test]
    fn test_unbound_local() {
        let (result, _) = run("x = 1\ndef f():\n    y = x\n    x = 2\nf()\n", Mode::Exec);
        let fault = result.unwrap_err();
        assert!(fault
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::UNBOUND_LOCAL_ERROR)));
    }

    #[test]
    fn test_try_except_finally() {
        let vars = exec(
            "log = []\ntry:\n    1 / 0\nexcept (KeyError, ZeroDivisionError) as e:\n    log.append(str(e))\nelse:\n    log.append('else')\nfinally:\n    log.append('done')\n",
        );
        assert_eq!(vars["log"], eval("['division by zero', 'done']"));
    }

    #[test]
    fn test_reraise_and_unhandled() {
        let (result, _) = run(
            "try:\n    raise ValueError('bad')\nexcept ValueError:\n    raise\n",
            Mode::Exec,
        );
        let fault = result.unwrap_err();
        let exc = fault.as_exception().unwrap();
        assert!(exc.is_instance(&exceptions::VALUE_ERROR));
        assert_eq!(exc.message(), "bad");
    }

    #[test]
    fn test_unpacking() {
        let vars = exec("a, *b, c = [1, 2, 3, 4]\n(x, y), z = (1, 2), 3\n");
        assert_eq!(vars["b"], eval("[2, 3]"));
        assert_eq!(vars["y"], Value::Int(2));
        let (result, _) = run("a, b = [1, 2, 3]", Mode::Exec);
        assert!(result.is_err());
    }

    #[test]
    fn test_loops_and_subscript_assignment() {
        let vars = exec(
            "d = {}\nfor i in range(10):\n    if i == 5:\n        break\n    if i % 2:\n        continue\n    d[i] = i * i\nl = [0, 1, 2, 3]\nl[1:3] = ['a']\ndel l[0]\n",
        );
        assert_eq!(vars["d"], eval("{0: 0, 2: 4, 4: 16}"));
        assert_eq!(vars["l"], eval("['a', 3]"));
    }

    #[test]
    fn test_recursion_limit() {
        let (result, _) = run("def f(n):\n    return f(n + 1)\nf(0)\n", Mode::Exec);
        let fault = result.unwrap_err();
        assert!(fault
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::RECURSION_ERROR)));
    }

    #[test]
    fn test_argument_errors() {
        let (result, _) = run("def f(a, b):\n    pass\nf(1)\n", Mode::Exec);
        let fault = result.unwrap_err();
        assert_eq!(
            fault.as_exception().unwrap().message(),
            "f() missing 1 required positional argument: 'b'"
        );
    }

    #[test]
    fn test_release_clears_captured_scopes() {
        let program = parse("def f():\n    return 1\n", Mode::Exec).unwrap();
        let module = Env::new(Bindings::new(), None);
        let mut vm = Vm::default();
        vm.run(&program, &module).unwrap();
        let vars = module.take_vars();
        vm.release();
        assert!(matches!(vars["f"], Value::Function(_)));
        assert_eq!(Rc::strong_count(&module), 2);
    }

    #[test]
    fn test_violation_survives_finally_flow() {
        let (result, _) = run(
            "def f():\n    try:\n        yield 1\n    finally:\n        return 'swallowed'\nr = f()\n",
            Mode::Exec,
        );
        assert!(matches!(result, Err(Fault::Violation(_))));

        let (result, _) = run(
            "def g():\n    for i in range(3):\n        try:\n            yield i\n        finally:\n            break\n    return 'done'\nr = g()\n",
            Mode::Exec,
        );
        assert!(matches!(result, Err(Fault::Violation(_))));
    }

    #[test]
    fn test_finally_flow_replaces_exceptions() {
        let vars = exec(
            "def f():\n    try:\n        1 / 0\n    finally:\n        return 'swallowed'\nr = f()\n",
        );
        assert_eq!(vars["r"], Value::from("swallowed"));
    }

    #[test]
    fn test_raise_from_keeps_cause() {
        let (result, _) = run("raise ValueError('outer') from KeyError('inner')\n", Mode::Exec);
        let fault = result.unwrap_err();
        let exc = fault.as_exception().unwrap();
        assert!(exc.is_instance(&exceptions::VALUE_ERROR));
        assert!(exc
            .cause
            .as_ref()
            .is_some_and(|cause| cause.is_instance(&exceptions::KEY_ERROR)));

        let (result, _) = run("raise ValueError from None\n", Mode::Exec);
        assert!(result.unwrap_err().as_exception().unwrap().cause.is_none());

        let (result, _) = run("raise ValueError from 1\n", Mode::Exec);
        let fault = result.unwrap_err();
        let exc = fault.as_exception().unwrap();
        assert!(exc.is_instance(&exceptions::TYPE_ERROR));
        assert_eq!(exc.message(), "exception causes must derive from BaseException");
    }

    #[test]
    fn test_range_slices_are_checked() {
        assert_eq!(eval("list(range(10)[2:8:3])"), eval("[2, 5]"));
        assert_eq!(eval("list(range(10, 0, -2)[::-1])"), eval("[2, 4, 6, 8, 10]"));
        assert_eq!(eval("range(-9223372036854775807 - 1, 9223372036854775807, 2)[-1]"), Value::Int(9223372036854775806));

        let (result, _) = run(
            "range(-9223372036854775807 - 1, 9223372036854775807)[::2]",
            Mode::Eval,
        );
        let fault = result.unwrap_err();
        assert!(fault
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::OVERFLOW_ERROR)));
    }

    #[test]
    fn test_positional_only_parameters() {
        let vars = exec("def f(a, /, b, *, c=3):\n    return a + b + c\nr = f(1, b=2)\n");
        assert_eq!(vars["r"], Value::Int(6));
        let (result, _) = run("def f(a, /):\n    return a\nf(a=1)\n", Mode::Exec);
        assert!(result
            .unwrap_err()
            .as_exception()
            .is_some_and(|e| e.is_instance(&exceptions::TYPE_ERROR)));
    }
}
