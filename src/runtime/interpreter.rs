use crate::language::{
    ast::*,
    errors::SyntaxErrors,
    parser::parse_program,
    span::Span,
};
use crate::runtime::{
    class::{ClassRuntime, ClassView, NoClassRuntime},
    environment::Environment,
    error::{RuntimeError, RuntimeResult},
    symbols::{ScopeId, SymbolTable},
    value::Value,
};
use std::io::Write;
use std::rc::Rc;
use thiserror::Error;

/// Anything that stops a program from producing its output.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error(transparent)]
    Syntax(#[from] SyntaxErrors),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parses, registers, initializes and runs `source`, printing into `out`.
/// Returns the value `main` produced.
pub fn run_source<W: Write>(source: &str, out: W) -> Result<Value, ProgramError> {
    let program = parse_program(source)?;
    let symbols = SymbolTable::from_program(&program)?;
    let mut interpreter = Interpreter::new(symbols, out);
    interpreter.init_global_variables()?;
    Ok(interpreter.run()?)
}

pub struct Interpreter<W: Write> {
    symbols: SymbolTable,
    env: Environment,
    cursor: ScopeId,
    out: W,
    classes: Box<dyn ClassRuntime>,
}

/// How a statement finished. `Return` unwinds statement lists up to the
/// nearest call and is converted back into a plain value there.
enum Completion {
    Normal(Value),
    Return(Value),
}

impl Completion {
    fn into_value(self) -> Value {
        match self {
            Completion::Normal(value) | Completion::Return(value) => value,
        }
    }
}

impl<W: Write> Interpreter<W> {
    pub fn new(symbols: SymbolTable, out: W) -> Self {
        Self {
            symbols,
            env: Environment::new(),
            cursor: ScopeId::ROOT,
            out,
            classes: Box::new(NoClassRuntime),
        }
    }

    pub fn with_class_runtime(mut self, runtime: impl ClassRuntime + 'static) -> Self {
        self.classes = Box::new(runtime);
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Evaluates every declared namespace and class variable, parents before
    /// children and variables in name order within a scope.
    #[tracing::instrument(skip(self))]
    pub fn init_global_variables(&mut self) -> RuntimeResult<()> {
        for scope in self.symbols.depth_first() {
            let decls: Vec<Rc<VarDecl>> =
                self.symbols.node(scope).variables.values().cloned().collect();
            for decl in decls {
                self.initialize_variable(scope, &decl, decl.name.span)?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn run(&mut self) -> RuntimeResult<Value> {
        let main = self
            .symbols
            .node(ScopeId::ROOT)
            .functions
            .get("main")
            .cloned()
            .ok_or(RuntimeError::MissingEntryPoint)?;
        let value = self.invoke(ScopeId::ROOT, &main, Vec::new())?;
        self.out.flush().map_err(|source| RuntimeError::Output {
            source,
            span: main.name.span,
        })?;
        Ok(value)
    }

    fn initialize_variable(
        &mut self,
        scope: ScopeId,
        decl: &Rc<VarDecl>,
        reference: Span,
    ) -> RuntimeResult<Value> {
        let name = decl.name.name.as_str();
        if let Some(value) = self.symbols.node(scope).values.get(name) {
            return Ok(value.clone());
        }
        if self.symbols.is_initializing(scope, name) {
            return Err(RuntimeError::CircularReference {
                name: name.to_string(),
                span: reference,
                declared: decl.name.span,
            });
        }

        // Initializers run at namespace scope, never inside the reader's frames.
        self.symbols.set_initializing(scope, name, true);
        let saved = std::mem::replace(&mut self.cursor, scope);
        let frames = self.env.suspend_frames();
        let result = match &decl.init {
            Some(expr) => self.eval_expression(expr),
            None => Ok(Value::Null),
        };
        self.env.restore_frames(frames);
        self.cursor = saved;
        self.symbols.set_initializing(scope, name, false);

        let value = result?;
        tracing::debug!(
            variable = name,
            scope = %self.symbols.qualified_name(scope),
            value = %value,
            "initialized"
        );
        self.symbols.set_value(scope, name, value.clone());
        Ok(value)
    }

    fn invoke(
        &mut self,
        scope: ScopeId,
        def: &Rc<FunctionDef>,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        tracing::debug!(
            function = %def.name.name,
            scope = %self.symbols.qualified_name(scope),
            args = args.len(),
            "call"
        );
        let saved = std::mem::replace(&mut self.cursor, scope);
        self.env.push_frame();
        let result = (|| {
            let mut args = args.into_iter();
            for param in &def.params {
                self.env.bind(&param.name, args.next().unwrap_or_default());
            }
            self.eval_block(&def.body)
        })();
        self.env.pop_frame();
        self.cursor = saved;
        Ok(result?.into_value())
    }

    fn eval_block(&mut self, block: &Block) -> RuntimeResult<Completion> {
        let mut last = Value::Null;
        for statement in &block.statements {
            match self.eval_statement(statement)? {
                Completion::Normal(value) => last = value,
                done @ Completion::Return(_) => return Ok(done),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn eval_statement(&mut self, statement: &Statement) -> RuntimeResult<Completion> {
        match statement {
            Statement::Var(decl) => {
                let value = match &decl.init {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Null,
                };
                self.env.bind(&decl.name.name, value.clone());
                Ok(Completion::Normal(value))
            }
            Statement::Function(def) => {
                self.symbols.declare_function(self.cursor, def)?;
                Ok(Completion::Normal(Value::Null))
            }
            Statement::Class(def) => {
                self.symbols.declare_class(self.cursor, def)?;
                Ok(Completion::Normal(Value::Null))
            }
            Statement::Assign(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                self.assign(&stmt.target, value.clone())?;
                Ok(Completion::Normal(value))
            }
            Statement::If(stmt) => {
                if self.eval_condition(&stmt.condition, "if")? {
                    self.eval_block(&stmt.then_block)
                } else if let Some(else_block) = &stmt.else_block {
                    self.eval_block(else_block)
                } else {
                    Ok(Completion::Normal(Value::Null))
                }
            }
            Statement::For(stmt) => self.eval_for(stmt),
            Statement::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Null,
                };
                Ok(Completion::Return(value))
            }
            Statement::Print(stmt) => {
                self.eval_print(stmt)?;
                Ok(Completion::Normal(Value::Null))
            }
            Statement::Expr(expr) => Ok(Completion::Normal(self.eval_expression(expr)?)),
        }
    }

    fn eval_for(&mut self, stmt: &ForStmt) -> RuntimeResult<Completion> {
        if let Some(init) = &stmt.init {
            let value = self.eval_expression(init)?;
            self.env.bind(&stmt.iterator.name, value);
        }
        while self.eval_condition(&stmt.condition, "for")? {
            if let done @ Completion::Return(_) = self.eval_block(&stmt.body)? {
                return Ok(done);
            }
            if let Some(step) = &stmt.step {
                if let done @ Completion::Return(_) = self.eval_statement(step)? {
                    return Ok(done);
                }
            }
        }
        Ok(Completion::Normal(Value::Null))
    }

    fn eval_condition(&mut self, condition: &Expr, context: &str) -> RuntimeResult<bool> {
        let value = self.eval_expression(condition)?;
        value.as_bool().map_err(|err| RuntimeError::TypeMismatch {
            message: format!("`{context}` condition {err}"),
            span: condition.span(),
        })
    }

    fn eval_print(&mut self, stmt: &PrintStmt) -> RuntimeResult<()> {
        let mut text = String::new();
        for arg in &stmt.args {
            let value = self.eval_expression(arg)?;
            text.push_str(&value.to_string());
        }
        if stmt.newline {
            text.push('\n');
        }
        self.out
            .write_all(text.as_bytes())
            .map_err(|source| RuntimeError::Output {
                source,
                span: stmt.span,
            })
    }

    /// Rebinds an existing frame, global or namespace binding in place.
    /// Unknown simple names are created in the current frame.
    fn assign(&mut self, target: &QualifiedName, value: Value) -> RuntimeResult<()> {
        let value = if target.is_qualified() {
            value
        } else {
            match self.env.assign(&target.name, value) {
                Ok(()) => return Ok(()),
                Err(value) => value,
            }
        };

        if let Some((scope, _)) =
            self.symbols
                .resolve_variable(self.cursor, &target.name, &target.path)
        {
            self.symbols.set_value(scope, &target.name, value);
            return Ok(());
        }
        if target.is_qualified() {
            return Err(RuntimeError::UndefinedVariable {
                name: target.to_string(),
                span: target.span,
            });
        }
        self.env.bind(&target.name, value);
        Ok(())
    }

    fn eval_expression(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Int(value, _) => Ok(Value::Int(*value)),
            Expr::Float(value, _) => Ok(Value::Float(*value)),
            Expr::Str(value, _) => Ok(Value::String(value.clone())),
            Expr::Bool(value, _) => Ok(Value::Bool(*value)),
            Expr::Identifier(name) => self.eval_identifier(name),
            Expr::Unary { op, operand, span } => self.eval_unary(*op, operand, *span),
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => self.eval_binary(*op, left, right, *span),
            Expr::Call(call) => self.eval_call(call),
        }
    }

    /// Frames, then globals, then namespace variables. Unknown names and
    /// dead observers are `Null`; the consuming operator reports them.
    fn eval_identifier(&mut self, name: &QualifiedName) -> RuntimeResult<Value> {
        if !name.is_qualified() {
            if let Some(value) = self.env.lookup(&name.name) {
                return Ok(value.clone().live());
            }
        }
        match self
            .symbols
            .resolve_variable(self.cursor, &name.name, &name.path)
        {
            Some((scope, decl)) => self
                .initialize_variable(scope, &decl, name.span)
                .map(Value::live),
            None => Ok(Value::Null),
        }
    }

    fn eval_call(&mut self, call: &CallExpr) -> RuntimeResult<Value> {
        let callee = &call.callee;
        if let Some((scope, def)) =
            self.symbols
                .resolve_function(self.cursor, &callee.name, &callee.path)
        {
            if call.args.len() > def.params.len() {
                return Err(RuntimeError::ArityMismatch {
                    name: callee.to_string(),
                    expected: def.params.len(),
                    received: call.args.len(),
                    span: callee.span,
                });
            }
            let args = self.eval_arguments(&call.args)?;
            return self.invoke(scope, &def, args);
        }

        let class = self
            .symbols
            .resolve_scope(self.cursor, &callee.name, &callee.path)
            .filter(|id| self.symbols.node(*id).is_class());
        if let Some(class) = class {
            let args = self.eval_arguments(&call.args)?;
            return self
                .classes
                .instantiate(ClassView::new(&self.symbols, class), args, callee.span);
        }

        Err(RuntimeError::UndefinedFunction {
            name: callee.to_string(),
            span: callee.span,
        })
    }

    fn eval_arguments(&mut self, args: &[Expr]) -> RuntimeResult<Vec<Value>> {
        args.iter().map(|expr| self.eval_expression(expr)).collect()
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> RuntimeResult<Value> {
        if matches!(op, UnaryOp::AddressOf | UnaryOp::Deref) {
            return Err(RuntimeError::UnsupportedOperator {
                op: op.symbol(),
                span,
            });
        }
        match (op, self.eval_expression(operand)?) {
            (UnaryOp::Plus, value @ (Value::Int(_) | Value::Float(_))) => Ok(value),
            (UnaryOp::Neg, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
            (UnaryOp::Neg, Value::Float(value)) => Ok(Value::Float(-value)),
            (UnaryOp::Not, Value::Bool(value)) => Ok(Value::Bool(!value)),
            (op, value) => Err(RuntimeError::InvalidOperand {
                op: op.symbol(),
                message: format!("cannot apply to {}", value.type_name()),
                span,
            }),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> RuntimeResult<Value> {
        use BinaryOp::*;
        match op {
            Shl | Shr | BitAnd => {
                return Err(RuntimeError::UnsupportedOperator {
                    op: op.symbol(),
                    span,
                })
            }
            And | Or => return self.eval_logical(op, left, right),
            _ => {}
        }

        let rhs = self.eval_expression(right)?;
        let lhs = self.eval_expression(left)?;
        require_operand(left, &lhs)?;
        require_operand(right, &rhs)?;

        match op {
            Eq => Ok(Value::Bool(values_equal(&lhs, &rhs, span)?)),
            NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs, span)?)),
            Lt | LtEq | Gt | GtEq => compare(op, &lhs, &rhs, span),
            _ => arithmetic(op, lhs, rhs, span),
        }
    }

    fn eval_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> RuntimeResult<Value> {
        let lhs = self.eval_bool_operand(op, left)?;
        let decided = match op {
            BinaryOp::And => !lhs,
            _ => lhs,
        };
        if decided {
            return Ok(Value::Bool(lhs));
        }
        Ok(Value::Bool(self.eval_bool_operand(op, right)?))
    }

    fn eval_bool_operand(&mut self, op: BinaryOp, expr: &Expr) -> RuntimeResult<bool> {
        let value = self.eval_expression(expr)?;
        value.as_bool().map_err(|err| RuntimeError::TypeMismatch {
            message: format!("operand of `{}` {err}", op.symbol()),
            span: expr.span(),
        })
    }
}

/// Null operands are reported against the operand: a bare name means the
/// variable was never bound.
fn require_operand(expr: &Expr, value: &Value) -> RuntimeResult<()> {
    if !value.is_null() {
        return Ok(());
    }
    match expr {
        Expr::Identifier(name) => Err(RuntimeError::UndefinedVariable {
            name: name.to_string(),
            span: name.span,
        }),
        other => Err(RuntimeError::UnexpectedNull { span: other.span() }),
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value, span: Span) -> RuntimeResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b, span).map(Value::Int),
        (Value::Int(a), Value::Float(b)) => float_arithmetic(op, a as f64, b, span),
        (Value::Float(a), Value::Int(b)) => float_arithmetic(op, a, b as f64, span),
        (Value::Float(a), Value::Float(b)) => float_arithmetic(op, a, b, span),
        (lhs, rhs) => Err(RuntimeError::InvalidOperand {
            op: op.symbol(),
            message: format!("cannot apply to {} and {}", lhs.type_name(), rhs.type_name()),
            span,
        }),
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64, span: Span) -> RuntimeResult<i64> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => Err(RuntimeError::DivisionByZero { span }),
        BinaryOp::Div => Ok(a.wrapping_div(b)),
        BinaryOp::Rem => Ok(a.wrapping_rem(b)),
        other => Err(RuntimeError::UnsupportedOperator {
            op: other.symbol(),
            span,
        }),
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64, span: Span) -> RuntimeResult<Value> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        other => {
            return Err(RuntimeError::UnsupportedOperator {
                op: other.symbol(),
                span,
            })
        }
    };
    Ok(Value::Float(value))
}

fn values_equal(lhs: &Value, rhs: &Value, span: Span) -> RuntimeResult<bool> {
    match (lhs, rhs) {
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int(a), Value::Int(b)) => Ok(a == b),
        (Value::Int(a), Value::Float(b)) => Ok(*a as f64 == *b),
        (Value::Float(a), Value::Int(b)) => Ok(*a == *b as f64),
        (Value::Float(a), Value::Float(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::Shared(a), Value::Shared(b)) => Ok(Rc::ptr_eq(a, b)),
        (Value::Weak(a), Value::Weak(b)) => Ok(a.ptr_eq(b)),
        _ => Err(RuntimeError::TypeMismatch {
            message: format!("cannot compare {} with {}", lhs.type_name(), rhs.type_name()),
            span,
        }),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value, span: Span) -> RuntimeResult<Value> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        (a, b) if a.is_number() && b.is_number() => {
            let (Ok(a), Ok(b)) = (a.as_number(), b.as_number()) else {
                return Ok(Value::Bool(false));
            };
            a.partial_cmp(&b)
        }
        _ => {
            return Err(RuntimeError::TypeMismatch {
                message: format!(
                    "`{}` expects numbers or strings, found {} and {}",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ),
                span,
            })
        }
    };
    let Some(ordering) = ordering else {
        // NaN compares false against everything.
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}
