use crate::language::span::Span;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Every failure that aborts a program run. Spans are copied out of the tree
/// so an error stays meaningful after the program is dropped.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String, span: Span },
    #[error("Invalid operand for `{op}`: {message}")]
    InvalidOperand {
        op: &'static str,
        message: String,
        span: Span,
    },
    #[error("Unexpected null operand")]
    UnexpectedNull { span: Span },
    #[error("Undefined variable `{name}`")]
    UndefinedVariable { name: String, span: Span },
    #[error("Undefined function `{name}`")]
    UndefinedFunction { name: String, span: Span },
    #[error("Duplicate declaration of {kind} `{name}`")]
    DuplicateDeclaration {
        kind: &'static str,
        name: String,
        span: Span,
    },
    #[error("Undefined function `main`")]
    MissingEntryPoint,
    #[error("Unsupported operator `{op}`")]
    UnsupportedOperator { op: &'static str, span: Span },
    #[error("Division by zero")]
    DivisionByZero { span: Span },
    #[error("Function `{name}` takes {expected} argument(s) but {received} were supplied")]
    ArityMismatch {
        name: String,
        expected: usize,
        received: usize,
        span: Span,
    },
    #[error("Circular reference while initializing `{name}`")]
    CircularReference {
        name: String,
        span: Span,
        declared: Span,
    },
    #[error("Cannot declare `{name}`: {reason}")]
    IncompatibleScope {
        name: String,
        reason: &'static str,
        span: Span,
    },
    #[error("Cannot instantiate class `{class}`: {reason}")]
    ClassInstantiation {
        class: String,
        reason: String,
        span: Span,
    },
    #[error("Failed to write program output")]
    Output {
        #[source]
        source: std::io::Error,
        span: Span,
    },
}

impl RuntimeError {
    pub fn span(&self) -> Option<Span> {
        match self {
            RuntimeError::TypeMismatch { span, .. }
            | RuntimeError::InvalidOperand { span, .. }
            | RuntimeError::UnexpectedNull { span }
            | RuntimeError::UndefinedVariable { span, .. }
            | RuntimeError::UndefinedFunction { span, .. }
            | RuntimeError::DuplicateDeclaration { span, .. }
            | RuntimeError::UnsupportedOperator { span, .. }
            | RuntimeError::DivisionByZero { span }
            | RuntimeError::ArityMismatch { span, .. }
            | RuntimeError::CircularReference { span, .. }
            | RuntimeError::IncompatibleScope { span, .. }
            | RuntimeError::ClassInstantiation { span, .. }
            | RuntimeError::Output { span, .. } => Some(*span),
            RuntimeError::MissingEntryPoint => None,
        }
    }

    /// Stable identifier used as the diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            RuntimeError::TypeMismatch { .. } => "ember::runtime::type_mismatch",
            RuntimeError::InvalidOperand { .. } => "ember::runtime::invalid_operand",
            RuntimeError::UnexpectedNull { .. } => "ember::runtime::unexpected_null",
            RuntimeError::UndefinedVariable { .. } => "ember::runtime::undefined_variable",
            RuntimeError::UndefinedFunction { .. } => "ember::runtime::undefined_function",
            RuntimeError::DuplicateDeclaration { .. } => "ember::runtime::duplicate_declaration",
            RuntimeError::MissingEntryPoint => "ember::runtime::missing_entry_point",
            RuntimeError::UnsupportedOperator { .. } => "ember::runtime::unsupported_operator",
            RuntimeError::DivisionByZero { .. } => "ember::runtime::division_by_zero",
            RuntimeError::ArityMismatch { .. } => "ember::runtime::arity_mismatch",
            RuntimeError::CircularReference { .. } => "ember::runtime::circular_reference",
            RuntimeError::IncompatibleScope { .. } => "ember::runtime::incompatible_scope",
            RuntimeError::ClassInstantiation { .. } => "ember::runtime::class_instantiation",
            RuntimeError::Output { .. } => "ember::runtime::output",
        }
    }

    pub fn help(&self) -> Option<String> {
        match self {
            RuntimeError::UndefinedVariable { name, .. } => Some(format!(
                "`{name}` is not bound in any call frame, global, or namespace"
            )),
            RuntimeError::MissingEntryPoint => {
                Some("Declare `func main() { ... }` in the top-level namespace".into())
            }
            RuntimeError::CircularReference { name, .. } => Some(format!(
                "The initializer of `{name}` depends on its own value"
            )),
            RuntimeError::ClassInstantiation { .. } => {
                Some("Install a class runtime to construct instances".into())
            }
            _ => None,
        }
    }
}
