use crate::language::span::Span;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

/// Declarations allowed at namespace scope. Definitions are reference-counted
/// so the symbol table can point at the node that declared a name without
/// copying the subtree.
#[derive(Clone, Debug)]
pub enum Item {
    Namespace(NamespaceDef),
    Class(Rc<ClassDef>),
    Function(Rc<FunctionDef>),
    Variable(Rc<VarDecl>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// `a::b::name`, or `::name` when anchored at the root namespace. A leading
/// empty segment in `path` marks the root anchor.
#[derive(Clone, Debug, PartialEq)]
pub struct QualifiedName {
    pub path: Vec<String>,
    pub name: String,
    pub span: Span,
}

impl QualifiedName {
    pub fn is_qualified(&self) -> bool {
        !self.path.is_empty()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.path {
            write!(f, "{segment}::")?;
        }
        write!(f, "{}", self.name)
    }
}

#[derive(Clone, Debug)]
pub struct NamespaceDef {
    pub name: Identifier,
    pub items: Vec<Item>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

#[derive(Clone, Debug)]
pub struct BaseClass {
    pub visibility: Visibility,
    pub name: QualifiedName,
}

#[derive(Clone, Debug)]
pub struct ClassDef {
    pub name: Identifier,
    pub bases: Vec<BaseClass>,
    pub variables: Vec<Rc<VarDecl>>,
    pub functions: Vec<Rc<FunctionDef>>,
    pub constructors: Vec<Rc<FunctionDef>>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub type_name: Option<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: Identifier,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
    pub name: Identifier,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Statement list; the body of functions and of `if`/`for` branches.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Var(Rc<VarDecl>),
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Assign(AssignStmt),
    If(IfStmt),
    For(ForStmt),
    Return(ReturnStmt),
    Print(PrintStmt),
    Expr(Expr),
}

#[derive(Clone, Debug)]
pub struct AssignStmt {
    pub target: QualifiedName,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
    pub span: Span,
}

/// `for i = init; condition; step { body }`
#[derive(Clone, Debug)]
pub struct ForStmt {
    pub iterator: Identifier,
    pub init: Option<Expr>,
    pub condition: Expr,
    pub step: Option<Box<Statement>>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct PrintStmt {
    pub args: Vec<Expr>,
    pub newline: bool,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    AddressOf,
    Deref,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::AddressOf => "&",
            UnaryOp::Deref => "*",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Shl,
    Shr,
    BitAnd,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CallExpr {
    pub callee: QualifiedName,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Int(i64, Span),
    Float(f64, Span),
    Str(String, Span),
    Bool(bool, Span),
    Identifier(QualifiedName),
    /// `span` is the operator token.
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// `span` is the operator token.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Call(CallExpr),
}

impl Expr {
    /// Span of the token this node originated from.
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(_, span) | Expr::Float(_, span) | Expr::Str(_, span) | Expr::Bool(_, span) => {
                *span
            }
            Expr::Identifier(name) => name.span,
            Expr::Unary { span, .. } | Expr::Binary { span, .. } => *span,
            Expr::Call(call) => call.callee.span,
        }
    }
}
