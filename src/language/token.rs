use crate::language::span::Span;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),

    Func,
    Var,
    Namespace,
    Class,
    Public,
    Private,
    Init,
    If,
    Else,
    For,
    Return,
    Print,
    Println,
    True,
    False,

    Ampersand,
    AmpersandAmpersand,
    PipePipe,
    Bang,
    BangEq,
    Eq,
    EqEq,
    Lt,
    LtEq,
    LtLt,
    Gt,
    GtEq,
    GtGt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Comma,
    Colon,
    ColonColon,
    Semi,

    LParen,
    RParen,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "func" => TokenKind::Func,
            "var" => TokenKind::Var,
            "namespace" => TokenKind::Namespace,
            "class" => TokenKind::Class,
            "public" => TokenKind::Public,
            "private" => TokenKind::Private,
            "init" => TokenKind::Init,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "return" => TokenKind::Return,
            "print" => TokenKind::Print,
            "println" => TokenKind::Println,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_item_start(&self) -> bool {
        matches!(
            self,
            TokenKind::Func | TokenKind::Var | TokenKind::Namespace | TokenKind::Class
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Identifier(name) => return write!(f, "identifier `{name}`"),
            TokenKind::Integer(value) => return write!(f, "integer `{value}`"),
            TokenKind::Float(value) => return write!(f, "float `{value}`"),
            TokenKind::String(value) => return write!(f, "string \"{value}\""),
            TokenKind::Func => "`func`",
            TokenKind::Var => "`var`",
            TokenKind::Namespace => "`namespace`",
            TokenKind::Class => "`class`",
            TokenKind::Public => "`public`",
            TokenKind::Private => "`private`",
            TokenKind::Init => "`init`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::For => "`for`",
            TokenKind::Return => "`return`",
            TokenKind::Print => "`print`",
            TokenKind::Println => "`println`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Ampersand => "`&`",
            TokenKind::AmpersandAmpersand => "`&&`",
            TokenKind::PipePipe => "`||`",
            TokenKind::Bang => "`!`",
            TokenKind::BangEq => "`!=`",
            TokenKind::Eq => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::LtLt => "`<<`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::GtGt => "`>>`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::ColonColon => "`::`",
            TokenKind::Semi => "`;`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}
