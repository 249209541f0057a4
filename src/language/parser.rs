use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};
use std::rc::Rc;

pub fn parse_program(source: &str) -> Result<Program, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            return Err(SyntaxErrors::new(
                errors.into_iter().map(SyntaxError::from).collect(),
            ))
        }
    };
    parse_tokens(tokens)
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program, SyntaxErrors> {
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(Token { kind: TokenKind::Eof, .. })) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or(0);
            tokens.push(Token {
                kind: TokenKind::Eof,
                span: Span::new(end, end),
            });
        }
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Program, SyntaxErrors> {
        let mut items = Vec::new();
        while !self.is_eof() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.report(err);
                    self.synchronize_item(false);
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Program { items })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_item(&mut self) -> Result<Item, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Namespace => {
                self.advance();
                self.parse_namespace().map(Item::Namespace)
            }
            TokenKind::Class => {
                self.advance();
                self.parse_class().map(|def| Item::Class(Rc::new(def)))
            }
            TokenKind::Func => {
                self.advance();
                self.parse_function().map(|def| Item::Function(Rc::new(def)))
            }
            TokenKind::Var => {
                self.advance();
                self.parse_var().map(|decl| Item::Variable(Rc::new(decl)))
            }
            _ => Err(self
                .error_here("Expected declaration")
                .with_help("Only `namespace`, `class`, `func` and `var` may appear at namespace scope")),
        }
    }

    fn parse_namespace(&mut self) -> Result<NamespaceDef, SyntaxError> {
        let start = self.previous_span().start;
        let name = self.expect_identifier("Expected namespace name")?;
        self.expect(TokenKind::LBrace, "after namespace name")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            match self.parse_item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    self.report(err);
                    self.synchronize_item(true);
                }
            }
        }
        let end = self.expect(TokenKind::RBrace, "to close namespace")?.end;
        Ok(NamespaceDef {
            name,
            items,
            span: Span::new(start, end),
        })
    }

    fn parse_class(&mut self) -> Result<ClassDef, SyntaxError> {
        let start = self.previous_span().start;
        let name = self.expect_identifier("Expected class name")?;

        let mut bases = Vec::new();
        if self.matches(&TokenKind::Colon) {
            loop {
                let visibility = if self.matches(&TokenKind::Private) {
                    Visibility::Private
                } else {
                    self.matches(&TokenKind::Public);
                    Visibility::Public
                };
                let name = self.parse_qualified_name()?;
                bases.push(BaseClass { visibility, name });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "to open class body")?;
        let mut variables = Vec::new();
        let mut functions = Vec::new();
        let mut constructors = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            match self.peek_kind() {
                TokenKind::Var => {
                    self.advance();
                    variables.push(Rc::new(self.parse_var()?));
                }
                TokenKind::Func => {
                    self.advance();
                    functions.push(Rc::new(self.parse_function()?));
                }
                TokenKind::Init => {
                    let span = self.advance().span;
                    let name = Identifier {
                        name: "init".into(),
                        span,
                    };
                    constructors.push(Rc::new(self.parse_function_rest(name)?));
                }
                _ => {
                    return Err(self
                        .error_here("Expected class member")
                        .with_help("Class bodies hold `var`, `func` and `init` declarations"))
                }
            }
        }
        let end = self.expect(TokenKind::RBrace, "to close class body")?.end;

        Ok(ClassDef {
            name,
            bases,
            variables,
            functions,
            constructors,
            span: Span::new(start, end),
        })
    }

    fn parse_function(&mut self) -> Result<FunctionDef, SyntaxError> {
        let name = self.expect_identifier("Expected function name")?;
        self.parse_function_rest(name)
    }

    fn parse_function_rest(&mut self, name: Identifier) -> Result<FunctionDef, SyntaxError> {
        self.expect(TokenKind::LParen, "to open parameter list")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "to close parameter list")?;
        let body = self.parse_block()?;
        let span = Span::new(name.span.start, body.span.end);
        Ok(FunctionDef {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let name = self.expect_identifier("Expected parameter name")?;
        let mut span = name.span;
        let type_name = if self.matches(&TokenKind::Colon) {
            let ty = self.expect_identifier("Expected parameter type after `:`")?;
            span = span.union(ty.span);
            Some(ty.name)
        } else {
            None
        };
        Ok(Param {
            name: name.name,
            type_name,
            span,
        })
    }

    fn parse_var(&mut self) -> Result<VarDecl, SyntaxError> {
        let start = self.previous_span().start;
        let name = self.expect_identifier("Expected variable name after `var`")?;
        let init = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.expect_semi()?.end;
        Ok(VarDecl {
            name,
            init,
            span: Span::new(start, end),
        })
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let start = self.expect(TokenKind::LBrace, "to open block")?.start;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            if self.matches(&TokenKind::Semi) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        let end = self.expect(TokenKind::RBrace, "to close block")?.end;
        Ok(Block {
            statements,
            span: Span::new(start, end),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Var => {
                self.advance();
                Ok(Statement::Var(Rc::new(self.parse_var()?)))
            }
            TokenKind::Func => {
                self.advance();
                Ok(Statement::Function(Rc::new(self.parse_function()?)))
            }
            TokenKind::Class => {
                self.advance();
                Ok(Statement::Class(Rc::new(self.parse_class()?)))
            }
            TokenKind::If => {
                let span = self.advance().span;
                Ok(Statement::If(self.parse_if(span)?))
            }
            TokenKind::For => {
                let span = self.advance().span;
                Ok(Statement::For(self.parse_for(span)?))
            }
            TokenKind::Return => {
                let span = self.advance().span;
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_semi()?;
                Ok(Statement::Return(ReturnStmt { value, span }))
            }
            TokenKind::Print | TokenKind::Println => {
                let newline = self.check(&TokenKind::Println);
                let span = self.advance().span;
                self.expect(TokenKind::LParen, "after print")?;
                let args = self.parse_arguments()?;
                self.expect_semi()?;
                Ok(Statement::Print(PrintStmt {
                    args,
                    newline,
                    span,
                }))
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.expect_semi()?;
                Ok(stmt)
            }
        }
    }

    /// Assignment or bare expression, without the trailing `;`.
    fn parse_simple_statement(&mut self) -> Result<Statement, SyntaxError> {
        let expr = self.parse_expression()?;
        if !self.check(&TokenKind::Eq) {
            return Ok(Statement::Expr(expr));
        }
        let eq_span = self.advance().span;
        match expr {
            Expr::Identifier(target) => {
                let value = self.parse_expression()?;
                let span = target.span.union(eq_span);
                Ok(Statement::Assign(AssignStmt {
                    target,
                    value,
                    span,
                }))
            }
            other => Err(SyntaxError::new("Invalid assignment target", other.span())
                .with_help("Only variables can be assigned to")),
        }
    }

    fn parse_if(&mut self, span: Span) -> Result<IfStmt, SyntaxError> {
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let else_block = if self.matches(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let nested_span = self.advance().span;
                let nested = self.parse_if(nested_span)?;
                let block_span = Span::new(nested_span.start, self.previous_span().end);
                Some(Block {
                    statements: vec![Statement::If(nested)],
                    span: block_span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(IfStmt {
            condition,
            then_block,
            else_block,
            span,
        })
    }

    fn parse_for(&mut self, span: Span) -> Result<ForStmt, SyntaxError> {
        let iterator = self.expect_identifier("Expected loop variable after `for`")?;
        let init = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "after loop variable")
            .map_err(|err| err.with_help("Syntax: for i = 0; i < n; i = i + 1 { ... }"))?;
        let condition = self.parse_expression()?;
        let step = if self.matches(&TokenKind::Semi) {
            Some(Box::new(self.parse_simple_statement()?))
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(ForStmt {
            iterator,
            init,
            condition,
            step,
            body,
            span,
        })
    }

    /// Comma separated expressions up to and including the closing `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "to close argument list")?;
        Ok(args)
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let (op, prec) = match self.current_binary_op() {
                Some(info) => info,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            let span = self.advance().span;
            let right = self.parse_binary(prec + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek_kind() {
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Ampersand => UnaryOp::AddressOf,
            TokenKind::Star => UnaryOp::Deref,
            _ => return self.parse_postfix(),
        };
        let span = self.advance().span;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_primary()?;
        match expr {
            Expr::Identifier(callee) if self.check(&TokenKind::LParen) => {
                self.advance();
                let args = self.parse_arguments()?;
                Ok(Expr::Call(CallExpr { callee, args }))
            }
            expr => Ok(expr),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Integer(value) => Ok(Expr::Int(value, self.advance().span)),
            TokenKind::Float(value) => Ok(Expr::Float(value, self.advance().span)),
            TokenKind::String(value) => Ok(Expr::Str(value, self.advance().span)),
            TokenKind::True => Ok(Expr::Bool(true, self.advance().span)),
            TokenKind::False => Ok(Expr::Bool(false, self.advance().span)),
            TokenKind::Identifier(_) | TokenKind::ColonColon => {
                Ok(Expr::Identifier(self.parse_qualified_name()?))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "after expression")?;
                Ok(expr)
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn parse_qualified_name(&mut self) -> Result<QualifiedName, SyntaxError> {
        let start = self.current_span().start;
        let mut path = Vec::new();
        if self.matches(&TokenKind::ColonColon) {
            path.push(String::new());
        }
        let mut name = self.expect_identifier("Expected name")?;
        while self.check(&TokenKind::ColonColon)
            && matches!(self.peek_kind_n(1), TokenKind::Identifier(_))
        {
            self.advance();
            let next = self.expect_identifier("Expected name after `::`")?;
            path.push(std::mem::replace(&mut name, next).name);
        }
        Ok(QualifiedName {
            path,
            name: name.name,
            span: Span::new(start, name.span.end),
        })
    }

    fn current_binary_op(&self) -> Option<(BinaryOp, u8)> {
        match self.peek_kind() {
            TokenKind::PipePipe => Some((BinaryOp::Or, 1)),
            TokenKind::AmpersandAmpersand => Some((BinaryOp::And, 2)),
            TokenKind::EqEq => Some((BinaryOp::Eq, 3)),
            TokenKind::BangEq => Some((BinaryOp::NotEq, 3)),
            TokenKind::Lt => Some((BinaryOp::Lt, 4)),
            TokenKind::LtEq => Some((BinaryOp::LtEq, 4)),
            TokenKind::Gt => Some((BinaryOp::Gt, 4)),
            TokenKind::GtEq => Some((BinaryOp::GtEq, 4)),
            TokenKind::LtLt => Some((BinaryOp::Shl, 5)),
            TokenKind::GtGt => Some((BinaryOp::Shr, 5)),
            TokenKind::Ampersand => Some((BinaryOp::BitAnd, 6)),
            TokenKind::Plus => Some((BinaryOp::Add, 7)),
            TokenKind::Minus => Some((BinaryOp::Sub, 7)),
            TokenKind::Star => Some((BinaryOp::Mul, 8)),
            TokenKind::Slash => Some((BinaryOp::Div, 8)),
            TokenKind::Percent => Some((BinaryOp::Rem, 8)),
            _ => None,
        }
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<Identifier, SyntaxError> {
        match self.peek_kind() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Ok(Identifier { name, span })
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Span, SyntaxError> {
        if self.check(&kind) {
            Ok(self.advance().span)
        } else {
            let found = self.peek_kind();
            Err(self.error_here(&format!("Expected {kind} {context}, found {found}")))
        }
    }

    fn expect_semi(&mut self) -> Result<Span, SyntaxError> {
        if self.check(&TokenKind::Semi) {
            return Ok(self.advance().span);
        }
        let end = self.previous_span().end;
        Err(SyntaxError::new(
            format!("Expected `;`, found {}", self.peek_kind()),
            Span::new(end, end),
        )
        .with_help("Statements and variable declarations end with `;`"))
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek_kind() == kind
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek_kind_n(0)
    }

    fn peek_kind_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len() - 1);
        self.pos = (self.pos + 1).min(self.tokens.len());
        &self.tokens[index]
    }

    fn is_eof(&self) -> bool {
        self.check(&TokenKind::Eof)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_default()
    }

    fn previous_span(&self) -> Span {
        if self.pos == 0 {
            self.current_span()
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message.to_string(), self.current_span())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    /// Skips at least one token, then up to the next declaration keyword.
    /// Inside a namespace body a closing brace also ends the skip.
    fn synchronize_item(&mut self, in_namespace: bool) {
        if !self.is_eof() {
            self.advance();
        }
        while !self.is_eof() {
            let kind = self.peek_kind();
            if kind.is_item_start() || (in_namespace && kind == TokenKind::RBrace) {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse_program(source).expect("parse")
    }

    fn main_body(program: &Program) -> &Block {
        program
            .items
            .iter()
            .find_map(|item| match item {
                Item::Function(def) if def.name.name == "main" => Some(&def.body),
                _ => None,
            })
            .expect("main")
    }

    #[test]
    fn parses_functions_with_typed_parameters() {
        let program = parse_ok("func f2( a1:Int, a2:Int ) { return a1-a2; }");
        let Item::Function(def) = &program.items[0] else {
            panic!("expected function");
        };
        assert_eq!(def.name.name, "f2");
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.params[0].type_name.as_deref(), Some("Int"));
        assert!(matches!(def.body.statements[0], Statement::Return(_)));
    }

    #[test]
    fn binary_precedence_and_operator_spans() {
        let source = "func main() { var x = 1 + 2 * 3; }";
        let program = parse_ok(source);
        let Statement::Var(decl) = &main_body(&program).statements[0] else {
            panic!("expected var");
        };
        let Some(Expr::Binary { op, right, span, .. }) = &decl.init else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert_eq!(span.text(source), "+");
        assert!(matches!(
            right.as_ref(),
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn parses_nested_calls_and_qualified_names() {
        let source = "func main() { x1 = f3((0), 1 + f1(f0() + (2)), ::geo::f2(f1(3), f1(4)) + 5); }";
        let program = parse_ok(source);
        let Statement::Assign(assign) = &main_body(&program).statements[0] else {
            panic!("expected assignment");
        };
        assert_eq!(assign.target.name, "x1");
        let Expr::Call(call) = &assign.value else {
            panic!("expected call");
        };
        assert_eq!(call.callee.name, "f3");
        assert_eq!(call.args.len(), 3);
        let Expr::Binary { left, .. } = &call.args[2] else {
            panic!("expected binary");
        };
        let Expr::Call(inner) = left.as_ref() else {
            panic!("expected qualified call");
        };
        assert_eq!(inner.callee.path, vec![String::new(), "geo".to_string()]);
        assert_eq!(inner.callee.to_string(), "::geo::f2");
        assert_eq!(inner.callee.span.text(source), "::geo::f2");
    }

    #[test]
    fn parses_control_flow() {
        let program = parse_ok(
            "func main() {
                 for i = 0; i < 3; i = i + 1 { print(i); }
                 if x > 1 { return 1; } else if x < 0 { return -1; } else { println(\"zero\"); }
             }",
        );
        let body = main_body(&program);
        let Statement::For(stmt) = &body.statements[0] else {
            panic!("expected for");
        };
        assert_eq!(stmt.iterator.name, "i");
        assert!(stmt.init.is_some());
        assert!(matches!(stmt.step.as_deref(), Some(Statement::Assign(_))));
        let Statement::If(stmt) = &body.statements[1] else {
            panic!("expected if");
        };
        let else_block = stmt.else_block.as_ref().expect("else");
        assert!(matches!(else_block.statements[0], Statement::If(_)));
    }

    #[test]
    fn parses_namespaces_and_classes() {
        let program = parse_ok(
            "namespace geo {
                 var scale = 2;
                 namespace inner { func f() { return 1; } }
             }
             class Point : Shape, private util::Base {
                 var origin = 0;
                 init(x, y) { }
                 func len() { return 0; }
             }",
        );
        let Item::Namespace(ns) = &program.items[0] else {
            panic!("expected namespace");
        };
        assert_eq!(ns.name.name, "geo");
        assert_eq!(ns.items.len(), 2);
        let Item::Class(class) = &program.items[1] else {
            panic!("expected class");
        };
        assert_eq!(class.bases.len(), 2);
        assert_eq!(class.bases[0].visibility, Visibility::Public);
        assert_eq!(class.bases[1].visibility, Visibility::Private);
        assert_eq!(class.bases[1].name.path, vec!["util".to_string()]);
        assert_eq!(class.constructors[0].params.len(), 2);
        assert_eq!(class.functions[0].name.name, "len");
        assert_eq!(class.variables[0].name.name, "origin");
    }

    #[test]
    fn unsupported_operators_still_parse() {
        let program = parse_ok("func main() { var p = &x; var q = *p << 2; }");
        let Statement::Var(decl) = &main_body(&program).statements[0] else {
            panic!("expected var");
        };
        assert!(matches!(
            decl.init,
            Some(Expr::Unary {
                op: UnaryOp::AddressOf,
                ..
            })
        ));
    }

    #[test]
    fn collects_errors_and_recovers_at_next_item() {
        let errors = parse_program("func a() { var x = ; }\nfunc b() { return 1 }\nfunc c() { }")
            .unwrap_err()
            .errors;
        assert_eq!(errors.len(), 2);
        assert!(errors[0].message.contains("Expected expression"));
        assert!(errors[1].message.contains("Expected `;`"));
        assert!(errors[1].help.is_some());
    }

    #[test]
    fn rejects_statements_at_namespace_scope() {
        let errors = parse_program("print(\"x\");").unwrap_err().errors;
        assert_eq!(errors[0].message, "Expected declaration");
    }

    #[test]
    fn rejects_assignment_to_non_variable() {
        let errors = parse_program("func main() { f() = 1; }").unwrap_err().errors;
        assert_eq!(errors[0].message, "Invalid assignment target");
    }

    #[test]
    fn lexer_errors_become_syntax_errors() {
        let errors = parse_program("func main() { var a = 1 $ 2; }").unwrap_err().errors;
        assert!(errors[0].message.contains("Unexpected character"));
    }
}
