use crate::language::{
    errors::SyntaxError,
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1},
    combinator::{map, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair, tuple},
    IResult, Parser as NomParser,
};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

impl From<LexError> for SyntaxError {
    fn from(err: LexError) -> Self {
        SyntaxError::new(err.message, err.span)
    }
}

/// Tokenizes `source`, always terminating the stream with an `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut remaining = source;

    loop {
        if let Ok((after, _)) = trivia(remaining) {
            remaining = after;
        }
        if remaining.is_empty() {
            break;
        }

        let offset = source.len() - remaining.len();
        match next_token(remaining, offset) {
            Ok((after, kind)) => {
                let end = source.len() - after.len();
                tokens.push(Token {
                    kind,
                    span: Span::new(offset, end),
                });
                remaining = after;
            }
            Err(rejected) => {
                errors.push(rejected.error);
                remaining = &remaining[rejected.skip.max(1).min(remaining.len())..];
            }
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(source.len(), source.len()),
    });

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

struct Rejected {
    error: LexError,
    skip: usize,
}

fn next_token(input: &str, offset: usize) -> Result<(&str, TokenKind), Rejected> {
    if input.starts_with("/*") {
        return Err(Rejected {
            error: LexError {
                message: "Unterminated block comment".into(),
                span: Span::new(offset, offset + 2),
            },
            skip: input.len(),
        });
    }

    if let Ok((after, digits)) = number(input) {
        let span = Span::new(offset, offset + digits.len());
        let kind = if digits.contains('.') {
            digits.parse::<f64>().map(TokenKind::Float).ok()
        } else {
            digits.parse::<i64>().map(TokenKind::Integer).ok()
        };
        return match kind {
            Some(kind) => Ok((after, kind)),
            None => Err(Rejected {
                error: LexError {
                    message: format!("Integer literal `{digits}` does not fit in 64 bits"),
                    span,
                },
                skip: digits.len(),
            }),
        };
    }

    if input.starts_with('"') {
        return match string_literal(input) {
            Ok((after, text)) => Ok((after, TokenKind::String(text))),
            Err(_) => {
                let line_len = input.find(['\n', '\r']).unwrap_or(input.len());
                Err(Rejected {
                    error: LexError {
                        message: "Unterminated or malformed string literal".into(),
                        span: Span::new(offset, offset + line_len),
                    },
                    skip: line_len,
                })
            }
        };
    }

    if let Ok((after, text)) = word(input) {
        let kind =
            TokenKind::keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));
        return Ok((after, kind));
    }

    if let Ok((after, kind)) = symbol(input) {
        return Ok((after, kind));
    }

    let ch = input.chars().next().unwrap_or('\0');
    Err(Rejected {
        error: LexError {
            message: format!("Unexpected character `{ch}`"),
            span: Span::new(offset, offset + ch.len_utf8()),
        },
        skip: ch.len_utf8(),
    })
}

fn trivia(input: &str) -> IResult<&str, usize> {
    many0_count(alt((
        multispace1,
        recognize(pair(tag("//"), opt(is_not("\n\r")))),
        recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
    )))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(pair(digit1, opt(pair(char('.'), digit1)))).parse(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", char('\\')),
                    value("\"", char('"')),
                    value("\n", char('n')),
                    value("\t", char('t')),
                    value("\r", char('r')),
                    value("\0", char('0')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )
    .parse(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

fn symbol(input: &str) -> IResult<&str, TokenKind> {
    alt((
        alt((
            value(TokenKind::ColonColon, tag("::")),
            value(TokenKind::EqEq, tag("==")),
            value(TokenKind::BangEq, tag("!=")),
            value(TokenKind::LtEq, tag("<=")),
            value(TokenKind::GtEq, tag(">=")),
            value(TokenKind::LtLt, tag("<<")),
            value(TokenKind::GtGt, tag(">>")),
            value(TokenKind::AmpersandAmpersand, tag("&&")),
            value(TokenKind::PipePipe, tag("||")),
        )),
        alt((
            value(TokenKind::LParen, char('(')),
            value(TokenKind::RParen, char(')')),
            value(TokenKind::LBrace, char('{')),
            value(TokenKind::RBrace, char('}')),
            value(TokenKind::Comma, char(',')),
            value(TokenKind::Semi, char(';')),
            value(TokenKind::Colon, char(':')),
            value(TokenKind::Eq, char('=')),
            value(TokenKind::Plus, char('+')),
            value(TokenKind::Minus, char('-')),
            value(TokenKind::Star, char('*')),
            value(TokenKind::Slash, char('/')),
            value(TokenKind::Percent, char('%')),
            value(TokenKind::Bang, char('!')),
            value(TokenKind::Ampersand, char('&')),
            value(TokenKind::Lt, char('<')),
            value(TokenKind::Gt, char('>')),
        )),
    ))
    .parse(input)
}
