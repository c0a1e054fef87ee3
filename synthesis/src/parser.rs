//! Formula lexer and recursive-descent parser.
//!
//! The accepted syntax follows the usual GR(1) tool conventions:
//!
//! ```text
//! (!req -> X(!grant))
//! landing_pending && near_ground -> X landed
//! !(fire_left && fire_main)
//! X(falling_fast) -> X(action = 2)
//! G !crash
//! ```
//!
//! Precedence from loosest to tightest: `<->`, `->` (right associative),
//! `||`, `&&`, then the unary operators `!`, `X`, `G`, `F`. A primed
//! identifier `x'` is shorthand for `X x`.

use crate::error::ParseError;
use crate::formula::{CompareOp, Formula};
use logos::Logos;
use std::ops::Range;
use std::str::FromStr;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token {
    #[token("true")]
    #[token("TRUE")]
    True,
    #[token("false")]
    #[token("FALSE")]
    False,

    #[token("!")]
    #[token("~")]
    Not,
    #[token("&&")]
    #[token("&")]
    #[token("/\\")]
    And,
    #[token("||")]
    #[token("|")]
    #[token("\\/")]
    Or,
    #[token("->")]
    Implies,
    #[token("<->")]
    Iff,
    #[token("=")]
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,

    #[token("X", priority = 3)]
    #[token("next")]
    Next,
    #[token("G", priority = 3)]
    #[token("[]")]
    Always,
    #[token("F", priority = 3)]
    #[token("<>")]
    Eventually,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*'", |lex| {
        let slice = lex.slice();
        slice[..slice.len() - 1].to_owned()
    })]
    Primed(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_owned())]
    Ident(String),
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Implies => "'->'".to_string(),
            Token::Iff => "'<->'".to_string(),
            Token::Eq => "'='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Next => "'X'".to_string(),
            Token::Always => "'G'".to_string(),
            Token::Eventually => "'F'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Primed(name) => format!("'{}''", name),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Int(value) => format!("integer {}", value),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, Range<usize>)>, ParseError> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                return Err(ParseError::new(
                    span.start,
                    format!("unexpected character sequence '{}'", lexer.slice()),
                ))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                self.offset(),
                format!("unexpected {}", token.describe()),
            ),
            None => ParseError::new(self.end, "unexpected end of input"),
        }
    }

    fn parse_iff(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_implies()?;
        while self.eat(&Token::Iff) {
            let rhs = self.parse_implies()?;
            lhs = Formula::iff(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_implies(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Implies) {
            let rhs = self.parse_implies()?;
            return Ok(Formula::implies(lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Formula::or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.parse_unary()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_unary()?;
            lhs = Formula::and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Formula, ParseError> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                Ok(Formula::not(self.parse_unary()?))
            }
            Some(Token::Next) => {
                self.advance();
                Ok(Formula::next(self.parse_unary()?))
            }
            Some(Token::Always) => {
                self.advance();
                Ok(Formula::always(self.parse_unary()?))
            }
            Some(Token::Eventually) => {
                self.advance();
                Ok(Formula::eventually(self.parse_unary()?))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Formula, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::True) => Ok(Formula::True),
            Some(Token::False) => Ok(Formula::False),
            Some(Token::LParen) => {
                let inner = self.parse_iff()?;
                if !self.eat(&Token::RParen) {
                    return Err(match self.peek() {
                        Some(_) => self.unexpected(),
                        None => ParseError::new(self.end, "expected ')'"),
                    });
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.parse_comparison(name),
            Some(Token::Primed(name)) => Ok(Formula::next(self.parse_comparison(name)?)),
            Some(token) => Err(ParseError::new(
                offset,
                format!("unexpected {}", token.describe()),
            )),
            None => Err(ParseError::new(self.end, "unexpected end of input")),
        }
    }

    fn parse_comparison(&mut self, var: String) -> Result<Formula, ParseError> {
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            _ => return Ok(Formula::Var(var)),
        };
        self.advance();
        let offset = self.offset();
        match self.advance() {
            Some(Token::Int(value)) => Ok(Formula::Compare { var, op, value }),
            Some(token) => Err(ParseError::new(
                offset,
                format!("expected integer after '{}', found {}", op, token.describe()),
            )),
            None => Err(ParseError::new(
                self.end,
                format!("expected integer after '{}'", op),
            )),
        }
    }
}

/// Parse a formula from its textual form
pub fn parse(input: &str) -> Result<Formula, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let formula = parser.parse_iff()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected());
    }
    Ok(formula)
}

impl FromStr for Formula {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Formula {
        Formula::var(name)
    }

    #[test]
    fn test_parse_request_grant_guarantees() {
        let f = parse("(!req -> X(!grant))").unwrap();
        assert_eq!(
            f,
            Formula::implies(
                Formula::not(var("req")),
                Formula::next(Formula::not(var("grant")))
            )
        );
    }

    #[test]
    fn test_precedence() {
        let f = parse("a || b && c -> d").unwrap();
        assert_eq!(
            f,
            Formula::implies(
                Formula::or(var("a"), Formula::and(var("b"), var("c"))),
                var("d")
            )
        );

        let f = parse("a -> b -> c").unwrap();
        assert_eq!(
            f,
            Formula::implies(var("a"), Formula::implies(var("b"), var("c")))
        );

        let f = parse("a <-> b -> c").unwrap();
        assert_eq!(
            f,
            Formula::iff(var("a"), Formula::implies(var("b"), var("c")))
        );
    }

    #[test]
    fn test_unary_binds_tighter_than_and() {
        let f = parse("X a && b").unwrap();
        assert_eq!(f, Formula::and(Formula::next(var("a")), var("b")));

        let f = parse("G !crash").unwrap();
        assert_eq!(f, Formula::always(Formula::not(var("crash"))));

        let f = parse("[] <> landed").unwrap();
        assert_eq!(f, Formula::always(Formula::eventually(var("landed"))));
    }

    #[test]
    fn test_alternative_spellings() {
        assert_eq!(
            parse("a /\\ b").unwrap(),
            parse("a && b").unwrap()
        );
        assert_eq!(parse("a \\/ b").unwrap(), parse("a | b").unwrap());
        assert_eq!(parse("~a").unwrap(), parse("!a").unwrap());
        assert_eq!(parse("next(a)").unwrap(), parse("X a").unwrap());
        assert_eq!(parse("TRUE").unwrap(), Formula::True);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(parse("action = 2").unwrap(), Formula::eq("action", 2));
        assert_eq!(
            parse("action != 0").unwrap(),
            Formula::Compare {
                var: "action".to_string(),
                op: CompareOp::Ne,
                value: 0
            }
        );
        assert_eq!(
            parse("X(action == -1)").unwrap(),
            Formula::next(Formula::eq("action", -1))
        );
        assert_eq!(
            parse("action' = 3").unwrap(),
            Formula::next(Formula::eq("action", 3))
        );
    }

    #[test]
    fn test_identifiers_starting_with_operator_letters() {
        assert_eq!(parse("Xpos").unwrap(), var("Xpos"));
        assert_eq!(parse("fire_left").unwrap(), var("fire_left"));
        assert_eq!(parse("Goal").unwrap(), var("Goal"));
    }

    #[test]
    fn test_display_roundtrip() {
        for input in [
            "(landing_pending && near_ground && p && q && r) -> X(landed)",
            "!(do_nothing && fire_left)",
            "X(!touchdown && falling_fast) -> X(action = 2)",
            "a <-> (b || !c)",
            "G (F landed)",
        ] {
            let parsed = parse(input).unwrap();
            let reparsed = parse(&parsed.to_string()).unwrap();
            assert_eq!(parsed, reparsed, "roundtrip failed for {}", input);
        }
    }

    #[test]
    fn test_errors() {
        let err = parse("a &&").unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.message.contains("end of input"));

        let err = parse("(a || b").unwrap_err();
        assert!(err.message.contains("')'"));

        let err = parse("a b").unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse("a # b").unwrap_err();
        assert_eq!(err.offset, 2);

        let err = parse("action = b").unwrap_err();
        assert!(err.message.contains("expected integer"));
    }
}
