//! Pattern parsing.
//!
//! Grammar, loosest first:
//!
//! ```text
//! pat        ::= cons_pat [':' type]
//! cons_pat   ::= app_pat ['::' cons_pat]          (right-assoc)
//! app_pat    ::= ident atomic_pat                 (constructor application)
//!              | ident 'as' pat                   (layered)
//!              | atomic_pat
//! atomic_pat ::= '_' | literal | ident | '(' … ')' | '[' … ']' | '{' … '}'
//! ```
//!
//! Whether a bare identifier is a variable binding or a nullary
//! constructor is not known here; the type resolver decides when it can
//! see the constructor environment.

use crate::ast::*;
use crate::{ParseError, Parser};
use quill_lex::Token;
use quill_util::Label;

impl Parser {
    pub(crate) fn parse_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        let pat = self.parse_cons_pat()?;
        if self.at(&Token::Colon) {
            self.advance();
            let ty = self.parse_type()?;
            let pos = start.merge(self.prev_pos());
            Ok(Pat::new(PatKind::Annotated(Box::new(pat), Box::new(ty)), pos))
        } else {
            Ok(pat)
        }
    }

    fn parse_cons_pat(&mut self) -> Result<Pat, ParseError> {
        let lhs = self.parse_app_pat()?;
        if self.at(&Token::Cons) {
            self.advance();
            let rhs = self.parse_cons_pat()?;
            let pos = lhs.pos.merge(rhs.pos);
            Ok(Pat::new(PatKind::Cons(Box::new(lhs), Box::new(rhs)), pos))
        } else {
            Ok(lhs)
        }
    }

    fn parse_app_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            if self.eat(&Token::As) {
                let inner = self.parse_pat()?;
                let pos = start.merge(self.prev_pos());
                return Ok(Pat::new(PatKind::As(name, Box::new(inner)), pos));
            }
            if self.at_atomic_pat_start() {
                let arg = self.parse_atomic_pat()?;
                let pos = start.merge(self.prev_pos());
                return Ok(Pat::new(PatKind::Con(name, Some(Box::new(arg))), pos));
            }
            return Ok(Pat::new(PatKind::Id(name), start));
        }
        self.parse_atomic_pat()
    }

    /// True when the current token can begin an atomic pattern
    pub(crate) fn at_atomic_pat_start(&self) -> bool {
        matches!(
            self.peek(),
            Token::Wild
                | Token::Int(_)
                | Token::Real(_)
                | Token::Str(_)
                | Token::Char(_)
                | Token::Ident(_)
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
        )
    }

    pub(crate) fn parse_atomic_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        match self.peek().clone() {
            Token::Wild => {
                self.advance();
                Ok(Pat::new(PatKind::Wild, start))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Pat::new(PatKind::Lit(Literal::Int(n)), start))
            }
            Token::Real(r) => {
                self.advance();
                Ok(Pat::new(PatKind::Lit(Literal::Real(r)), start))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Pat::new(PatKind::Lit(Literal::Str(s)), start))
            }
            Token::Char(c) => {
                self.advance();
                Ok(Pat::new(PatKind::Lit(Literal::Char(c)), start))
            }
            Token::Ident(name) => {
                self.advance();
                let kind = if name == quill_util::symbol::SYM_TRUE {
                    PatKind::Lit(Literal::Bool(true))
                } else if name == quill_util::symbol::SYM_FALSE {
                    PatKind::Lit(Literal::Bool(false))
                } else {
                    PatKind::Id(name)
                };
                Ok(Pat::new(kind, start))
            }
            Token::LParen => self.parse_paren_pat(),
            Token::LBracket => self.parse_list_pat(),
            Token::LBrace => self.parse_record_pat(),
            _ => Err(self.unexpected("a pattern")),
        }
    }

    /// `()`, `(p)`, or `(p1, p2, …)`
    fn parse_paren_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        self.expect(&Token::LParen)?;
        if self.at(&Token::RParen) {
            self.advance();
            return Ok(Pat::new(
                PatKind::Lit(Literal::Unit),
                start.merge(self.prev_pos()),
            ));
        }
        let first = self.parse_pat()?;
        if self.at(&Token::Comma) {
            let mut pats = vec![first];
            while self.eat(&Token::Comma) {
                pats.push(self.parse_pat()?);
            }
            self.expect(&Token::RParen)?;
            Ok(Pat::new(PatKind::Tuple(pats), start.merge(self.prev_pos())))
        } else {
            self.expect(&Token::RParen)?;
            Ok(first)
        }
    }

    /// `[]` or `[p1, p2, …]`
    fn parse_list_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        self.expect(&Token::LBracket)?;
        let mut pats = Vec::new();
        if !self.at(&Token::RBracket) {
            pats.push(self.parse_pat()?);
            while self.eat(&Token::Comma) {
                pats.push(self.parse_pat()?);
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Pat::new(PatKind::List(pats), start.merge(self.prev_pos())))
    }

    /// `{a, b = p, ...}`; the ellipsis, when present, must be last
    fn parse_record_pat(&mut self) -> Result<Pat, ParseError> {
        let start = self.pos();
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        let mut ellipsis = false;
        if !self.at(&Token::RBrace) {
            loop {
                if self.at(&Token::Ellipsis) {
                    self.advance();
                    ellipsis = true;
                    break;
                }
                let label = match self.peek().clone() {
                    Token::Ident(name) => {
                        self.advance();
                        Label::from(name)
                    }
                    Token::Int(n) if n > 0 => {
                        self.advance();
                        Label::from(n.to_string().as_str())
                    }
                    _ => return Err(self.unexpected("a record label or '...'")),
                };
                let field_pos = self.prev_pos();
                let pat = if self.eat(&Token::Eq) {
                    self.parse_pat()?
                } else {
                    // Shorthand `{a, b}` binds each field to a variable
                    // of the label's name.
                    Pat::new(
                        PatKind::Id(quill_util::Symbol::intern(label.as_str())),
                        field_pos,
                    )
                };
                fields.push((label, pat));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Pat::new(
            PatKind::Record { fields, ellipsis },
            start.merge(self.prev_pos()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use quill_util::FileId;

    fn parse_pat(source: &str) -> Pat {
        // Parse a pattern by wrapping it in a fn expression.
        match Parser::parse_single(&format!("fn {} => 0;", source), FileId::STDIN).unwrap() {
            Statement::Expr(e) => match e.kind {
                ExprKind::Fn(mut arms) => arms.remove(0).pat,
                other => panic!("expected fn, got {:?}", other),
            },
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_wildcard_and_ident() {
        assert!(matches!(parse_pat("_").kind, PatKind::Wild));
        assert!(matches!(parse_pat("x").kind, PatKind::Id(_)));
    }

    #[test]
    fn test_literal_pats() {
        assert!(matches!(
            parse_pat("0").kind,
            PatKind::Lit(Literal::Int(0))
        ));
        assert!(matches!(
            parse_pat("~1").kind,
            PatKind::Lit(Literal::Int(-1))
        ));
        assert!(matches!(
            parse_pat("true").kind,
            PatKind::Lit(Literal::Bool(true))
        ));
        assert!(matches!(
            parse_pat("\"a\"").kind,
            PatKind::Lit(Literal::Str(_))
        ));
    }

    #[test]
    fn test_cons_pat_right_assoc() {
        let pat = parse_pat("x :: y :: rest");
        match pat.kind {
            PatKind::Cons(_, tail) => assert!(matches!(tail.kind, PatKind::Cons(_, _))),
            other => panic!("expected cons, got {:?}", other),
        }
    }

    #[test]
    fn test_tuple_pat() {
        match parse_pat("(a, b, c)").kind {
            PatKind::Tuple(pats) => assert_eq!(pats.len(), 3),
            other => panic!("expected tuple, got {:?}", other),
        }
    }

    #[test]
    fn test_list_pat() {
        match parse_pat("[a, b]").kind {
            PatKind::List(pats) => assert_eq!(pats.len(), 2),
            other => panic!("expected list, got {:?}", other),
        }
        assert!(matches!(parse_pat("[]").kind, PatKind::List(ref v) if v.is_empty()));
    }

    #[test]
    fn test_record_pat_shorthand() {
        match parse_pat("{id, name}").kind {
            PatKind::Record { fields, ellipsis } => {
                assert_eq!(fields.len(), 2);
                assert!(!ellipsis);
                assert!(matches!(fields[0].1.kind, PatKind::Id(_)));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_record_pat_ellipsis() {
        match parse_pat("{id, ...}").kind {
            PatKind::Record { fields, ellipsis } => {
                assert_eq!(fields.len(), 1);
                assert!(ellipsis);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_record_pat_explicit_field() {
        match parse_pat("{id = n}").kind {
            PatKind::Record { fields, .. } => {
                assert_eq!(fields[0].0.as_str(), "id");
                assert!(matches!(fields[0].1.kind, PatKind::Id(_)));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_constructor_application() {
        match parse_pat("SOME x").kind {
            PatKind::Con(name, arg) => {
                assert_eq!(name.as_str(), "SOME");
                assert!(arg.is_some());
            }
            other => panic!("expected constructor, got {:?}", other),
        }
    }

    #[test]
    fn test_as_pat() {
        match parse_pat("whole as (a, b)").kind {
            PatKind::As(name, inner) => {
                assert_eq!(name.as_str(), "whole");
                assert!(matches!(inner.kind, PatKind::Tuple(_)));
            }
            other => panic!("expected as-pattern, got {:?}", other),
        }
    }

    #[test]
    fn test_annotated_pat() {
        assert!(matches!(
            parse_pat("(x : int)").kind,
            PatKind::Annotated(_, _)
        ));
    }

    #[test]
    fn test_nested_pat() {
        let pat = parse_pat("(SOME x :: rest, _)");
        match pat.kind {
            PatKind::Tuple(pats) => {
                assert!(matches!(pats[0].kind, PatKind::Cons(_, _)));
                assert!(matches!(pats[1].kind, PatKind::Wild));
            }
            other => panic!("expected tuple, got {:?}", other),
        }
    }
}
