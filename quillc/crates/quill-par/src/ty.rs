//! Type-expression parsing.
//!
//! Grammar, loosest first:
//!
//! ```text
//! type     ::= tuple_ty ['->' type]               (fn right-assoc)
//! tuple_ty ::= postfix_ty ('*' postfix_ty)*
//! postfix_ty ::= atom_ty (ident)*                 ('int list', '(a, b) pair')
//! atom_ty  ::= tyvar | ident | '(' type {',' type} ')'
//!            | '{' label ':' type {','} '}' | 'typeof' exp
//! ```
//!
//! A parenthesized list of more than one type is a [`TypeExpKind::Composite`];
//! it only makes sense applied to a named constructor, which the postfix
//! loop performs. A singleton survives as plain grouping.

use crate::ast::*;
use crate::{ParseError, Parser};
use quill_lex::Token;
use quill_util::Label;

impl Parser {
    pub(crate) fn parse_type(&mut self) -> Result<TypeExp, ParseError> {
        let start = self.pos();
        let lhs = self.parse_tuple_type()?;
        if self.eat(&Token::Arrow) {
            let rhs = self.parse_type()?;
            let pos = start.merge(self.prev_pos());
            Ok(TypeExp::new(
                TypeExpKind::Fn(Box::new(lhs), Box::new(rhs)),
                pos,
            ))
        } else {
            Ok(lhs)
        }
    }

    fn parse_tuple_type(&mut self) -> Result<TypeExp, ParseError> {
        let start = self.pos();
        let first = self.parse_postfix_type()?;
        if !self.at(&Token::Star) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat(&Token::Star) {
            parts.push(self.parse_postfix_type()?);
        }
        Ok(TypeExp::new(
            TypeExpKind::Tuple(parts),
            start.merge(self.prev_pos()),
        ))
    }

    /// Postfix application of named type constructors: `int list list`
    fn parse_postfix_type(&mut self) -> Result<TypeExp, ParseError> {
        let start = self.pos();
        let mut ty = self.parse_atom_type()?;
        while let Token::Ident(name) = self.peek().clone() {
            self.advance();
            let args = match ty.kind {
                TypeExpKind::Composite(parts) => parts,
                _ => vec![ty],
            };
            ty = TypeExp::new(
                TypeExpKind::Named(args, name),
                start.merge(self.prev_pos()),
            );
        }
        Ok(ty)
    }

    fn parse_atom_type(&mut self) -> Result<TypeExp, ParseError> {
        let start = self.pos();
        match self.peek().clone() {
            Token::TyVar(name) => {
                self.advance();
                Ok(TypeExp::new(TypeExpKind::Var(name), start))
            }
            Token::Ident(name) => {
                self.advance();
                Ok(TypeExp::new(TypeExpKind::Named(Vec::new(), name), start))
            }
            Token::LParen => {
                self.advance();
                let mut parts = vec![self.parse_type()?];
                while self.eat(&Token::Comma) {
                    parts.push(self.parse_type()?);
                }
                self.expect(&Token::RParen)?;
                let pos = start.merge(self.prev_pos());
                if parts.len() == 1 {
                    Ok(parts.remove(0))
                } else {
                    Ok(TypeExp::new(TypeExpKind::Composite(parts), pos))
                }
            }
            Token::LBrace => {
                self.advance();
                let mut fields = Vec::new();
                if !self.at(&Token::RBrace) {
                    loop {
                        let label = match self.peek().clone() {
                            Token::Ident(name) => {
                                self.advance();
                                Label::from(name)
                            }
                            Token::Int(n) if n > 0 => {
                                self.advance();
                                Label::from(n.to_string().as_str())
                            }
                            _ => return Err(self.unexpected("a record label")),
                        };
                        self.expect(&Token::Colon)?;
                        let ty = self.parse_type()?;
                        fields.push((label, ty));
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(TypeExp::new(
                    TypeExpKind::Record(fields),
                    start.merge(self.prev_pos()),
                ))
            }
            Token::Typeof => {
                self.advance();
                let exp = self.parse_expr()?;
                Ok(TypeExp::new(
                    TypeExpKind::Expression(Box::new(exp)),
                    start.merge(self.prev_pos()),
                ))
            }
            _ => Err(self.unexpected("a type")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use quill_util::FileId;

    fn parse_type(source: &str) -> TypeExp {
        match Parser::parse_single(&format!("x : {};", source), FileId::STDIN).unwrap() {
            Statement::Expr(e) => match e.kind {
                ExprKind::Annotated(_, ty) => *ty,
                other => panic!("expected annotation, got {:?}", other),
            },
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn test_named_type() {
        match parse_type("int").kind {
            TypeExpKind::Named(args, name) => {
                assert!(args.is_empty());
                assert_eq!(name.as_str(), "int");
            }
            other => panic!("expected named, got {:?}", other),
        }
    }

    #[test]
    fn test_tyvar() {
        assert!(matches!(parse_type("'a").kind, TypeExpKind::Var(_)));
    }

    #[test]
    fn test_postfix_application() {
        match parse_type("int list").kind {
            TypeExpKind::Named(args, name) => {
                assert_eq!(args.len(), 1);
                assert_eq!(name.as_str(), "list");
            }
            other => panic!("expected named, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_postfix() {
        match parse_type("int list list").kind {
            TypeExpKind::Named(args, name) => {
                assert_eq!(name.as_str(), "list");
                assert!(matches!(&args[0].kind, TypeExpKind::Named(_, inner) if inner.eq_str("list")));
            }
            other => panic!("expected named, got {:?}", other),
        }
    }

    #[test]
    fn test_composite_application() {
        match parse_type("(int, string) pair").kind {
            TypeExpKind::Named(args, name) => {
                assert_eq!(args.len(), 2);
                assert_eq!(name.as_str(), "pair");
            }
            other => panic!("expected named, got {:?}", other),
        }
    }

    #[test]
    fn test_tuple_type() {
        match parse_type("int * string * bool").kind {
            TypeExpKind::Tuple(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected tuple, got {:?}", other),
        }
    }

    #[test]
    fn test_fn_type_right_assoc() {
        match parse_type("int -> string -> bool").kind {
            TypeExpKind::Fn(_, result) => {
                assert!(matches!(result.kind, TypeExpKind::Fn(_, _)));
            }
            other => panic!("expected fn type, got {:?}", other),
        }
    }

    #[test]
    fn test_fn_binds_looser_than_tuple() {
        match parse_type("int * int -> int").kind {
            TypeExpKind::Fn(param, _) => {
                assert!(matches!(param.kind, TypeExpKind::Tuple(_)));
            }
            other => panic!("expected fn type, got {:?}", other),
        }
    }

    #[test]
    fn test_record_type() {
        match parse_type("{id: int, name: string}").kind {
            TypeExpKind::Record(fields) => assert_eq!(fields.len(), 2),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_parenthesized_grouping() {
        match parse_type("(int -> int) list").kind {
            TypeExpKind::Named(args, name) => {
                assert_eq!(name.as_str(), "list");
                assert!(matches!(args[0].kind, TypeExpKind::Fn(_, _)));
            }
            other => panic!("expected named, got {:?}", other),
        }
    }

    #[test]
    fn test_typeof() {
        assert!(matches!(
            parse_type("typeof [1]").kind,
            TypeExpKind::Expression(_)
        ));
    }
}
