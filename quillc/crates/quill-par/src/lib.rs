//! quill-par - Parser (Syntactic Analyzer)
//!
//! ============================================================================
//! PARSING OVERVIEW
//! ============================================================================
//!
//! A hand-written recursive-descent parser over the token stream from
//! `quill-lex`, producing the abstract syntax tree in [`ast`]. The
//! closed forms (declarations, `fn`/`case`/`if`/`let`, the query
//! pipelines) each have a parsing function; infix expressions use
//! precedence climbing over a fixed level table, which handles both
//! precedence and associativity without left recursion.
//!
//! One parser instance consumes one statement stream; the REPL feeds it
//! a `;`-terminated statement at a time, a `use`d file feeds it the
//! whole file and pulls statements until end of input.
//!
//! OPERATOR PRECEDENCE (loosest to tightest):
//! ------------------------------------------
//!
//! | Level | Operators                              | Associativity |
//! |-------|----------------------------------------|---------------|
//! | 0     | `implies`                              | Left          |
//! | 1     | `orelse`                               | Left          |
//! | 2     | `andalso`                              | Left          |
//! | 3     | `o`                                    | Left          |
//! | 4     | `=` `<>` `<` `<=` `>` `>=` `elem` `notelem` | Left     |
//! | 5     | `::` `@`                               | Right         |
//! | 6     | `+` `-` `^`                            | Left          |
//! | 7     | `*` `/` `div` `mod`                    | Left          |
//! | 7b    | `over` (aggregate application)         | Left          |
//! | 8     | function application                   | Left          |
//! | 9     | `.field`                               | Left          |
//!
//! Unary `~` binds tighter than level 7 and consumes a whole
//! application chain: `~f x` negates `f x`.
//!
//! ERROR REPORTING:
//! ----------------
//! Syntax errors carry the position of the offending token; there is no
//! recovery - the REPL abandons the statement and re-prompts. Besides
//! the parser this crate holds the unparser (the `--echo` rendering and
//! the statement-cache key) and a pre/post visitor over the tree.

pub mod ast;
mod expr;
mod pat;
mod query;
mod ty;
pub mod unparse;
pub mod visit;

use ast::*;
use quill_lex::{Token, TokenInfo};
use quill_util::{Pos, Symbol};
use thiserror::Error;

/// A syntax error with the position of the offending token
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        pos: Pos,
    },
    #[error("unexpected end of input; expected {expected}")]
    UnexpectedEof { expected: String, pos: Pos },
    #[error("clauses of a function must all name '{first}', found '{other}'")]
    FunClauseNameMismatch {
        first: Symbol,
        other: Symbol,
        pos: Pos,
    },
    #[error("'forall' requires a 'require' step")]
    ForallWithoutRequire { pos: Pos },
    #[error("'require' is only legal inside 'forall'")]
    RequireOutsideForall { pos: Pos },
}

impl ParseError {
    pub fn pos(&self) -> Pos {
        match self {
            ParseError::UnexpectedToken { pos, .. }
            | ParseError::UnexpectedEof { pos, .. }
            | ParseError::FunClauseNameMismatch { pos, .. }
            | ParseError::ForallWithoutRequire { pos }
            | ParseError::RequireOutsideForall { pos } => *pos,
        }
    }
}

/// Parser over a token vector
pub struct Parser {
    tokens: Vec<TokenInfo>,
    index: usize,
}

impl Parser {
    pub fn new(tokens: Vec<TokenInfo>) -> Self {
        Self { tokens, index: 0 }
    }

    /// Convenience: lex and parse a single statement
    pub fn parse_single(source: &str, file_id: quill_util::FileId) -> Result<Statement, ParseError> {
        let tokens = quill_lex::tokenize(source, file_id).map_err(|e| ParseError::UnexpectedToken {
            expected: "a token".to_string(),
            found: e.to_string(),
            pos: e.pos,
        })?;
        let mut parser = Parser::new(tokens);
        match parser.parse_statement()? {
            Some(statement) => Ok(statement),
            None => Err(ParseError::UnexpectedEof {
                expected: "a statement".to_string(),
                pos: Pos::DUMMY,
            }),
        }
    }

    // =========================================================================
    // Token stream helpers
    // =========================================================================

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)].token
    }

    pub(crate) fn peek_ahead(&self, offset: usize) -> &Token {
        let i = (self.index + offset).min(self.tokens.len() - 1);
        &self.tokens[i].token
    }

    pub(crate) fn pos(&self) -> Pos {
        self.tokens[self.index.min(self.tokens.len() - 1)].pos
    }

    /// Position of the most recently consumed token
    pub(crate) fn prev_pos(&self) -> Pos {
        if self.index == 0 {
            self.pos()
        } else {
            self.tokens[self.index - 1].pos
        }
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.tokens[self.index.min(self.tokens.len() - 1)].token.clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    pub(crate) fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    pub(crate) fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &Token) -> Result<Pos, ParseError> {
        if self.at(token) {
            let pos = self.pos();
            self.advance();
            Ok(pos)
        } else {
            Err(self.unexpected(&token.describe()))
        }
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        let found = self.peek();
        if matches!(found, Token::Eof) {
            ParseError::UnexpectedEof {
                expected: expected.to_string(),
                pos: self.pos(),
            }
        } else {
            ParseError::UnexpectedToken {
                expected: expected.to_string(),
                found: found.describe(),
                pos: self.pos(),
            }
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<(Symbol, Pos), ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                let pos = self.pos();
                self.advance();
                Ok((name, pos))
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    // =========================================================================
    // Statements and declarations
    // =========================================================================

    /// Parse the next statement; `None` at end of input.
    ///
    /// Consumes the trailing `;` when present. Stray extra semicolons
    /// are skipped.
    pub fn parse_statement(&mut self) -> Result<Option<Statement>, ParseError> {
        while self.eat(&Token::Semi) {}
        if self.at(&Token::Eof) {
            return Ok(None);
        }
        let statement = match self.peek() {
            Token::Val | Token::Fun | Token::Datatype | Token::Type | Token::Over => {
                Statement::Decl(self.parse_decl()?)
            }
            _ => Statement::Expr(self.parse_expr()?),
        };
        if !self.eat(&Token::Semi) && !self.at(&Token::Eof) {
            return Err(self.unexpected("';'"));
        }
        Ok(Some(statement))
    }

    /// Parse all remaining statements (used for `use`d files)
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        while let Some(statement) = self.parse_statement()? {
            statements.push(statement);
        }
        Ok(statements)
    }

    pub(crate) fn parse_decl(&mut self) -> Result<Decl, ParseError> {
        let start = self.pos();
        let kind = match self.peek() {
            Token::Val => {
                self.advance();
                let rec = self.eat(&Token::Rec);
                let inst = self.eat(&Token::Inst);
                let mut binds = vec![self.parse_val_bind()?];
                while self.eat(&Token::And) {
                    binds.push(self.parse_val_bind()?);
                }
                DeclKind::Val { rec, inst, binds }
            }
            Token::Fun => {
                self.advance();
                let mut binds = vec![self.parse_fun_bind()?];
                while self.eat(&Token::And) {
                    binds.push(self.parse_fun_bind()?);
                }
                DeclKind::Fun(binds)
            }
            Token::Datatype => {
                self.advance();
                let mut binds = vec![self.parse_datatype_bind()?];
                while self.eat(&Token::And) {
                    binds.push(self.parse_datatype_bind()?);
                }
                DeclKind::Datatype(binds)
            }
            Token::Type => {
                self.advance();
                let mut binds = vec![self.parse_type_bind()?];
                while self.eat(&Token::And) {
                    binds.push(self.parse_type_bind()?);
                }
                DeclKind::TypeAlias(binds)
            }
            Token::Over => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                DeclKind::Over(name)
            }
            _ => return Err(self.unexpected("a declaration")),
        };
        Ok(Decl::new(kind, start.merge(self.prev_pos())))
    }

    fn parse_val_bind(&mut self) -> Result<ValBind, ParseError> {
        let start = self.pos();
        let pat = self.parse_pat()?;
        self.expect(&Token::Eq)?;
        let exp = self.parse_expr()?;
        Ok(ValBind {
            pat,
            exp,
            pos: start.merge(self.prev_pos()),
        })
    }

    fn parse_fun_bind(&mut self) -> Result<FunBind, ParseError> {
        let start = self.pos();
        let mut clauses = Vec::new();
        let (name, _) = self.expect_ident()?;
        clauses.push(self.parse_fun_clause()?);
        while self.eat(&Token::Bar) {
            let (clause_name, name_pos) = self.expect_ident()?;
            if clause_name != name {
                return Err(ParseError::FunClauseNameMismatch {
                    first: name,
                    other: clause_name,
                    pos: name_pos,
                });
            }
            clauses.push(self.parse_fun_clause()?);
        }
        Ok(FunBind {
            name,
            clauses,
            pos: start.merge(self.prev_pos()),
        })
    }

    /// The part of a clause after the function name:
    /// `p1 p2 [: ty] = exp`
    fn parse_fun_clause(&mut self) -> Result<FunClause, ParseError> {
        let start = self.pos();
        let mut pats = vec![self.parse_atomic_pat()?];
        while self.at_atomic_pat_start() {
            pats.push(self.parse_atomic_pat()?);
        }
        let ret_ty = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Eq)?;
        let exp = self.parse_expr()?;
        Ok(FunClause {
            pats,
            ret_ty,
            exp,
            pos: start.merge(self.prev_pos()),
        })
    }

    fn parse_datatype_bind(&mut self) -> Result<DatatypeBind, ParseError> {
        let start = self.pos();
        let tyvars = self.parse_tyvar_seq()?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::Eq)?;
        let mut ctors = vec![self.parse_ctor_bind()?];
        while self.eat(&Token::Bar) {
            ctors.push(self.parse_ctor_bind()?);
        }
        Ok(DatatypeBind {
            name,
            tyvars,
            ctors,
            pos: start.merge(self.prev_pos()),
        })
    }

    fn parse_ctor_bind(&mut self) -> Result<CtorBind, ParseError> {
        let start = self.pos();
        let (name, _) = self.expect_ident()?;
        let payload = if self.eat(&Token::Of) {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok(CtorBind {
            name,
            payload,
            pos: start.merge(self.prev_pos()),
        })
    }

    fn parse_type_bind(&mut self) -> Result<TypeBind, ParseError> {
        let start = self.pos();
        let tyvars = self.parse_tyvar_seq()?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::Eq)?;
        let ty = self.parse_type()?;
        Ok(TypeBind {
            name,
            tyvars,
            ty,
            pos: start.merge(self.prev_pos()),
        })
    }

    /// Type parameters before a type name: nothing, `'a`, or `('a, 'b)`
    fn parse_tyvar_seq(&mut self) -> Result<Vec<Symbol>, ParseError> {
        match self.peek().clone() {
            Token::TyVar(v) => {
                self.advance();
                Ok(vec![v])
            }
            Token::LParen if matches!(self.peek_ahead(1), Token::TyVar(_)) => {
                self.advance();
                let mut vars = Vec::new();
                loop {
                    match self.peek().clone() {
                        Token::TyVar(v) => {
                            self.advance();
                            vars.push(v);
                        }
                        _ => return Err(self.unexpected("a type variable")),
                    }
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen)?;
                Ok(vars)
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_util::FileId;

    fn parse(source: &str) -> Statement {
        Parser::parse_single(source, FileId::STDIN).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        Parser::parse_single(source, FileId::STDIN).unwrap_err()
    }

    #[test]
    fn test_val_decl() {
        let stmt = parse("val x = 1;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Val { rec, inst, binds } => {
                    assert!(!rec);
                    assert!(!inst);
                    assert_eq!(binds.len(), 1);
                }
                _ => panic!("expected val"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_val_rec_decl() {
        let stmt = parse("val rec f = fn x => f x;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Val { rec, .. } => assert!(rec),
                _ => panic!("expected val"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_val_and_group() {
        let stmt = parse("val x = 1 and y = 2;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Val { binds, .. } => assert_eq!(binds.len(), 2),
                _ => panic!("expected val"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_fun_decl_single_clause() {
        let stmt = parse("fun fact n = if n < 1 then 1 else n * fact (n - 1);");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Fun(binds) => {
                    assert_eq!(binds.len(), 1);
                    assert_eq!(binds[0].name.as_str(), "fact");
                    assert_eq!(binds[0].clauses.len(), 1);
                    assert_eq!(binds[0].clauses[0].pats.len(), 1);
                }
                _ => panic!("expected fun"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_fun_decl_multi_clause() {
        let stmt = parse("fun f 0 = 1 | f n = n;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Fun(binds) => assert_eq!(binds[0].clauses.len(), 2),
                _ => panic!("expected fun"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_fun_decl_curried() {
        let stmt = parse("fun add x y = x + y;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Fun(binds) => assert_eq!(binds[0].clauses[0].pats.len(), 2),
                _ => panic!("expected fun"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_fun_clause_name_mismatch() {
        let err = parse_err("fun f 0 = 1 | g n = n;");
        assert!(matches!(err, ParseError::FunClauseNameMismatch { .. }));
    }

    #[test]
    fn test_datatype_decl() {
        let stmt = parse("datatype color = RED | GREEN | BLUE;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Datatype(binds) => {
                    assert_eq!(binds[0].name.as_str(), "color");
                    assert_eq!(binds[0].ctors.len(), 3);
                    assert!(binds[0].ctors.iter().all(|c| c.payload.is_none()));
                }
                _ => panic!("expected datatype"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_datatype_decl_with_payload_and_tyvars() {
        let stmt = parse("datatype 'a tree = LEAF | NODE of 'a tree * 'a * 'a tree;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Datatype(binds) => {
                    assert_eq!(binds[0].tyvars.len(), 1);
                    assert!(binds[0].ctors[1].payload.is_some());
                }
                _ => panic!("expected datatype"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_type_alias() {
        let stmt = parse("type point = {x: int, y: int};");
        match stmt {
            Statement::Decl(decl) => assert!(matches!(decl.kind, DeclKind::TypeAlias(_))),
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_over_decl() {
        let stmt = parse("over describe;");
        match stmt {
            Statement::Decl(decl) => match decl.kind {
                DeclKind::Over(name) => assert_eq!(name.as_str(), "describe"),
                _ => panic!("expected over"),
            },
            _ => panic!("expected decl"),
        }
    }

    #[test]
    fn test_bare_expression_statement() {
        let stmt = parse("1 + 2;");
        assert!(matches!(stmt, Statement::Expr(_)));
    }

    #[test]
    fn test_missing_semi_at_eof_is_fine() {
        let stmt = Parser::parse_single("val x = 1", FileId::STDIN).unwrap();
        assert!(matches!(stmt, Statement::Decl(_)));
    }

    #[test]
    fn test_statement_stream() {
        let tokens = quill_lex::tokenize("val x = 1; val y = 2;", FileId::STDIN).unwrap();
        let mut parser = Parser::new(tokens);
        let statements = parser.parse_statements().unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_syntax_error_has_position() {
        let err = parse_err("val = 3;");
        assert_ne!(err.pos(), Pos::DUMMY);
    }
}
