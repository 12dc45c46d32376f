//! Datalog parser: a small direct-coded lexer and recursive descent.
//!
//! Lexical conventions: `% …` comments run to end of line; identifiers
//! starting with an uppercase letter are variables, lowercase are
//! relation names, booleans and column types; numbers and double-quoted
//! strings are constants. Items end with `.`; the `.input`/`.output`
//! directives start with `.` at item position.

use crate::ast::*;
use crate::DatalogError;
use quill_util::{FileId, Pos, Symbol};

/// Parse a complete program
pub fn parse_program(source: &str, file_id: FileId) -> Result<Program, DatalogError> {
    let tokens = scan(source, file_id)?;
    let mut parser = DlParser { tokens, index: 0 };
    parser.program()
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Lowercase identifier (relation, type name, boolean)
    Lower(Symbol),
    /// Uppercase identifier (variable)
    Upper(Symbol),
    Int(i64),
    Real(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    /// `:-`
    Turnstile,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Plus,
    Minus,
    Star,
    Slash,
    /// `.input` / `.output`
    Directive(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct TokInfo {
    tok: Tok,
    pos: Pos,
}

fn scan(source: &str, file_id: FileId) -> Result<Vec<TokInfo>, DatalogError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line: u32 = 1;
    let mut col: u32 = 1;
    macro_rules! pos_at {
        ($start:expr, $sl:expr, $sc:expr) => {
            Pos {
                start: $start,
                end: i,
                start_line: $sl,
                start_column: $sc,
                end_line: line,
                end_column: col,
                file_id,
            }
        };
    }
    while i < bytes.len() {
        let c = bytes[i] as char;
        let (start, sl, sc) = (i, line, col);
        match c {
            ' ' | '\t' | '\r' => {
                i += 1;
                col += 1;
            }
            '\n' => {
                i += 1;
                line += 1;
                col = 1;
            }
            '%' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                    col += 1;
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                    col += 1;
                }
                let text = &source[start..i];
                let tok = if c.is_ascii_uppercase() {
                    Tok::Upper(Symbol::intern(text))
                } else {
                    Tok::Lower(Symbol::intern(text))
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            '0'..='9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                    col += 1;
                }
                let mut is_real = false;
                if i + 1 < bytes.len()
                    && bytes[i] == b'.'
                    && bytes[i + 1].is_ascii_digit()
                {
                    is_real = true;
                    i += 1;
                    col += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                        col += 1;
                    }
                }
                let text = &source[start..i];
                let pos = pos_at!(start, sl, sc);
                let tok = if is_real {
                    Tok::Real(text.parse().map_err(|_| DatalogError::Parse {
                        message: format!("malformed number {}", text),
                        pos,
                    })?)
                } else {
                    Tok::Int(text.parse().map_err(|_| DatalogError::Parse {
                        message: format!("malformed number {}", text),
                        pos,
                    })?)
                };
                tokens.push(TokInfo { tok, pos });
            }
            '"' => {
                i += 1;
                col += 1;
                let mut value = String::new();
                loop {
                    if i >= bytes.len() || bytes[i] == b'\n' {
                        return Err(DatalogError::Parse {
                            message: "unterminated string".to_string(),
                            pos: pos_at!(start, sl, sc),
                        });
                    }
                    if bytes[i] == b'"' {
                        i += 1;
                        col += 1;
                        break;
                    }
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        let escape = bytes[i + 1];
                        value.push(match escape {
                            b'n' => '\n',
                            b't' => '\t',
                            b'\\' => '\\',
                            b'"' => '"',
                            other => other as char,
                        });
                        i += 2;
                        col += 2;
                        continue;
                    }
                    value.push(bytes[i] as char);
                    i += 1;
                    col += 1;
                }
                tokens.push(TokInfo {
                    tok: Tok::Str(value),
                    pos: pos_at!(start, sl, sc),
                });
            }
            '.' => {
                // `.input` / `.output` directives, else an item period.
                i += 1;
                col += 1;
                let rest = &source[i..];
                let tok = if rest.starts_with("input") {
                    i += 5;
                    col += 5;
                    Tok::Directive("input")
                } else if rest.starts_with("output") {
                    i += 6;
                    col += 6;
                    Tok::Directive("output")
                } else {
                    Tok::Dot
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            ':' => {
                i += 1;
                col += 1;
                let tok = if i < bytes.len() && bytes[i] == b'-' {
                    i += 1;
                    col += 1;
                    Tok::Turnstile
                } else {
                    Tok::Colon
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            '<' => {
                i += 1;
                col += 1;
                let tok = if i < bytes.len() && bytes[i] == b'=' {
                    i += 1;
                    col += 1;
                    Tok::Le
                } else {
                    Tok::Lt
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            '>' => {
                i += 1;
                col += 1;
                let tok = if i < bytes.len() && bytes[i] == b'=' {
                    i += 1;
                    col += 1;
                    Tok::Ge
                } else {
                    Tok::Gt
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            '!' => {
                i += 1;
                col += 1;
                let tok = if i < bytes.len() && bytes[i] == b'=' {
                    i += 1;
                    col += 1;
                    Tok::Ne
                } else {
                    Tok::Bang
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            '(' | ')' | ',' | '=' | '+' | '-' | '*' | '/' => {
                i += 1;
                col += 1;
                let tok = match c {
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    ',' => Tok::Comma,
                    '=' => Tok::Eq,
                    '+' => Tok::Plus,
                    '-' => Tok::Minus,
                    '*' => Tok::Star,
                    _ => Tok::Slash,
                };
                tokens.push(TokInfo {
                    tok,
                    pos: pos_at!(start, sl, sc),
                });
            }
            other => {
                i += 1;
                col += 1;
                return Err(DatalogError::Parse {
                    message: format!("unexpected character '{}'", other),
                    pos: pos_at!(start, sl, sc),
                });
            }
        }
    }
    tokens.push(TokInfo {
        tok: Tok::Eof,
        pos: Pos {
            start: bytes.len(),
            end: bytes.len(),
            start_line: line,
            start_column: col,
            end_line: line,
            end_column: col,
            file_id,
        },
    });
    Ok(tokens)
}

struct DlParser {
    tokens: Vec<TokInfo>,
    index: usize,
}

impl DlParser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.index.min(self.tokens.len() - 1)].tok
    }

    fn pos(&self) -> Pos {
        self.tokens[self.index.min(self.tokens.len() - 1)].pos
    }

    fn advance(&mut self) -> Tok {
        let tok = self.tokens[self.index.min(self.tokens.len() - 1)].tok.clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), DatalogError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> DatalogError {
        DatalogError::Parse {
            message: format!("expected {}", expected),
            pos: self.pos(),
        }
    }

    fn program(&mut self) -> Result<Program, DatalogError> {
        let mut items = Vec::new();
        while !matches!(self.peek(), Tok::Eof) {
            items.push(self.item()?);
        }
        Ok(Program { items })
    }

    fn item(&mut self) -> Result<Item, DatalogError> {
        let start = self.pos();
        match self.peek().clone() {
            Tok::Directive("input") => {
                self.advance();
                let relation = self.relation_name()?;
                let path = match self.advance() {
                    Tok::Str(path) => path,
                    _ => return Err(self.unexpected("a file path string")),
                };
                self.expect(Tok::Dot, "'.'")?;
                Ok(Item::Input(Input {
                    relation,
                    path,
                    pos: start,
                }))
            }
            Tok::Directive("output") => {
                self.advance();
                let relation = self.relation_name()?;
                self.expect(Tok::Dot, "'.'")?;
                Ok(Item::Output(Output {
                    relation,
                    pos: start,
                }))
            }
            Tok::Lower(_) => self.decl_fact_or_rule(),
            _ => Err(self.unexpected("a declaration, fact, rule or directive")),
        }
    }

    fn relation_name(&mut self) -> Result<Symbol, DatalogError> {
        match self.advance() {
            Tok::Lower(name) => Ok(name),
            _ => Err(self.unexpected("a relation name")),
        }
    }

    /// `rel(x: int, …).` | `rel(1, …).` | `rel(X, …) :- body.`
    fn decl_fact_or_rule(&mut self) -> Result<Item, DatalogError> {
        let start = self.pos();
        let name = self.relation_name()?;
        self.expect(Tok::LParen, "'('")?;
        // A declaration iff the first argument is `ident : type`.
        let is_decl = matches!(
            (self.peek(), &self.tokens[(self.index + 1).min(self.tokens.len() - 1)].tok),
            (Tok::Lower(_), Tok::Colon)
        );
        if is_decl {
            let mut params = Vec::new();
            loop {
                let param = match self.advance() {
                    Tok::Lower(param) => param,
                    _ => return Err(self.unexpected("a parameter name")),
                };
                self.expect(Tok::Colon, "':'")?;
                let ty = match self.advance() {
                    Tok::Lower(ty) if ty.eq_str("int") => ColumnType::Int,
                    Tok::Lower(ty) if ty.eq_str("real") => ColumnType::Real,
                    Tok::Lower(ty) if ty.eq_str("bool") => ColumnType::Bool,
                    Tok::Lower(ty) if ty.eq_str("string") => ColumnType::String,
                    _ => return Err(self.unexpected("a column type")),
                };
                params.push((param, ty));
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "')'")?;
            self.expect(Tok::Dot, "'.'")?;
            return Ok(Item::Decl(RelDecl {
                name,
                params,
                pos: start,
            }));
        }
        // Arguments, then decide fact vs rule by what follows.
        let mut args = Vec::new();
        if !matches!(self.peek(), Tok::RParen) {
            loop {
                args.push(self.term()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        let head = Atom {
            relation: name,
            args,
            pos: start,
        };
        if self.eat(&Tok::Dot) {
            // A fact: every argument must be a ground constant.
            let mut values = Vec::new();
            for arg in &head.args {
                match arg {
                    Term::Const(c) => values.push(c.clone()),
                    _ => {
                        return Err(DatalogError::NonGroundFact {
                            relation: name,
                            pos: start,
                        })
                    }
                }
            }
            return Ok(Item::Fact(Fact {
                relation: name,
                values,
                pos: start,
            }));
        }
        self.expect(Tok::Turnstile, "':-' or '.'")?;
        let mut body = vec![self.body_item()?];
        while self.eat(&Tok::Comma) {
            body.push(self.body_item()?);
        }
        self.expect(Tok::Dot, "'.'")?;
        Ok(Item::Rule(Rule {
            head,
            body,
            pos: start,
        }))
    }

    fn body_item(&mut self) -> Result<BodyItem, DatalogError> {
        let start = self.pos();
        if self.eat(&Tok::Bang) {
            let atom = self.atom()?;
            return Ok(BodyItem::Negated(atom));
        }
        // An atom iff a relation name followed by '('.
        if matches!(self.peek(), Tok::Lower(_))
            && matches!(
                self.tokens[(self.index + 1).min(self.tokens.len() - 1)].tok,
                Tok::LParen
            )
        {
            return Ok(BodyItem::Atom(self.atom()?));
        }
        // Otherwise a comparison.
        let lhs = self.term()?;
        let op = match self.advance() {
            Tok::Eq => CmpOp::Eq,
            Tok::Ne => CmpOp::Ne,
            Tok::Lt => CmpOp::Lt,
            Tok::Le => CmpOp::Le,
            Tok::Gt => CmpOp::Gt,
            Tok::Ge => CmpOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        let rhs = self.term()?;
        Ok(BodyItem::Compare {
            op,
            lhs,
            rhs,
            pos: start,
        })
    }

    fn atom(&mut self) -> Result<Atom, DatalogError> {
        let start = self.pos();
        let relation = self.relation_name()?;
        self.expect(Tok::LParen, "'('")?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Tok::RParen) {
            loop {
                args.push(self.term()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen, "')'")?;
        Ok(Atom {
            relation,
            args,
            pos: start,
        })
    }

    /// Terms with `+ -` over `* / %`-free factors (no datalog modulo
    /// spelling; `mod` is not part of the surface)
    fn term(&mut self) -> Result<Term, DatalogError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => ArithOp::Add,
                Tok::Minus => ArithOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = Term::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Term, DatalogError> {
        let mut lhs = self.base_term()?;
        loop {
            let op = match self.peek() {
                Tok::Star => ArithOp::Mul,
                Tok::Slash => ArithOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.base_term()?;
            lhs = Term::Arith(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn base_term(&mut self) -> Result<Term, DatalogError> {
        match self.advance() {
            Tok::Upper(v) => Ok(Term::Var(v)),
            Tok::Int(n) => Ok(Term::Const(Const::Int(n))),
            Tok::Real(r) => Ok(Term::Const(Const::Real(r))),
            Tok::Str(s) => Ok(Term::Const(Const::Str(s))),
            Tok::Lower(w) if w.eq_str("true") => Ok(Term::Const(Const::Bool(true))),
            Tok::Lower(w) if w.eq_str("false") => Ok(Term::Const(Const::Bool(false))),
            Tok::Minus => {
                // Negative numeric constant.
                match self.advance() {
                    Tok::Int(n) => Ok(Term::Const(Const::Int(-n))),
                    Tok::Real(r) => Ok(Term::Const(Const::Real(-r))),
                    _ => Err(self.unexpected("a number after '-'")),
                }
            }
            Tok::LParen => {
                let inner = self.term()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected("a term")),
        }
    }
}
