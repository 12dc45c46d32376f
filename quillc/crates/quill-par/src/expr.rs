//! Expression parsing: precedence climbing over the fixed level table.
//!
//! `parse_expr` handles the closed expression forms (`fn`, `case`, `if`,
//! `let`, the query forms) directly, then falls through to the infix
//! ladder. Application and field selection live below the ladder, so
//! `#sal e + 1` parses as `(#sal e) + 1`.

use crate::ast::*;
use crate::{ParseError, Parser};
use quill_lex::Token;
use quill_util::{Label, Symbol};

/// Precedence levels, loosest first
const LEVEL_IMPLIES: u8 = 0;
const LEVEL_ORELSE: u8 = 1;
const LEVEL_ANDALSO: u8 = 2;
const LEVEL_COMPOSE: u8 = 3;
const LEVEL_COMPARE: u8 = 4;
const LEVEL_CONS: u8 = 5;
const LEVEL_ADD: u8 = 6;
const LEVEL_MUL: u8 = 7;
const LEVEL_TOP: u8 = 8;

impl Parser {
    /// Parse a complete expression, including an optional trailing
    /// type annotation `e : ty`
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        let exp = match self.peek() {
            Token::Fn => {
                self.advance();
                let arms = self.parse_match_arms()?;
                Expr::new(ExprKind::Fn(arms), start.merge(self.prev_pos()))
            }
            Token::Case => {
                self.advance();
                let scrutinee = self.parse_expr()?;
                self.expect(&Token::Of)?;
                let arms = self.parse_match_arms()?;
                Expr::new(
                    ExprKind::Case(Box::new(scrutinee), arms),
                    start.merge(self.prev_pos()),
                )
            }
            Token::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&Token::Then)?;
                let then_exp = self.parse_expr()?;
                self.expect(&Token::Else)?;
                let else_exp = self.parse_expr()?;
                Expr::new(
                    ExprKind::If(Box::new(cond), Box::new(then_exp), Box::new(else_exp)),
                    start.merge(self.prev_pos()),
                )
            }
            Token::Let => {
                self.advance();
                let mut decls = Vec::new();
                while !self.at(&Token::In) {
                    decls.push(self.parse_decl()?);
                    while self.eat(&Token::Semi) {}
                }
                self.expect(&Token::In)?;
                let body = self.parse_expr()?;
                self.expect(&Token::End)?;
                Expr::new(
                    ExprKind::Let(decls, Box::new(body)),
                    start.merge(self.prev_pos()),
                )
            }
            Token::From | Token::Exists | Token::Forall => self.parse_query()?,
            _ => self.parse_infix(LEVEL_IMPLIES)?,
        };
        if self.at(&Token::Colon) {
            self.advance();
            let ty = self.parse_type()?;
            let pos = start.merge(self.prev_pos());
            Ok(Expr::new(
                ExprKind::Annotated(Box::new(exp), Box::new(ty)),
                pos,
            ))
        } else {
            Ok(exp)
        }
    }

    /// `pat => exp | pat => exp | …`
    pub(crate) fn parse_match_arms(&mut self) -> Result<Vec<MatchArm>, ParseError> {
        let mut arms = Vec::new();
        loop {
            let start = self.pos();
            let pat = self.parse_pat()?;
            self.expect(&Token::DArrow)?;
            let exp = self.parse_expr()?;
            arms.push(MatchArm {
                pat,
                exp,
                pos: start.merge(self.prev_pos()),
            });
            if !self.eat(&Token::Bar) {
                break;
            }
        }
        Ok(arms)
    }

    /// Map the current token to its infix operator at `level`, if any
    fn infix_op_at(&self, level: u8) -> Option<BinOp> {
        let op = match (level, self.peek()) {
            (LEVEL_IMPLIES, Token::Implies) => BinOp::Implies,
            (LEVEL_ORELSE, Token::Orelse) => BinOp::Orelse,
            (LEVEL_ANDALSO, Token::Andalso) => BinOp::Andalso,
            (LEVEL_COMPOSE, Token::Ident(s)) if s.eq_str("o") => BinOp::Compose,
            (LEVEL_COMPARE, Token::Eq) => BinOp::Eq,
            (LEVEL_COMPARE, Token::Ne) => BinOp::Ne,
            (LEVEL_COMPARE, Token::Lt) => BinOp::Lt,
            (LEVEL_COMPARE, Token::Le) => BinOp::Le,
            (LEVEL_COMPARE, Token::Gt) => BinOp::Gt,
            (LEVEL_COMPARE, Token::Ge) => BinOp::Ge,
            (LEVEL_COMPARE, Token::Elem) => BinOp::Elem,
            (LEVEL_COMPARE, Token::Notelem) => BinOp::Notelem,
            (LEVEL_CONS, Token::Cons) => BinOp::Cons,
            (LEVEL_CONS, Token::At) => BinOp::Append,
            (LEVEL_ADD, Token::Plus) => BinOp::Plus,
            (LEVEL_ADD, Token::Minus) => BinOp::Minus,
            (LEVEL_ADD, Token::Caret) => BinOp::Concat,
            (LEVEL_MUL, Token::Star) => BinOp::Times,
            (LEVEL_MUL, Token::Slash) => BinOp::Divide,
            (LEVEL_MUL, Token::Div) => BinOp::Div,
            (LEVEL_MUL, Token::Mod) => BinOp::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing from `level` upward
    fn parse_infix(&mut self, level: u8) -> Result<Expr, ParseError> {
        if level >= LEVEL_TOP {
            return self.parse_aggregate();
        }
        // Level 5 is right-associative; everything else is left.
        if level == LEVEL_CONS {
            let lhs = self.parse_infix(level + 1)?;
            if let Some(op) = self.infix_op_at(level) {
                self.advance();
                let rhs = self.parse_infix(level)?;
                let pos = lhs.pos.merge(rhs.pos);
                return Ok(Expr::new(
                    ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)),
                    pos,
                ));
            }
            return Ok(lhs);
        }
        let mut lhs = self.parse_infix(level + 1)?;
        while let Some(op) = self.infix_op_at(level) {
            self.advance();
            let rhs = self.parse_infix(level + 1)?;
            let pos = lhs.pos.merge(rhs.pos);
            lhs = Expr::new(ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    /// Level 7b: `agg over exp`
    fn parse_aggregate(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_apply()?;
        while self.at(&Token::Over) {
            self.advance();
            let rhs = self.parse_apply()?;
            let pos = lhs.pos.merge(rhs.pos);
            lhs = Expr::new(ExprKind::Aggregate(Box::new(lhs), Box::new(rhs)), pos);
        }
        Ok(lhs)
    }

    /// Level 8: left-associative application chains, and unary `~`
    fn parse_apply(&mut self) -> Result<Expr, ParseError> {
        if self.at(&Token::Tilde) {
            let start = self.pos();
            self.advance();
            let operand = self.parse_apply()?;
            let pos = start.merge(operand.pos);
            return Ok(Expr::new(ExprKind::Negate(Box::new(operand)), pos));
        }
        let mut exp = self.parse_postfix()?;
        while self.at_atom_start() {
            let arg = self.parse_postfix()?;
            let pos = exp.pos.merge(arg.pos);
            exp = Expr::new(ExprKind::Apply(Box::new(exp), Box::new(arg)), pos);
        }
        Ok(exp)
    }

    /// Level 9: `.field` selection
    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut exp = self.parse_atom()?;
        while self.at(&Token::Dot) {
            self.advance();
            let label = self.parse_label()?;
            let pos = exp.pos.merge(self.prev_pos());
            exp = Expr::new(ExprKind::Field(Box::new(exp), label), pos);
        }
        Ok(exp)
    }

    /// A record label: identifier or ordinal
    fn parse_label(&mut self) -> Result<Label, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(Label::from(name))
            }
            Token::Int(n) if n > 0 => {
                self.advance();
                Ok(Label::from(n.to_string().as_str()))
            }
            _ => Err(self.unexpected("a record label")),
        }
    }

    /// True when the current token can begin an atomic expression
    ///
    /// `o` is excluded: it has infix status, so in argument position it
    /// is always the composition operator, never an operand.
    pub(crate) fn at_atom_start(&self) -> bool {
        match self.peek() {
            Token::Ident(name) => !name.eq_str("o"),
            Token::Int(_)
            | Token::Real(_)
            | Token::Str(_)
            | Token::Char(_)
            | Token::LabelRef(_)
            | Token::LParen
            | Token::LBracket
            | Token::LBrace => true,
            _ => false,
        }
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        match self.peek().clone() {
            Token::Int(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Lit(Literal::Int(n)), start))
            }
            Token::Real(r) => {
                self.advance();
                Ok(Expr::new(ExprKind::Lit(Literal::Real(r)), start))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Lit(Literal::Str(s)), start))
            }
            Token::Char(c) => {
                self.advance();
                Ok(Expr::new(ExprKind::Lit(Literal::Char(c)), start))
            }
            Token::Ident(name) => {
                self.advance();
                let kind = if name == quill_util::symbol::SYM_TRUE {
                    ExprKind::Lit(Literal::Bool(true))
                } else if name == quill_util::symbol::SYM_FALSE {
                    ExprKind::Lit(Literal::Bool(false))
                } else {
                    ExprKind::Id(name)
                };
                Ok(Expr::new(kind, start))
            }
            Token::LabelRef(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::RecordSel(Label::from(name)), start))
            }
            Token::LParen => self.parse_paren(),
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_record(),
            Token::Typeof => Err(self.unexpected("an expression ('typeof' is a type form)")),
            _ => Err(self.unexpected("an expression")),
        }
    }

    /// `()`, `(e)`, or `(e1, e2, …)`
    fn parse_paren(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        self.expect(&Token::LParen)?;
        if self.at(&Token::RParen) {
            self.advance();
            return Ok(Expr::new(
                ExprKind::Lit(Literal::Unit),
                start.merge(self.prev_pos()),
            ));
        }
        let first = self.parse_expr()?;
        if self.at(&Token::Comma) {
            let mut exps = vec![first];
            while self.eat(&Token::Comma) {
                exps.push(self.parse_expr()?);
            }
            self.expect(&Token::RParen)?;
            Ok(Expr::new(
                ExprKind::Tuple(exps),
                start.merge(self.prev_pos()),
            ))
        } else {
            self.expect(&Token::RParen)?;
            Ok(first)
        }
    }

    /// `[]` or `[e1, e2, …]`
    fn parse_list(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        self.expect(&Token::LBracket)?;
        let mut exps = Vec::new();
        if !self.at(&Token::RBracket) {
            exps.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                exps.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Expr::new(
            ExprKind::List(exps),
            start.merge(self.prev_pos()),
        ))
    }

    /// `{field = e, shorthand, …}` or `{base with field = e, …}`
    ///
    /// Disambiguation: if the brace opens on `label =`, `label ,` or
    /// `label }` the body is a plain record; otherwise an expression
    /// follows and `with` is required.
    fn parse_record(&mut self) -> Result<Expr, ParseError> {
        let start = self.pos();
        self.expect(&Token::LBrace)?;
        if self.at(&Token::RBrace) {
            self.advance();
            return Ok(Expr::new(
                ExprKind::Record {
                    fields: Vec::new(),
                    base: None,
                },
                start.merge(self.prev_pos()),
            ));
        }
        let plain = matches!(self.peek(), Token::Ident(_) | Token::Int(_))
            && matches!(
                self.peek_ahead(1),
                Token::Eq | Token::Comma | Token::RBrace
            );
        let base = if plain {
            None
        } else {
            let base = self.parse_expr()?;
            self.expect(&Token::With)?;
            Some(Box::new(base))
        };
        let mut fields = Vec::new();
        loop {
            let field_pos = self.pos();
            let label = self.parse_label()?;
            let exp = if self.eat(&Token::Eq) {
                self.parse_expr()?
            } else {
                // Shorthand: `{a, b}` binds each label to the variable
                // of the same name.
                Expr::new(ExprKind::Id(Symbol::intern(label.as_str())), field_pos)
            };
            fields.push((label, exp));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::new(
            ExprKind::Record { fields, base },
            start.merge(self.prev_pos()),
        ))
    }
}
