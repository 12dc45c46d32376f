//! The lexer proper: direct-coded scanning over a [`Cursor`].
//!
//! Each `scan_*` method consumes one token class. Position bookkeeping is
//! uniform: the start offset/line/column is captured before scanning and
//! closed into a [`Pos`] when the token is produced.

use crate::cursor::Cursor;
use crate::{LexError, LexErrorKind, Token, TokenInfo};
use quill_util::{FileId, Pos, Symbol};

/// Lexer over one source text
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
    file_id: FileId,
}

/// Start-of-token bookkeeping
struct Start {
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: FileId) -> Self {
        Self {
            cursor: Cursor::new(source),
            file_id,
        }
    }

    /// Tokenize the whole input, ending with `Eof`
    pub fn tokenize(mut self) -> Result<Vec<TokenInfo>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.mark();
            if self.cursor.is_at_end() {
                tokens.push(TokenInfo::new(Token::Eof, self.pos_from(&start)));
                return Ok(tokens);
            }
            let token = self.scan_token(&start)?;
            tokens.push(TokenInfo::new(token, self.pos_from(&start)));
        }
    }

    fn mark(&self) -> Start {
        Start {
            offset: self.cursor.position(),
            line: self.cursor.line(),
            column: self.cursor.column(),
        }
    }

    fn pos_from(&self, start: &Start) -> Pos {
        Pos {
            start: start.offset,
            end: self.cursor.position(),
            start_line: start.line,
            start_column: start.column,
            end_line: self.cursor.line(),
            end_column: self.cursor.column(),
            file_id: self.file_id,
        }
    }

    fn error(&self, start: &Start, kind: LexErrorKind) -> LexError {
        LexError {
            kind,
            pos: self.pos_from(start),
        }
    }

    /// Skip whitespace and comments
    ///
    /// `(* ... *)` nests; `(*)` runs to end of line.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            let ch = self.cursor.current_char();
            if ch.is_whitespace() {
                self.cursor.advance();
            } else if ch == '(' && self.cursor.next_char() == '*' {
                let start = self.mark();
                self.cursor.advance(); // (
                self.cursor.advance(); // *
                if self.cursor.current_char() == ')' {
                    // line comment: (*) ... end-of-line
                    self.cursor.advance();
                    while !self.cursor.is_at_end() && self.cursor.current_char() != '\n' {
                        self.cursor.advance();
                    }
                } else {
                    self.skip_block_comment(&start)?;
                }
            } else {
                return Ok(());
            }
        }
    }

    fn skip_block_comment(&mut self, start: &Start) -> Result<(), LexError> {
        let mut depth = 1usize;
        while depth > 0 {
            if self.cursor.is_at_end() {
                return Err(self.error(start, LexErrorKind::UnterminatedComment));
            }
            let ch = self.cursor.current_char();
            if ch == '(' && self.cursor.next_char() == '*' {
                self.cursor.advance();
                self.cursor.advance();
                depth += 1;
            } else if ch == '*' && self.cursor.next_char() == ')' {
                self.cursor.advance();
                self.cursor.advance();
                depth -= 1;
            } else {
                self.cursor.advance();
            }
        }
        Ok(())
    }

    fn scan_token(&mut self, start: &Start) -> Result<Token, LexError> {
        let ch = self.cursor.current_char();
        match ch {
            '0'..='9' => self.scan_number(start, false),
            '~' if self.cursor.next_char().is_ascii_digit() => {
                self.cursor.advance();
                self.scan_number(start, true)
            }
            'a'..='z' | 'A'..='Z' => Ok(self.scan_ident()),
            '`' => self.scan_quoted_ident(start),
            '\'' => self.scan_tyvar(start),
            '#' => self.scan_hash(start),
            '"' => self.scan_string(start),
            _ => self.scan_operator(start),
        }
    }

    /// Numeric literal; `negated` when a leading `~` was already consumed
    fn scan_number(&mut self, start: &Start, negated: bool) -> Result<Token, LexError> {
        let digits_start = self.cursor.position();
        while self.cursor.current_char().is_ascii_digit() {
            self.cursor.advance();
        }
        let mut is_real = false;
        if self.cursor.current_char() == '.' && self.cursor.next_char().is_ascii_digit() {
            is_real = true;
            self.cursor.advance();
            while self.cursor.current_char().is_ascii_digit() {
                self.cursor.advance();
            }
        }
        if matches!(self.cursor.current_char(), 'e' | 'E') {
            let after = self.cursor.next_char();
            let after2 = self.cursor.char_at(2);
            if after.is_ascii_digit() || (after == '~' && after2.is_ascii_digit()) {
                is_real = true;
                self.cursor.advance(); // e
                self.cursor.advance_if('~');
                while self.cursor.current_char().is_ascii_digit() {
                    self.cursor.advance();
                }
            }
        }
        let text = self.cursor.slice(digits_start, self.cursor.position());
        if is_real {
            let rust_text = text.replace('~', "-");
            let value: f64 = rust_text
                .parse()
                .map_err(|_| self.error(start, LexErrorKind::MalformedNumber))?;
            Ok(Token::Real(if negated { -value } else { value }))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(start, LexErrorKind::IntOutOfRange))?;
            Ok(Token::Int(if negated { -value } else { value }))
        }
    }

    /// Alphanumeric identifier or keyword; primes allowed after the head
    fn scan_ident(&mut self) -> Token {
        let start = self.cursor.position();
        while matches!(self.cursor.current_char(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '\'')
        {
            self.cursor.advance();
        }
        let text = self.cursor.slice(start, self.cursor.position());
        Token::keyword(text).unwrap_or_else(|| Token::Ident(Symbol::intern(text)))
    }

    /// Backtick-quoted identifier: any text between backticks
    fn scan_quoted_ident(&mut self, start: &Start) -> Result<Token, LexError> {
        self.cursor.advance(); // opening `
        let text_start = self.cursor.position();
        while self.cursor.current_char() != '`' {
            if self.cursor.is_at_end() || self.cursor.current_char() == '\n' {
                return Err(self.error(start, LexErrorKind::UnterminatedQuotedIdent));
            }
            self.cursor.advance();
        }
        let text = self.cursor.slice(text_start, self.cursor.position());
        self.cursor.advance(); // closing `
        Ok(Token::Ident(Symbol::intern(text)))
    }

    /// Type variable: `'a`, `'b2`
    fn scan_tyvar(&mut self, start: &Start) -> Result<Token, LexError> {
        self.cursor.advance(); // '
        if !self.cursor.current_char().is_ascii_alphabetic() {
            return Err(self.error(start, LexErrorKind::UnexpectedChar('\'')));
        }
        let text_start = self.cursor.position();
        while matches!(self.cursor.current_char(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_') {
            self.cursor.advance();
        }
        let text = self.cursor.slice(text_start, self.cursor.position());
        Ok(Token::TyVar(Symbol::intern(text)))
    }

    /// `#"c"` character literal or `#label` record selector
    fn scan_hash(&mut self, start: &Start) -> Result<Token, LexError> {
        self.cursor.advance(); // #
        let ch = self.cursor.current_char();
        if ch == '"' {
            self.cursor.advance();
            let value = match self.cursor.current_char() {
                '\\' => {
                    self.cursor.advance();
                    self.scan_escape(start)?
                }
                '"' | '\0' => return Err(self.error(start, LexErrorKind::MalformedChar)),
                other => {
                    self.cursor.advance();
                    other
                }
            };
            if !self.cursor.advance_if('"') {
                return Err(self.error(start, LexErrorKind::MalformedChar));
            }
            Ok(Token::Char(value))
        } else if ch.is_ascii_alphanumeric() {
            let text_start = self.cursor.position();
            while matches!(self.cursor.current_char(), 'a'..='z' | 'A'..='Z' | '0'..='9' | '_') {
                self.cursor.advance();
            }
            let text = self.cursor.slice(text_start, self.cursor.position());
            Ok(Token::LabelRef(Symbol::intern(text)))
        } else {
            Err(self.error(start, LexErrorKind::UnexpectedChar('#')))
        }
    }

    fn scan_string(&mut self, start: &Start) -> Result<Token, LexError> {
        self.cursor.advance(); // opening "
        let mut value = String::new();
        loop {
            match self.cursor.current_char() {
                '"' => {
                    self.cursor.advance();
                    return Ok(Token::Str(value));
                }
                '\0' if self.cursor.is_at_end() => {
                    return Err(self.error(start, LexErrorKind::UnterminatedString));
                }
                '\n' => return Err(self.error(start, LexErrorKind::UnterminatedString)),
                '\\' => {
                    self.cursor.advance();
                    value.push(self.scan_escape(start)?);
                }
                other => {
                    self.cursor.advance();
                    value.push(other);
                }
            }
        }
    }

    /// One escape, the backslash already consumed
    fn scan_escape(&mut self, start: &Start) -> Result<char, LexError> {
        let ch = self.cursor.current_char();
        let value = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '"' => '"',
            'a' => '\u{7}',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0'..='9' => {
                // \ddd decimal character code
                let mut code: u32 = 0;
                for _ in 0..3 {
                    let d = self.cursor.current_char();
                    if !d.is_ascii_digit() {
                        return Err(self.error(start, LexErrorKind::InvalidEscape(d)));
                    }
                    code = code * 10 + d.to_digit(10).unwrap_or(0);
                    self.cursor.advance();
                }
                return char::from_u32(code)
                    .ok_or_else(|| self.error(start, LexErrorKind::InvalidEscape(ch)));
            }
            other => return Err(self.error(start, LexErrorKind::InvalidEscape(other))),
        };
        self.cursor.advance();
        Ok(value)
    }

    fn scan_operator(&mut self, start: &Start) -> Result<Token, LexError> {
        let ch = self.cursor.current_char();
        self.cursor.advance();
        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semi,
            '_' => Token::Wild,
            '+' => Token::Plus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '~' => Token::Tilde,
            '@' => Token::At,
            '|' => Token::Bar,
            '.' => {
                if self.cursor.current_char() == '.' && self.cursor.next_char() == '.' {
                    self.cursor.advance();
                    self.cursor.advance();
                    Token::Ellipsis
                } else {
                    Token::Dot
                }
            }
            ':' => {
                if self.cursor.advance_if(':') {
                    Token::Cons
                } else {
                    Token::Colon
                }
            }
            '=' => {
                if self.cursor.advance_if('>') {
                    Token::DArrow
                } else {
                    Token::Eq
                }
            }
            '-' => {
                if self.cursor.advance_if('>') {
                    Token::Arrow
                } else {
                    Token::Minus
                }
            }
            '<' => {
                if self.cursor.advance_if('>') {
                    Token::Ne
                } else if self.cursor.advance_if('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.cursor.advance_if('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            other => return Err(self.error(start, LexErrorKind::UnexpectedChar(other))),
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize;

    fn lex(source: &str) -> Vec<Token> {
        let mut tokens: Vec<_> = tokenize(source, FileId::STDIN)
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect();
        assert_eq!(tokens.pop(), Some(Token::Eof));
        tokens
    }

    fn lex_err(source: &str) -> LexErrorKind {
        tokenize(source, FileId::STDIN).unwrap_err().kind
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            lex("val rec fact"),
            vec![Token::Val, Token::Rec, Token::Ident(Symbol::intern("fact"))]
        );
    }

    #[test]
    fn test_prime_in_ident() {
        assert_eq!(lex("x'"), vec![Token::Ident(Symbol::intern("x'"))]);
    }

    #[test]
    fn test_int_literals() {
        assert_eq!(lex("42"), vec![Token::Int(42)]);
        assert_eq!(lex("~5"), vec![Token::Int(-5)]);
        assert_eq!(lex("0"), vec![Token::Int(0)]);
    }

    #[test]
    fn test_tilde_not_followed_by_digit_is_negation() {
        assert_eq!(
            lex("~x"),
            vec![Token::Tilde, Token::Ident(Symbol::intern("x"))]
        );
    }

    #[test]
    fn test_real_literals() {
        assert_eq!(lex("2.5"), vec![Token::Real(2.5)]);
        assert_eq!(lex("~2.5"), vec![Token::Real(-2.5)]);
        assert_eq!(lex("1e3"), vec![Token::Real(1000.0)]);
        assert_eq!(lex("2.5e~1"), vec![Token::Real(0.25)]);
    }

    #[test]
    fn test_int_dot_is_not_real() {
        // `1.` is an int followed by a dot (field selection needs this)
        assert_eq!(lex("1 . x").len(), 3);
        assert_eq!(lex("nth.1").len(), 3);
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(lex("\"abc\""), vec![Token::Str("abc".to_string())]);
        assert_eq!(lex("\"a\\nb\""), vec![Token::Str("a\nb".to_string())]);
        assert_eq!(lex("\"say \\\"hi\\\"\""), vec![Token::Str("say \"hi\"".to_string())]);
    }

    #[test]
    fn test_string_decimal_escape() {
        assert_eq!(lex("\"\\065\""), vec![Token::Str("A".to_string())]);
    }

    #[test]
    fn test_char_literal() {
        assert_eq!(lex("#\"a\""), vec![Token::Char('a')]);
        assert_eq!(lex("#\"\\n\""), vec![Token::Char('\n')]);
    }

    #[test]
    fn test_label_ref() {
        assert_eq!(
            lex("#deptno"),
            vec![Token::LabelRef(Symbol::intern("deptno"))]
        );
        assert_eq!(lex("#1"), vec![Token::LabelRef(Symbol::intern("1"))]);
    }

    #[test]
    fn test_tyvar() {
        assert_eq!(lex("'a"), vec![Token::TyVar(Symbol::intern("a"))]);
    }

    #[test]
    fn test_quoted_ident() {
        assert_eq!(
            lex("`current date`"),
            vec![Token::Ident(Symbol::intern("current date"))]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex(":: => -> <> <= >= ..."),
            vec![
                Token::Cons,
                Token::DArrow,
                Token::Arrow,
                Token::Ne,
                Token::Le,
                Token::Ge,
                Token::Ellipsis,
            ]
        );
    }

    #[test]
    fn test_nested_comment() {
        assert_eq!(lex("1 (* out (* in *) out *) 2"), vec![Token::Int(1), Token::Int(2)]);
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(lex("1 (*) all of this is comment\n2"), vec![Token::Int(1), Token::Int(2)]);
    }

    #[test]
    fn test_unterminated_comment() {
        assert_eq!(lex_err("(* never closed"), LexErrorKind::UnterminatedComment);
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(lex_err("\"oops"), LexErrorKind::UnterminatedString);
        assert_eq!(lex_err("\"multi\nline\""), LexErrorKind::UnterminatedString);
    }

    #[test]
    fn test_malformed_char() {
        assert_eq!(lex_err("#\"ab\""), LexErrorKind::MalformedChar);
        assert_eq!(lex_err("#\"\""), LexErrorKind::MalformedChar);
    }

    #[test]
    fn test_unexpected_char() {
        assert_eq!(lex_err("?"), LexErrorKind::UnexpectedChar('?'));
    }

    #[test]
    fn test_int_out_of_range() {
        assert_eq!(lex_err("99999999999999999999"), LexErrorKind::IntOutOfRange);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("val x", FileId::STDIN).unwrap();
        assert_eq!(tokens[0].pos.start_column, 1);
        assert_eq!(tokens[0].pos.end_column, 4);
        assert_eq!(tokens[1].pos.start_column, 5);
        assert_eq!(tokens[1].pos.start_line, 1);
    }

    #[test]
    fn test_positions_across_lines() {
        let tokens = tokenize("val\nx", FileId::STDIN).unwrap();
        assert_eq!(tokens[1].pos.start_line, 2);
        assert_eq!(tokens[1].pos.start_column, 1);
    }

    #[test]
    fn test_full_statement() {
        let tokens = lex("fun fact n = if n < 1 then 1 else n * fact (n - 1);");
        assert_eq!(tokens[0], Token::Fun);
        assert_eq!(tokens.last(), Some(&Token::Semi));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::tokenize;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_int_literals_round_trip(n in 0i64..i64::MAX) {
            let tokens = tokenize(&n.to_string(), FileId::STDIN).unwrap();
            prop_assert_eq!(&tokens[0].token, &Token::Int(n));
        }

        #[test]
        fn prop_negated_int_literals(n in 1i64..i64::MAX) {
            let tokens = tokenize(&format!("~{}", n), FileId::STDIN).unwrap();
            prop_assert_eq!(&tokens[0].token, &Token::Int(-n));
        }

        #[test]
        fn prop_string_literals_preserve_content(s in "[a-zA-Z0-9 ]*") {
            let tokens = tokenize(&format!("\"{}\"", s), FileId::STDIN).unwrap();
            prop_assert_eq!(&tokens[0].token, &Token::Str(s));
        }

        #[test]
        fn prop_idents_lex_as_one_token(s in "[a-z][a-zA-Z0-9_]{0,20}") {
            let tokens = tokenize(&s, FileId::STDIN).unwrap();
            // Either a keyword or the identifier itself, never a split.
            prop_assert_eq!(tokens.len(), 2);
            if let Token::Ident(sym) = &tokens[0].token {
                prop_assert_eq!(sym.as_str(), s);
            }
        }

        #[test]
        fn prop_lexer_never_panics(s in "\\PC*") {
            let _ = tokenize(&s, FileId::STDIN);
        }
    }
}
